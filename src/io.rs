use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::Style;
use glob::Pattern;

use crate::error::BuildError;

const ANSI_BLUE: Style = Style::new().blue();

pub(crate) fn as_overhead(s: Instant) -> impl Display {
    let e = Instant::now();
    let f = format!("(+{}ms)", e.duration_since(s).as_millis());
    ANSI_BLUE.apply_to(f)
}

/// Delete the entire output root if it exists, then recreate it empty.
pub(crate) async fn clean_output(dist: &Utf8Path) -> Result<(), BuildError> {
    match tokio::fs::remove_dir_all(dist).await {
        Ok(()) => {}
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(err.into()),
    }

    tokio::fs::create_dir_all(dist).await?;

    Ok(())
}

/// Copies every file matched by `patterns` into `dest`, keeping its path
/// relative to `strip`. Paths matching any of `excludes` are skipped.
/// Returns the number of files copied.
pub(crate) async fn copy_glob(
    patterns: &[String],
    excludes: &[Pattern],
    strip: &Utf8Path,
    dest: &Utf8Path,
) -> Result<u64, BuildError> {
    let mut copied = 0;

    for pattern in patterns {
        for entry in glob::glob(pattern)? {
            let path = Utf8PathBuf::try_from(entry?)?;
            if path.is_dir() {
                continue;
            }
            if excludes.iter().any(|excluded| excluded.matches(path.as_str())) {
                continue;
            }

            let rel = path.strip_prefix(strip).unwrap_or(path.as_path());
            let target = dest.join(rel);

            if let Some(dir) = target.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }
            tokio::fs::copy(&path, &target).await?;
            copied += 1;
        }
    }

    Ok(copied)
}

/// Recursive copy of a directory tree, used by the scaffolding step.
pub(crate) fn copy_rec(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> std::io::Result<()> {
    fs::create_dir_all(&dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let filetype = entry.file_type()?;
        if filetype.is_dir() {
            copy_rec(entry.path(), dst.as_ref().join(entry.file_name()))?;
        } else {
            fs::copy(entry.path(), dst.as_ref().join(entry.file_name()))?;
        }
    }

    Ok(())
}
