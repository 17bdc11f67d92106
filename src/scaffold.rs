//! Project scaffolding: starter-template copy and layout/partial stubs.

use camino::Utf8Path;
use console::style;

use crate::error::ScaffoldError;

/// Categories a stub can be created for.
const CATEGORIES: [&str; 2] = ["layout", "partial"];

fn user_error(message: &str) {
    eprintln!("{} {message}", style("error").red());
}

/// Copies the starter template tree into `target`. Used as the first step of
/// the `init` pipeline.
pub(crate) fn copy_template(template: &Utf8Path, target: &Utf8Path) -> Result<(), ScaffoldError> {
    crate::io::copy_rec(template, target)?;
    Ok(())
}

/// Creates a project-local copy of a stock layout or partial so it can be
/// customized.
///
/// `argument` takes the form `category:target`, e.g. `layout:blank`. The stub
/// is copied from `library/<category>s/<target>.html` into
/// `project/src/<category>s/<target>.html`. Invalid category, missing source
/// and pre-existing target are user mistakes: they are reported with a
/// message and the call still returns `Ok`. Only filesystem failures surface
/// as errors.
pub fn create(
    library: &Utf8Path,
    project: &Utf8Path,
    argument: &str,
) -> Result<(), ScaffoldError> {
    if argument.is_empty() {
        user_error("no target specified");
        return Ok(());
    }

    let Some((category, target)) = argument.split_once(':') else {
        user_error(r#"category can be only "layout" or "partial""#);
        return Ok(());
    };
    if !CATEGORIES.contains(&category) {
        user_error(r#"category can be only "layout" or "partial""#);
        return Ok(());
    }

    let source = library
        .join(format!("{category}s"))
        .join(target)
        .with_extension("html");
    let destination = project
        .join("src")
        .join(format!("{category}s"))
        .join(target)
        .with_extension("html");

    if !source.exists() {
        user_error("source file does not exist");
        return Ok(());
    }
    if destination.exists() {
        user_error("target file already exists");
        return Ok(());
    }

    eprintln!("create custom {target} {category}");

    if let Some(dir) = destination.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::copy(&source, &destination)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use camino::Utf8PathBuf;

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    fn library_with(category: &str, name: &str) -> (tempfile::TempDir, Utf8PathBuf) {
        let (dir, root) = scratch();
        let library = root.join("library");
        std::fs::create_dir_all(library.join(format!("{category}s"))).unwrap();
        std::fs::write(
            library.join(format!("{category}s/{name}.html")),
            "<main></main>",
        )
        .unwrap();
        (dir, root)
    }

    #[test]
    fn creates_a_layout_stub() {
        let (_dir, root) = library_with("layout", "blank");
        let project = root.join("project");
        std::fs::create_dir_all(&project).unwrap();

        create(&root.join("library"), &project, "layout:blank").unwrap();

        let copied = project.join("src/layouts/blank.html");
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "<main></main>");
    }

    #[test]
    fn invalid_category_is_a_user_error_not_a_failure() {
        let (_dir, root) = library_with("layout", "blank");
        let project = root.join("project");
        std::fs::create_dir_all(&project).unwrap();

        create(&root.join("library"), &project, "widget:blank").unwrap();
        create(&root.join("library"), &project, "garbage").unwrap();
        create(&root.join("library"), &project, "").unwrap();

        assert!(!project.join("src").exists());
    }

    #[test]
    fn missing_source_creates_nothing() {
        let (_dir, root) = library_with("layout", "blank");
        let project = root.join("project");
        std::fs::create_dir_all(&project).unwrap();

        create(&root.join("library"), &project, "layout:nope").unwrap();
        assert!(!project.join("src/layouts/nope.html").exists());
    }

    #[test]
    fn existing_target_is_never_overwritten() {
        let (_dir, root) = library_with("partial", "nav");
        let project = root.join("project");
        std::fs::create_dir_all(project.join("src/partials")).unwrap();
        std::fs::write(project.join("src/partials/nav.html"), "customized").unwrap();

        create(&root.join("library"), &project, "partial:nav").unwrap();

        assert_eq!(
            std::fs::read_to_string(project.join("src/partials/nav.html")).unwrap(),
            "customized"
        );
    }
}
