//! Process-wide cache of parsed template artifacts.

use std::collections::HashMap;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};

/// A cache of compiled template/page artifacts keyed by source path.
///
/// The rendering collaborator owns the entries through [`get_or_compute`];
/// the watch layer only ever calls [`invalidate`], synchronously, before
/// re-running a reaction whose inputs (layouts, partials, data helpers)
/// changed. Injecting a fresh cache per test keeps this state out of
/// globals.
///
/// [`get_or_compute`]: TemplateCache::get_or_compute
/// [`invalidate`]: TemplateCache::invalidate
#[derive(Debug, Default)]
pub struct TemplateCache {
    entries: Mutex<HashMap<Utf8PathBuf, std::sync::Arc<str>>>,
}

impl TemplateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached artifact for `path`, computing and storing it on a
    /// miss. A failed computation caches nothing.
    pub fn get_or_compute<F>(
        &self,
        path: impl AsRef<Utf8Path>,
        compute: F,
    ) -> anyhow::Result<std::sync::Arc<str>>
    where
        F: FnOnce() -> anyhow::Result<String>,
    {
        let path = path.as_ref();

        if let Some(found) = self.entries.lock().unwrap().get(path) {
            return Ok(found.clone());
        }

        let computed: std::sync::Arc<str> = compute()?.into();
        self.entries
            .lock()
            .unwrap()
            .insert(path.to_owned(), computed.clone());

        Ok(computed)
    }

    /// Drops every cached artifact. Readers recompute on next access.
    pub fn invalidate(&self) {
        self.entries.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().unwrap().is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn computes_once_per_path() {
        let cache = TemplateCache::new();
        let mut calls = 0;

        for _ in 0..3 {
            let value = cache
                .get_or_compute("src/layouts/base.html", || {
                    calls += 1;
                    Ok("compiled".to_string())
                })
                .unwrap();
            assert_eq!(&*value, "compiled");
        }

        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn invalidate_forces_recompute() {
        let cache = TemplateCache::new();

        cache
            .get_or_compute("a.html", || Ok("one".to_string()))
            .unwrap();
        cache.invalidate();
        assert!(cache.is_empty());

        let value = cache
            .get_or_compute("a.html", || Ok("two".to_string()))
            .unwrap();
        assert_eq!(&*value, "two");
    }

    #[test]
    fn failed_compute_caches_nothing() {
        let cache = TemplateCache::new();

        let result = cache.get_or_compute("bad.html", || anyhow::bail!("boom"));
        assert!(result.is_err());
        assert!(cache.is_empty());
    }
}
