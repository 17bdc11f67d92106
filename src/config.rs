//! The configuration surface consumed by the build pipeline.
//!
//! The core reads a handful of fields directly (paths, production flag);
//! everything else is passthrough data for the rendering, sitemap and
//! bundler collaborators.

use camino::Utf8PathBuf;
use serde::Deserialize;

/// Project-wide settings, usually deserialized from a settings file owned by
/// the site project. Every field has a sensible default so a partial file is
/// enough to get going.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "UPPERCASE")]
pub struct Settings {
    /// Toggles minification and other release-only transforms.
    pub production: bool,
    /// Canonical origin of the deployed site, e.g. `https://example.org`.
    pub origin: String,
    /// Port of the development HTTP server.
    pub port: u16,
    /// Optional CDN prefix, passed through to the rendering collaborator.
    pub cdn: Option<String>,
    /// Source roots and the output root.
    pub paths: Paths,
    /// Sitemap/robots options, passed through to the sitemap collaborator.
    pub index: Index,
    /// Browser target list for CSS vendor prefixing, passed through.
    pub compatibility: Vec<String>,
    /// Opaque bundler configuration, passed through to the JS bundler.
    pub webpack: serde_json::Value,
    /// Recognized file extensions per document role.
    pub file_types: FileTypes,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            production: false,
            origin: String::new(),
            port: 8080,
            cdn: None,
            paths: Paths::default(),
            index: Index::default(),
            compatibility: vec!["last 2 versions".into(), "not dead".into()],
            webpack: serde_json::Value::Null,
            file_types: FileTypes::default(),
        }
    }
}

/// Source roots and the output root. All paths are relative to the project
/// directory. The exact subpaths are configuration-driven, but they must stay
/// stable across a full rebuild given identical input.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Paths {
    /// Output root; recursively deleted by the `clean` step.
    pub dist: Utf8PathBuf,
    pub assets: Utf8PathBuf,
    pub public: Utf8PathBuf,
    pub pages: Utf8PathBuf,
    pub layouts: Utf8PathBuf,
    pub partials: Utf8PathBuf,
    pub templates: Utf8PathBuf,
    pub data: Utf8PathBuf,
    pub helpers: Utf8PathBuf,
    /// Entry stylesheets, relative to `assets`.
    pub styles: Vec<Utf8PathBuf>,
    /// Entry scripts, relative to `assets`.
    pub entries: Vec<Utf8PathBuf>,
    /// Extra include paths for the Sass compiler.
    pub sass: Vec<Utf8PathBuf>,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            dist: "dist".into(),
            assets: "src/assets".into(),
            public: "src/public".into(),
            pages: "src/pages".into(),
            layouts: "src/layouts".into(),
            partials: "src/partials".into(),
            templates: "src/templates".into(),
            data: "src/data".into(),
            helpers: "src/helpers".into(),
            styles: vec!["/scss/app.scss".into()],
            entries: vec!["/js/app.js".into()],
            sass: vec![],
        }
    }
}

/// Options for the sitemap/robots collaborator.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Index {
    pub sitemap: bool,
    pub robots: Option<String>,
    pub disallow: Vec<String>,
}

/// File extensions recognized for each document role.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FileTypes {
    pub page: String,
    pub partial: String,
    pub data: String,
    /// Content documents copied verbatim under `files/` in the output tree.
    pub content: String,
}

impl Default for FileTypes {
    fn default() -> Self {
        Self {
            page: "html".into(),
            partial: "html".into(),
            data: "yml".into(),
            content: "json".into(),
        }
    }
}
