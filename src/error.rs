use camino::Utf8PathBuf;
use thiserror::Error;

/// Top-level error returned by the public `Website` entry points.
#[derive(Debug, Error)]
pub enum SiteError {
    #[error("Failed to build runtime")]
    Runtime(#[from] std::io::Error),

    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),

    #[error("Error while building the website.\n{0}")]
    Build(#[from] BuildError),

    #[cfg(feature = "live")]
    #[error("Error while watching for file changes:\n{0}")]
    Watch(#[from] WatchError),

    #[error("Error while scaffolding the project:\n{0}")]
    Scaffold(#[from] ScaffoldError),
}

/// Malformed document content. Never retried; the invoking task fails.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("front matter must be a key/value mapping")]
    Matter,
}

/// Errors raised by the content data layer.
#[derive(Debug, Error)]
pub enum ContentError {
    /// Operation attempted on a file extension outside the supported set.
    #[error("file type '{0}' is not supported")]
    UnsupportedFormat(Box<str>),

    #[error("couldn't parse {0}:\n{1}")]
    Parse(Utf8PathBuf, #[source] ParseError),

    #[error("couldn't serialize {0}:\n{1}")]
    Serialize(Utf8PathBuf, #[source] ParseError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors raised while evaluating a task graph.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't run glob.\n{0}")]
    Glob(#[from] glob::GlobError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error(transparent)]
    Content(#[from] ContentError),

    #[error("Task '{0}':\n{1}")]
    Task(String, anyhow::Error),

    #[error("Task panicked:\n{0}")]
    Panic(#[from] tokio::task::JoinError),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("Couldn't compile glob pattern.\n{0}")]
    GlobPattern(#[from] glob::PatternError),

    #[error("Couldn't convert path to UTF-8.\n{0}")]
    PathFormat(#[from] camino::FromPathBufError),

    #[error("Failed to bind the live reload socket.\n{0}")]
    Bind(std::io::Error),
}

/// Filesystem failure during scaffolding. User-level mistakes (bad category,
/// missing source, existing target) are reported as messages instead and do
/// not surface here.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ScaffoldError(#[from] std::io::Error);
