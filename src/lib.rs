#![forbid(unsafe_code)]

//! Composable static site build pipeline.
//!
//! A [`Website`] compiles a tree of source documents, templates, stylesheets
//! and scripts into a deployable output tree. The build is a declarative
//! [`TaskGraph`] of named leaf tasks evaluated on a single-threaded
//! cooperative runtime, and the same leaves back an incremental development
//! loop: watch rules bind glob patterns to reaction graphs, debounce bursts
//! of filesystem events and ping connected browsers over a live-reload
//! socket once a reaction finishes.
//!
//! ```rust,no_run
//! use tessera::{Settings, Website};
//!
//! let website = Website::config().settings(Settings::default()).finish();
//! website.build().unwrap();
//! ```

mod cache;
mod config;
mod content;
mod error;
mod io;
mod pipeline;
mod scaffold;
mod task;
#[cfg(feature = "live")]
mod watch;

use std::sync::Arc;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

pub use crate::cache::TemplateCache;
pub use crate::config::{FileTypes, Index, Paths, Settings};
pub use crate::content::{Content, ContentFile, Format};
pub use crate::error::*;
pub use crate::pipeline::{Bundler, CopyBundler, Renderer};
pub use crate::scaffold::create;
pub use crate::task::{Context, Mode, TaskGraph, TaskResult, TaskUnit};
#[cfg(feature = "live")]
pub use crate::watch::{Reloader, WatchController, WatchRule};

/// This struct represents the website which will be built by the pipeline.
/// The individual settings can be set by calling the [`config`](Self::config)
/// function.
pub struct Website {
    pub(crate) settings: Arc<Settings>,
    pub(crate) cache: Arc<TemplateCache>,
    pub(crate) renderer: Option<Arc<dyn Renderer>>,
    pub(crate) bundler: Arc<dyn Bundler>,
    pub(crate) generator: Option<TaskUnit>,
    pub(crate) extra_roots: Arc<[Utf8PathBuf]>,
}

impl Website {
    pub fn config() -> Config {
        Config::new()
    }

    /// Runs the fixed build graph once. Any leaf failure aborts the run;
    /// callers should translate the error into a non-zero process exit.
    pub fn build(&self) -> Result<(), SiteError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Tessera").red(),
            style("build").blue()
        );

        let runtime = Self::runtime()?;
        let local = tokio::task::LocalSet::new();

        let graph = pipeline::graph_build(self);
        let progress = progress_bar(graph.leaves());
        let mut ctx = self.context(Mode::Build, None);
        ctx.progress = progress.clone();

        let s = Instant::now();
        runtime.block_on(local.run_until(graph.run(ctx)))?;
        progress.finish_with_message(format!("Finished tasks {}", io::as_overhead(s)));

        Ok(())
    }

    /// Scaffolds a new project from the starter `template` tree, then runs
    /// the configured content generation step, if any.
    pub fn init(&self, template: impl AsRef<Utf8Path>) -> Result<(), SiteError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Tessera").red(),
            style("init").blue()
        );

        let runtime = Self::runtime()?;
        let local = tokio::task::LocalSet::new();

        let graph = pipeline::graph_init(self, template.as_ref().to_owned());
        let ctx = self.context(Mode::Build, None);

        runtime.block_on(local.run_until(graph.run(ctx)))?;

        Ok(())
    }

    /// The development loop: builds once, starts the dev server, then keeps
    /// watching for file changes until process teardown. Reaction failures
    /// are logged per rule and never stop the loop.
    #[cfg(feature = "live")]
    pub fn watch(&self) -> Result<(), SiteError> {
        eprintln!(
            "Running {} in {} mode.",
            style("Tessera").red(),
            style("watch").blue()
        );

        let runtime = Self::runtime()?;
        let local = tokio::task::LocalSet::new();

        runtime.block_on(local.run_until(async {
            let reloader = watch::Reloader::serve()?;
            let ctx = self.context(Mode::Watch, Some(reloader.port()));

            let graph = pipeline::graph_build(self);
            let progress = progress_bar(graph.leaves());
            let mut initial = ctx.clone();
            initial.progress = progress.clone();

            let s = Instant::now();
            graph.run(initial).await?;
            progress.finish_with_message(format!("Finished tasks {}", io::as_overhead(s)));

            #[cfg(feature = "server")]
            let _server = watch::server::start(self.settings.clone());

            let controller = pipeline::watch_rules(self)?;
            controller.run(ctx, reloader).await?;

            Ok::<(), SiteError>(())
        }))
    }

    fn context(&self, mode: Mode, port: Option<u16>) -> Context {
        Context::new(
            self.settings.clone(),
            self.cache.clone(),
            mode,
            port,
            self.extra_roots.clone(),
        )
    }

    fn runtime() -> Result<tokio::runtime::Runtime, SiteError> {
        Ok(tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?)
    }
}

/// A builder struct for creating a [`Website`] with specified settings.
pub struct Config {
    settings: Settings,
    cache: Arc<TemplateCache>,
    renderer: Option<Arc<dyn Renderer>>,
    bundler: Arc<dyn Bundler>,
    generator: Option<TaskUnit>,
    extra_roots: Vec<Utf8PathBuf>,
}

impl Config {
    fn new() -> Self {
        Self {
            settings: Settings::default(),
            cache: Arc::new(TemplateCache::new()),
            renderer: None,
            bundler: Arc::new(CopyBundler),
            generator: None,
            extra_roots: Vec::new(),
        }
    }

    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Injects the parse cache shared with the rendering collaborator.
    /// Defaults to a fresh one.
    pub fn cache(mut self, cache: Arc<TemplateCache>) -> Self {
        self.cache = cache;
        self
    }

    /// Installs the page-rendering collaborator. Without one, the `pages`
    /// and `templates` steps are left out of the pipeline.
    pub fn renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Some(Arc::new(renderer));
        self
    }

    /// Installs the script-bundling collaborator. Defaults to
    /// [`CopyBundler`].
    pub fn bundler(mut self, bundler: impl Bundler + 'static) -> Self {
        self.bundler = Arc::new(bundler);
        self
    }

    /// Installs the content generation step run at the end of `init`.
    pub fn generator(mut self, generate: TaskUnit) -> Self {
        self.generator = Some(generate);
        self
    }

    /// Additional source roots contributed by installed plugins; their
    /// `assets` and `public` subtrees join the copy steps as extra inputs.
    pub fn extra_roots(mut self, roots: impl IntoIterator<Item = Utf8PathBuf>) -> Self {
        self.extra_roots.extend(roots);
        self
    }

    pub fn finish(self) -> Website {
        Website {
            settings: Arc::new(self.settings),
            cache: self.cache,
            renderer: self.renderer,
            bundler: self.bundler,
            generator: self.generator,
            extra_roots: self.extra_roots.into(),
        }
    }
}

/// Initializes a stderr `tracing` subscriber honoring `RUST_LOG`.
#[cfg(feature = "logging")]
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
}

fn progress_bar(len: usize) -> ProgressBar {
    ProgressBar::new(len as u64).with_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("Error setting progress bar template")
            .progress_chars("#>-"),
    )
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use super::*;

    struct StubRenderer {
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Renderer for StubRenderer {
        fn compile_templates(&self, _ctx: &Context) -> TaskResult {
            self.log.lock().unwrap().push("templates");
            Ok(())
        }

        fn render_pages(&self, ctx: &Context) -> TaskResult {
            self.log.lock().unwrap().push("pages");
            let out = ctx.settings.paths.dist.join("index.html");
            std::fs::write(out, "<h1>rendered</h1>")?;
            Ok(())
        }
    }

    fn project() -> (tempfile::TempDir, Settings) {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();

        std::fs::create_dir_all(root.join("src/assets/js")).unwrap();
        std::fs::create_dir_all(root.join("src/assets/scss")).unwrap();
        std::fs::create_dir_all(root.join("src/assets/img")).unwrap();
        std::fs::create_dir_all(root.join("src/assets/fonts")).unwrap();
        std::fs::create_dir_all(root.join("src/public")).unwrap();
        std::fs::create_dir_all(root.join("src/data")).unwrap();

        std::fs::write(root.join("src/assets/js/app.js"), "console.log(1)").unwrap();
        std::fs::write(root.join("src/assets/scss/app.scss"), "body { color: red; }").unwrap();
        std::fs::write(root.join("src/assets/img/logo.png"), "png").unwrap();
        std::fs::write(root.join("src/assets/fonts/site.woff2"), "font").unwrap();
        std::fs::write(root.join("src/assets/favicon.ico"), "ico").unwrap();
        std::fs::write(root.join("src/public/robots.txt"), "User-agent: *").unwrap();
        std::fs::write(root.join("src/data/menu.json"), "{}").unwrap();

        let mut settings = Settings::default();
        settings.paths.assets = root.join("src/assets");
        settings.paths.public = root.join("src/public");
        settings.paths.data = root.join("src/data");
        settings.paths.dist = root.join("dist");
        settings.paths.styles = vec!["/scss/app.scss".into()];
        settings.paths.entries = vec!["/js/app.js".into()];

        (dir, settings)
    }

    #[test]
    fn build_produces_the_output_tree() {
        let (_dir, settings) = project();
        let dist = settings.paths.dist.clone();

        let website = Website::config().settings(settings).finish();
        website.build().unwrap();

        assert!(dist.join("assets/js/app.js").exists());
        assert!(dist.join("assets/img/logo.png").exists());
        assert!(dist.join("assets/fonts/site.woff2").exists());
        assert!(dist.join("assets/favicon.ico").exists());
        assert!(dist.join("robots.txt").exists());
        assert!(dist.join("files/menu.json").exists());
        if cfg!(feature = "styles") {
            assert!(dist.join("assets/css/app.css").exists());
        }
        // Source-only asset directories never land in the copy output.
        assert!(!dist.join("assets/scss").exists());
    }

    #[test]
    fn build_cleans_stale_output_first() {
        let (_dir, settings) = project();
        let dist = settings.paths.dist.clone();
        std::fs::create_dir_all(&dist).unwrap();
        std::fs::write(dist.join("stale.html"), "old").unwrap();

        let website = Website::config().settings(settings).finish();
        website.build().unwrap();

        assert!(!dist.join("stale.html").exists());
    }

    #[test]
    fn renderer_compiles_templates_before_rendering_pages() {
        let (_dir, settings) = project();
        let dist = settings.paths.dist.clone();
        let log = Arc::new(Mutex::new(Vec::new()));

        let website = Website::config()
            .settings(settings)
            .renderer(StubRenderer { log: log.clone() })
            .finish();
        website.build().unwrap();

        assert_eq!(
            std::fs::read_to_string(dist.join("index.html")).unwrap(),
            "<h1>rendered</h1>"
        );
        // Templates are a series step; pages run inside the later fan-out.
        assert_eq!(*log.lock().unwrap(), vec!["templates", "pages"]);
    }
}
