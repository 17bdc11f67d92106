//! The fixed build pipelines and their leaf tasks.
//!
//! Graphs are assembled once from the project settings: `build` is
//! `series(clean, templates, parallel(pages, javascript, images, copy),
//! sass)`, and `init` is the starter-template copy followed by the
//! user-provided content generation step. `clean` always precedes every
//! writer as a series step; putting it in a parallel group would race the
//! copy tasks over the output root.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use glob::Pattern;

use crate::Website;
use crate::io;
use crate::task::{Context, TaskGraph, TaskResult, TaskUnit};
#[cfg(feature = "live")]
use crate::watch::{WatchController, WatchRule};

/// The page-rendering/templating collaborator.
///
/// Implementations own layout/partial resolution and are expected to keep
/// their parsed artifacts in [`Context::cache`], so that invalidation before
/// a re-render takes effect.
pub trait Renderer: Send + Sync {
    /// Compile raw template sources into the deployable template bundle.
    fn compile_templates(&self, ctx: &Context) -> TaskResult;
    /// Render every page document into the output tree.
    fn render_pages(&self, ctx: &Context) -> TaskResult;
}

/// The script-bundling collaborator. The opaque bundler configuration is
/// available as `ctx.settings.webpack`.
pub trait Bundler: Send + Sync {
    /// Produce the script bundle under `assets/js` in the output tree.
    fn bundle(&self, ctx: &Context) -> TaskResult;
}

/// Fallback bundler which copies the configured entry scripts verbatim.
pub struct CopyBundler;

impl Bundler for CopyBundler {
    fn bundle(&self, ctx: &Context) -> TaskResult {
        let dest = ctx.settings.paths.dist.join("assets/js");
        std::fs::create_dir_all(&dest)?;

        for entry in &ctx.settings.paths.entries {
            let source = Utf8PathBuf::from(format!("{}{}", ctx.settings.paths.assets, entry));
            let Some(name) = source.file_name() else {
                continue;
            };
            std::fs::copy(&source, dest.join(name))?;
        }

        Ok(())
    }
}

/// The one-shot `build` graph.
pub(crate) fn graph_build(site: &Website) -> TaskGraph {
    let mut fanout = Vec::new();
    if let Some(renderer) = &site.renderer {
        fanout.push(leaf_pages(renderer.clone()));
    }
    fanout.push(leaf_javascript(site.bundler.clone()));
    fanout.push(leaf_images());
    fanout.push(TaskGraph::parallel([
        leaf_copy_assets(),
        leaf_copy_public(),
        leaf_copy_content(),
    ]));

    let mut steps = vec![leaf_clean()];
    if let Some(renderer) = &site.renderer {
        steps.push(leaf_templates(renderer.clone()));
    }
    steps.push(TaskGraph::parallel(fanout));
    #[cfg(feature = "styles")]
    steps.push(leaf_sass());

    TaskGraph::series(steps)
}

/// The `init` graph: scaffold the starter template, then run the content
/// generation step when one is configured.
pub(crate) fn graph_init(site: &Website, template: Utf8PathBuf) -> TaskGraph {
    let scaffold = TaskUnit::new("scaffold", move |_ctx| {
        let template = template.clone();
        async move {
            crate::scaffold::copy_template(&template, Utf8Path::new("."))?;
            Ok(())
        }
    });

    let mut steps = vec![TaskGraph::leaf(scaffold)];
    if let Some(generate) = &site.generator {
        steps.push(TaskGraph::leaf(generate.clone()));
    }

    TaskGraph::series(steps)
}

fn leaf_clean() -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("clean", |ctx| async move {
        io::clean_output(&ctx.settings.paths.dist).await?;
        Ok(())
    }))
}

fn leaf_pages(renderer: Arc<dyn Renderer>) -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("pages", move |ctx| {
        let renderer = renderer.clone();
        async move { renderer.render_pages(&ctx) }
    }))
}

fn leaf_templates(renderer: Arc<dyn Renderer>) -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("templates", move |ctx| {
        let renderer = renderer.clone();
        async move { renderer.compile_templates(&ctx) }
    }))
}

fn leaf_javascript(bundler: Arc<dyn Bundler>) -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("javascript", move |ctx| {
        let bundler = bundler.clone();
        async move { bundler.bundle(&ctx) }
    }))
}

fn leaf_images() -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("images", |ctx| async move {
        let root = ctx.settings.paths.assets.join("img");
        let dest = ctx.settings.paths.dist.join("assets/img");
        io::copy_glob(&[format!("{root}/**/*")], &[], &root, &dest).await?;
        Ok(())
    }))
}

fn leaf_copy_assets() -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("copy:assets", |ctx| async move {
        let dest = ctx.settings.paths.dist.join("assets");

        let mut roots: Vec<Utf8PathBuf> = ctx
            .extra_roots
            .iter()
            .map(|root| root.join("assets"))
            .collect();
        roots.push(ctx.settings.paths.assets.clone());

        for root in roots {
            let excludes = compile_patterns(&asset_excludes(&root))?;
            io::copy_glob(&[format!("{root}/**/*")], &excludes, &root, &dest).await?;
        }

        Ok(())
    }))
}

fn leaf_copy_public() -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("copy:public", |ctx| async move {
        let dest = ctx.settings.paths.dist.clone();

        let mut roots: Vec<Utf8PathBuf> = ctx
            .extra_roots
            .iter()
            .map(|root| root.join("public"))
            .collect();
        roots.push(ctx.settings.paths.public.clone());

        for root in roots {
            io::copy_glob(&[format!("{root}/**/*")], &[], &root, &dest).await?;
        }

        Ok(())
    }))
}

fn leaf_copy_content() -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("copy:content", |ctx| async move {
        let data = &ctx.settings.paths.data;
        let ext = &ctx.settings.file_types.content;
        let dest = ctx.settings.paths.dist.join("files");
        io::copy_glob(&[format!("{data}/**/*.{ext}")], &[], data, &dest).await?;
        Ok(())
    }))
}

#[cfg(feature = "styles")]
fn leaf_sass() -> TaskGraph {
    TaskGraph::leaf(TaskUnit::new("sass", |ctx| async move {
        let settings = &ctx.settings;
        let dest = settings.paths.dist.join("assets/css");
        tokio::fs::create_dir_all(&dest).await?;

        let style = if settings.production {
            grass::OutputStyle::Compressed
        } else {
            grass::OutputStyle::Expanded
        };
        let options = grass::Options::default()
            .style(style)
            .load_paths(&settings.paths.sass);

        for entry in &settings.paths.styles {
            let source = Utf8PathBuf::from(format!("{}{}", settings.paths.assets, entry));
            let css = grass::from_path(&source, &options)
                .map_err(|err| anyhow::anyhow!("Sass compilation error: {err}"))?;

            let name = source.file_stem().unwrap_or("app");
            tokio::fs::write(dest.join(format!("{name}.css")), css).await?;
        }

        Ok(())
    }))
}

fn asset_excludes(root: &Utf8Path) -> Vec<String> {
    ["img", "js", "scss"]
        .iter()
        .map(|dir| format!("{root}/{dir}/**/*"))
        .collect()
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, glob::PatternError> {
    patterns.iter().map(|p| Pattern::new(p)).collect()
}

/// The watch rule table. Each saved file re-derives the full output of the
/// matched tasks; rules whose inputs feed the parse cache invalidate it
/// before re-rendering.
#[cfg(feature = "live")]
pub(crate) fn watch_rules(site: &Website) -> Result<WatchController, crate::error::WatchError> {
    use std::time::Duration;

    let paths = &site.settings.paths;
    let types = &site.settings.file_types;

    let roots: Vec<Utf8PathBuf> = [
        &paths.assets,
        &paths.public,
        &paths.pages,
        &paths.layouts,
        &paths.partials,
        &paths.templates,
        &paths.data,
        &paths.helpers,
    ]
    .into_iter()
    .cloned()
    .filter(|root| root.exists())
    .collect();

    let mut controller = WatchController::new(roots);

    controller.register(
        WatchRule::new(
            "assets",
            &[format!("{}/**/*", paths.assets)],
            leaf_copy_assets(),
        )?
        .exclude(&asset_excludes(&paths.assets))?,
    );
    controller.register(WatchRule::new(
        "public",
        &[format!("{}/**/*", paths.public)],
        leaf_copy_public(),
    )?);

    if let Some(renderer) = &site.renderer {
        controller.register(
            WatchRule::new(
                "pages",
                &[format!("{}/**/*.{}", paths.pages, types.page)],
                leaf_pages(renderer.clone()),
            )?
            .reload(),
        );
        controller.register(
            WatchRule::new(
                "layouts",
                &[
                    format!("{}/**/*.{}", paths.layouts, types.partial),
                    format!("{}/**/*.{}", paths.partials, types.partial),
                ],
                leaf_pages(renderer.clone()),
            )?
            .invalidate()
            .reload(),
        );
        controller.register(
            WatchRule::new(
                "templates",
                &[format!("{}/**/*.html", paths.templates)],
                TaskGraph::series([
                    leaf_templates(renderer.clone()),
                    leaf_javascript(site.bundler.clone()),
                ]),
            )?
            .reload(),
        );
        controller.register(
            WatchRule::new(
                "data",
                &[format!("{}/**/*.{}", paths.data, types.data)],
                leaf_pages(renderer.clone()),
            )?
            .invalidate()
            .reload(),
        );
        controller.register(
            WatchRule::new(
                "helpers",
                &[format!("{}/**/*.js", paths.helpers)],
                leaf_pages(renderer.clone()),
            )?
            .invalidate()
            .reload(),
        );
    }

    #[cfg(feature = "styles")]
    controller.register(
        WatchRule::new(
            "styles",
            &[format!("{}/scss/**/*.scss", paths.assets)],
            leaf_sass(),
        )?
        .reload(),
    );

    controller.register(
        WatchRule::new(
            "javascript",
            &[format!("{}/js/**/*.js", paths.assets)],
            leaf_javascript(site.bundler.clone()),
        )?
        .delay(Duration::from_millis(1000))
        .reload(),
    );
    controller.register(
        WatchRule::new(
            "images",
            &[format!("{}/img/**/*", paths.assets)],
            leaf_images(),
        )?
        .reload(),
    );

    Ok(controller)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::*;
    use crate::cache::TemplateCache;
    use crate::config::Settings;
    use crate::task::Mode;

    fn context(settings: Settings) -> Context {
        Context::new(
            Arc::new(settings),
            Arc::new(TemplateCache::new()),
            Mode::Build,
            None,
            Vec::new().into(),
        )
    }

    fn scratch() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        (dir, path)
    }

    #[test]
    fn build_graph_shape_without_renderer() {
        let site = crate::Website::config().finish();
        let graph = graph_build(&site);

        // clean + javascript + images + three copies (+ sass).
        let expected = if cfg!(feature = "styles") { 7 } else { 6 };
        assert_eq!(graph.leaves(), expected);
        assert!(matches!(graph, TaskGraph::Series(_)));
    }

    #[test]
    fn copy_bundler_copies_entry_scripts() {
        let (_dir, root) = scratch();
        std::fs::create_dir_all(root.join("assets/js")).unwrap();
        std::fs::write(root.join("assets/js/app.js"), "console.log(1)").unwrap();

        let mut settings = Settings::default();
        settings.paths.assets = root.join("assets");
        settings.paths.dist = root.join("dist");
        settings.paths.entries = vec!["/js/app.js".into()];

        CopyBundler.bundle(&context(settings)).unwrap();

        assert_eq!(
            std::fs::read_to_string(root.join("dist/assets/js/app.js")).unwrap(),
            "console.log(1)"
        );
    }

    #[cfg(feature = "styles")]
    #[tokio::test]
    async fn sass_leaf_compiles_entry_stylesheets() {
        let (_dir, root) = scratch();
        std::fs::create_dir_all(root.join("assets/scss")).unwrap();
        std::fs::write(root.join("assets/scss/app.scss"), "body { color: red; }").unwrap();

        let mut settings = Settings::default();
        settings.paths.assets = root.join("assets");
        settings.paths.dist = root.join("dist");
        settings.paths.styles = vec!["/scss/app.scss".into()];

        let local = tokio::task::LocalSet::new();
        local
            .run_until(leaf_sass().run(context(settings)))
            .await
            .unwrap();

        let css = std::fs::read_to_string(root.join("dist/assets/css/app.css")).unwrap();
        assert!(css.contains("color: red"));
    }
}
