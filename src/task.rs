//! The build task graph.
//!
//! A build is a static composition of named leaf tasks into [`TaskGraph`]
//! nodes, assembled once at startup and evaluated by a single generic
//! evaluator. Scheduling is single-threaded and cooperative: "parallel"
//! means concurrently interleaved futures on the current thread, not OS
//! threads, so leaf side effects may interleave across parallel siblings
//! but never across series steps.

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::Arc;

use camino::Utf8PathBuf;
use indicatif::ProgressBar;

use crate::cache::TemplateCache;
use crate::config::Settings;
use crate::error::BuildError;

/// Result of a single executed task. Userland leaves report any error.
pub type TaskResult = anyhow::Result<()>;

type TaskFuture = Pin<Box<dyn Future<Output = TaskResult>>>;
type TaskFnPtr = Rc<dyn Fn(Context) -> TaskFuture>;

/// Whether the pipeline runs once or keeps watching for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A one-time build.
    Build,
    /// A continuous watch mode for development.
    Watch,
}

/// Shared state threaded through every task in a graph.
#[derive(Clone)]
pub struct Context {
    /// Project settings, consumed by stock leaves and collaborators alike.
    pub settings: Arc<Settings>,
    /// The parse cache shared with the rendering collaborator.
    pub cache: Arc<TemplateCache>,
    /// The current build mode.
    pub mode: Mode,
    /// Port of the live-reload socket, if one is open.
    pub port: Option<u16>,
    /// Additional source roots contributed by installed plugins.
    pub extra_roots: Arc<[Utf8PathBuf]>,
    pub(crate) progress: ProgressBar,
}

impl Context {
    pub(crate) fn new(
        settings: Arc<Settings>,
        cache: Arc<TemplateCache>,
        mode: Mode,
        port: Option<u16>,
        extra_roots: Arc<[Utf8PathBuf]>,
    ) -> Self {
        Self {
            settings,
            cache,
            mode,
            port,
            extra_roots,
            progress: ProgressBar::hidden(),
        }
    }

    /// Returns a JavaScript snippet enabling live reload, for the rendering
    /// collaborator to inject into pages while watching.
    pub fn refresh_script(&self) -> Option<String> {
        if self.mode != Mode::Watch {
            return None;
        }

        self.port.map(|port| {
            format!(
                r#"
const socket = new WebSocket("ws://localhost:{port}");
socket.addEventListener("message", event => {{
    window.location.reload();
}});
"#
            )
        })
    }
}

/// An atomic, named, side-effecting build step.
///
/// The closure reads, transforms and writes some file set; the graph only
/// consumes its completion or failure. Cloning is cheap and shares the
/// underlying closure.
#[derive(Clone)]
pub struct TaskUnit {
    name: &'static str,
    func: TaskFnPtr,
}

impl TaskUnit {
    pub fn new<F, Fut>(name: &'static str, func: F) -> Self
    where
        F: Fn(Context) -> Fut + 'static,
        Fut: Future<Output = TaskResult> + 'static,
    {
        Self {
            name,
            func: Rc::new(move |ctx| -> TaskFuture { Box::pin(func(ctx)) }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Debug for TaskUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TaskUnit({})", self.name)
    }
}

/// Sequential and concurrent composition of [`TaskUnit`]s.
#[derive(Clone, Debug)]
pub enum TaskGraph {
    Leaf(TaskUnit),
    /// Children run in listed order; a failing child aborts the rest.
    Series(Vec<TaskGraph>),
    /// Children run interleaved with no ordering guarantee; in-flight
    /// children always run to completion, and the node fails if any did.
    Parallel(Vec<TaskGraph>),
}

impl TaskGraph {
    pub fn leaf(unit: TaskUnit) -> Self {
        TaskGraph::Leaf(unit)
    }

    pub fn series(nodes: impl IntoIterator<Item = TaskGraph>) -> Self {
        TaskGraph::Series(nodes.into_iter().collect())
    }

    pub fn parallel(nodes: impl IntoIterator<Item = TaskGraph>) -> Self {
        TaskGraph::Parallel(nodes.into_iter().collect())
    }

    /// Number of leaves in the subtree, used to size progress bars.
    pub fn leaves(&self) -> usize {
        match self {
            TaskGraph::Leaf(_) => 1,
            TaskGraph::Series(nodes) | TaskGraph::Parallel(nodes) => {
                nodes.iter().map(TaskGraph::leaves).sum()
            }
        }
    }

    /// Evaluates the graph. Must run inside a `tokio` current-thread runtime
    /// with a `LocalSet`, since parallel children are spawned locally.
    ///
    /// Failure propagation: a failing leaf aborts the remaining steps of its
    /// `Series` ancestor with no rollback of already-applied side effects.
    /// Under a `Parallel` ancestor, in-flight siblings run to completion or
    /// failure independently; the first failure (in child order) is
    /// reported, later ones are logged.
    pub fn run(self, ctx: Context) -> Pin<Box<dyn Future<Output = Result<(), BuildError>>>> {
        Box::pin(async move {
            match self {
                TaskGraph::Leaf(unit) => {
                    tracing::debug!(task = unit.name, "running");
                    ctx.progress.set_message(unit.name);

                    (unit.func)(ctx.clone())
                        .await
                        .map_err(|err| BuildError::Task(unit.name.to_string(), err))?;

                    ctx.progress.inc(1);
                    Ok(())
                }
                TaskGraph::Series(nodes) => {
                    for node in nodes {
                        node.run(ctx.clone()).await?;
                    }
                    Ok(())
                }
                TaskGraph::Parallel(nodes) => {
                    let handles: Vec<_> = nodes
                        .into_iter()
                        .map(|node| tokio::task::spawn_local(node.run(ctx.clone())))
                        .collect();

                    let mut first = None;
                    for handle in handles {
                        let failure = match handle.await {
                            Ok(Ok(())) => continue,
                            Ok(Err(err)) => err,
                            Err(join) => BuildError::Panic(join),
                        };

                        if first.is_none() {
                            first = Some(failure);
                        } else {
                            tracing::error!("{failure}");
                        }
                    }

                    match first {
                        Some(err) => Err(err),
                        None => Ok(()),
                    }
                }
            }
        })
    }
}
