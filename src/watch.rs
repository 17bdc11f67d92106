//! Filesystem watching and the development loop.
//!
//! The controller binds glob patterns to reaction graphs. Filesystem events
//! funnel through one channel into a single event loop; create, modify and
//! delete all collapse into a generic "changed" event, and every matching
//! rule debounces independently before its reaction graph runs. Reactions
//! are awaited inside the loop, so two triggers of the same rule can never
//! overlap: events arriving mid-reaction queue up and coalesce into one
//! subsequent run.

use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use camino::Utf8PathBuf;
use glob::Pattern;
use notify::{EventKind, RecursiveMode, Watcher};
use tokio::time::Instant;
use tungstenite::WebSocket;

use crate::error::WatchError;
use crate::io;
use crate::task::{Context, TaskGraph};

/// Binds one or more glob patterns to a reaction graph.
pub struct WatchRule {
    name: &'static str,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    delay: Duration,
    invalidate: bool,
    reload: bool,
    reaction: TaskGraph,
    pending: Option<Instant>,
}

impl WatchRule {
    pub fn new(
        name: &'static str,
        include: &[String],
        reaction: TaskGraph,
    ) -> Result<Self, glob::PatternError> {
        Ok(Self {
            name,
            include: compile(include)?,
            exclude: Vec::new(),
            delay: Duration::ZERO,
            invalidate: false,
            reload: false,
            reaction,
            pending: None,
        })
    }

    /// Paths matching any of these patterns never trigger the rule.
    pub fn exclude(mut self, patterns: &[String]) -> Result<Self, glob::PatternError> {
        self.exclude = compile(patterns)?;
        Ok(self)
    }

    /// Debounce window: the reaction fires only once this much time passed
    /// with no further matching event.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Invalidate the shared parse cache right before the reaction runs.
    pub fn invalidate(mut self) -> Self {
        self.invalidate = true;
        self
    }

    /// Signal connected browsers after the reaction completed successfully.
    pub fn reload(mut self) -> Self {
        self.reload = true;
        self
    }

    fn matches(&self, path: &str) -> bool {
        self.include.iter().any(|pattern| pattern.matches(path))
            && !self.exclude.iter().any(|pattern| pattern.matches(path))
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, glob::PatternError> {
    patterns.iter().map(|p| Pattern::new(p)).collect()
}

/// Dispatches filesystem change events to the registered [`WatchRule`]s.
pub struct WatchController {
    roots: Vec<Utf8PathBuf>,
    rules: Vec<WatchRule>,
}

impl WatchController {
    /// `roots` are the directories placed under recursive observation; rules
    /// match against paths relative to the working directory.
    pub fn new(roots: Vec<Utf8PathBuf>) -> Self {
        Self {
            roots,
            rules: Vec::new(),
        }
    }

    pub fn register(&mut self, rule: WatchRule) {
        self.rules.push(rule);
    }

    /// Listens for change events until the watcher channel closes. Each
    /// rule's failures are logged and isolated; the controller stays alive
    /// for subsequent events.
    pub async fn run(mut self, ctx: Context, reloader: Reloader) -> Result<(), WatchError> {
        let root = Utf8PathBuf::try_from(std::env::current_dir()?)?;
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let mut watcher =
            notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
                let event = match result {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!("watcher error: {err}");
                        return;
                    }
                };

                // Create, modify and delete all count as a generic change;
                // reactions re-derive full output either way.
                if !matches!(
                    event.kind,
                    EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                ) {
                    return;
                }

                for path in event.paths {
                    let _ = tx.send(path);
                }
            })?;

        for dir in &self.roots {
            watcher.watch(dir.as_std_path(), RecursiveMode::Recursive)?;
        }
        tracing::info!(rules = self.rules.len(), "watching for changes");

        loop {
            let deadline = self.next_deadline();
            let wakeup = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                received = rx.recv() => {
                    match received {
                        Some(path) => {
                            let path = match path.strip_prefix(root.as_std_path()) {
                                Ok(rel) => rel.to_path_buf(),
                                Err(_) => path,
                            };
                            match Utf8PathBuf::try_from(path) {
                                Ok(path) => {
                                    self.mark_matching(path.as_str(), Instant::now());
                                }
                                Err(err) => tracing::warn!("ignoring non UTF-8 path: {err}"),
                            }
                        }
                        None => break,
                    }
                }
                _ = tokio::time::sleep_until(wakeup), if deadline.is_some() => {
                    self.fire_due(&ctx, &reloader).await;
                }
            }
        }

        Ok(())
    }

    /// Restarts the debounce timer of every rule matching `path`.
    fn mark_matching(&mut self, path: &str, now: Instant) -> usize {
        let mut marked = 0;

        for rule in &mut self.rules {
            if rule.matches(path) {
                rule.pending = Some(now + rule.delay);
                marked += 1;
            }
        }

        if marked > 0 {
            tracing::debug!(path, marked, "change event");
        }
        marked
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.rules.iter().filter_map(|rule| rule.pending).min()
    }

    /// Runs the reaction graph of every rule whose debounce window elapsed.
    async fn fire_due(&mut self, ctx: &Context, reloader: &Reloader) {
        let now = Instant::now();

        for index in 0..self.rules.len() {
            let due = matches!(self.rules[index].pending, Some(at) if at <= now);
            if !due {
                continue;
            }
            self.rules[index].pending = None;

            let rule = &self.rules[index];
            if rule.invalidate {
                ctx.cache.invalidate();
            }

            let started = std::time::Instant::now();
            match rule.reaction.clone().run(ctx.clone()).await {
                Ok(()) => {
                    eprintln!("Refreshed {} {}", rule.name, io::as_overhead(started));
                    if rule.reload {
                        reloader.notify();
                    }
                }
                Err(err) => tracing::error!(rule = rule.name, "reaction failed:\n{err}"),
            }
        }
    }
}

/// Handle for the one-way reload notification to connected browsers.
#[derive(Clone)]
pub struct Reloader {
    port: u16,
    tx: Sender<()>,
}

impl Reloader {
    /// Opens the live-reload WebSocket and spawns its service threads.
    pub(crate) fn serve() -> Result<Self, WatchError> {
        let (listener, port) = reserve_port()?;
        let clients = Arc::new(Mutex::new(Vec::new()));

        new_thread_ws_incoming(listener, clients.clone());
        let tx = new_thread_ws_reload(clients);

        Ok(Self { port, tx })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Asks every connected browser to reload. Cannot fail the pipeline;
    /// signalling problems are logged and swallowed.
    pub fn notify(&self) {
        if let Err(err) = self.tx.send(()) {
            tracing::warn!("live reload unavailable: {err}");
        }
    }

    #[cfg(test)]
    pub(crate) fn disconnected() -> Self {
        let (tx, _) = std::sync::mpsc::channel();
        Self { port: 0, tx }
    }
}

fn reserve_port() -> Result<(TcpListener, u16), WatchError> {
    let listener = match TcpListener::bind("127.0.0.1:1337") {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0").map_err(WatchError::Bind)?,
    };

    let port = listener.local_addr().map_err(WatchError::Bind)?.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(
    server: TcpListener,
    clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>,
) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(err) => {
                    tracing::warn!("live reload connection failed: {err}");
                    continue;
                }
            };
            match tungstenite::accept(stream) {
                Ok(socket) => clients.lock().unwrap().push(socket),
                Err(err) => tracing::warn!("live reload handshake failed: {err}"),
            }
        }
    })
}

fn new_thread_ws_reload(clients: Arc<Mutex<Vec<WebSocket<TcpStream>>>>) -> Sender<()> {
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::spawn(move || {
        while rx.recv().is_ok() {
            let mut clients = clients.lock().unwrap();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send("reload".into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(err)) => {
                        if err.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(err) => {
                        tracing::warn!("live reload send failed: {err:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            // Close all but the last 10 connections.
            let len = clients.len();
            if len > 10 {
                for mut socket in clients.drain(0..len - 10) {
                    socket.close(None).ok();
                }
            }
        }
    });

    tx
}

#[cfg(feature = "server")]
pub(crate) mod server {
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::thread;

    use axum::Router;
    use camino::Utf8PathBuf;
    use console::style;
    use tower_http::services::ServeDir;

    use crate::config::Settings;

    pub(crate) fn start(settings: Arc<Settings>) -> thread::JoinHandle<Result<(), anyhow::Error>> {
        let port = settings.port;
        let dist = settings.paths.dist.clone();
        let url = style(format!("http://localhost:{port}/")).yellow();
        eprintln!("Starting a HTTP server on {url}");

        thread::spawn(move || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(serve(dist, port))
        })
    }

    async fn serve(dist: Utf8PathBuf, port: u16) -> Result<(), anyhow::Error> {
        let address = SocketAddr::from(([127, 0, 0, 1], port));
        let address = tokio::net::TcpListener::bind(address).await?;

        let router = Router::new().fallback_service(ServeDir::new(dist));

        axum::serve(address, router).await?;

        Ok(())
    }
}
