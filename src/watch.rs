//! File system watcher for watch mode and live preview.
//!
//! Monitors every tracked folder, the asset folders and the config file,
//! and feeds debounced batches of changed paths to the compiler.
//!
//! # Relationship with `compiler/watch.rs`
//!
//! - **This module** (`src/watch.rs`): Event loop, debouncing, config reloads
//! - **`compiler/watch.rs`**: What a batch of paths invalidates, via [`Compiler::rebuild`]
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Event Loop                              │
//! │                                                              │
//! │  ┌──────────┐    ┌──────────┐    ┌────────────────────────┐  │
//! │  │ notify   │───▶│ Debouncer│───▶│    handle_changes()    │  │
//! │  │ events   │    │ (300ms)  │    │                        │  │
//! │  └──────────┘    └──────────┘    │  ┌──────────────────┐  │  │
//! │                                  │  │ Reload           │  │  │
//! │                                  │  │ (config/redirect)│  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  │  ┌──────────────────┐  │  │
//! │                                  │  │ Incremental      │  │  │
//! │                                  │  │ (documents)      │  │  │
//! │                                  │  └──────────────────┘  │  │
//! │                                  └────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Batches are consumed one at a time under the compiler lock, so at most
//! one rebuild runs at once. A failed cycle is logged and the loop keeps
//! watching.

use crate::{
    cli::Cli,
    compiler::Compiler,
    config::SiteConfig,
    context::BuildContext,
    fs::is_ignored,
    log,
};
use anyhow::{Context, Result};
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::RecvTimeoutError,
    },
    time::{Duration, Instant},
};

// =============================================================================
// Constants
// =============================================================================

const DEBOUNCE_MS: u64 = 300;
const REBUILD_COOLDOWN_MS: u64 = 800;
/// How often an idle loop checks for shutdown
const IDLE_POLL_MS: u64 = 500;

// =============================================================================
// Path Utilities
// =============================================================================

/// Format path relative to root for log display.
fn rel_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root).unwrap_or(path).display().to_string()
}

// =============================================================================
// Debounce State
// =============================================================================

/// Batches rapid file events with debouncing and rebuild cooldown.
struct Debouncer {
    pending: FxHashSet<PathBuf>,
    last_event: Option<Instant>,
    last_rebuild: Option<Instant>,
}

impl Debouncer {
    fn new() -> Self {
        Self {
            pending: FxHashSet::default(),
            last_event: None,
            last_rebuild: None,
        }
    }

    fn in_cooldown(&self) -> bool {
        self.last_rebuild
            .is_some_and(|t| t.elapsed() < Duration::from_millis(REBUILD_COOLDOWN_MS))
    }

    fn add(&mut self, event: Event) {
        for path in event.paths {
            if !is_ignored(&path) {
                self.pending.insert(path);
            }
        }
        self.last_event = Some(Instant::now());
    }

    /// Quiet for the debounce window and out of the rebuild cooldown.
    ///
    /// Events arriving during the cooldown stay pending for the next batch.
    fn ready(&self) -> bool {
        !self.pending.is_empty()
            && !self.in_cooldown()
            && self
                .last_event
                .is_some_and(|t| t.elapsed() >= Duration::from_millis(DEBOUNCE_MS))
    }

    fn take(&mut self) -> Vec<PathBuf> {
        self.last_event = None;
        let mut paths: Vec<_> = self.pending.drain().collect();
        paths.sort();
        paths
    }

    fn mark_rebuild(&mut self) {
        self.last_rebuild = Some(Instant::now());
    }

    fn timeout(&self) -> Duration {
        if self.pending.is_empty() {
            Duration::from_millis(IDLE_POLL_MS)
        } else {
            Duration::from_millis(DEBOUNCE_MS)
        }
    }
}

// =============================================================================
// Event Handler
// =============================================================================

/// What a batch asks of the compiler.
#[derive(Debug, PartialEq, Eq)]
enum Action {
    /// Config file changed: reload it and rebuild everything
    Reload,
    /// Redirect template changed: rebuild everything
    Full,
    Incremental,
}

fn classify(paths: &[PathBuf], ctx: &BuildContext) -> Action {
    let redirect_template = ctx
        .config
        .build
        .redirect_template
        .as_ref()
        .map(|path| ctx.root().join(path));

    if paths.iter().any(|p| same_file(p, ctx.config_path())) {
        Action::Reload
    } else if let Some(template) = redirect_template
        && paths.iter().any(|p| same_file(p, &template))
    {
        Action::Full
    } else {
        Action::Incremental
    }
}

/// Event paths may carry a non-canonical form of the same file.
fn same_file(event_path: &Path, path: &Path) -> bool {
    event_path == path || event_path.canonicalize().is_ok_and(|p| p == path)
}

/// Process one batch. Returns true if everything was rebuilt (for cooldown).
fn handle_changes(paths: &[PathBuf], cli: &Cli, compiler: &Mutex<Compiler>) -> bool {
    if paths.is_empty() {
        return false;
    }

    let mut compiler = compiler.lock();
    let root = compiler.context().root().to_path_buf();
    let action = classify(paths, compiler.context());

    let result = match action {
        Action::Reload => {
            log!("watch"; "config changed, rebuilding...");
            reload_context(cli).and_then(|ctx| compiler.reload(ctx))
        }
        Action::Full => {
            log!("watch"; "redirect template changed, rebuilding...");
            compiler.build()
        }
        Action::Incremental => {
            let names: Vec<_> = paths.iter().map(|p| rel_path(p, &root)).collect();
            log!("watch"; "{} changed", names.join(", "));
            compiler.rebuild(paths)
        }
    };
    compiler.watching();

    if let Err(e) = result {
        log!("watch"; "build failed");
        log!("error"; "{e:#}");
    }
    eprintln!(); // Blank line to separate rebuild sessions

    action != Action::Incremental
}

fn reload_context(cli: &Cli) -> Result<BuildContext> {
    let config = SiteConfig::load(cli)?;
    Ok(BuildContext::new(config)?)
}

// =============================================================================
// Watcher Setup
// =============================================================================

/// Every path whose change can affect the output, with its watch mode.
fn watch_targets(ctx: &BuildContext) -> Vec<(PathBuf, RecursiveMode)> {
    let config = &ctx.config;
    let build = &config.build;

    let folders = config
        .collections
        .iter()
        .chain(&config.datasets)
        .map(|entry| &entry.folder)
        .chain(&build.pages)
        .chain(&build.data)
        .chain(&build.assets)
        .map(|folder| (ctx.root().join(folder), RecursiveMode::Recursive));
    let files = std::iter::once(ctx.config_path().to_path_buf())
        .chain(build.redirect_template.as_ref().map(|p| ctx.root().join(p)))
        .map(|file| (file, RecursiveMode::NonRecursive));

    folders.chain(files).filter(|(path, _)| path.exists()).collect()
}

fn setup_watchers(watcher: &mut impl Watcher, ctx: &BuildContext) -> Result<Vec<PathBuf>> {
    let targets = watch_targets(ctx);
    for (path, mode) in &targets {
        watcher
            .watch(path, *mode)
            .with_context(|| format!("Failed to watch {}", path.display()))?;
    }

    let names: Vec<_> = targets.iter().map(|(p, _)| rel_path(p, ctx.root())).collect();
    log!("watch"; "{}", names.join(", "));
    eprintln!(); // Blank line to separate init logs from change events
    Ok(targets.into_iter().map(|(path, _)| path).collect())
}

const fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_)
    )
}

// =============================================================================
// Public API
// =============================================================================

/// Start blocking file watcher with debouncing and live rebuild.
///
/// Returns once `shutdown` is set, after the batch in progress finished.
pub fn watch_for_changes_blocking(cli: &Cli, compiler: &Mutex<Compiler>, shutdown: &AtomicBool) -> Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx).context("Failed to create file watcher")?;
    let mut watched = setup_watchers(&mut watcher, compiler.lock().context())?;
    compiler.lock().watching();

    let mut debouncer = Debouncer::new();

    while !shutdown.load(Ordering::SeqCst) {
        match rx.recv_timeout(debouncer.timeout()) {
            Ok(Ok(event)) if is_relevant(&event) => debouncer.add(event),
            Ok(Err(e)) => log!("watch"; "error: {e}"),
            Err(RecvTimeoutError::Timeout) if debouncer.ready() => {
                if handle_changes(&debouncer.take(), cli, compiler) {
                    debouncer.mark_rebuild();
                    // Folders may have moved with the config
                    for path in watched.drain(..) {
                        let _ = watcher.unwatch(&path);
                    }
                    watched = setup_watchers(&mut watcher, compiler.lock().context())?;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
            // Other cases: irrelevant events, timeout without ready, etc.
            _ => {}
        }
    }

    Ok(())
}

/// Watch mode without the preview server; Ctrl+C stops the loop.
pub fn watch_site(cli: &Cli, compiler: &Mutex<Compiler>) -> Result<()> {
    static SHUTDOWN: AtomicBool = AtomicBool::new(false);
    ctrlc::set_handler(|| {
        log!("watch"; "shutting down...");
        SHUTDOWN.store(true, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    watch_for_changes_blocking(cli, compiler, &SHUTDOWN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::testing::site;

    #[test]
    fn test_debouncer_batches_events() {
        let mut debouncer = Debouncer::new();
        let event = Event::new(EventKind::Any)
            .add_path(PathBuf::from("/site/_posts/b.md"))
            .add_path(PathBuf::from("/site/_posts/a.md"))
            .add_path(PathBuf::from("/site/_posts/a.md~"));
        debouncer.add(event);

        assert!(!debouncer.ready());
        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 20));
        assert!(debouncer.ready());
        assert_eq!(
            debouncer.take(),
            vec![PathBuf::from("/site/_posts/a.md"), PathBuf::from("/site/_posts/b.md")]
        );
        assert!(!debouncer.ready());
    }

    #[test]
    fn test_debouncer_keeps_events_during_cooldown() {
        let mut debouncer = Debouncer::new();
        debouncer.mark_rebuild();
        debouncer.add(Event::new(EventKind::Any).add_path(PathBuf::from("/site/_posts/a.md")));

        std::thread::sleep(Duration::from_millis(DEBOUNCE_MS + 20));
        assert!(debouncer.in_cooldown());
        assert!(!debouncer.ready());

        std::thread::sleep(Duration::from_millis(REBUILD_COOLDOWN_MS - DEBOUNCE_MS));
        assert!(!debouncer.in_cooldown());
        assert!(debouncer.ready());
        assert_eq!(debouncer.take(), vec![PathBuf::from("/site/_posts/a.md")]);
    }

    #[test]
    fn test_classify_config_and_redirect_template() {
        let (_dir, ctx) = site(
            "[build]\nredirect_template = \"redirect.html\"\n",
            &[("redirect.html", "<a href=\"{{ this.redirect }}\"></a>")],
        );

        let config = vec![ctx.config_path().to_path_buf()];
        let template = vec![ctx.root().join("redirect.html")];
        let post = vec![ctx.root().join("_pages/a.md")];

        assert_eq!(classify(&config, &ctx), Action::Reload);
        assert_eq!(classify(&template, &ctx), Action::Full);
        assert_eq!(classify(&post, &ctx), Action::Incremental);
    }

    #[test]
    fn test_watch_targets_skip_missing_folders() {
        let (_dir, ctx) = site(
            "[build]\nassets = [\"assets\"]\n",
            &[("_pages/index.html", "---\n---\nhi"), ("assets/logo.svg", "<svg/>")],
        );

        let targets: Vec<_> = watch_targets(&ctx).into_iter().map(|(p, _)| p).collect();
        assert!(targets.contains(&ctx.root().join("assets")));
        assert!(targets.contains(&ctx.config_path().to_path_buf()));
        assert!(targets.iter().all(|p| p.exists()));
    }
}
