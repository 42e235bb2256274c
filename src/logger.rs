//! Terminal output: prefixed log lines and the render status line.
//!
//! ```text
//! [scan] 3 folders
//! [warn] _posts/bad.md: missing front matter
//! [route] 42 routes
//! [render] content 12/38  redirects 0/4        <- rewritten in place
//! ```
//!
//! The status line is only drawn while a [`RenderProgress`] is alive; a log
//! line printed meanwhile clears it first and the next tick redraws it.

use colored::{ColoredString, Colorize};
use crossterm::{
    execute,
    terminal::{Clear, ClearType, size},
};
use parking_lot::Mutex;
use std::{
    io::{Write, stdout},
    sync::{
        OnceLock,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

static TERMINAL_WIDTH: OnceLock<usize> = OnceLock::new();

/// Whether a status line currently occupies the last terminal row
static STATUS_LINE: AtomicBool = AtomicBool::new(false);

fn terminal_width() -> usize {
    *TERMINAL_WIDTH.get_or_init(|| size().map_or(120, |(w, _)| usize::from(w)))
}

/// Log a message under a phase prefix.
///
/// ```ignore
/// log!("scan"; "{} documents in `{}`", count, folder);
/// ```
#[macro_export]
macro_rules! log {
    ($module:expr; $($arg:tt)*) => {{
        $crate::logger::log($module, &format!($($arg)*))
    }};
}

/// Print one log line; single-line messages are cut to the terminal width.
pub fn log(module: &str, message: &str) {
    let mut stdout = stdout().lock();
    if STATUS_LINE.load(Ordering::SeqCst) {
        clear_line(&mut stdout);
    }

    let message = if message.contains('\n') {
        message
    } else {
        truncate_str(message, terminal_width().saturating_sub(prefix_width(module)))
    };
    writeln!(stdout, "{} {message}", prefix(module)).ok();
    stdout.flush().ok();
}

/// `[module] ` as printed.
const fn prefix_width(module: &str) -> usize {
    module.len() + 3
}

fn prefix(module: &str) -> ColoredString {
    let text = format!("[{module}]");
    match module {
        "error" => text.bright_red().bold(),
        "warn" => text.bright_magenta().bold(),
        "serve" | "watch" => text.bright_green().bold(),
        "scan" | "eval" | "route" => text.bright_cyan().bold(),
        _ => text.bright_yellow().bold(),
    }
}

fn clear_line(stdout: &mut impl Write) {
    write!(stdout, "\r").ok();
    execute!(stdout, Clear(ClearType::CurrentLine)).ok();
}

/// Cut `s` to at most `max_len` bytes on a char boundary.
fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        return s;
    }
    let mut end = max_len;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ============================================================================
// Render Progress
// ============================================================================

/// Per-kind counters of one render pass, drawn as a single status line.
pub struct RenderProgress {
    kinds: Vec<Counter>,
    draw: Mutex<()>,
}

struct Counter {
    name: &'static str,
    done: AtomicUsize,
    total: usize,
}

impl RenderProgress {
    /// Start counting `(kind, total)` pairs; kinds with nothing to render
    /// are left out.
    ///
    /// Returns `None` when at most one target renders: there is nothing to
    /// watch progress on.
    pub fn start(kinds: &[(&'static str, usize)]) -> Option<Self> {
        let kinds: Vec<Counter> = kinds
            .iter()
            .filter(|(_, total)| *total > 0)
            .map(|&(name, total)| Counter {
                name,
                done: AtomicUsize::new(0),
                total,
            })
            .collect();
        if kinds.iter().map(|k| k.total).sum::<usize>() <= 1 {
            return None;
        }

        STATUS_LINE.store(true, Ordering::SeqCst);
        Some(Self {
            kinds,
            draw: Mutex::new(()),
        })
    }

    /// Count one rendered target of `kind` and redraw.
    pub fn tick(&self, kind: &str) {
        if let Some(counter) = self.kinds.iter().find(|k| k.name == kind) {
            counter.done.fetch_add(1, Ordering::Relaxed);
            self.redraw();
        }
    }

    /// `content 12/38  redirects 0/4`
    fn status(&self) -> String {
        self.kinds
            .iter()
            .map(|k| format!("{} {}/{}", k.name, k.done.load(Ordering::Relaxed).min(k.total), k.total))
            .collect::<Vec<_>>()
            .join("  ")
    }

    fn redraw(&self) {
        let _guard = self.draw.lock();
        let status = self.status();
        let status = truncate_str(&status, terminal_width().saturating_sub(prefix_width("render")));

        let mut stdout = stdout().lock();
        clear_line(&mut stdout);
        write!(stdout, "{} {status}", prefix("render")).ok();
        stdout.flush().ok();
    }

    /// Remove the status line.
    pub fn finish(&self) {
        if !STATUS_LINE.swap(false, Ordering::SeqCst) {
            return;
        }
        let _guard = self.draw.lock();
        let mut stdout = stdout().lock();
        clear_line(&mut stdout);
        stdout.flush().ok();
    }
}

impl Drop for RenderProgress {
    fn drop(&mut self) {
        self.finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_width() {
        // "[scan] "
        assert_eq!(prefix_width("scan"), 7);
        assert_eq!(prefix_width("render"), 9);
    }

    #[test]
    fn test_truncate_str() {
        assert_eq!(truncate_str("hello", 10), "hello");
        assert_eq!(truncate_str("hello world", 5), "hello");
        assert_eq!(truncate_str("hello", 0), "");
        // "é" is two bytes; cutting inside it backs off
        assert_eq!(truncate_str("café", 4), "caf");
    }

    #[test]
    fn test_start_skips_single_target() {
        assert!(RenderProgress::start(&[("content", 1), ("redirects", 0)]).is_none());
        assert!(RenderProgress::start(&[]).is_none());
    }

    #[test]
    fn test_status_counts_per_kind() {
        let progress = RenderProgress::start(&[("content", 3), ("redirects", 0), ("feeds", 2)]).unwrap();
        progress.kinds[0].done.fetch_add(2, Ordering::Relaxed);
        progress.kinds[1].done.fetch_add(5, Ordering::Relaxed);

        assert_eq!(progress.status(), "content 2/3  feeds 2/2");
    }
}
