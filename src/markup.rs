//! Markup engines and extension dispatch.
//!
//! Each [`MarkupEngine`] claims a set of file extensions. The dispatcher
//! matches the lower-cased document extension exactly; unclaimed extensions
//! yield `None` and the body is used as final text.

use pulldown_cmark::{Options, Parser, html};
use rustc_hash::FxHashMap;

pub trait MarkupEngine: Send + Sync {
    fn name(&self) -> &'static str;

    /// Lower-case extensions this engine claims.
    fn extensions(&self) -> &'static [&'static str];

    fn parse(&self, text: &str) -> String;
}

// ============================================================================
// Engines
// ============================================================================

/// CommonMark with GFM tables, strikethrough, task lists and footnotes.
pub struct MarkdownEngine;

impl MarkdownEngine {
    fn options() -> Options {
        Options::ENABLE_TABLES
            | Options::ENABLE_STRIKETHROUGH
            | Options::ENABLE_TASKLISTS
            | Options::ENABLE_FOOTNOTES
    }
}

impl MarkupEngine for MarkdownEngine {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["md", "markdown", "mdown"]
    }

    fn parse(&self, text: &str) -> String {
        let parser = Parser::new_ext(text, Self::options());
        let mut out = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut out, parser);
        out
    }
}

/// HTML bodies are already final.
pub struct HtmlEngine;

impl MarkupEngine for HtmlEngine {
    fn name(&self) -> &'static str {
        "html"
    }

    fn extensions(&self) -> &'static [&'static str] {
        &["html", "htm"]
    }

    fn parse(&self, text: &str) -> String {
        text.to_string()
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

#[derive(Default)]
pub struct MarkupDispatcher {
    engines: Vec<Box<dyn MarkupEngine>>,
    by_extension: FxHashMap<&'static str, usize>,
}

impl MarkupDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Markdown and HTML registered.
    pub fn with_defaults() -> Self {
        let mut dispatcher = Self::new();
        dispatcher.register(Box::new(MarkdownEngine));
        dispatcher.register(Box::new(HtmlEngine));
        dispatcher
    }

    /// Later registrations take over extensions claimed earlier.
    pub fn register(&mut self, engine: Box<dyn MarkupEngine>) {
        let index = self.engines.len();
        for ext in engine.extensions() {
            self.by_extension.insert(*ext, index);
        }
        self.engines.push(engine);
    }

    pub fn engine_for(&self, extension: &str) -> Option<&dyn MarkupEngine> {
        let extension = extension.to_ascii_lowercase();
        self.by_extension
            .get(extension.as_str())
            .map(|&i| self.engines[i].as_ref())
    }
}
