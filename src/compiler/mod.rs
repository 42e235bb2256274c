//! Build orchestration.
//!
//! The [`Compiler`] owns every tracker, the router and the rendered outputs,
//! and sequences them through one state machine:
//!
//! ```text
//!            full build
//! Idle ──▶ Scanning ──▶ Evaluating ──▶ Routing ──▶ Rendering ──▶ Idle
//!   │                                                             │
//!   │                                    watch mode               ▼
//!   └───────────────────────────────────────────────────────▶ Watching
//!                                                                 │ change
//!                    rebuild(paths): refresh ─▶ evaluate ─▶       │
//!                    route ─▶ render affected targets only  ◀─────┘
//! ```
//!
//! - **evaluate**: front matter, permalinks, dynamic pages, redirects
//! - **pages**: routing and rendering
//! - **watch**: incremental rebuilds
//!
//! Any abort-class error moves the compiler to `Failed`; the next rebuild
//! after a failure is a full build.

mod evaluate;
mod pages;
mod watch;

use crate::{
    context::BuildContext,
    fs::{DiskFilesystem, Filesystem},
    log,
    markup::MarkupDispatcher,
    router::{Route, Router},
    serve::guess_content_type,
    templating::{JinjaTemplating, Templating},
    tracker::{CollectionManager, DataManager, PageManager, Warning},
};
use anyhow::{Context, Result};
use rustc_hash::FxHashMap;
use std::path::{Component, Path, PathBuf};

/// Embedded fallback for redirect pages.
const REDIRECT_TEMPLATE: &str = include_str!("../embed/redirect.html");

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildState {
    Idle,
    Scanning,
    Evaluating,
    Routing,
    Rendering,
    Watching,
    Failed,
}

/// A rendered target, kept in memory for previews and change detection.
#[derive(Debug, Clone)]
pub struct Output {
    pub bytes: Vec<u8>,
    pub hash: blake3::Hash,
    pub route: Route,
}

/// Outcome of one build cycle.
#[derive(Debug, Default)]
pub struct BuildReport {
    /// Targets rendered this cycle
    pub rendered: Vec<String>,
    /// Targets whose bytes changed and were written
    pub written: Vec<String>,
    /// Targets no longer routed, deleted from the output
    pub removed: Vec<String>,
    pub warnings: Vec<Warning>,
}

/// Bytes answering a live-preview request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
}

pub struct Compiler {
    ctx: BuildContext,
    fs: Box<dyn Filesystem>,
    markup: MarkupDispatcher,
    templating: Box<dyn Templating>,
    collections: CollectionManager,
    data: DataManager,
    pages: PageManager,
    router: Router,
    outputs: FxHashMap<String, Output>,
    redirect_template: String,
    state: BuildState,
}

impl Compiler {
    /// Compiler on the real filesystem with the default engines.
    pub fn new(ctx: BuildContext) -> Self {
        let templating = Box::new(JinjaTemplating::from_context(&ctx));
        Self::with_collaborators(ctx, Box::new(DiskFilesystem), MarkupDispatcher::with_defaults(), templating)
    }

    pub fn with_collaborators(
        ctx: BuildContext,
        fs: Box<dyn Filesystem>,
        markup: MarkupDispatcher,
        templating: Box<dyn Templating>,
    ) -> Self {
        Self {
            ctx,
            fs,
            markup,
            templating,
            collections: CollectionManager::new(),
            data: DataManager::new(),
            pages: PageManager::new(),
            router: Router::new(),
            outputs: FxHashMap::default(),
            redirect_template: REDIRECT_TEMPLATE.to_string(),
            state: BuildState::Idle,
        }
    }

    pub const fn context(&self) -> &BuildContext {
        &self.ctx
    }

    pub const fn state(&self) -> BuildState {
        self.state
    }

    pub const fn router(&self) -> &Router {
        &self.router
    }

    pub const fn collections(&self) -> &CollectionManager {
        &self.collections
    }

    pub const fn data(&self) -> &DataManager {
        &self.data
    }

    pub const fn pages(&self) -> &PageManager {
        &self.pages
    }

    pub fn output(&self, target: &str) -> Option<&Output> {
        self.outputs.get(target)
    }

    /// Enter the quiescent watch state after a successful build.
    pub fn watching(&mut self) {
        if self.state != BuildState::Failed {
            self.state = BuildState::Watching;
        }
    }

    /// Swap in a reloaded configuration and rebuild everything.
    ///
    /// The templating engine is recreated from the new context.
    pub fn reload(&mut self, ctx: BuildContext) -> Result<BuildReport> {
        self.templating = Box::new(JinjaTemplating::from_context(&ctx));
        self.ctx = ctx;
        self.build()
    }

    // ========================================================================
    // Full build
    // ========================================================================

    pub fn build(&mut self) -> Result<BuildReport> {
        let result = self.full_build();
        self.state = match result {
            Ok(_) => BuildState::Idle,
            Err(_) => BuildState::Failed,
        };
        result
    }

    fn full_build(&mut self) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        self.collections = CollectionManager::new();
        self.data = DataManager::new();
        self.pages.clear();
        self.router.clear();
        self.redirect_template = self.load_redirect_template()?;

        let output = self.ctx.output_dir();
        if self.ctx.config.build.clean {
            self.fs
                .remove_dir_all(&output)
                .with_context(|| format!("Failed to clear output directory: {}", output.display()))?;
            self.outputs.clear();
        }

        // Every tracker finishes scanning before anything is evaluated
        self.state = BuildState::Scanning;
        report.warnings.extend(self.collections.scan(&*self.fs, &self.ctx)?);
        report.warnings.extend(self.data.scan(&*self.fs, &self.ctx)?);
        report.warnings.extend(self.pages.scan(&*self.fs, &self.ctx)?);

        self.state = BuildState::Evaluating;
        self.evaluate_all()?;

        self.state = BuildState::Routing;
        self.route_all(&mut report.warnings);
        log!("route"; "{} routes", self.router.len());

        self.state = BuildState::Rendering;
        let targets: Vec<String> = self.router.routes().map(|r| r.target.clone()).collect();
        let rendered = self.render_targets(&targets)?;
        self.commit(rendered, &mut report)?;
        self.prune(&mut report)?;
        let assets = self.copy_assets()?;

        log!("render"; "{} rendered, {} written, {} assets",
            report.rendered.len(), report.written.len(), assets);
        summarize(&report.warnings);
        Ok(report)
    }

    fn load_redirect_template(&self) -> Result<String> {
        match &self.ctx.config.build.redirect_template {
            Some(path) if !self.ctx.safe() => {
                let path = self.ctx.root().join(path);
                self.fs
                    .read_to_string(&path)
                    .with_context(|| format!("Failed to read redirect template: {}", path.display()))
            }
            _ => Ok(REDIRECT_TEMPLATE.to_string()),
        }
    }

    // ========================================================================
    // Output
    // ========================================================================

    /// Keep rendered targets in memory; write those whose bytes changed.
    fn commit(&mut self, rendered: Vec<(Route, String)>, report: &mut BuildReport) -> Result<()> {
        let output_dir = self.ctx.output_dir();
        for (route, html) in rendered {
            let bytes = html.into_bytes();
            let hash = blake3::hash(&bytes);
            let path = output_dir.join(&route.target);

            let unchanged = match self.outputs.get(&route.target) {
                Some(previous) => previous.hash == hash,
                None => self
                    .fs
                    .read_to_string(&path)
                    .is_ok_and(|existing| blake3::hash(existing.as_bytes()) == hash),
            };
            if !unchanged {
                self.fs
                    .write(&path, &bytes)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                report.written.push(route.target.clone());
            }

            report.rendered.push(route.target.clone());
            self.outputs.insert(route.target.clone(), Output { bytes, hash, route });
        }
        Ok(())
    }

    /// Delete outputs whose route disappeared.
    fn prune(&mut self, report: &mut BuildReport) -> Result<()> {
        let mut stale: Vec<String> = self
            .outputs
            .keys()
            .filter(|target| self.router.get(target).is_none())
            .cloned()
            .collect();
        stale.sort_unstable();

        let output_dir = self.ctx.output_dir();
        for target in stale {
            let path = output_dir.join(&target);
            self.fs
                .remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
            self.outputs.remove(&target);
            report.removed.push(target);
        }
        Ok(())
    }

    /// Whether root-relative `path` lies in an asset folder.
    ///
    /// Only plain segments count: `assets/../quire.toml` starts with
    /// `assets` but names a file outside it.
    fn is_asset(&self, path: &str) -> bool {
        let path = Path::new(path);
        path.components().all(|c| matches!(c, Component::Normal(_)))
            && self.ctx.config.build.assets.iter().any(|folder| path.starts_with(folder))
    }

    fn copy_assets(&self) -> Result<usize> {
        let mut copied = 0;
        for folder in &self.ctx.config.build.assets {
            let source = self.ctx.root().join(folder);
            if !self.fs.exists(&source) {
                continue;
            }
            let files = self
                .fs
                .list_files(&source)
                .with_context(|| format!("Failed to scan assets in {}", source.display()))?;
            for file in files {
                if let Some(relative) = self.ctx.relative_path(&file) {
                    self.copy_asset(&relative)?;
                    copied += 1;
                }
            }
        }
        Ok(copied)
    }

    fn copy_asset(&self, relative: &str) -> Result<()> {
        let from = self.ctx.absolute(relative);
        let to = self.ctx.output_dir().join(relative);
        self.fs
            .copy(&from, &to)
            .with_context(|| format!("Failed to copy asset {relative}"))
    }

    // ========================================================================
    // Live preview
    // ========================================================================

    /// Rendered bytes for a request path, straight from memory.
    pub fn preview(&self, request: &str) -> Option<Preview> {
        let route = self.router.resolve(request)?;
        let output = self.outputs.get(&route.target)?;
        Some(Preview {
            bytes: output.bytes.clone(),
            content_type: guess_content_type(Path::new(&route.target)),
        })
    }

    /// Source file of an asset request, if it exists.
    pub fn asset_source(&self, request: &str) -> Option<PathBuf> {
        let relative = crate::router::normalize(request);
        if !self.is_asset(&relative) {
            return None;
        }
        let path = self.ctx.absolute(&relative);
        self.fs.exists(&path).then_some(path)
    }
}

fn summarize(warnings: &[Warning]) {
    if !warnings.is_empty() {
        log!("warn"; "{} documents skipped", warnings.len());
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        context::testing::site,
        document::EvalError,
        jail::JailError,
        templating::TemplateRenderError,
    };
    use pretty_assertions::assert_eq;
    use std::fs;
    use tempfile::TempDir;

    pub const POST: &str = "---\ntitle: Post\npermalink: /p/\nredirect_from: /old/\n---\nHello %name";

    pub fn compiler(config: &str, files: &[(&str, &str)]) -> (TempDir, Compiler) {
        let (dir, ctx) = site(config, files);
        (dir, Compiler::new(ctx))
    }

    fn page(compiler: &Compiler, request: &str) -> String {
        let preview = compiler.preview(request).unwrap();
        String::from_utf8(preview.bytes).unwrap()
    }

    #[test]
    fn test_post_with_redirect_end_to_end() {
        let (dir, mut compiler) = compiler("[site]\nname = \"World\"\n", &[("_pages/post.md", POST)]);
        let report = compiler.build().unwrap();

        assert_eq!(compiler.state(), BuildState::Idle);
        assert!(page(&compiler, "/p/").contains("Hello World"));
        let redirect = page(&compiler, "/old/");
        assert!(redirect.contains(r#"http-equiv="refresh""#));
        assert!(redirect.contains("url=/p/"));

        let mut written = report.written.clone();
        written.sort_unstable();
        assert_eq!(written, vec!["old/index.html", "p/index.html"]);
        assert!(dir.path().join("_site/p/index.html").is_file());
        assert_eq!(compiler.preview("/p/").unwrap().content_type, "text/html; charset=utf-8");
        assert!(compiler.preview("/missing/").is_none());
    }

    #[test]
    fn test_dynamic_collection_pages() {
        let (_dir, mut compiler) = compiler(
            "[[collections]]\nname = \"posts\"\nfolder = \"_posts\"\n",
            &[
                ("_posts/first.md", "---\ntitle: First\n---\nOne"),
                ("_posts/second.md", "---\ntitle: Second\npermalink: /custom/\n---\nTwo"),
                ("_posts/draft.md", "---\ntitle: Draft\ndraft: true\n---\nWip"),
                (
                    "_pages/blog.html",
                    "---\ncollection: posts\npermalink: /blog/%title/\n---\n<h1>{{ this.title }}</h1>{{ this.content }}",
                ),
                (
                    "_pages/index.html",
                    "---\npermalink: /\n---\n{% for post in collections.posts %}[{{ post.url }}]{% endfor %}",
                ),
            ],
        );
        compiler.build().unwrap();

        let first = page(&compiler, "/blog/first/");
        assert!(first.contains("<h1>First</h1>"));
        assert!(first.contains("<p>One</p>"));
        assert!(page(&compiler, "/custom/").contains("<h1>Second</h1>"));
        assert!(compiler.preview("/blog/draft/").is_none());
        assert_eq!(page(&compiler, "/"), "[/blog/first/][/custom/]");
    }

    #[test]
    fn test_drafts_rendered_when_enabled() {
        let (_dir, mut compiler) = compiler(
            "[build]\ndrafts = true\n",
            &[("_pages/wip.html", "---\npermalink: /wip/\ndraft: true\n---\nwip")],
        );
        compiler.build().unwrap();
        assert!(compiler.preview("/wip/").is_some());
    }

    #[test]
    fn test_undefined_variable_aborts_build() {
        let (dir, mut compiler) = compiler(
            "",
            &[
                ("_pages/ok.html", "---\npermalink: /ok/\n---\nfine"),
                ("_pages/bad.html", "---\npermalink: /%missing/\n---\nbad"),
            ],
        );
        let err = compiler.build().unwrap_err();

        assert_eq!(
            err.downcast_ref::<EvalError>(),
            Some(&EvalError::UndefinedVariable {
                name: "missing".into(),
                path: "_pages/bad.html".into()
            })
        );
        assert_eq!(compiler.state(), BuildState::Failed);
        assert!(compiler.router().is_empty());
        assert!(!dir.path().join("_site/ok/index.html").exists());
    }

    #[test]
    fn test_capability_denied_aborts_render() {
        let (_dir, mut compiler) = compiler(
            "",
            &[("_pages/leak.html", "---\npermalink: /leak/\n---\n{{ this.body }}")],
        );
        let err = compiler.build().unwrap_err();

        assert!(format!("{err:#}").contains("_pages/leak.html"));
        assert!(matches!(
            err.downcast_ref::<TemplateRenderError>(),
            Some(TemplateRenderError::Jail(JailError::CapabilityDenied { .. }))
        ));
    }

    #[test]
    fn test_malformed_documents_become_warnings() {
        let (_dir, mut compiler) = compiler(
            "[build]\ndata = [\"_data\"]\n",
            &[
                ("_pages/ok.html", "---\npermalink: /ok/\n---\n{{ data.authors[0].name }}"),
                ("_pages/empty.html", "---\ntitle: nothing\n---\n"),
                ("_data/authors.yml", "- name: Ada\n"),
                ("_data/feed.xml", "<feed/>"),
            ],
        );
        let report = compiler.build().unwrap();

        assert_eq!(report.warnings.len(), 2);
        assert_eq!(page(&compiler, "/ok/"), "Ada");
    }

    #[test]
    fn test_unchanged_outputs_are_not_rewritten() {
        let (_dir, ctx) = site("", &[("_pages/a.html", "---\npermalink: /a/\n---\nA")]);
        Compiler::new(ctx.clone()).build().unwrap();

        let report = Compiler::new(ctx).build().unwrap();
        assert_eq!(report.rendered, vec!["a/index.html"]);
        assert!(report.written.is_empty());
    }

    #[test]
    fn test_assets_copied_and_served_from_source() {
        let (dir, mut compiler) = compiler(
            "",
            &[("_pages/a.html", "---\npermalink: /a/\n---\nA"), ("assets/site.css", "body {}")],
        );
        compiler.build().unwrap();

        assert_eq!(fs::read_to_string(dir.path().join("_site/assets/site.css")).unwrap(), "body {}");
        assert_eq!(compiler.asset_source("/assets/site.css"), Some(dir.path().join("assets/site.css")));
        assert!(compiler.asset_source("/_pages/a.html").is_none());
    }

    #[test]
    fn test_asset_requests_cannot_leave_asset_folder() {
        let (_dir, mut compiler) = compiler(
            "",
            &[("_pages/a.html", "---\npermalink: /a/\n---\nA"), ("assets/site.css", "body {}")],
        );
        compiler.build().unwrap();

        assert!(compiler.asset_source("/assets/%2e%2e/quire.toml").is_none());
        assert!(compiler.asset_source("/assets/../quire.toml").is_none());
        assert!(compiler.asset_source("/assets/%2E%2E/%2E%2E/etc/passwd").is_none());
        assert!(compiler.asset_source("/assets/site.css").is_some());
    }

    #[test]
    fn test_dot_segment_permalink_stays_in_output() {
        let (dir, mut compiler) = compiler(
            "",
            &[("_pages/escape.html", "---\npermalink: /../../escaped.html\nredirect_from: /../old/\n---\nx")],
        );
        compiler.build().unwrap();

        assert!(dir.path().join("_site/escaped.html").is_file());
        assert!(dir.path().join("_site/old/index.html").is_file());
        assert!(!dir.path().join("escaped.html").exists());
        assert!(!dir.path().parent().unwrap().join("escaped.html").exists());
        assert_eq!(page(&compiler, "/escaped.html"), "x");
    }

    #[test]
    fn test_safe_mode_ignores_custom_redirect_template() {
        let config = "[build]\nsafe = true\nredirect_template = \"redirect.html\"\n";
        let (_dir, mut compiler) = compiler(config, &[("_pages/post.md", POST), ("redirect.html", "custom")]);
        compiler.build().unwrap();
        assert!(page(&compiler, "/old/").contains("http-equiv"));
    }

    #[test]
    fn test_navigation_children_rendered() {
        let (_dir, mut compiler) = compiler(
            "",
            &[
                (
                    "_pages/gallery.html",
                    "---\ntitle: Gallery\npermalink: /gallery/\n---\n{% for c in this.children %}<{{ c.title }}>{% endfor %}",
                ),
                ("_pages/france.html", "---\ntitle: France\npermalink: /gallery/france/\n---\nf"),
            ],
        );
        compiler.build().unwrap();
        assert_eq!(page(&compiler, "/gallery/"), "<France>");
    }
}
