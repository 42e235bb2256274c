//! Routing and rendering phases.

use super::Compiler;
use crate::{
    document::{PageView, REDIRECT_PREFIX},
    jail::JailError,
    log,
    logger::RenderProgress,
    router::Route,
    templating::{ContextValue, TemplateContext},
    tracker::Warning,
};
use anyhow::{Context, Result, anyhow};

impl Compiler {
    // ========================================================================
    // Routing
    // ========================================================================

    /// Rebuild the whole route table.
    pub(super) fn route_all(&mut self, warnings: &mut Vec<Warning>) {
        self.router.clear();
        let mut paths = self.pages.tracker().paths();
        paths.extend(self.pages.redirects().map(|page| page.document().relative_path().to_string()));
        for path in paths {
            self.route_page(&path, warnings);
        }
    }

    /// Register the routes of one page; dynamic pages get one per item.
    ///
    /// Returns the registered targets.
    pub(super) fn route_page(&mut self, path: &str, warnings: &mut Vec<Warning>) -> Vec<String> {
        let Some(page) = self.pages.get(path) else {
            return Vec::new();
        };
        if !self.is_visible(page) {
            return Vec::new();
        }

        if page.is_dynamic() {
            let items = page.content_items().to_vec();
            items
                .iter()
                .filter_map(|item| self.route_item(path, item, warnings))
                .collect()
        } else {
            let route = Route::page(page.target_file(), path);
            self.register(route, warnings).into_iter().collect()
        }
    }

    /// Register one item under its dynamic page.
    pub(super) fn route_item(&mut self, page_view: &str, item: &str, warnings: &mut Vec<Warning>) -> Option<String> {
        let content = self.collections.tracker().get(item)?;
        if !self.ctx.drafts() && content.document().is_draft() {
            return None;
        }
        let route = Route::item(content.target_file(), page_view, item);
        self.register(route, warnings)
    }

    fn register(&mut self, route: Route, warnings: &mut Vec<Warning>) -> Option<String> {
        let target = route.target.clone();
        let source = route.source().to_string();
        if let Some(previous) = self.router.register(route)
            && previous.source() != source
        {
            let message = format!("`{target}` is also produced by `{}`", previous.source());
            log!("warn"; "{source}: {message}");
            warnings.push(Warning { path: source, message });
        }
        Some(target)
    }

    fn is_visible(&self, page: &PageView) -> bool {
        self.ctx.drafts() || !page.document().is_draft()
    }

    // ========================================================================
    // Rendering
    // ========================================================================

    /// Globals injected once every page view is known.
    fn template_globals(&self) -> Result<TemplateContext<'_>, JailError> {
        let drafts = self.ctx.drafts();
        let mut globals = TemplateContext::new();
        globals.insert("site", ContextValue::Json(self.ctx.site_json()));
        globals.insert("data", self.data.jailed()?);
        globals.insert("collections", self.collections.jailed(drafts)?);
        globals.insert("pages", self.pages.jailed(drafts)?);
        Ok(globals)
    }

    /// Render `targets`; the first failure aborts with the source path.
    pub(super) fn render_targets(&self, targets: &[String]) -> Result<Vec<(Route, String)>> {
        let globals = self.template_globals()?;
        let redirects = targets
            .iter()
            .filter_map(|t| self.router.get(t))
            .filter(|r| r.page_view.starts_with(REDIRECT_PREFIX))
            .count();
        let progress = RenderProgress::start(&[
            ("content", targets.len() - redirects),
            ("redirects", redirects),
        ]);

        let mut rendered = Vec::with_capacity(targets.len());
        for target in targets {
            let Some(route) = self.router.get(target) else {
                continue;
            };
            let html = self
                .render_route(&globals, route)
                .with_context(|| format!("Failed to render `{}`", route.source()))?;
            rendered.push((route.clone(), html));

            if let Some(progress) = &progress {
                let kind = if route.page_view.starts_with(REDIRECT_PREFIX) { "redirects" } else { "content" };
                progress.tick(kind);
            }
        }

        if let Some(progress) = &progress {
            progress.finish();
        }
        Ok(rendered)
    }

    fn render_route(&self, globals: &TemplateContext<'_>, route: &Route) -> Result<String> {
        let page = self
            .pages
            .get(&route.page_view)
            .ok_or_else(|| anyhow!("no page view `{}`", route.page_view))?;
        let document = page.document();
        let template = document.content().unwrap_or_else(|| document.body());

        let mut scope = globals.scope();
        match &route.item {
            Some(path) => {
                let item = self
                    .collections
                    .tracker()
                    .get(path)
                    .ok_or_else(|| anyhow!("no collection item `{path}`"))?;
                scope.insert("this", ContextValue::jailed(item.jail()?));
                scope.insert("page", ContextValue::jailed(page.jail()?));
            }
            None => scope.insert("this", ContextValue::jailed(page.jail()?)),
        }

        Ok(self.templating.render(template, &scope)?)
    }
}
