//! PageViews: tracked pages plus synthesized redirect pages.

use super::{FolderOptions, Trackable, Tracker, Warning};
use crate::{
    context::BuildContext,
    document::{Document, DocumentError, PageView, PageViewLink},
    fs::Filesystem,
    jail::JailError,
    log,
    templating::ContextValue,
};
use anyhow::Result;
use rustc_hash::FxHashMap;
use serde_yaml::Mapping;
use std::collections::BTreeMap;

impl Trackable for PageView {
    fn construct(relative_path: &str, raw: &str) -> Result<Self, DocumentError> {
        Self::parse(relative_path, raw)
    }

    fn document(&self) -> &Document {
        PageView::document(self)
    }

    fn document_mut(&mut self) -> &mut Document {
        PageView::document_mut(self)
    }
}

#[derive(Default)]
pub struct PageManager {
    tracker: Tracker<PageView>,
    /// Redirect pages keyed by their `@redirect:` path
    redirects: BTreeMap<String, PageView>,
}

impl PageManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, fs: &dyn Filesystem, ctx: &BuildContext) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();
        for folder in &ctx.config.build.pages {
            let folder = folder.to_string_lossy();
            warnings.extend(self.tracker.scan(fs, ctx, &folder, FolderOptions::default())?);
        }
        log!("scan"; "{} pages", self.tracker.len());
        Ok(warnings)
    }

    pub const fn tracker(&self) -> &Tracker<PageView> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker<PageView> {
        &mut self.tracker
    }

    /// Tracked page or redirect page by path.
    pub fn get(&self, path: &str) -> Option<&PageView> {
        self.tracker.get(path).or_else(|| self.redirects.get(path))
    }

    pub fn dynamic_pages(&self) -> impl Iterator<Item = &PageView> {
        self.tracker.iter().filter(|page| page.is_dynamic())
    }

    pub fn static_pages(&self) -> impl Iterator<Item = &PageView> {
        self.tracker.iter().filter(|page| !page.is_dynamic())
    }

    /// Dynamic page bound to `collection`; the first one scanned wins.
    pub fn page_for_collection(&self, collection: &str) -> Option<&PageView> {
        self.dynamic_pages().find(|page| page.collection() == Some(collection))
    }

    pub fn redirects(&self) -> impl Iterator<Item = &PageView> {
        self.redirects.values()
    }

    /// Replace the redirect pages generated from `origin`.
    ///
    /// Returns the paths of the new redirect pages.
    pub fn set_redirects(&mut self, origin: &str, target: &str, sources: &[String], template: &str) -> Vec<String> {
        self.remove_redirects(origin);

        let mut paths = Vec::with_capacity(sources.len());
        for from in sources {
            let mut page = PageView::redirect(origin, from, target, template);
            // Synthetic front matter holds no variables
            if page.evaluate(&Mapping::new()).is_err() {
                continue;
            }
            let path = page.document().relative_path().to_string();
            if let Some(previous) = self.redirects.get(&path)
                && previous.redirect_origin() != Some(origin)
            {
                log!("warn"; "redirect `{from}` declared by both `{}` and `{origin}`",
                    previous.redirect_origin().unwrap_or_default());
            }
            self.redirects.insert(path.clone(), page);
            paths.push(path);
        }
        paths
    }

    /// Drop every redirect page generated from `origin`, returning their paths.
    pub fn remove_redirects(&mut self, origin: &str) -> Vec<String> {
        let stale: Vec<String> = self
            .redirects
            .iter()
            .filter(|(_, page)| page.redirect_origin() == Some(origin))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &stale {
            self.redirects.remove(path);
        }
        stale
    }

    /// Link each static page to the static pages nested directly below its URL.
    ///
    /// ```text
    /// /gallery/            ◀── parent
    /// ├── /gallery/france/ ◀── child
    /// │   └── /gallery/france/paris/
    /// └── /gallery/spain/
    /// ```
    pub fn build_navigation(&mut self, drafts: bool) {
        let nodes: Vec<(String, String, PageViewLink)> = self
            .static_pages()
            .filter(|page| page.in_menu() && (drafts || !page.document().is_draft()))
            .filter_map(|page| {
                let url = page.url()?;
                Some((page.document().relative_path().to_string(), url, page.link()))
            })
            .collect();

        let mut children: FxHashMap<String, Vec<PageViewLink>> = FxHashMap::default();
        for (path, url, link) in &nodes {
            let parent = nodes
                .iter()
                .filter(|(other, parent_url, _)| {
                    other != path
                        && parent_url.ends_with('/')
                        && url.len() > parent_url.len()
                        && url.starts_with(parent_url.as_str())
                })
                .max_by_key(|(_, parent_url, _)| parent_url.len());
            if let Some((parent_path, _, _)) = parent {
                children.entry(parent_path.clone()).or_default().push(link.clone());
            }
        }

        for page in self.tracker.values_mut() {
            let path = page.document().relative_path().to_string();
            page.set_children(children.remove(&path).unwrap_or_default());
        }
    }

    /// The `pages` template global: every visible static page.
    pub fn jailed(&self, drafts: bool) -> Result<ContextValue<'_>, JailError> {
        let pages = self
            .static_pages()
            .filter(|page| drafts || !page.document().is_draft())
            .map(|page| page.jail().map(ContextValue::jailed))
            .collect::<Result<_, _>>()?;
        Ok(ContextValue::List(pages))
    }

    pub fn clear(&mut self) {
        self.tracker.clear();
        self.redirects.clear();
    }
}
