//! Evaluation phase: front matter, permalinks, dynamic pages and redirects.
//!
//! Runs only after every tracker finished scanning, so the site globals are
//! complete before the first `%name` is resolved.

use super::Compiler;
use crate::{document::PageViewLink, log};
use anyhow::Result;

impl Compiler {
    pub(super) fn evaluate_all(&mut self) -> Result<()> {
        // Pages first: items take their permalink pattern from dynamic pages
        for path in self.pages.tracker().paths() {
            self.evaluate_page(&path)?;
        }
        for path in self.collections.tracker().paths() {
            self.evaluate_item(&path)?;
        }

        let origins: Vec<String> = self
            .pages
            .tracker()
            .paths()
            .into_iter()
            .chain(self.collections.tracker().paths())
            .collect();
        let mut redirects = 0;
        for origin in &origins {
            redirects += self.regenerate_redirects(origin).1.len();
        }

        self.pages.build_navigation(self.ctx.drafts());
        log!("eval"; "{} pages, {} items, {} redirects",
            self.pages.tracker().len(), self.collections.tracker().len(), redirects);
        Ok(())
    }

    pub(super) fn evaluate_page(&mut self, path: &str) -> Result<()> {
        let globals = self.ctx.globals();
        let Some(page) = self.pages.tracker_mut().get_mut(path) else {
            return Ok(());
        };
        page.evaluate(globals)?;
        page.document_mut().parse_body(&self.markup);
        Ok(())
    }

    /// Evaluate one item and bind it to its collection's dynamic page.
    pub(super) fn evaluate_item(&mut self, path: &str) -> Result<()> {
        let dynamic = self
            .collections
            .tracker()
            .get(path)
            .and_then(|item| item.document().namespace())
            .and_then(|collection| self.pages.page_for_collection(collection))
            .map(|page| (page.permalink_pattern().map(str::to_string), page.link()));

        let globals = self.ctx.globals();
        let Some(item) = self.collections.tracker_mut().get_mut(path) else {
            return Ok(());
        };
        if let Some((Some(pattern), _)) = &dynamic {
            item.apply_permalink_pattern(pattern);
        }
        item.evaluate(globals)?;
        item.document_mut().parse_body(&self.markup);

        let link: Option<PageViewLink> = dynamic.map(|(_, link)| link);
        item.link_page_view(link.clone());
        if let Some(link) = link
            && let Some(page) = self.pages.tracker_mut().get_mut(&link.path)
        {
            page.attach_item(path);
        }
        Ok(())
    }

    /// Rebuild the redirect pages declared by `origin`.
    ///
    /// Returns the redirect paths dropped and the ones created.
    pub(super) fn regenerate_redirects(&mut self, origin: &str) -> (Vec<String>, Vec<String>) {
        let declared = match self.collections.tracker().get(origin) {
            Some(item) if self.ctx.drafts() || !item.document().is_draft() => {
                item.url().map(|url| (url, item.redirects().to_vec()))
            }
            Some(_) => None,
            None => self
                .pages
                .tracker()
                .get(origin)
                .filter(|page| self.ctx.drafts() || !page.document().is_draft())
                .and_then(|page| page.url().map(|url| (url, page.redirects().to_vec()))),
        };

        let removed = self.pages.remove_redirects(origin);
        let added = match declared {
            Some((url, sources)) if !sources.is_empty() => {
                self.pages.set_redirects(origin, &url, &sources, &self.redirect_template)
            }
            _ => Vec::new(),
        };
        (removed, added)
    }

    /// Drop a removed item from every dynamic page.
    pub(super) fn detach_item(&mut self, path: &str) {
        for page in self.pages.tracker_mut().values_mut() {
            page.detach_item(path);
        }
    }
}
