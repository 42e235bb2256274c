//! Incremental rebuilds for watch mode.
//!
//! Called by the event loop in [`crate::watch`] with one debounced batch of
//! changed paths.
//!
//! ```text
//! changed paths ──▶ owning tracker (should_track)
//!                      │ refresh / remove
//!                      ▼
//!                 re-evaluate changed documents + their redirects
//!                      │
//!                      ▼
//!                 re-route changed sources ──▶ render affected targets
//! ```
//!
//! Affected targets are the routes of the changed documents plus routes of
//! pages whose template reads the global that changed. Everything else,
//! in memory and on disk, is left alone.

use super::{BuildReport, BuildState, Compiler};
use crate::{
    document::PageView,
    fs::is_ignored,
    log,
    tracker::Warning,
};
use anyhow::Result;
use std::{collections::BTreeSet, path::PathBuf};

/// What one batch of paths changed.
#[derive(Debug, Default)]
struct Changes {
    items: BTreeSet<String>,
    removed_items: BTreeSet<String>,
    pages: BTreeSet<String>,
    removed_pages: BTreeSet<String>,
    data: bool,
    assets: BTreeSet<String>,
    /// A dynamic page changed; every item permalink may move
    full: bool,
}

impl Changes {
    fn is_empty(&self) -> bool {
        self.items.is_empty()
            && self.removed_items.is_empty()
            && self.pages.is_empty()
            && self.removed_pages.is_empty()
            && !self.data
            && self.assets.is_empty()
    }

    /// Whether a template reading these globals must be re-rendered.
    fn touches(&self, template: &str) -> bool {
        let collections = !self.items.is_empty() || !self.removed_items.is_empty();
        let pages = !self.pages.is_empty() || !self.removed_pages.is_empty();
        (collections && template.contains("collections"))
            || (self.data && template.contains("data"))
            || (pages && (template.contains("pages") || template.contains("children")))
    }
}

impl Compiler {
    /// Process one batch of changed paths.
    ///
    /// After a failed cycle the next batch triggers a full build. The
    /// compiler returns to `Watching` on success.
    pub fn rebuild(&mut self, changed: &[PathBuf]) -> Result<BuildReport> {
        if self.state == BuildState::Failed {
            log!("watch"; "previous build failed, rebuilding everything");
            let report = self.build()?;
            self.watching();
            return Ok(report);
        }

        let result = self.incremental(changed);
        self.state = match result {
            Ok(_) => BuildState::Watching,
            Err(_) => BuildState::Failed,
        };
        result
    }

    fn incremental(&mut self, changed: &[PathBuf]) -> Result<BuildReport> {
        let mut report = BuildReport::default();
        let paths: BTreeSet<String> = changed
            .iter()
            .filter(|path| !is_ignored(path))
            .filter_map(|path| self.ctx.relative_path(path))
            .collect();

        self.state = BuildState::Scanning;
        let changes = self.refresh_all(&paths, &mut report.warnings);
        if changes.full {
            log!("watch"; "dynamic page changed, rebuilding everything");
            return self.full_build();
        }
        if changes.is_empty() {
            return Ok(report);
        }

        self.state = BuildState::Evaluating;
        for path in &changes.pages {
            self.evaluate_page(path)?;
        }
        for path in &changes.items {
            self.evaluate_item(path)?;
        }
        for path in &changes.removed_items {
            self.detach_item(path);
        }

        let origins = changes
            .items
            .iter()
            .chain(&changes.removed_items)
            .chain(&changes.pages)
            .chain(&changes.removed_pages);
        let mut stale_redirects = Vec::new();
        let mut new_redirects = Vec::new();
        for origin in origins {
            let (removed, added) = self.regenerate_redirects(origin);
            stale_redirects.extend(removed);
            new_redirects.extend(added);
        }
        if !changes.pages.is_empty() || !changes.removed_pages.is_empty() {
            self.pages.build_navigation(self.ctx.drafts());
        }

        self.state = BuildState::Routing;
        for path in changes.items.iter().chain(&changes.removed_items) {
            self.router.unregister_source(path);
        }
        for path in changes.pages.iter().chain(&changes.removed_pages).chain(&stale_redirects) {
            self.router.unregister_page_view(path);
        }

        let mut targets = BTreeSet::new();
        for path in &changes.items {
            let page_view = self
                .collections
                .tracker()
                .get(path)
                .and_then(|item| item.page_view())
                .map(|link| link.path.clone());
            if let Some(page_view) = page_view {
                targets.extend(self.route_item(&page_view, path, &mut report.warnings));
            }
        }
        for path in changes.pages.iter().chain(&new_redirects) {
            targets.extend(self.route_page(path, &mut report.warnings));
        }
        targets.extend(
            self.router
                .routes()
                .filter(|route| self.pages.get(&route.page_view).is_some_and(|page| depends_on(page, &changes)))
                .map(|route| route.target.clone()),
        );

        self.state = BuildState::Rendering;
        let targets: Vec<String> = targets.into_iter().collect();
        let rendered = self.render_targets(&targets)?;
        self.commit(rendered, &mut report)?;
        self.prune(&mut report)?;
        self.sync_assets(&changes.assets)?;

        log!("watch"; "{} rendered, {} written, {} removed",
            report.rendered.len(), report.written.len(), report.removed.len());
        Ok(report)
    }

    /// Hand each path to the tracker that owns it.
    fn refresh_all(&mut self, paths: &BTreeSet<String>, warnings: &mut Vec<Warning>) -> Changes {
        let mut changes = Changes::default();
        for path in paths {
            let exists = self.fs.exists(&self.ctx.absolute(path));

            if self.collections.tracker().should_track(path) {
                let tracker = self.collections.tracker_mut();
                if !exists {
                    if tracker.remove(path).is_some() {
                        changes.removed_items.insert(path.clone());
                    }
                } else {
                    match tracker.refresh(&*self.fs, &self.ctx, path) {
                        Ok(()) => {
                            changes.items.insert(path.clone());
                        }
                        Err(err) => warnings.push(Warning::new(path, &err)),
                    }
                }
            } else if self.data.tracker().should_track(path) {
                let tracker = self.data.tracker_mut();
                if !exists {
                    changes.data |= tracker.remove(path).is_some();
                } else {
                    match tracker.refresh(&*self.fs, &self.ctx, path) {
                        Ok(()) => changes.data = true,
                        Err(err) => warnings.push(Warning::new(path, &err)),
                    }
                }
            } else if self.pages.tracker().should_track(path) {
                let was_dynamic = self.pages.tracker().get(path).is_some_and(PageView::is_dynamic);
                let tracker = self.pages.tracker_mut();
                if !exists {
                    if tracker.remove(path).is_some() {
                        changes.removed_pages.insert(path.clone());
                    }
                } else {
                    match tracker.refresh(&*self.fs, &self.ctx, path) {
                        Ok(()) => {
                            changes.pages.insert(path.clone());
                        }
                        Err(err) => warnings.push(Warning::new(path, &err)),
                    }
                }
                let is_dynamic = self.pages.tracker().get(path).is_some_and(PageView::is_dynamic);
                changes.full |= was_dynamic || is_dynamic;
            } else if self.is_asset(path) {
                changes.assets.insert(path.clone());
            }
        }
        changes
    }

    /// Mirror changed asset files into the output.
    fn sync_assets(&self, assets: &BTreeSet<String>) -> Result<()> {
        for path in assets {
            if self.fs.exists(&self.ctx.absolute(path)) {
                self.copy_asset(path)?;
            } else {
                self.fs.remove_file(&self.ctx.output_dir().join(path))?;
            }
        }
        Ok(())
    }
}

fn depends_on(page: &PageView, changes: &Changes) -> bool {
    let document = page.document();
    changes.touches(document.content().unwrap_or_else(|| document.body()))
}

#[cfg(test)]
mod tests {
    use super::super::tests::{POST, compiler};
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const CONFIG: &str = "[site]\nname = \"World\"\n";

    fn snapshot(compiler: &Compiler) -> Vec<(String, Vec<u8>)> {
        compiler
            .router()
            .routes()
            .map(|route| {
                let bytes = compiler.output(&route.target).map(|o| o.bytes.clone()).unwrap_or_default();
                (route.target.clone(), bytes)
            })
            .collect()
    }

    #[test]
    fn test_body_change_rerenders_only_dependents() {
        let (dir, mut compiler) = compiler(
            CONFIG,
            &[
                ("_pages/post.md", POST),
                ("_pages/about.html", "---\ntitle: About\npermalink: /about/\n---\nabout"),
            ],
        );
        compiler.build().unwrap();
        compiler.watching();
        let about_before = compiler.output("about/index.html").unwrap().bytes.clone();
        let about_mtime = fs::metadata(dir.path().join("_site/about/index.html")).unwrap().modified().unwrap();

        let post = dir.path().join("_pages/post.md");
        fs::write(&post, POST.replace("Hello %name", "Goodbye %name")).unwrap();
        let report = compiler.rebuild(&[post]).unwrap();

        assert_eq!(compiler.state(), BuildState::Watching);
        assert!(!report.rendered.contains(&"about/index.html".to_string()));
        assert_eq!(report.written, vec!["p/index.html"]);
        assert!(String::from_utf8_lossy(&compiler.preview("/p/").unwrap().bytes).contains("Goodbye World"));
        assert!(compiler.preview("/old/").is_some());

        assert_eq!(compiler.output("about/index.html").unwrap().bytes, about_before);
        assert_eq!(
            fs::metadata(dir.path().join("_site/about/index.html")).unwrap().modified().unwrap(),
            about_mtime
        );
    }

    #[test]
    fn test_unrelated_routes_stay_identical() {
        let (dir, mut compiler) = compiler(
            CONFIG,
            &[
                ("_pages/post.md", POST),
                ("_pages/a.html", "---\npermalink: /a/\n---\nA"),
                ("_pages/b.html", "---\npermalink: /b/\n---\nB"),
            ],
        );
        compiler.build().unwrap();
        compiler.watching();
        let unrelated = |c: &Compiler| -> Vec<_> {
            snapshot(c).into_iter().filter(|(t, _)| t.starts_with("a/") || t.starts_with("b/")).collect()
        };
        let before = unrelated(&compiler);

        let post = dir.path().join("_pages/post.md");
        fs::write(&post, POST.replace("Hello", "Hi")).unwrap();
        compiler.rebuild(&[post]).unwrap();

        assert_eq!(unrelated(&compiler), before);
    }

    #[test]
    fn test_new_removed_and_broken_items() {
        let (dir, mut compiler) = compiler(
            "[[collections]]\nname = \"posts\"\nfolder = \"_posts\"\n",
            &[
                ("_posts/a.md", "---\ntitle: A\n---\na"),
                ("_pages/blog.html", "---\ncollection: posts\npermalink: /blog/%title/\n---\n{{ this.title }}"),
                (
                    "_pages/index.html",
                    "---\npermalink: /\n---\n{% for p in collections.posts %}{{ p.title }};{% endfor %}",
                ),
                ("_pages/about.html", "---\npermalink: /about/\n---\nabout"),
            ],
        );
        compiler.build().unwrap();
        compiler.watching();

        // Added item: routed and listed on the index
        let b = dir.path().join("_posts/b.md");
        fs::write(&b, "---\ntitle: B\n---\nb").unwrap();
        let report = compiler.rebuild(std::slice::from_ref(&b)).unwrap();
        assert!(compiler.preview("/blog/b/").is_some());
        assert_eq!(String::from_utf8(compiler.preview("/").unwrap().bytes).unwrap(), "A;B;");
        assert!(!report.rendered.contains(&"about/index.html".to_string()));

        // Broken item: warning, previous version kept
        fs::write(&b, "no front matter").unwrap();
        let report = compiler.rebuild(std::slice::from_ref(&b)).unwrap();
        assert_eq!(report.warnings.len(), 1);
        assert!(compiler.preview("/blog/b/").is_some());

        // Removed item: route and output gone
        fs::remove_file(&b).unwrap();
        let report = compiler.rebuild(&[b]).unwrap();
        assert_eq!(report.removed, vec!["blog/b/index.html"]);
        assert!(compiler.preview("/blog/b/").is_none());
        assert!(!dir.path().join("_site/blog/b/index.html").exists());
        assert_eq!(String::from_utf8(compiler.preview("/").unwrap().bytes).unwrap(), "A;");
    }

    #[test]
    fn test_eval_error_fails_cycle_then_recovers() {
        let (dir, mut compiler) = compiler(CONFIG, &[("_pages/post.md", POST)]);
        compiler.build().unwrap();
        compiler.watching();

        let post = dir.path().join("_pages/post.md");
        fs::write(&post, POST.replace("/p/", "/%typo/")).unwrap();
        assert!(compiler.rebuild(std::slice::from_ref(&post)).is_err());
        assert_eq!(compiler.state(), BuildState::Failed);

        fs::write(&post, POST).unwrap();
        compiler.rebuild(&[post]).unwrap();
        assert_eq!(compiler.state(), BuildState::Watching);
        assert!(compiler.preview("/p/").is_some());
    }

    #[test]
    fn test_dynamic_page_change_rebuilds_everything() {
        let (dir, mut compiler) = compiler(
            "[[collections]]\nname = \"posts\"\nfolder = \"_posts\"\n",
            &[
                ("_posts/a.md", "---\ntitle: A\n---\na"),
                ("_pages/blog.html", "---\ncollection: posts\npermalink: /blog/%title/\n---\nx"),
            ],
        );
        compiler.build().unwrap();
        compiler.watching();

        let blog = dir.path().join("_pages/blog.html");
        fs::write(&blog, "---\ncollection: posts\npermalink: /posts/%title/\n---\nx").unwrap();
        let report = compiler.rebuild(&[blog]).unwrap();

        assert!(compiler.preview("/posts/a/").is_some());
        assert!(compiler.preview("/blog/a/").is_none());
        assert_eq!(report.removed, vec!["blog/a/index.html"]);
    }

    #[test]
    fn test_data_change_rerenders_readers() {
        let (dir, mut compiler) = compiler(
            "[build]\ndata = [\"_data\"]\n",
            &[
                ("_data/site.yml", "motto: old\n"),
                ("_pages/index.html", "---\npermalink: /\n---\n{{ data.site.motto }}"),
                ("_pages/about.html", "---\npermalink: /about/\n---\nabout"),
            ],
        );
        compiler.build().unwrap();
        compiler.watching();

        let data = dir.path().join("_data/site.yml");
        fs::write(&data, "motto: new\n").unwrap();
        let report = compiler.rebuild(&[data]).unwrap();

        assert_eq!(report.rendered, vec!["index.html"]);
        assert_eq!(String::from_utf8(compiler.preview("/").unwrap().bytes).unwrap(), "new");
    }
}
