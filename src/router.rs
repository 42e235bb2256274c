//! Request path → PageView routing for live preview.
//!
//! Routes are keyed by target file, so every request is normalized the same
//! way a permalink is turned into a target:
//!
//! ```text
//! /p/          ─▶ p/index.html
//! /p/index.html─▶ p/index.html
//! /feed.xml?t=1─▶ feed.xml
//! /            ─▶ index.html
//! ```
//!
//! The table is rebuilt after a full build and patched after a rebuild. No
//! disk I/O happens here.

use std::collections::BTreeMap;

/// What answers one target file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub target: String,
    /// PageView that renders the target
    pub page_view: String,
    /// Item rendered through a dynamic PageView
    pub item: Option<String>,
}

impl Route {
    pub fn page(target: String, page_view: &str) -> Self {
        Self {
            target,
            page_view: page_view.to_string(),
            item: None,
        }
    }

    pub fn item(target: String, page_view: &str, item: &str) -> Self {
        Self {
            target,
            page_view: page_view.to_string(),
            item: Some(item.to_string()),
        }
    }

    /// The document whose change invalidates this route.
    pub fn source(&self) -> &str {
        self.item.as_deref().unwrap_or(&self.page_view)
    }
}

#[derive(Debug, Default)]
pub struct Router {
    routes: BTreeMap<String, Route>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route, returning the one it replaced on a duplicate target.
    pub fn register(&mut self, route: Route) -> Option<Route> {
        self.routes.insert(route.target.clone(), route)
    }

    pub fn resolve(&self, request: &str) -> Option<&Route> {
        self.routes.get(&normalize(request))
    }

    pub fn get(&self, target: &str) -> Option<&Route> {
        self.routes.get(target)
    }

    /// Drop every route whose source is `path`, returning them.
    pub fn unregister_source(&mut self, path: &str) -> Vec<Route> {
        let targets: Vec<String> = self
            .routes
            .values()
            .filter(|route| route.source() == path)
            .map(|route| route.target.clone())
            .collect();
        targets
            .iter()
            .filter_map(|target| self.routes.remove(target))
            .collect()
    }

    /// Drop every route rendered by the PageView at `path`, items included.
    pub fn unregister_page_view(&mut self, path: &str) -> Vec<Route> {
        let targets: Vec<String> = self
            .routes
            .values()
            .filter(|route| route.page_view == path)
            .map(|route| route.target.clone())
            .collect();
        targets
            .iter()
            .filter_map(|target| self.routes.remove(target))
            .collect()
    }

    pub fn routes(&self) -> impl Iterator<Item = &Route> {
        self.routes.values()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn clear(&mut self) {
        self.routes.clear();
    }
}

/// Request path → target file key.
pub fn normalize(request: &str) -> String {
    let path = request.split(['?', '#']).next().unwrap_or_default();
    let path = urlencoding::decode(path).map_or_else(|_| path.to_string(), |p| p.into_owned());

    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        "index.html".to_string()
    } else if trimmed.ends_with('/') {
        format!("{trimmed}index.html")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("/"), "index.html");
        assert_eq!(normalize(""), "index.html");
        assert_eq!(normalize("/p/"), "p/index.html");
        assert_eq!(normalize("/p/index.html"), "p/index.html");
        assert_eq!(normalize("/feed.xml?t=123"), "feed.xml");
        assert_eq!(normalize("/caf%C3%A9/"), "café/index.html");
    }

    #[test]
    fn test_trailing_slash_equivalent_to_index() {
        let mut router = Router::new();
        router.register(Route::page("p/index.html".into(), "_pages/post.md"));

        assert_eq!(router.resolve("/p/").map(Route::source), Some("_pages/post.md"));
        assert_eq!(router.resolve("/p/index.html").map(Route::source), Some("_pages/post.md"));
        assert!(router.resolve("/p").is_none());
        assert!(router.resolve("/q/").is_none());
    }

    #[test]
    fn test_duplicate_target_returns_previous() {
        let mut router = Router::new();
        assert!(router.register(Route::page("a.html".into(), "_pages/a.html")).is_none());
        let previous = router.register(Route::page("a.html".into(), "_pages/other.html"));
        assert_eq!(previous.map(|r| r.page_view), Some("_pages/a.html".to_string()));
    }

    #[test]
    fn test_unregister_by_source_and_page_view() {
        let mut router = Router::new();
        router.register(Route::item("blog/a/index.html".into(), "_pages/blog.html", "_posts/a.md"));
        router.register(Route::item("blog/b/index.html".into(), "_pages/blog.html", "_posts/b.md"));
        router.register(Route::page("about/index.html".into(), "_pages/about.html"));

        assert_eq!(router.unregister_source("_posts/a.md").len(), 1);
        assert_eq!(router.len(), 2);
        assert_eq!(router.unregister_page_view("_pages/blog.html").len(), 1);
        assert_eq!(router.routes().map(|r| r.target.as_str()).collect::<Vec<_>>(), vec!["about/index.html"]);
    }
}
