//! Capability-restricted views over documents.
//!
//! A [`JailedView`] is the only object surface templates can reach. It is
//! built from the wrapped object, a whitelist of accessors and a redirect
//! table, and resolves both into a fixed dispatch table at construction:
//!
//! ```text
//!   template call          dispatch table              internal resolver
//!   ─────────────          ──────────────              ─────────────────
//!   getTitle       ──▶  Title       ─────────────────▶  title()
//!   page_view      ──▶  PageView    ── redirected ──▶  jailed_page_view()
//!   getBody        ──▶  (absent)    ──▶ CapabilityDenied
//! ```
//!
//! Names follow the `X` → `getX` convention, case-normalized, so `title`,
//! `Title` and `getTitle` are the same call. Indexed reads pass through to
//! the object; indexed writes always fail.

use crate::document::Document;
use rustc_hash::FxHashMap;
use serde_json::Value as Json;
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, PartialEq, Eq)]
pub enum JailError {
    #[error("`{name}` is not accessible on `{path}`")]
    CapabilityDenied { name: String, path: String },

    #[error("`{path}` is read-only; cannot assign `{key}`")]
    ReadOnlyViolation { key: String, path: String },

    #[error("`{path}` cannot be jailed before its front matter is evaluated")]
    Unevaluated { path: String },
}

// ============================================================================
// Accessors
// ============================================================================

/// Every operation a jailed object may expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Accessor {
    Title,
    Permalink,
    Url,
    Redirects,
    TargetFile,
    Name,
    RelativeFilePath,
    Basename,
    Extension,
    Namespace,
    Collection,
    FrontMatter,
    Content,
    Body,
    PageView,
    JailedPageView,
    Children,
    JailedChildren,
    ContentItems,
    Data,
    Draft,
}

impl Accessor {
    const ALL: [Accessor; 21] = [
        Self::Title,
        Self::Permalink,
        Self::Url,
        Self::Redirects,
        Self::TargetFile,
        Self::Name,
        Self::RelativeFilePath,
        Self::Basename,
        Self::Extension,
        Self::Namespace,
        Self::Collection,
        Self::FrontMatter,
        Self::Content,
        Self::Body,
        Self::PageView,
        Self::JailedPageView,
        Self::Children,
        Self::JailedChildren,
        Self::ContentItems,
        Self::Data,
        Self::Draft,
    ];

    pub const fn method_name(self) -> &'static str {
        match self {
            Self::Title => "getTitle",
            Self::Permalink => "getPermalink",
            Self::Url => "getUrl",
            Self::Redirects => "getRedirects",
            Self::TargetFile => "getTargetFile",
            Self::Name => "getName",
            Self::RelativeFilePath => "getRelativeFilePath",
            Self::Basename => "getBasename",
            Self::Extension => "getExtension",
            Self::Namespace => "getNamespace",
            Self::Collection => "getCollection",
            Self::FrontMatter => "getFrontMatter",
            Self::Content => "getContent",
            Self::Body => "getBody",
            Self::PageView => "getPageView",
            Self::JailedPageView => "getJailedPageView",
            Self::Children => "getChildren",
            Self::JailedChildren => "getJailedChildren",
            Self::ContentItems => "getContentItems",
            Self::Data => "getData",
            Self::Draft => "getDraft",
        }
    }

    /// Parse an external call name: `getTargetFile`, `targetFile` and
    /// `target_file` all name [`Accessor::TargetFile`].
    pub fn from_call(name: &str) -> Option<Self> {
        let bare = match name.strip_prefix("get") {
            Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase() || c == '_') => rest,
            _ => name,
        };
        let wanted: String = bare.chars().filter(|c| *c != '_').collect();

        Self::ALL
            .into_iter()
            .find(|a| a.method_name()[3..].eq_ignore_ascii_case(&wanted))
    }
}

// ============================================================================
// Jailed View
// ============================================================================

pub type Resolver<T> = fn(&T) -> Json;

/// An object that can be wrapped in a [`JailedView`].
pub trait Jailable: Sized {
    fn document(&self) -> &Document;

    /// Internal implementation of `accessor`, if this type has one.
    fn resolver(accessor: Accessor) -> Option<Resolver<Self>>;

    /// Array-style read access.
    fn offset_get(&self, key: &str) -> Option<Json>;

    fn keys(&self) -> Vec<String>;

    fn to_json(&self) -> Json;
}

pub struct JailedView<'a, T: Jailable> {
    object: &'a T,
    calls: FxHashMap<Accessor, Resolver<T>>,
}

impl<'a, T: Jailable> JailedView<'a, T> {
    /// Fails on a document whose front matter was never evaluated, so
    /// templates cannot observe raw `%variable` placeholders.
    pub fn new(
        object: &'a T,
        whitelist: &[Accessor],
        redirects: &[(Accessor, Accessor)],
    ) -> Result<Self, JailError> {
        let document = object.document();
        if !document.is_evaluated() {
            return Err(JailError::Unevaluated {
                path: document.relative_path().to_string(),
            });
        }

        let mut calls = FxHashMap::default();
        for &accessor in whitelist {
            if let Some(resolver) = T::resolver(accessor) {
                calls.insert(accessor, resolver);
            }
        }
        // Redirects win over an identically-named whitelisted accessor
        for &(external, internal) in redirects {
            if let Some(resolver) = T::resolver(internal) {
                calls.insert(external, resolver);
            }
        }

        Ok(Self { object, calls })
    }

    fn path(&self) -> &str {
        self.object.document().relative_path()
    }

    pub fn get(&self, accessor: Accessor) -> Result<Json, JailError> {
        self.calls
            .get(&accessor)
            .map(|resolve| resolve(self.object))
            .ok_or_else(|| self.denied(accessor.method_name()))
    }

    pub fn call(&self, name: &str) -> Result<Json, JailError> {
        match Accessor::from_call(name) {
            Some(accessor) => self.get(accessor).map_err(|_| self.denied(name)),
            None => Err(self.denied(name)),
        }
    }

    pub fn offset_get(&self, key: &str) -> Option<Json> {
        self.object.offset_get(key)
    }

    pub fn offset_set(&self, key: &str, _value: Json) -> Result<(), JailError> {
        Err(self.read_only(key))
    }

    pub fn offset_unset(&self, key: &str) -> Result<(), JailError> {
        Err(self.read_only(key))
    }

    pub fn keys(&self) -> Vec<String> {
        self.object.keys()
    }

    pub fn to_json(&self) -> Json {
        self.object.to_json()
    }

    /// Result of every call in the dispatch table.
    pub fn exposed(&self) -> Vec<(Accessor, Json)> {
        self.calls
            .iter()
            .map(|(&accessor, resolve)| (accessor, resolve(self.object)))
            .collect()
    }

    fn denied(&self, name: &str) -> JailError {
        JailError::CapabilityDenied {
            name: name.to_string(),
            path: self.path().to_string(),
        }
    }

    fn read_only(&self, key: &str) -> JailError {
        JailError::ReadOnlyViolation {
            key: key.to_string(),
            path: self.path().to_string(),
        }
    }
}

/// Type-erased jailed object, as stored in template contexts.
pub trait JailedObject {
    fn path(&self) -> &str;
    fn call(&self, name: &str) -> Result<Json, JailError>;
    fn offset_get(&self, key: &str) -> Option<Json>;
    fn keys(&self) -> Vec<String>;
    fn exposed(&self) -> Vec<(Accessor, Json)>;
    fn to_json(&self) -> Json;
}

impl<T: Jailable> JailedObject for JailedView<'_, T> {
    fn path(&self) -> &str {
        JailedView::path(self)
    }

    fn call(&self, name: &str) -> Result<Json, JailError> {
        JailedView::call(self, name)
    }

    fn offset_get(&self, key: &str) -> Option<Json> {
        JailedView::offset_get(self, key)
    }

    fn keys(&self) -> Vec<String> {
        JailedView::keys(self)
    }

    fn exposed(&self) -> Vec<(Accessor, Json)> {
        JailedView::exposed(self)
    }

    fn to_json(&self) -> Json {
        JailedView::to_json(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{ContentItem, PageView};
    use serde_json::json;

    fn item(raw: &str) -> ContentItem {
        let mut item = ContentItem::parse("_posts/hello.md", raw).unwrap();
        item.evaluate(&Default::default()).unwrap();
        item
    }

    #[test]
    fn test_accessor_naming_convention() {
        assert_eq!(Accessor::from_call("getTitle"), Some(Accessor::Title));
        assert_eq!(Accessor::from_call("title"), Some(Accessor::Title));
        assert_eq!(Accessor::from_call("Title"), Some(Accessor::Title));
        assert_eq!(Accessor::from_call("target_file"), Some(Accessor::TargetFile));
        assert_eq!(Accessor::from_call("getTargetFile"), Some(Accessor::TargetFile));
        assert_eq!(Accessor::from_call("unlink"), None);
        for accessor in Accessor::ALL {
            assert_eq!(Accessor::from_call(accessor.method_name()), Some(accessor));
        }
    }

    #[test]
    fn test_whitelisted_call_succeeds_and_others_are_denied() {
        let item = item("---\ntitle: Hello\n---\nsecret body");
        let view = JailedView::new(&item, &[Accessor::Title], &[]).unwrap();

        assert_eq!(view.call("getTitle").unwrap(), json!("Hello"));
        assert_eq!(
            view.call("getBody"),
            Err(JailError::CapabilityDenied {
                name: "getBody".into(),
                path: "_posts/hello.md".into()
            })
        );
        assert!(matches!(view.call("rm_rf"), Err(JailError::CapabilityDenied { .. })));
    }

    #[test]
    fn test_writes_are_read_only() {
        let item = item("---\ntitle: Hello\n---\nbody");
        let view = JailedView::new(&item, &[Accessor::Title], &[]).unwrap();

        assert!(matches!(
            view.offset_set("title", json!("Bye")),
            Err(JailError::ReadOnlyViolation { .. })
        ));
        assert!(matches!(view.offset_unset("title"), Err(JailError::ReadOnlyViolation { .. })));
        assert_eq!(item.document().title(), Some("Hello"));
    }

    #[test]
    fn test_indexed_reads_delegate() {
        let item = item("---\ntitle: Hello\ntags: [a, b]\n---\nbody");
        let view = item.jail().unwrap();

        assert_eq!(view.offset_get("tags"), Some(json!(["a", "b"])));
        assert_eq!(view.offset_get("missing"), None);
        assert!(view.keys().contains(&"title".to_string()));
        assert_eq!(view.to_json()["title"], "Hello");
    }

    #[test]
    fn test_redirect_table_dispatches_to_safe_accessor() {
        let mut item = item("---\ntitle: Hello\n---\nbody");
        item.document_mut().set_namespace(Some("posts".into()));
        let view = item.jail().unwrap();

        // `collection` is answered by the namespace, never the live collection
        assert_eq!(view.call("getCollection").unwrap(), json!("posts"));
        // the content item never exposes its raw body
        assert!(view.call("body").is_err());
    }

    #[test]
    fn test_page_view_children_redirect() {
        let mut page = PageView::parse("_pages/gallery.html", "---\npermalink: /gallery/\n---\n<ul></ul>").unwrap();
        page.evaluate(&Default::default()).unwrap();
        let view = page.jail().unwrap();

        assert_eq!(view.call("children").unwrap(), json!([]));
        assert_eq!(view.call("permalink").unwrap(), json!("/gallery/"));
        assert!(view.call("content").is_err());
    }

    #[test]
    fn test_unevaluated_document_cannot_be_jailed() {
        let item = ContentItem::parse("_posts/raw.md", "---\ntitle: Hello %name\n---\nbody").unwrap();

        assert_eq!(
            item.jail().err(),
            Some(JailError::Unevaluated {
                path: "_posts/raw.md".into()
            })
        );
    }

    #[test]
    fn test_exposed_covers_dispatch_table_only() {
        let item = item("---\ntitle: Hello\n---\nbody");
        let view = JailedView::new(&item, &[Accessor::Title, Accessor::Url], &[]).unwrap();

        let mut exposed: Vec<_> = view.exposed().into_iter().map(|(a, _)| a.method_name()).collect();
        exposed.sort_unstable();
        assert_eq!(exposed, vec!["getTitle", "getUrl"]);
    }
}
