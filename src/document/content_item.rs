//! Collection entries.

use super::{Document, DocumentError, EvalError, PageViewLink, permalink::Links};
use crate::jail::{Accessor, JailError, Jailable, JailedView, Resolver};
use serde_json::{Value as Json, json};
use serde_yaml::Mapping;

/// A document belonging to a collection (e.g. a blog post).
#[derive(Debug, Clone)]
pub struct ContentItem {
    document: Document,
    links: Links,
    /// Dynamic PageView this item is rendered through
    page_view: Option<PageViewLink>,
}

impl ContentItem {
    pub const WHITELIST: &[Accessor] = &[
        Accessor::Title,
        Accessor::Permalink,
        Accessor::Url,
        Accessor::Redirects,
        Accessor::TargetFile,
        Accessor::Name,
        Accessor::RelativeFilePath,
        Accessor::Basename,
        Accessor::Extension,
        Accessor::Namespace,
        Accessor::FrontMatter,
        Accessor::Content,
        Accessor::Draft,
    ];

    pub const REDIRECTS: &[(Accessor, Accessor)] = &[
        (Accessor::PageView, Accessor::JailedPageView),
        (Accessor::Collection, Accessor::Namespace),
    ];

    pub fn parse(relative_path: &str, raw: &str) -> Result<Self, DocumentError> {
        Document::parse(relative_path, raw).map(Self::from_document)
    }

    pub fn from_document(document: Document) -> Self {
        Self {
            document,
            links: Links::default(),
            page_view: None,
        }
    }

    pub const fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    /// Use a dynamic PageView's permalink pattern unless the item sets its own.
    pub fn apply_permalink_pattern(&mut self, pattern: &str) {
        self.document.insert_default("permalink", pattern);
    }

    pub fn evaluate(&mut self, globals: &Mapping) -> Result<(), EvalError> {
        self.document.evaluate(globals)?;
        self.links = Links::of(&self.document);
        Ok(())
    }

    pub fn permalink(&self) -> Option<&str> {
        self.links.permalink.as_deref()
    }

    pub fn url(&self) -> Option<String> {
        self.links.url()
    }

    pub fn redirects(&self) -> &[String] {
        &self.links.redirects
    }

    pub fn target_file(&self) -> String {
        self.links.target_file(self.document.basename())
    }

    pub const fn page_view(&self) -> Option<&PageViewLink> {
        self.page_view.as_ref()
    }

    pub fn link_page_view(&mut self, link: Option<PageViewLink>) {
        self.page_view = link;
    }

    pub fn jail(&self) -> Result<JailedView<'_, Self>, JailError> {
        JailedView::new(self, Self::WHITELIST, Self::REDIRECTS)
    }
}

impl Jailable for ContentItem {
    fn document(&self) -> &Document {
        &self.document
    }

    fn resolver(accessor: Accessor) -> Option<Resolver<Self>> {
        let resolver: Resolver<Self> = match accessor {
            Accessor::Title => |i| json!(i.document.title()),
            Accessor::Permalink => |i| json!(i.permalink()),
            Accessor::Url => |i| json!(i.url()),
            Accessor::Redirects => |i| json!(i.redirects()),
            Accessor::TargetFile => |i| json!(i.target_file()),
            Accessor::Name => |i| json!(i.document.index_name()),
            Accessor::RelativeFilePath => |i| json!(i.document.relative_path()),
            Accessor::Basename => |i| json!(i.document.basename()),
            Accessor::Extension => |i| json!(i.document.extension()),
            Accessor::Namespace => |i| json!(i.document.namespace()),
            Accessor::FrontMatter => |i| i.document.front_matter().to_json(),
            Accessor::Content => |i| json!(i.document.content()),
            Accessor::Body => |i| json!(i.document.body()),
            Accessor::JailedPageView => |i| json!(i.page_view),
            Accessor::Draft => |i| json!(i.document.is_draft()),
            _ => return None,
        };
        Some(resolver)
    }

    fn offset_get(&self, key: &str) -> Option<Json> {
        self.document.front_matter().to_json().get(key).cloned()
    }

    fn keys(&self) -> Vec<String> {
        self.document
            .front_matter()
            .as_mapping()
            .keys()
            .filter_map(|k| k.as_str().map(str::to_string))
            .collect()
    }

    fn to_json(&self) -> Json {
        let mut json = self.document.front_matter().to_json();
        if let Json::Object(map) = &mut json {
            map.insert("permalink".into(), json!(self.permalink()));
            map.insert("url".into(), json!(self.url()));
            map.insert("content".into(), json!(self.document.content()));
            map.insert("namespace".into(), json!(self.document.namespace()));
        }
        json
    }
}
