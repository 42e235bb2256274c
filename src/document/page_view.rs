//! Pages: static, dynamic (one output per collection item) and redirects.

use super::{Document, DocumentError, EvalError, FrontMatter, permalink::Links};
use crate::jail::{Accessor, JailError, Jailable, JailedView, Resolver};
use serde::Serialize;
use serde_json::{Value as Json, json};
use serde_yaml::Mapping;

/// Key prefix of in-memory redirect pages.
pub const REDIRECT_PREFIX: &str = "@redirect:";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageViewKind {
    Static,
    /// Rendered once per item of `collection`
    Dynamic { collection: String },
    /// Synthesized from `redirect_from` of the document at `origin`
    Redirect { origin: String, target: String },
}

/// Safe summary of a PageView, held by items and parent pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageViewLink {
    pub path: String,
    pub title: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PageView {
    document: Document,
    kind: PageViewKind,
    links: Links,
    children: Vec<PageViewLink>,
    /// Paths of attached ContentItems (dynamic only)
    content_items: Vec<String>,
}

impl PageView {
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
        Accessor::FrontMatter,
        Accessor::Children,
        Accessor::ContentItems,
        Accessor::Draft,
    ];

    pub const REDIRECTS: &[(Accessor, Accessor)] = &[(Accessor::Children, Accessor::JailedChildren)];

    pub fn parse(relative_path: &str, raw: &str) -> Result<Self, DocumentError> {
        Document::parse(relative_path, raw).map(Self::from_document)
    }

    pub fn from_document(document: Document) -> Self {
        let kind = match document.front_matter().get_str("collection") {
            Some(collection) => PageViewKind::Dynamic {
                collection: collection.to_string(),
            },
            None => PageViewKind::Static,
        };

        Self {
            document,
            kind,
            links: Links::default(),
            children: Vec::new(),
            content_items: Vec::new(),
        }
    }

    /// In-memory page at `from` that sends visitors to `to`.
    pub fn redirect(origin: &str, from: &str, to: &str, template: &str) -> Self {
        let mut front_matter = FrontMatter::default();
        front_matter.insert("permalink", from);
        front_matter.insert("redirect", to);
        front_matter.insert("menu", false);

        let document = Document::from_parts(
            format!("{REDIRECT_PREFIX}{from}"),
            front_matter,
            template.to_string(),
        );

        Self {
            document,
            kind: PageViewKind::Redirect {
                origin: origin.to_string(),
                target: to.to_string(),
            },
            links: Links::default(),
            children: Vec::new(),
            content_items: Vec::new(),
        }
    }

    pub const fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub const fn kind(&self) -> &PageViewKind {
        &self.kind
    }

    pub const fn is_dynamic(&self) -> bool {
        matches!(self.kind, PageViewKind::Dynamic { .. })
    }

    pub fn collection(&self) -> Option<&str> {
        match &self.kind {
            PageViewKind::Dynamic { collection } => Some(collection),
            _ => None,
        }
    }

    /// Source document of a redirect page.
    pub fn redirect_origin(&self) -> Option<&str> {
        match &self.kind {
            PageViewKind::Redirect { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Raw permalink pattern of a dynamic page, e.g. `/blog/%title/`.
    pub fn permalink_pattern(&self) -> Option<&str> {
        self.document.front_matter().get_str("permalink")
    }

    /// Dynamic pages keep their permalink pattern raw; it is evaluated per item.
    pub fn evaluate(&mut self, globals: &Mapping) -> Result<(), EvalError> {
        if self.is_dynamic() {
            self.document.evaluate_keeping(globals, &["permalink"])?;
            self.links = Links::default();
        } else {
            self.document.evaluate(globals)?;
            self.links = Links::of(&self.document);
        }
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

    /// Excluded from navigation with `menu: false`.
    pub fn in_menu(&self) -> bool {
        !matches!(self.document.front_matter().get("menu"), Some(serde_yaml::Value::Bool(false)))
    }

    pub fn children(&self) -> &[PageViewLink] {
        &self.children
    }

    pub fn set_children(&mut self, children: Vec<PageViewLink>) {
        self.children = children;
    }

    pub fn content_items(&self) -> &[String] {
        &self.content_items
    }

    pub fn attach_item(&mut self, path: &str) {
        if !self.content_items.iter().any(|p| p == path) {
            self.content_items.push(path.to_string());
        }
    }

    pub fn detach_item(&mut self, path: &str) {
        self.content_items.retain(|p| p != path);
    }

    pub fn link(&self) -> PageViewLink {
        PageViewLink {
            path: self.document.relative_path().to_string(),
            title: self.document.title().map(str::to_string),
            url: self.url(),
        }
    }

    pub fn jail(&self) -> Result<JailedView<'_, Self>, JailError> {
        JailedView::new(self, Self::WHITELIST, Self::REDIRECTS)
    }
}

impl Jailable for PageView {
    fn document(&self) -> &Document {
        &self.document
    }

    fn resolver(accessor: Accessor) -> Option<Resolver<Self>> {
        let resolver: Resolver<Self> = match accessor {
            Accessor::Title => |p| json!(p.document.title()),
            Accessor::Permalink => |p| json!(p.permalink()),
            Accessor::Url => |p| json!(p.url()),
            Accessor::Redirects => |p| json!(p.redirects()),
            Accessor::TargetFile => |p| json!(p.target_file()),
            Accessor::Name => |p| json!(p.document.index_name()),
            Accessor::RelativeFilePath => |p| json!(p.document.relative_path()),
            Accessor::Basename => |p| json!(p.document.basename()),
            Accessor::Extension => |p| json!(p.document.extension()),
            Accessor::FrontMatter => |p| p.document.front_matter().to_json(),
            Accessor::Content => |p| json!(p.document.content()),
            Accessor::Body => |p| json!(p.document.body()),
            Accessor::JailedChildren => |p| json!(p.children),
            Accessor::ContentItems => |p| json!(p.content_items),
            Accessor::Draft => |p| json!(p.document.is_draft()),
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
            map.insert("children".into(), json!(self.children));
        }
        json
    }
}
