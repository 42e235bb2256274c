//! In-memory source documents.
//!
//! # Source format
//!
//! ```text
//! ---                      ◀── opening delimiter (first line)
//! title: Hello
//! permalink: /blog/%title/ ◀── YAML front matter
//! ---                      ◀── closing delimiter
//! Body text, handed to a   ◀── body (must not be blank)
//! markup engine later.
//! ```
//!
//! # Lifecycle
//!
//! ```text
//! parse ──▶ evaluate (front matter + body vars) ──▶ parse_body (markup) ──▶ jail
//! ```
//!
//! A document is evaluated at most once; repeated calls are no-ops.
//! Typed wrappers ([`ContentItem`], [`PageView`], [`DataItem`]) add their
//! own state on top of a [`Document`].

mod content_item;
mod data_item;
mod error;
mod evaluator;
mod page_view;
pub mod permalink;

pub use content_item::ContentItem;
pub use data_item::DataItem;
pub use error::{DocumentError, EvalError};
pub use evaluator::FrontMatterEvaluator;
pub use page_view::{PageView, PageViewKind, PageViewLink, REDIRECT_PREFIX};

use crate::markup::MarkupDispatcher;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_yaml::{Mapping, Value};
use std::path::Path;

const DELIMITER: &str = "---";

// ============================================================================
// Front Matter
// ============================================================================

/// Ordered front matter mapping with typed accessors.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrontMatter(Mapping);

impl FrontMatter {
    pub fn parse(path: &str, yaml: &str) -> Result<Self, DocumentError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        match serde_yaml::from_str(yaml) {
            Ok(Value::Mapping(map)) => Ok(Self(map)),
            Ok(Value::Null) => Ok(Self::default()),
            Ok(_) => Err(DocumentError::front_matter(path, "expected a mapping")),
            Err(err) => Err(DocumentError::front_matter(path, err)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: &str, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(Value::String(key.to_string()), value.into())
    }

    /// A value that may be given as one string or a list of strings.
    pub fn string_list(&self, key: &str) -> Vec<String> {
        match self.get(key) {
            Some(Value::String(s)) => vec![s.clone()],
            Some(Value::Sequence(seq)) => seq
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect(),
            _ => Vec::new(),
        }
    }

    pub const fn as_mapping(&self) -> &Mapping {
        &self.0
    }

    pub fn to_json(&self) -> serde_json::Value {
        yaml_to_json(&Value::Mapping(self.0.clone()))
    }

    /// Add `year`, `month` and `day` derived from `date`, keeping explicit keys.
    fn insert_date_parts(&mut self) {
        let Some(date) = self.get("date").and_then(parse_date) else {
            return;
        };
        for (key, format) in [("year", "%Y"), ("month", "%m"), ("day", "%d")] {
            if !self.contains_key(key) {
                self.insert(key, date.format(format).to_string());
            }
        }
    }
}

fn parse_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|dt| dt.date())
                })
                .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
        }
        Value::Number(n) => n
            .as_i64()
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .map(|dt| dt.date_naive()),
        _ => None,
    }
}

/// Convert YAML to JSON, stringifying non-string keys.
pub fn yaml_to_json(value: &Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Json::from(i)
            } else if let Some(u) = n.as_u64() {
                Json::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map_or(Json::Null, Json::Number)
            }
        }
        Value::String(s) => Json::String(s.clone()),
        Value::Sequence(seq) => Json::Array(seq.iter().map(yaml_to_json).collect()),
        Value::Mapping(map) => Json::Object(
            map.iter()
                .map(|(k, v)| (yaml_key(k), yaml_to_json(v)))
                .collect(),
        ),
        Value::Tagged(tagged) => yaml_to_json(&tagged.value),
    }
}

fn yaml_key(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

// ============================================================================
// Document
// ============================================================================

#[derive(Debug, Clone)]
pub struct Document {
    relative_path: String,
    namespace: Option<String>,
    extension: String,
    front_matter: FrontMatter,
    body: String,
    content: Option<String>,
    evaluated: bool,
}

impl Document {
    /// Split `raw` into front matter and body.
    pub fn parse(relative_path: impl Into<String>, raw: &str) -> Result<Self, DocumentError> {
        let path = relative_path.into();
        let raw = raw.strip_prefix('\u{feff}').unwrap_or(raw);

        let mut lines = raw.split_inclusive('\n');
        let opening = lines.next().unwrap_or_default();
        if opening.trim_end() != DELIMITER {
            return Err(DocumentError::invalid(&path, "missing opening `---` delimiter"));
        }

        let mut consumed = opening.len();
        let mut yaml = String::new();
        let mut closed = false;
        for line in lines {
            consumed += line.len();
            if line.trim_end() == DELIMITER {
                closed = true;
                break;
            }
            yaml.push_str(line);
        }
        if !closed {
            return Err(DocumentError::invalid(&path, "missing closing `---` delimiter"));
        }

        let body = raw[consumed..].trim();
        if body.is_empty() {
            return Err(DocumentError::invalid(&path, "body is empty"));
        }

        let mut front_matter = FrontMatter::parse(&path, &yaml)?;
        front_matter.insert_date_parts();
        Ok(Self::from_parts(path, front_matter, body.to_string()))
    }

    /// Build a document directly from memory, without a source file.
    pub fn from_parts(relative_path: impl Into<String>, front_matter: FrontMatter, body: String) -> Self {
        let relative_path = relative_path.into();
        let extension = Path::new(&relative_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        Self {
            relative_path,
            namespace: None,
            extension,
            front_matter,
            body,
            content: None,
            evaluated: false,
        }
    }

    /// A document whose whole file is payload: nothing to evaluate.
    pub(crate) fn from_data(relative_path: impl Into<String>, raw: String) -> Self {
        let mut doc = Self::from_parts(relative_path, FrontMatter::default(), raw);
        doc.evaluated = true;
        doc
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    /// `a/b/post.md` → `post.md`
    pub fn basename(&self) -> &str {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
    }

    /// `a/b/post.md` → `post`
    pub fn index_name(&self) -> &str {
        let basename = self.basename();
        match basename.rfind('.') {
            Some(dot) if dot > 0 => &basename[..dot],
            _ => basename,
        }
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn set_namespace(&mut self, namespace: Option<String>) {
        self.namespace = namespace;
    }

    pub const fn front_matter(&self) -> &FrontMatter {
        &self.front_matter
    }

    /// Add a front matter key before evaluation, unless already set.
    pub fn insert_default(&mut self, key: &str, value: &str) {
        if !self.evaluated && !self.front_matter.contains_key(key) {
            self.front_matter.insert(key, value);
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.front_matter.get_str("title")
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Markup output, or the body when no engine claimed the extension.
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub const fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub const fn is_parsed(&self) -> bool {
        self.content.is_some()
    }

    pub fn is_draft(&self) -> bool {
        self.front_matter.get_bool("draft")
    }

    /// Resolve `%name` references in front matter and body.
    pub fn evaluate(&mut self, globals: &Mapping) -> Result<(), EvalError> {
        self.evaluate_keeping(globals, &[])
    }

    /// Like [`Document::evaluate`], leaving the listed top-level keys verbatim.
    pub fn evaluate_keeping(&mut self, globals: &Mapping, raw_keys: &[&str]) -> Result<(), EvalError> {
        if self.evaluated {
            return Ok(());
        }

        let mut evaluator =
            FrontMatterEvaluator::new(&self.relative_path, self.front_matter.as_mapping(), globals)
                .keep_raw(raw_keys);
        let front_matter = evaluator.evaluate()?;
        let body = evaluator.substitute_lenient(&self.body);

        self.front_matter = FrontMatter(front_matter);
        self.body = body;
        self.evaluated = true;
        Ok(())
    }

    /// Run the body through the markup engine for its extension.
    pub fn parse_body(&mut self, markup: &MarkupDispatcher) {
        if self.content.is_some() {
            return;
        }
        let content = match markup.engine_for(&self.extension) {
            Some(engine) => engine.parse(&self.body),
            None => self.body.clone(),
        };
        self.content = Some(content);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_document() {
        let doc = Document::parse("_posts/hello.md", "---\ntitle: Hello\n---\n\nBody text\n").unwrap();

        assert_eq!(doc.relative_path(), "_posts/hello.md");
        assert_eq!(doc.basename(), "hello.md");
        assert_eq!(doc.index_name(), "hello");
        assert_eq!(doc.extension(), "md");
        assert_eq!(doc.title(), Some("Hello"));
        assert_eq!(doc.body(), "Body text");
        assert!(!doc.is_evaluated());
        assert!(!doc.is_parsed());
    }

    #[test]
    fn test_parse_body_containing_delimiter() {
        let doc = Document::parse("a.md", "---\n---\nabove\n---\nbelow").unwrap();
        assert_eq!(doc.body(), "above\n---\nbelow");
        assert!(doc.front_matter().as_mapping().is_empty());
    }

    #[test]
    fn test_parse_crlf() {
        let doc = Document::parse("a.md", "---\r\ntitle: A\r\n---\r\nbody\r\n").unwrap();
        assert_eq!(doc.title(), Some("A"));
        assert_eq!(doc.body(), "body");
    }

    #[test]
    fn test_missing_delimiters() {
        let err = Document::parse("a.md", "title: A\n---\nbody").unwrap_err();
        assert!(matches!(err, DocumentError::InvalidSyntax { .. }));

        let err = Document::parse("a.md", "---\ntitle: A\nbody").unwrap_err();
        assert!(matches!(err, DocumentError::InvalidSyntax { .. }));
    }

    #[test]
    fn test_empty_body() {
        let err = Document::parse("a.md", "---\ntitle: A\n---\n  \n\n").unwrap_err();
        assert!(format!("{err}").contains("body is empty"));
    }

    #[test]
    fn test_bad_front_matter() {
        let err = Document::parse("a.md", "---\n- just\n- a list\n---\nbody").unwrap_err();
        assert!(matches!(err, DocumentError::FrontMatter { .. }));
    }

    #[test]
    fn test_date_parts() {
        let doc = Document::parse("a.md", "---\ndate: 2024-03-07\nday: '99'\n---\nbody").unwrap();
        let fm = doc.front_matter();
        assert_eq!(fm.get_str("year"), Some("2024"));
        assert_eq!(fm.get_str("month"), Some("03"));
        assert_eq!(fm.get_str("day"), Some("99"));

        let doc = Document::parse("a.md", "---\ndate: 0\n---\nbody").unwrap();
        assert_eq!(doc.front_matter().get_str("year"), Some("1970"));
    }

    #[test]
    fn test_evaluate_is_idempotent() {
        let mut globals = Mapping::new();
        globals.insert("name".into(), "World".into());
        let mut doc =
            Document::parse("a.md", "---\ngreeting: Hello %name\n---\nSay %greeting").unwrap();

        doc.evaluate(&globals).unwrap();
        assert_eq!(doc.front_matter().get_str("greeting"), Some("Hello World"));
        assert_eq!(doc.body(), "Say Hello World");

        // Second call does not touch the evaluated state, even with new globals
        let snapshot = doc.front_matter().clone();
        doc.evaluate(&Mapping::new()).unwrap();
        assert_eq!(doc.front_matter(), &snapshot);
    }

    #[test]
    fn test_evaluate_undefined_reports_path() {
        let mut doc = Document::parse("_posts/x.md", "---\npermalink: /%missing/\n---\nbody").unwrap();
        let err = doc.evaluate(&Mapping::new()).unwrap_err();
        assert_eq!(
            err,
            EvalError::UndefinedVariable {
                name: "missing".into(),
                path: "_posts/x.md".into()
            }
        );
        assert!(!doc.is_evaluated());
    }

    #[test]
    fn test_string_list() {
        let doc = Document::parse("a.md", "---\none: /a/\nmany: [/b/, /c/]\n---\nbody").unwrap();
        assert_eq!(doc.front_matter().string_list("one"), vec!["/a/"]);
        assert_eq!(doc.front_matter().string_list("many"), vec!["/b/", "/c/"]);
        assert!(doc.front_matter().string_list("none").is_empty());
    }

    #[test]
    fn test_yaml_to_json_stringifies_keys() {
        let value: Value = serde_yaml::from_str("1: one\ntrue: yes\nnested: {a: [1, 2.5]}").unwrap();
        let json = yaml_to_json(&value);
        assert_eq!(json["1"], "one");
        assert_eq!(json["true"], "yes");
        assert_eq!(json["nested"]["a"][1], 2.5);
    }

    #[test]
    fn test_parse_body_with_and_without_engine() {
        let markup = MarkupDispatcher::with_defaults();

        let mut doc = Document::parse("a.md", "---\n---\n# Title").unwrap();
        doc.parse_body(&markup);
        assert!(doc.content().unwrap().contains("<h1>Title</h1>"));

        let mut doc = Document::parse("a.txt", "---\n---\n# Title").unwrap();
        doc.parse_body(&markup);
        assert_eq!(doc.content(), Some("# Title"));
    }
}
