//! Template rendering collaborator.
//!
//! Templates only ever see a [`TemplateContext`]: plain JSON values and
//! jailed objects. Nothing in a context can reach a live document except
//! through its [`JailedObject`] capabilities.
//!
//! ```text
//! TemplateContext (globals)           scope (per page)
//! ─────────────────────────           ────────────────
//! site        ─▶ Json                 this ─▶ Jailed(item or page)
//! data        ─▶ Map<name, Jailed>    page ─▶ Jailed(dynamic page)
//! collections ─▶ Map<name, List>
//! pages       ─▶ List<Jailed>
//! ```

mod jinja;

pub use jinja::JinjaTemplating;

use crate::jail::{JailError, JailedObject};
use serde_json::Value as Json;
use std::{collections::BTreeMap, path::PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TemplateRenderError {
    #[error(transparent)]
    Jail(#[from] JailError),

    #[error("template syntax: {0}")]
    Syntax(String),

    #[error("cannot include `{}`", .path.display())]
    Include {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("`{0}` is not allowed in safe mode")]
    SafeMode(String),

    #[error(transparent)]
    Engine(minijinja::Error),
}

pub trait Templating: Send + Sync {
    fn render(&self, template: &str, context: &TemplateContext<'_>) -> Result<String, TemplateRenderError>;
}

// ============================================================================
// Context
// ============================================================================

pub enum ContextValue<'a> {
    Json(Json),
    Jailed(Box<dyn JailedObject + 'a>),
    List(Vec<ContextValue<'a>>),
    Map(BTreeMap<String, ContextValue<'a>>),
}

impl<'a> ContextValue<'a> {
    pub fn jailed(object: impl JailedObject + 'a) -> Self {
        Self::Jailed(Box::new(object))
    }

    /// Plain JSON form, for output and comparisons.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Json(value) => value.clone(),
            Self::Jailed(object) => object.to_json(),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(map) => Json::Object(map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
        }
    }
}

impl std::fmt::Debug for ContextValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(value) => write!(f, "Json({value})"),
            Self::Jailed(object) => write!(f, "Jailed({})", object.path()),
            Self::List(items) => f.debug_list().entries(items).finish(),
            Self::Map(map) => f.debug_map().entries(map).finish(),
        }
    }
}

/// Named values visible to a template, layered over an optional parent.
#[derive(Default)]
pub struct TemplateContext<'a> {
    parent: Option<&'a TemplateContext<'a>>,
    values: BTreeMap<String, ContextValue<'a>>,
}

impl<'a> TemplateContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// A child context; its own values shadow the parent's.
    pub fn scope(&'a self) -> Self {
        Self {
            parent: Some(self),
            values: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, name: &str, value: ContextValue<'a>) {
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ContextValue<'a>> {
        self.values
            .get(name)
            .or_else(|| self.parent.and_then(|parent| parent.get(name)))
    }

    /// Every visible name, scopes already resolved.
    pub fn flatten(&self) -> BTreeMap<&str, &ContextValue<'a>> {
        let mut visible = self.parent.map(TemplateContext::flatten).unwrap_or_default();
        visible.extend(self.values.iter().map(|(name, value)| (name.as_str(), value)));
        visible
    }
}
