//! Structured data files.

use super::{Document, DocumentError};
use crate::{
    data,
    jail::{Accessor, JailError, Jailable, JailedView, Resolver},
};
use serde_json::{Value as Json, json};

/// A document whose whole file is a structured payload.
#[derive(Debug, Clone)]
pub struct DataItem {
    document: Document,
    payload: Json,
}

impl DataItem {
    pub const WHITELIST: &[Accessor] = &[
        Accessor::Name,
        Accessor::RelativeFilePath,
        Accessor::Basename,
        Accessor::Extension,
        Accessor::Namespace,
        Accessor::Data,
    ];

    pub fn parse(relative_path: &str, raw: &str) -> Result<Self, DocumentError> {
        let document = Document::from_data(relative_path, raw.to_string());
        let payload = data::deserialize(relative_path, document.extension(), raw)?;
        Ok(Self { document, payload })
    }

    pub const fn document(&self) -> &Document {
        &self.document
    }

    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub const fn payload(&self) -> &Json {
        &self.payload
    }

    pub fn jail(&self) -> Result<JailedView<'_, Self>, JailError> {
        JailedView::new(self, Self::WHITELIST, &[])
    }
}

impl Jailable for DataItem {
    fn document(&self) -> &Document {
        &self.document
    }

    fn resolver(accessor: Accessor) -> Option<Resolver<Self>> {
        let resolver: Resolver<Self> = match accessor {
            Accessor::Name => |d| json!(d.document.index_name()),
            Accessor::RelativeFilePath => |d| json!(d.document.relative_path()),
            Accessor::Basename => |d| json!(d.document.basename()),
            Accessor::Extension => |d| json!(d.document.extension()),
            Accessor::Namespace => |d| json!(d.document.namespace()),
            Accessor::Data => |d| d.payload.clone(),
            _ => return None,
        };
        Some(resolver)
    }

    fn offset_get(&self, key: &str) -> Option<Json> {
        match &self.payload {
            Json::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)).cloned(),
            other => other.get(key).cloned(),
        }
    }

    fn keys(&self) -> Vec<String> {
        match &self.payload {
            Json::Object(map) => map.keys().cloned().collect(),
            Json::Array(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            _ => Vec::new(),
        }
    }

    fn to_json(&self) -> Json {
        self.payload.clone()
    }
}
