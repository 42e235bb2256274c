//! Data files and datasets.
//!
//! Plain `build.data` folders are tracked without a namespace and exposed
//! by index name (`data.authors`). Each `[[datasets]]` folder is forced into
//! its own namespace and exposed as a list (`data.<dataset>`); a dataset
//! shadows a plain data file with the same name.

use super::{FolderOptions, Trackable, Tracker, Warning};
use crate::{
    context::BuildContext,
    document::{DataItem, Document, DocumentError},
    fs::Filesystem,
    jail::JailError,
    log,
    templating::ContextValue,
};
use anyhow::Result;
use std::collections::BTreeMap;

impl Trackable for DataItem {
    fn construct(relative_path: &str, raw: &str) -> Result<Self, DocumentError> {
        Self::parse(relative_path, raw)
    }

    fn document(&self) -> &Document {
        DataItem::document(self)
    }

    fn document_mut(&mut self) -> &mut Document {
        DataItem::document_mut(self)
    }
}

#[derive(Default)]
pub struct DataManager {
    tracker: Tracker<DataItem>,
}

impl DataManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scan(&mut self, fs: &dyn Filesystem, ctx: &BuildContext) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();
        for folder in &ctx.config.build.data {
            let folder = folder.to_string_lossy();
            warnings.extend(self.tracker.scan(fs, ctx, &folder, FolderOptions::default())?);
        }
        for dataset in &ctx.config.datasets {
            let folder = dataset.folder.to_string_lossy();
            warnings.extend(self.tracker.scan(
                fs,
                ctx,
                &folder,
                FolderOptions::namespaced(&dataset.name),
            )?);
        }
        log!("scan"; "{} data files", self.tracker.len());
        Ok(warnings)
    }

    pub const fn tracker(&self) -> &Tracker<DataItem> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker<DataItem> {
        &mut self.tracker
    }

    /// The `data` template global.
    pub fn jailed(&self) -> Result<ContextValue<'_>, JailError> {
        let mut data = BTreeMap::new();
        for item in self.tracker.namespace(None) {
            data.insert(
                item.document().index_name().to_string(),
                ContextValue::jailed(item.jail()?),
            );
        }
        for name in self.tracker.namespaces().flatten() {
            let items = self
                .tracker
                .namespace(Some(name))
                .map(|item| item.jail().map(ContextValue::jailed))
                .collect::<Result<_, _>>()?;
            data.insert(name.to_string(), ContextValue::List(items));
        }
        Ok(ContextValue::Map(data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::testing::site, fs::DiskFilesystem};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_unsupported_and_missing_formats_are_skipped() {
        let (_dir, ctx) = site(
            "[build]\ndata = [\"_data\"]\n",
            &[
                ("_data/authors.yml", "- name: Ada\n"),
                ("_data/feed.xml", "<feed/>"),
                ("_data/table.csv", "a,b"),
            ],
        );
        let mut manager = DataManager::new();
        let warnings = manager.scan(&DiskFilesystem, &ctx).unwrap();

        let mut skipped: Vec<_> = warnings.iter().map(|w| w.path.as_str()).collect();
        skipped.sort_unstable();
        assert_eq!(skipped, vec!["_data/feed.xml", "_data/table.csv"]);
        assert_eq!(
            manager.tracker().get("_data/authors.yml").map(DataItem::payload),
            Some(&json!([{"name": "Ada"}]))
        );
    }

    #[test]
    fn test_datasets_are_namespaced() {
        let (_dir, ctx) = site(
            "[[datasets]]\nname = \"books\"\nfolder = \"_books\"\n",
            &[("_books/dune.json", r#"{"title": "Dune"}"#)],
        );
        let mut manager = DataManager::new();
        manager.scan(&DiskFilesystem, &ctx).unwrap();

        let dune = manager.tracker().get_by_index(Some("books"), "dune").unwrap();
        assert_eq!(dune.document().namespace(), Some("books"));

        let ContextValue::Map(data) = manager.jailed().unwrap() else {
            panic!("data global is a map");
        };
        assert!(matches!(data.get("books"), Some(ContextValue::List(items)) if items.len() == 1));
    }
}
