//! Collections: namespaced folders of content items.

use super::{FolderOptions, Trackable, Tracker, Warning};
use crate::{
    context::BuildContext,
    document::{ContentItem, Document, DocumentError},
    fs::Filesystem,
    jail::JailError,
    log,
    templating::ContextValue,
};
use anyhow::Result;
use std::collections::BTreeMap;

impl Trackable for ContentItem {
    fn construct(relative_path: &str, raw: &str) -> Result<Self, DocumentError> {
        Self::parse(relative_path, raw)
    }

    fn document(&self) -> &Document {
        ContentItem::document(self)
    }

    fn document_mut(&mut self) -> &mut Document {
        ContentItem::document_mut(self)
    }
}

#[derive(Default)]
pub struct CollectionManager {
    tracker: Tracker<ContentItem>,
}

impl CollectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan every `[[collections]]` folder, namespaced by collection name.
    pub fn scan(&mut self, fs: &dyn Filesystem, ctx: &BuildContext) -> Result<Vec<Warning>> {
        let mut warnings = Vec::new();
        for collection in &ctx.config.collections {
            let folder = collection.folder.to_string_lossy();
            warnings.extend(self.tracker.scan(
                fs,
                ctx,
                &folder,
                FolderOptions::namespaced(&collection.name),
            )?);
        }
        log!("scan"; "{} collection items", self.tracker.len());
        Ok(warnings)
    }

    pub const fn tracker(&self) -> &Tracker<ContentItem> {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut Tracker<ContentItem> {
        &mut self.tracker
    }

    /// Items of one collection, drafts included.
    pub fn items(&self, collection: &str) -> impl Iterator<Item = &ContentItem> {
        self.tracker.namespace(Some(collection))
    }

    /// The `collections` template global: name → jailed items.
    pub fn jailed(&self, drafts: bool) -> Result<ContextValue<'_>, JailError> {
        let mut collections = BTreeMap::new();
        for name in self.tracker.namespaces().flatten() {
            let items = self
                .items(name)
                .filter(|item| drafts || !item.document().is_draft())
                .map(|item| item.jail().map(ContextValue::jailed))
                .collect::<Result<_, _>>()?;
            collections.insert(name.to_string(), ContextValue::List(items));
        }
        Ok(ContextValue::Map(collections))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{context::testing::site, fs::DiskFilesystem};
    use serde_yaml::Mapping;

    const CONFIG: &str = "[[collections]]\nname = \"posts\"\nfolder = \"_posts\"\n";

    #[test]
    fn test_scan_configured_collections() {
        let (_dir, ctx) = site(
            CONFIG,
            &[
                ("_posts/a.md", "---\ntitle: A\n---\na"),
                ("_posts/b.md", "---\ntitle: B\ndraft: true\n---\nb"),
            ],
        );
        let mut manager = CollectionManager::new();
        let warnings = manager.scan(&DiskFilesystem, &ctx).unwrap();

        assert!(warnings.is_empty());
        assert_eq!(manager.items("posts").count(), 2);
        assert!(manager.tracker().should_track("_posts/c.md"));
    }

    #[test]
    fn test_jailed_collections_hide_drafts() {
        let (_dir, ctx) = site(
            CONFIG,
            &[
                ("_posts/a.md", "---\ntitle: A\n---\na"),
                ("_posts/b.md", "---\ntitle: B\ndraft: true\n---\nb"),
            ],
        );
        let mut manager = CollectionManager::new();
        manager.scan(&DiskFilesystem, &ctx).unwrap();
        for item in manager.tracker_mut().values_mut() {
            item.evaluate(&Mapping::new()).unwrap();
        }

        let count = |value: &ContextValue<'_>| match value {
            ContextValue::Map(map) => match map.get("posts") {
                Some(ContextValue::List(items)) => items.len(),
                _ => 0,
            },
            _ => 0,
        };
        assert_eq!(count(&manager.jailed(false).unwrap()), 1);
        assert_eq!(count(&manager.jailed(true).unwrap()), 2);
    }
}
