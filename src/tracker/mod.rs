//! Generic document tracking.
//!
//! A [`Tracker`] owns the canonical index for one category of documents:
//!
//! ```text
//!  folders      [_posts → ns "posts"]  [_drafts → ns "posts"]
//!                   │ scan / refresh / add / remove
//!                   ▼
//!  flattened    "_posts/a.md" ─▶ T     (every tracked path)
//!  grouped      Some("posts") ─▶ [a ─▶ "_posts/a.md", b ─▶ ...]
//! ```
//!
//! Both maps always hold the same set of paths. Folder definitions decide
//! which changed paths a tracker claims, by path-component prefix.

mod collection;
mod data;
mod page;

pub use collection::CollectionManager;
pub use data::DataManager;
pub use page::PageManager;

use crate::{
    context::BuildContext,
    document::{Document, DocumentError},
    fs::Filesystem,
    log,
};
use anyhow::{Context, Result};
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::{collections::BTreeMap, path::Path};

// ============================================================================
// Types
// ============================================================================

/// A document type a [`Tracker`] can construct.
pub trait Trackable: Send + Sized {
    fn construct(relative_path: &str, raw: &str) -> Result<Self, DocumentError>;
    fn document(&self) -> &Document;
    fn document_mut(&mut self) -> &mut Document;
}

/// Per-folder options, remembered for every document scanned from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderOptions {
    pub namespace: Option<String>,
}

impl FolderOptions {
    pub fn namespaced(namespace: &str) -> Self {
        Self {
            namespace: Some(namespace.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderDefinition {
    /// Root-relative folder
    pub folder: String,
    pub options: FolderOptions,
}

/// A document skipped during a scan or refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub path: String,
    pub message: String,
}

impl Warning {
    pub fn new(path: &str, error: &DocumentError) -> Self {
        log!("warn"; "{error}");
        Self {
            path: path.to_string(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    index_name: String,
    path: String,
}

// ============================================================================
// Tracker
// ============================================================================

pub struct Tracker<T> {
    folders: Vec<FolderDefinition>,
    flattened: FxHashMap<String, T>,
    grouped: BTreeMap<Option<String>, Vec<IndexEntry>>,
    item_options: FxHashMap<String, FolderOptions>,
}

impl<T> Default for Tracker<T> {
    fn default() -> Self {
        Self {
            folders: Vec::new(),
            flattened: FxHashMap::default(),
            grouped: BTreeMap::new(),
            item_options: FxHashMap::default(),
        }
    }
}

impl<T: Trackable> Tracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track every file below `folder`.
    ///
    /// Files are read and parsed in parallel, then inserted in path order.
    /// Malformed files become warnings; an unreadable folder is an error.
    pub fn scan(
        &mut self,
        fs: &dyn Filesystem,
        ctx: &BuildContext,
        folder: &str,
        options: FolderOptions,
    ) -> Result<Vec<Warning>> {
        let files = fs
            .list_files(&ctx.absolute(folder))
            .with_context(|| format!("Failed to scan `{folder}`"))?;
        self.remember_folder(folder, options.clone());

        let parsed: Vec<(String, Result<T, DocumentError>)> = files
            .par_iter()
            .filter_map(|path| {
                let relative = ctx.relative_path(path)?;
                let result = fs
                    .read_to_string(path)
                    .map_err(|err| DocumentError::Io(path.clone(), err))
                    .and_then(|raw| T::construct(&relative, &raw));
                Some((relative, result))
            })
            .collect();

        let mut warnings = Vec::new();
        for (relative, result) in parsed {
            match result {
                Ok(item) => self.insert(item, options.clone()),
                Err(err) => warnings.push(Warning::new(&relative, &err)),
            }
        }
        Ok(warnings)
    }

    fn remember_folder(&mut self, folder: &str, options: FolderOptions) {
        let folder = folder.trim_end_matches('/').to_string();
        match self.folders.iter_mut().find(|f| f.folder == folder) {
            Some(existing) => existing.options = options,
            None => self.folders.push(FolderDefinition { folder, options }),
        }
    }

    /// True if `path` lies under one of the scanned folders.
    pub fn should_track(&self, path: &str) -> bool {
        self.owning_folder(path).is_some()
    }

    /// Deepest folder definition containing `path`.
    fn owning_folder(&self, path: &str) -> Option<&FolderDefinition> {
        self.folders
            .iter()
            .filter(|f| Path::new(path).starts_with(&f.folder))
            .max_by_key(|f| f.folder.len())
    }

    pub fn is_tracked(&self, path: &str) -> bool {
        self.flattened.contains_key(path)
    }

    /// Re-read one file, replacing its entry in place.
    ///
    /// The namespace comes from the options saved when the file was first
    /// tracked, or from its owning folder for a new file. On failure the
    /// previous entry is kept.
    pub fn refresh(&mut self, fs: &dyn Filesystem, ctx: &BuildContext, path: &str) -> Result<(), DocumentError> {
        let options = self
            .item_options
            .get(path)
            .cloned()
            .or_else(|| self.owning_folder(path).map(|f| f.options.clone()))
            .unwrap_or_default();

        let absolute = ctx.absolute(path);
        let raw = fs
            .read_to_string(&absolute)
            .map_err(|err| DocumentError::Io(absolute, err))?;
        let item = T::construct(path, &raw)?;
        self.insert(item, options);
        Ok(())
    }

    /// Construction hook tail: namespace, both maps, saved options.
    fn insert(&mut self, mut item: T, options: FolderOptions) {
        let document = item.document_mut();
        document.set_namespace(options.namespace.clone());
        let path = document.relative_path().to_string();
        let index_name = document.index_name().to_string();

        // A refresh may not move a document between namespaces
        if let Some(previous) = self.item_options.get(&path)
            && previous.namespace != options.namespace
        {
            self.unindex(&path);
        }

        if let Some(earlier) = self.colliding_path(options.namespace.as_deref(), &index_name, &path) {
            log!("warn"; "`{path}` shares the index name `{index_name}` with `{earlier}`, lookups by name return `{earlier}`");
        }

        let entries = self.grouped.entry(options.namespace.clone()).or_default();
        match entries.iter_mut().find(|e| e.path == path) {
            Some(entry) => entry.index_name = index_name,
            None => entries.push(IndexEntry {
                index_name,
                path: path.clone(),
            }),
        }

        self.item_options.insert(path.clone(), options);
        self.flattened.insert(path, item);
    }

    /// Another path already indexed as `index_name` in `namespace`.
    fn colliding_path(&self, namespace: Option<&str>, index_name: &str, path: &str) -> Option<&str> {
        self.grouped
            .get(&namespace.map(str::to_string))?
            .iter()
            .find(|e| e.index_name == index_name && e.path != path)
            .map(|e| e.path.as_str())
    }

    fn unindex(&mut self, path: &str) {
        for entries in self.grouped.values_mut() {
            entries.retain(|e| e.path != path);
        }
        self.grouped.retain(|_, entries| !entries.is_empty());
    }

    /// Evict `path` from both maps.
    pub fn remove(&mut self, path: &str) -> Option<T> {
        self.unindex(path);
        self.item_options.remove(path);
        self.flattened.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&T> {
        self.flattened.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut T> {
        self.flattened.get_mut(path)
    }

    /// First item indexed as `index_name`; later items with the same name
    /// are reachable by path only.
    pub fn get_by_index(&self, namespace: Option<&str>, index_name: &str) -> Option<&T> {
        self.grouped
            .get(&namespace.map(str::to_string))?
            .iter()
            .find(|e| e.index_name == index_name)
            .and_then(|e| self.flattened.get(&e.path))
    }

    /// Items of one namespace, in insertion order.
    pub fn namespace(&self, namespace: Option<&str>) -> impl Iterator<Item = &T> {
        self.grouped
            .get(&namespace.map(str::to_string))
            .into_iter()
            .flatten()
            .filter_map(|e| self.flattened.get(&e.path))
    }

    pub fn namespaces(&self) -> impl Iterator<Item = Option<&str>> {
        self.grouped.keys().map(Option::as_deref)
    }

    /// All paths, grouped by namespace, in insertion order.
    pub fn paths(&self) -> Vec<String> {
        self.grouped
            .values()
            .flatten()
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.grouped
            .values()
            .flatten()
            .filter_map(|e| self.flattened.get(&e.path))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.flattened.values_mut()
    }

    pub fn folders(&self) -> &[FolderDefinition] {
        &self.folders
    }

    pub fn len(&self) -> usize {
        self.flattened.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flattened.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Invariant check: both maps hold the same paths.
    #[cfg(test)]
    fn is_consistent(&self) -> bool {
        let grouped: Vec<_> = self.grouped.values().flatten().collect();
        grouped.len() == self.flattened.len()
            && grouped.iter().all(|e| self.flattened.contains_key(&e.path))
    }
}

// ============================================================================
// Tests
// ============================================================================
