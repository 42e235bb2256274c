//! Site configuration management for `quire.toml`.
//!
//! # Sections
//!
//! | Section           | Purpose                                          |
//! |-------------------|--------------------------------------------------|
//! | `[site]`          | Free table, exposed to templates as `site` and   |
//! |                   | to front matter as `%name` variables             |
//! | `[build]`         | Folder layout, drafts, safe mode, clean output   |
//! | `[serve]`         | Preview server (port, interface, watch)          |
//! | `[[collections]]` | Named ContentItem folders                        |
//! | `[[datasets]]`    | Named DataItem folders                           |
//!
//! # Example
//!
//! ```toml
//! [site]
//! title = "My Blog"
//! author = "Alice"
//!
//! [build]
//! output = "_site"
//! pages = ["_pages"]
//!
//! [[collections]]
//! name = "posts"
//! folder = "_posts"
//!
//! [[datasets]]
//! name = "authors"
//! folder = "_data/authors"
//! ```

mod build;
pub mod defaults;
mod error;
mod serve;

pub use build::BuildConfig;
pub use error::ConfigError;
pub use serve::ServeConfig;

use crate::cli::{Cli, Commands};
use anyhow::{Context, Result};
use educe::Educe;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

// ============================================================================
// Root Configuration
// ============================================================================

/// Root configuration structure representing quire.toml
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct SiteConfig {
    /// Absolute path to the config file (set after loading)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Absolute site root (set after loading)
    #[serde(skip)]
    pub root: PathBuf,

    /// Site-wide variables
    #[serde(default)]
    pub site: toml::Table,

    /// Build settings
    #[serde(default)]
    pub build: BuildConfig,

    /// Preview server settings
    #[serde(default)]
    pub serve: ServeConfig,

    /// ContentItem folders, one namespace per entry
    #[serde(default)]
    pub collections: Vec<FolderConfig>,

    /// DataItem folders, one namespace per entry
    #[serde(default)]
    pub datasets: Vec<FolderConfig>,
}

/// A `[[collections]]` or `[[datasets]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderConfig {
    pub name: String,
    pub folder: PathBuf,
}

impl SiteConfig {
    /// Parse configuration from TOML string
    pub fn from_str(content: &str) -> Result<Self, ConfigError> {
        let config: SiteConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Load configuration from file path
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content =
            fs::read_to_string(path).map_err(|err| ConfigError::Io(path.to_path_buf(), err))?;
        Self::from_str(&content)
    }

    /// Load, apply CLI overrides and validate.
    pub fn load(cli: &Cli) -> Result<Self> {
        let root = normalize_path(cli.root.as_deref().unwrap_or(Path::new("./")));
        let config_path = root.join(&cli.config);

        let mut config = Self::from_path(&config_path)
            .with_context(|| format!("Failed to load `{}`", config_path.display()))?;
        config.root = root;
        config.config_path = normalize_path(&config_path);
        config.update_with_cli(cli);
        config.validate()?;

        Ok(config)
    }

    /// Update configuration with CLI arguments
    pub fn update_with_cli(&mut self, cli: &Cli) {
        let args = cli.build_args();

        Self::update_option(&mut self.build.output, cli.output.as_ref());
        self.build.clean |= args.clean;
        self.build.drafts |= args.drafts;
        self.build.safe |= args.safe;

        if let Commands::Serve {
            interface,
            port,
            watch,
            ..
        } = &cli.command
        {
            Self::update_option(&mut self.serve.interface, interface.as_ref());
            Self::update_option(&mut self.serve.port, port.as_ref());
            Self::update_option(&mut self.serve.watch, watch.as_ref());
        }
    }

    /// Update config option if CLI value is provided
    fn update_option<T: Clone>(config_option: &mut T, cli_option: Option<&T>) {
        if let Some(option) = cli_option {
            *config_option = option.clone();
        }
    }

    /// Every folder that must exist before scanning, with a label for errors.
    fn required_folders(&self) -> Vec<(String, &Path)> {
        let collections = self
            .collections
            .iter()
            .map(|c| (format!("[[collections]] `{}`", c.name), c.folder.as_path()));
        let datasets = self
            .datasets
            .iter()
            .map(|d| (format!("[[datasets]] `{}`", d.name), d.folder.as_path()));
        let pages = self
            .build
            .pages
            .iter()
            .map(|p| ("[build.pages]".to_string(), p.as_path()));
        let data = self
            .build
            .data
            .iter()
            .map(|p| ("[build.data]".to_string(), p.as_path()));

        collections.chain(datasets).chain(pages).chain(data).collect()
    }

    /// Validate names, folder layout and the preview server settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (kind, entries) in [("collections", &self.collections), ("datasets", &self.datasets)] {
            let mut seen = FxHashSet::default();
            for entry in entries {
                if entry.name.trim().is_empty() {
                    return Err(ConfigError::EmptyName { kind });
                }
                if !seen.insert(entry.name.as_str()) {
                    return Err(ConfigError::DuplicateName {
                        kind,
                        name: entry.name.clone(),
                    });
                }
            }
        }

        for (label, folder) in self.required_folders() {
            let path = self.root.join(folder);
            if !path.is_dir() {
                return Err(ConfigError::MissingFolder {
                    label,
                    folder: folder.to_path_buf(),
                });
            }
        }

        if let Some(template) = &self.build.redirect_template
            && !self.build.safe
            && !self.root.join(template).is_file()
        {
            return Err(ConfigError::MissingRedirectTemplate(template.clone()));
        }

        self.serve.validate()
    }
}

/// Normalize a path to absolute, using canonicalize if the path exists
pub fn normalize_path(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| {
        // For non-existent paths, manually make them absolute
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    })
}

// ============================================================================
// Tests
// ============================================================================
