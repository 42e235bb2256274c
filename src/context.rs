//! Per-run build context.
//!
//! Holds the loaded configuration together with the resolved site root,
//! the drafts/safe flags and the global variables front matter may reference.
//! Everything downstream receives this instead of reaching for globals.

use crate::config::{ConfigError, SiteConfig, normalize_path};
use serde_yaml::Mapping;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone)]
pub struct BuildContext {
    pub config: SiteConfig,
    root: PathBuf,
    drafts: bool,
    safe: bool,
    globals: Mapping,
}

impl BuildContext {
    pub fn new(config: SiteConfig) -> Result<Self, ConfigError> {
        let root = normalize_path(&config.root);
        let globals = match serde_yaml::to_value(&config.site) {
            Ok(serde_yaml::Value::Mapping(map)) => map,
            Ok(_) => Mapping::new(),
            Err(err) => return Err(ConfigError::SiteTable(err.to_string())),
        };

        Ok(Self {
            drafts: config.build.drafts,
            safe: config.build.safe,
            root,
            globals,
            config,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub const fn drafts(&self) -> bool {
        self.drafts
    }

    pub const fn safe(&self) -> bool {
        self.safe
    }

    /// Variables visible to every front matter evaluation.
    pub const fn globals(&self) -> &Mapping {
        &self.globals
    }

    /// The `[site]` table as JSON for templates.
    pub fn site_json(&self) -> serde_json::Value {
        serde_json::to_value(&self.config.site).unwrap_or_default()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.config.build.output)
    }

    pub fn config_path(&self) -> &Path {
        &self.config.config_path
    }

    /// Absolute path for a root-relative `a/b.md`.
    pub fn absolute(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Root-relative, `/`-separated form of `path`.
    ///
    /// Relative inputs are taken as already relative to the root.
    /// Returns `None` for absolute paths outside the root.
    pub fn relative_path(&self, path: &Path) -> Option<String> {
        let relative = if path.is_absolute() {
            match path.strip_prefix(&self.root) {
                Ok(rel) => rel.to_path_buf(),
                // Watcher events may carry the non-canonical form (e.g. /tmp symlinks)
                Err(_) => path.canonicalize().ok()?.strip_prefix(&self.root).ok()?.to_path_buf(),
            }
        } else {
            path.to_path_buf()
        };

        let parts: Vec<_> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect();

        (!parts.is_empty()).then(|| parts.join("/"))
    }
}

/// Temporary sites for tests.
#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Write `files` under a fresh root and build a context from `config`.
    pub fn site(config: &str, files: &[(&str, &str)]) -> (TempDir, BuildContext) {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let path = dir.path().join(path);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        fs::write(dir.path().join("quire.toml"), config).unwrap();

        let mut config = SiteConfig::from_str(config).unwrap();
        config.root = dir.path().to_path_buf();
        config.config_path = dir.path().join("quire.toml");
        let ctx = BuildContext::new(config).unwrap();
        (dir, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn context(site: &str) -> (TempDir, BuildContext) {
        let dir = TempDir::new().unwrap();
        let mut config = SiteConfig::from_str(site).unwrap();
        config.root = dir.path().to_path_buf();
        let ctx = BuildContext::new(config).unwrap();
        (dir, ctx)
    }

    #[test]
    fn test_globals_from_site_table() {
        let (_dir, ctx) = context("[site]\nname = \"World\"\nyear = 2024\n");
        assert_eq!(
            ctx.globals().get("name").and_then(|v| v.as_str()),
            Some("World")
        );
        assert_eq!(ctx.globals().get("year").and_then(|v| v.as_i64()), Some(2024));
        assert_eq!(ctx.site_json()["name"], "World");
    }

    #[test]
    fn test_relative_path_round_trip() {
        let (dir, ctx) = context("");
        fs::create_dir_all(dir.path().join("_posts")).unwrap();
        let abs = ctx.absolute("_posts/a.md");

        assert_eq!(ctx.relative_path(&abs).as_deref(), Some("_posts/a.md"));
        assert_eq!(ctx.relative_path(Path::new("_posts/a.md")).as_deref(), Some("_posts/a.md"));
        assert_eq!(ctx.relative_path(Path::new("/elsewhere/a.md")), None);
    }

    #[test]
    fn test_flags_follow_config() {
        let (_dir, ctx) = context("[build]\ndrafts = true\n");
        assert!(ctx.drafts());
        assert!(!ctx.safe());
        assert!(ctx.output_dir().ends_with("_site"));
    }
}
