//! Errors raised while loading or validating `quire.toml`.
//!
//! Every variant aborts before the first scan; none is recoverable by a
//! rebuild without editing the config.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read `{}`", .0.display())]
    Io(PathBuf, #[source] std::io::Error),

    #[error("invalid TOML")]
    Toml(#[from] toml::de::Error),

    /// A `[[collections]]` or `[[datasets]]` entry with a blank name
    #[error("[[{kind}]] entries must have a non-empty name")]
    EmptyName { kind: &'static str },

    /// Two entries of one kind share a namespace
    #[error("[[{kind}]] `{name}` declared twice")]
    DuplicateName { kind: &'static str, name: String },

    #[error("{label} folder `{}` does not exist", .folder.display())]
    MissingFolder { label: String, folder: PathBuf },

    #[error("[build.redirect_template] `{}` not found", .0.display())]
    MissingRedirectTemplate(PathBuf),

    #[error("[serve] {0}")]
    Serve(String),

    /// `[site]` cannot be exposed as front matter globals
    #[error("[site] table: {0}")]
    SiteTable(String),
}
