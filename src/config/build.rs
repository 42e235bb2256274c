//! `[build]` section configuration.
//!
//! Contains folder layout and compile flags.

use super::defaults;
use educe::Educe;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// `[build]` section in quire.toml - build pipeline configuration.
///
/// # Example
/// ```toml
/// [build]
/// output = "_site"          # Output directory
/// pages = ["_pages"]        # PageView folders
/// data = ["_data"]          # DataItem folders without a namespace
/// assets = ["assets"]       # Copied verbatim into the output
/// drafts = false            # Publish `draft: true` documents
/// safe = false              # Disable file access from templates
/// ```
#[derive(Debug, Clone, Educe, Serialize, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory, relative to the site root.
    #[serde(default = "defaults::build::output")]
    #[educe(Default = defaults::build::output())]
    pub output: PathBuf,

    /// Folders holding PageViews.
    #[serde(default = "defaults::build::pages")]
    #[educe(Default = defaults::build::pages())]
    pub pages: Vec<PathBuf>,

    /// Folders holding DataItems exposed under `data` without a namespace.
    #[serde(default = "defaults::build::data")]
    #[educe(Default = defaults::build::data())]
    pub data: Vec<PathBuf>,

    /// Folders copied verbatim into the output and served during preview.
    #[serde(default = "defaults::build::assets")]
    #[educe(Default = defaults::build::assets())]
    pub assets: Vec<PathBuf>,

    /// Publish documents whose front matter sets `draft: true`.
    #[serde(default = "defaults::r#false")]
    pub drafts: bool,

    /// Safe mode: template functions that read files are refused.
    #[serde(default = "defaults::r#false")]
    pub safe: bool,

    /// Delete the output directory before writing.
    #[serde(default = "defaults::r#false")]
    pub clean: bool,

    /// Custom template for redirect pages. Ignored in safe mode.
    #[serde(default = "defaults::build::redirect_template")]
    #[educe(Default = defaults::build::redirect_template())]
    pub redirect_template: Option<PathBuf>,
}
