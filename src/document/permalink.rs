//! Permalink sanitizing and the permalink → target file rule.
//!
//! | Permalink            | Target file                 |
//! |----------------------|-----------------------------|
//! | `/gallery/france/`   | `gallery/france/index.html` |
//! | `/feed.xml`          | `feed.xml`                  |
//! | `/`                  | `index.html`                |
//! | (none)               | the document's base name    |

use super::Document;
use std::path::Path;

const PERMALINK_KEY: &str = "permalink";
const REDIRECT_KEY: &str = "redirect_from";

/// Permalink and redirect sources of an evaluated document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Links {
    pub permalink: Option<String>,
    pub redirects: Vec<String>,
}

impl Links {
    pub fn of(doc: &Document) -> Self {
        let front_matter = doc.front_matter();
        let permalink = front_matter
            .get_str(PERMALINK_KEY)
            .map(sanitize)
            .filter(|p| !p.is_empty());
        let redirects = front_matter
            .string_list(REDIRECT_KEY)
            .iter()
            .map(|r| sanitize(r))
            .filter(|r| !r.is_empty())
            .collect();

        Self { permalink, redirects }
    }

    pub fn target_file(&self, basename: &str) -> String {
        target_file(self.permalink.as_deref(), basename)
    }

    /// Public URL: the permalink with a leading `/`.
    pub fn url(&self) -> Option<String> {
        self.permalink.as_deref().map(url)
    }
}

/// Normalize a resolved permalink into a URL-safe path.
///
/// Non-ASCII is transliterated, whitespace becomes `-`, anything outside
/// `[0-9A-Za-z-_/.]` is dropped and the result is lower-cased. Empty, `.`
/// and `..` segments are removed, so a permalink never climbs out of the
/// output directory.
pub fn sanitize(permalink: &str) -> String {
    let ascii = deunicode::deunicode(permalink.trim());

    let filtered: String = ascii
        .chars()
        .map(|c| if c.is_whitespace() { '-' } else { c })
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '/' | '.'))
        .map(|c| c.to_ascii_lowercase())
        .collect();

    let segments: Vec<&str> = filtered
        .split('/')
        .filter(|segment| !matches!(*segment, "" | "." | ".."))
        .collect();
    let absolute = filtered.starts_with('/') || filtered.starts_with("./") || filtered.starts_with("../");

    if segments.is_empty() {
        return if filtered.contains('/') { "/".to_string() } else { String::new() };
    }

    let mut out = segments.join("/");
    if absolute {
        out.insert(0, '/');
    }
    if filtered.ends_with('/') {
        out.push('/');
    }
    out
}

/// Output file for a permalink, relative to the output directory.
pub fn target_file(permalink: Option<&str>, basename: &str) -> String {
    let Some(permalink) = permalink else {
        return basename.to_string();
    };

    let trimmed = permalink.trim_end_matches('/');
    let is_file = !permalink.ends_with('/') && Path::new(trimmed).extension().is_some();
    let target = if is_file {
        trimmed.to_string()
    } else {
        format!("{trimmed}/index.html")
    };

    target.trim_start_matches('/').to_string()
}

pub fn url(permalink: &str) -> String {
    if permalink.starts_with('/') {
        permalink.to_string()
    } else {
        format!("/{permalink}")
    }
}
