//! Site building entry points.
//!
//! # Architecture
//!
//! ```text
//! build_site()
//!     │
//!     ├── Compiler::build()
//!     │       │
//!     │       ├── scan      every tracker, in parallel per folder
//!     │       ├── evaluate  front matter, permalinks, redirects
//!     │       ├── route     target file → PageView (+ item)
//!     │       └── render    changed outputs written, stale ones removed
//!     │
//!     └── log_build_result()
//! ```
//!
//! `watch` and `serve` go through [`build_for_watch`], which keeps the
//! process alive after a failed first build so the next edit can fix it.

use crate::{
    compiler::{BuildReport, Compiler},
    log,
};
use anyhow::Result;

/// Build the entire site once.
///
/// An abort-class error is returned as is; skipped documents are reported
/// as warnings in the returned report.
pub fn build_site(compiler: &mut Compiler) -> Result<BuildReport> {
    log!("build"; "building {}", compiler.context().root().display());
    let report = compiler.build()?;
    log_build_result(compiler, &report);
    Ok(report)
}

/// First build of a watch session; failures are logged, not returned.
pub fn build_for_watch(compiler: &mut Compiler) {
    if let Err(e) = build_site(compiler) {
        log!("error"; "{e:#}");
        log!("watch"; "fix the error above, the next change rebuilds everything");
    }
}

/// Log build result based on what was routed
fn log_build_result(compiler: &Compiler, report: &BuildReport) {
    if compiler.router().is_empty() {
        log!("warn"; "nothing routed, check that page views declare a permalink");
    } else if report.warnings.is_empty() {
        log!("build"; "done");
    } else {
        log!("build"; "done with {} warnings", report.warnings.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{BuildState, tests::compiler};

    #[test]
    fn test_build_for_watch_keeps_failed_state() {
        let (_dir, mut compiler) = compiler(
            "",
            &[("_pages/index.html", "---\npermalink: /%missing/\n---\nbad")],
        );

        build_for_watch(&mut compiler);
        assert_eq!(compiler.state(), BuildState::Failed);
    }

    #[test]
    fn test_build_site_reports_routes() {
        let (_dir, mut compiler) = compiler(
            "",
            &[("_pages/index.html", "---\ntitle: Home\npermalink: /\n---\n<h1>{{ this.title }}</h1>")],
        );

        let report = build_site(&mut compiler).unwrap();
        assert_eq!(report.rendered, vec!["index.html".to_string()]);
    }
}
