//! Live preview server.
//!
//! Answers requests straight from the compiler's memory, built on
//! `tiny_http`:
//!
//! - Routed targets are served from the last rendered bytes
//! - Asset requests are served from their source folder
//! - Anything else is a 404
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐
//! │   Main Thread   │     │  Watcher Thread  │
//! │  (HTTP Server)  │     │  (File Monitor)  │
//! └────────┬────────┘     └────────┬─────────┘
//!          │                       │
//!          ▼                       ▼
//!    compiler.preview()      compiler.rebuild()
//!          │                       │
//!          └──────────┬────────────┘
//!                     ▼
//!          Arc<Mutex<Compiler>>
//! ```
//!
//! A request waits on the lock while a rebuild is in flight, so it never
//! sees a half-rendered site.

use crate::{cli::Cli, compiler::Compiler, log, watch::watch_for_changes_blocking};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

// ============================================================================
// Server Entry Point
// ============================================================================

/// Preview the site until Ctrl+C, watching sources when `[serve] watch` is on.
///
/// On shutdown the watcher thread finishes its current cycle before this
/// returns.
pub fn serve_site(cli: Cli, compiler: Arc<Mutex<Compiler>>) -> Result<()> {
    let serve = compiler.lock().context().config.serve.clone();
    let (server, addr) = try_bind_port(serve.interface, serve.port, serve.port_retries)?;
    let server = Arc::new(server);
    let shutdown = Arc::new(AtomicBool::new(false));

    let server_for_signal = Arc::clone(&server);
    let shutdown_for_signal = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        shutdown_for_signal.store(true, Ordering::SeqCst);
        server_for_signal.unblock();
    })
    .context("Failed to set Ctrl+C handler")?;

    log!("serve"; "http://{}", addr);

    let watcher = serve.watch.then(|| {
        let compiler = Arc::clone(&compiler);
        let shutdown = Arc::clone(&shutdown);
        std::thread::spawn(move || {
            if let Err(err) = watch_for_changes_blocking(&cli, &compiler, &shutdown) {
                log!("watch"; "{err}");
            }
        })
    });

    // Unblocked by the Ctrl+C handler
    for request in server.incoming_requests() {
        if let Err(e) = handle_request(request, &compiler) {
            log!("serve"; "request error: {e}");
        }
    }

    if let Some(watcher) = watcher {
        watcher
            .join()
            .map_err(|_| anyhow!("watcher thread panicked"))?;
    }
    Ok(())
}

/// Bind the first free port of `base_port..base_port + attempts`.
fn try_bind_port(interface: IpAddr, base_port: u16, attempts: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = String::new();
    for port in (0..attempts).map_while(|offset| base_port.checked_add(offset)) {
        let addr = SocketAddr::new(interface, port);
        match Server::http(addr) {
            Ok(server) => {
                if port != base_port {
                    log!("serve"; "port {base_port} in use, using {port} instead");
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(anyhow!("no free port among {attempts} from {base_port} on {interface}: {last_error}"))
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Request resolution order:
/// 1. Routed target → rendered bytes from memory
/// 2. Asset under an asset folder → source file
/// 3. Nothing found → 404
fn handle_request(request: Request, compiler: &Mutex<Compiler>) -> Result<()> {
    let url = request.url().to_string();

    // The guard is dropped before responding
    let (preview, asset) = {
        let compiler = compiler.lock();
        match compiler.preview(&url) {
            Some(preview) => (Some(preview), None),
            None => (None, compiler.asset_source(&url)),
        }
    };

    if let Some(preview) = preview {
        return respond(request, preview.bytes, preview.content_type);
    }
    if let Some(path) = asset {
        let content = fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))?;
        return respond(request, content, guess_content_type(&path));
    }

    serve_not_found(request)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn respond(request: Request, content: Vec<u8>, content_type: &str) -> Result<()> {
    let response = Response::from_data(content).with_header(content_type_header(content_type)?);
    request.respond(response)?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let response = Response::new(
        StatusCode(404),
        vec![content_type_header("text/plain")?],
        Cursor::new("404 Not Found"),
        Some(13),
        None,
    );
    request.respond(response)?;
    Ok(())
}

fn content_type_header(content_type: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", content_type)
        .map_err(|()| anyhow!("invalid content type `{content_type}`"))
}

// ============================================================================
// Content Types
// ============================================================================

/// Extensions a site commonly publishes; anything else is served as bytes.
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("html", "text/html; charset=utf-8"),
    ("htm", "text/html; charset=utf-8"),
    ("css", "text/css; charset=utf-8"),
    ("js", "application/javascript; charset=utf-8"),
    ("mjs", "application/javascript; charset=utf-8"),
    ("json", "application/json; charset=utf-8"),
    ("xml", "application/xml; charset=utf-8"),
    ("txt", "text/plain; charset=utf-8"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("ico", "image/x-icon"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("pdf", "application/pdf"),
];

/// Content type of a routed target or asset, by extension.
pub fn guess_content_type(path: &Path) -> &'static str {
    path.extension()
        .and_then(|ext| ext.to_str())
        .and_then(|ext| CONTENT_TYPES.iter().find(|(known, _)| known.eq_ignore_ascii_case(ext)))
        .map_or("application/octet-stream", |(_, content_type)| content_type)
}
