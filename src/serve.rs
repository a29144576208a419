use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    response::Response,
    Router,
};
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tracing::{error, info, warn};

use crate::loader::{FsLoader, MAX_FILE_SIZE};
use crate::markdown::RenderOptions;
use crate::namespace::Namespace;
use crate::paths::{normalize_path, percent_decode};
use crate::readout::Readout;

/// Maximum number of consecutive ports to try before giving up.
const MAX_PORT_ATTEMPTS: u16 = 100;

/// Shared application state passed to all request handlers via `Arc<AppState>`.
pub struct AppState {
    /// Directory the site is served from.
    pub serve_root: PathBuf,
    /// Canonicalized `serve_root` used for symlink-safe containment checks.
    pub canonical_root: PathBuf,
    /// Attribute that marks include elements in served pages.
    pub namespace: Namespace,
    pub render: RenderOptions,
}

/// Attempt to bind a TCP listener on `bind_addr` starting at `start_port`.
///
/// On `EADDRINUSE` the port is incremented by one and the attempt is retried up
/// to `MAX_PORT_ATTEMPTS` times.  Any other OS error causes an immediate failure
/// without further retries.
pub fn bind_with_retry(bind_addr: &str, start_port: u16) -> Result<(TcpListener, u16), String> {
    let mut port = start_port;
    for _ in 0..MAX_PORT_ATTEMPTS {
        let addr = format!("{}:{}", bind_addr, port);
        match TcpListener::bind(&addr) {
            Ok(listener) => {
                info!(port, "bind success");
                return Ok((listener, port));
            }
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                let next = port.wrapping_add(1);
                info!(port, next, "port in use");
                port = next;
            }
            Err(e) => {
                return Err(format!("bind {}:{} failed: {}", bind_addr, port, e));
            }
        }
    }
    Err(format!(
        "exhausted {} port candidates starting at {}; all ports in use",
        MAX_PORT_ATTEMPTS, start_port,
    ))
}

/// Derive the `Content-Type` value from a file extension (case-insensitive).
///
/// Markdown is served as text so pages that still run the include script in
/// the browser can fetch it.
pub fn mime_for_ext(ext: &str) -> &'static str {
    match ext.to_lowercase().as_str() {
        "html" | "htm" => "text/html; charset=utf-8",
        "md" | "markdown" => "text/markdown; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        "css" => "text/css",
        "js" => "text/javascript",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "gif" => "image/gif",
        "ico" => "image/x-icon",
        "woff2" => "font/woff2",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

fn is_html_ext(ext: &str) -> bool {
    ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm")
}

/// Resolve a candidate path to an existing file.
///
/// Order: the exact file; for a directory its `index.html`; for an
/// extensionless path the same name with `.html`.
///
/// Returns `(resolved_path, branch_name)` on success, `None` if not found.
async fn resolve_candidate(candidate: &Path) -> Option<(PathBuf, &'static str)> {
    match tokio::fs::metadata(candidate).await {
        Ok(meta) if meta.is_file() => {
            return Some((candidate.to_path_buf(), "exact"));
        }
        Ok(meta) if meta.is_dir() => {
            let index = candidate.join("index.html");
            if is_file(&index).await {
                return Some((index, "index"));
            }
            return None;
        }
        _ => {}
    }

    if candidate.extension().is_none() {
        let with_html = candidate.with_extension("html");
        if is_file(&with_html).await {
            return Some((with_html, "extensionless"));
        }
    }

    None
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Return `true` when the query string contains the `raw=1` parameter.
fn is_raw_mode(query: &str) -> bool {
    query.split('&').any(|param| param == "raw=1")
}

// ---------------------------------------------------------------------------
// Response helpers
// ---------------------------------------------------------------------------

fn not_found_response() -> Response {
    text_response(StatusCode::NOT_FOUND, "Not Found".to_owned())
}

fn too_large_response(norm_path: &str, size: u64) -> Response {
    let body = format!(
        "Content Too Large: {} ({} bytes exceeds {} byte limit)",
        norm_path, size, MAX_FILE_SIZE
    );
    text_response(StatusCode::PAYLOAD_TOO_LARGE, body)
}

fn internal_error_response() -> Response {
    text_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal Server Error".to_owned(),
    )
}

fn text_response(status: StatusCode, body: String) -> Response {
    let mut resp = Response::new(Body::from(body));
    *resp.status_mut() = status;
    set_common_headers(&mut resp, "text/plain; charset=utf-8");
    resp
}

fn ok_response(content_type: &'static str, body: Body, modified: Option<SystemTime>) -> Response {
    let mut resp = Response::new(body);
    set_common_headers(&mut resp, content_type);
    if let Some(mtime) = modified {
        if let Ok(value) = httpdate::fmt_http_date(mtime).parse::<header::HeaderValue>() {
            resp.headers_mut().insert(header::LAST_MODIFIED, value);
        }
    }
    resp
}

fn set_common_headers(resp: &mut Response, content_type: &'static str) {
    let headers = resp.headers_mut();
    headers.insert(header::CONTENT_TYPE, header::HeaderValue::from_static(content_type));
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        header::HeaderValue::from_static("nosniff"),
    );
}

// ---------------------------------------------------------------------------
// Axum request handler
// ---------------------------------------------------------------------------

/// Request pipeline:
/// 1. Percent-decode the raw request path; reject NUL bytes.
/// 2. Normalise `.`/`..`; reject traversal above root.
/// 3. Fallback resolution: exact → `index.html` → extensionless `.html`.
/// 4. Canonicalise and re-verify containment in `canonical_root`.
/// 5. Reject files over `MAX_FILE_SIZE` with 413.
/// 6. HTML pages have their includes resolved (unless `?raw=1`); everything
///    else is served as a static file.
async fn serve_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let raw_path = req.uri().path().to_owned();
    let query = req.uri().query().unwrap_or("").to_owned();

    let decoded = match percent_decode(&raw_path) {
        Ok(d) => d,
        Err(()) => {
            info!(path = %raw_path, reason = "invalid-percent-encoding", "denied");
            return not_found_response();
        }
    };

    if decoded.contains('\0') {
        info!(path = %raw_path, reason = "null-byte", "denied");
        return not_found_response();
    }

    let normalized = match normalize_path(&decoded) {
        Some(n) => n,
        None => {
            info!(path = %raw_path, reason = "path-traversal", "denied");
            return not_found_response();
        }
    };
    let norm_display = normalized.display().to_string();

    let candidate = state.serve_root.join(&normalized);
    let (resolved, branch) = match resolve_candidate(&candidate).await {
        Some(r) => r,
        None => {
            info!(path = %norm_display, reason = "not-found", "denied");
            return not_found_response();
        }
    };

    let canonical = match tokio::fs::canonicalize(&resolved).await {
        Ok(c) => c,
        Err(_) => {
            info!(path = %norm_display, reason = "canonicalize-failed", "denied");
            return not_found_response();
        }
    };
    if !canonical.starts_with(&state.canonical_root) {
        info!(
            path = %norm_display,
            reason = "outside-root",
            canonical = %canonical.display(),
            "denied"
        );
        return not_found_response();
    }

    let meta = match tokio::fs::metadata(&canonical).await {
        Ok(m) => m,
        Err(_) => {
            info!(path = %norm_display, reason = "metadata-failed", "denied");
            return not_found_response();
        }
    };
    let size = meta.len();
    if size > MAX_FILE_SIZE {
        info!(path = %norm_display, reason = "too-large", size, "denied");
        return too_large_response(&norm_display, size);
    }

    info!(path = %norm_display, branch, size, "resolved");

    let ext = canonical
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_owned();

    if is_html_ext(&ext) && !is_raw_mode(&query) {
        return render_page(&state, &canonical, &norm_display).await;
    }

    let bytes = match tokio::fs::read(&canonical).await {
        Ok(b) => b,
        Err(_) => return not_found_response(),
    };
    info!(path = %norm_display, mode = "static", "request");
    ok_response(mime_for_ext(&ext), Body::from(bytes), meta.modified().ok())
}

/// Read an HTML page and resolve its includes relative to the page's directory.
async fn render_page(state: &AppState, page: &Path, norm_display: &str) -> Response {
    let html = match tokio::fs::read_to_string(page).await {
        Ok(h) => h,
        Err(_) => return not_found_response(),
    };

    let page_dir = page.parent().unwrap_or(&state.canonical_root);
    let loader = match FsLoader::new(state.canonical_root.clone(), page_dir) {
        Ok(l) => l,
        Err(e) => {
            warn!(path = %norm_display, error = %e, "page outside root");
            return not_found_response();
        }
    };
    let readout = Readout::new(state.namespace.clone(), Arc::new(loader), state.render);

    match readout.process(&html).await {
        Ok((out, report)) => {
            info!(
                path = %norm_display,
                mode = "rendered",
                resolved = report.resolved,
                failed = report.failures.len(),
                "request"
            );
            ok_response("text/html; charset=utf-8", Body::from(out), None)
        }
        Err(e) => {
            error!(path = %norm_display, error = %e, "render failed");
            internal_error_response()
        }
    }
}

// ---------------------------------------------------------------------------
// Server entry point
// ---------------------------------------------------------------------------

/// Serve the site under `root`.
///
/// Binds to `bind_addr` starting at `start_port`, retrying on `EADDRINUSE` up
/// to 100 times.  The server shuts down cleanly when SIGINT (Ctrl+C) is
/// received.
pub async fn run_serve(
    root: PathBuf,
    bind_addr: String,
    start_port: u16,
    namespace: Namespace,
    render: RenderOptions,
) -> io::Result<()> {
    let canonical_root = std::fs::canonicalize(&root)?;
    if !canonical_root.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", root.display()),
        ));
    }

    let state = Arc::new(AppState {
        serve_root: root,
        canonical_root,
        namespace,
        render,
    });

    let (std_listener, bound_port) = bind_with_retry(&bind_addr, start_port)
        .map_err(|msg| io::Error::new(io::ErrorKind::AddrInUse, msg))?;

    std_listener.set_nonblocking(true)?;
    let listener = tokio::net::TcpListener::from_std(std_listener)?;

    let app = Router::new()
        .fallback(serve_handler)
        .layer(CompressionLayer::new())
        .with_state(state);

    info!(bind = %bind_addr, port = bound_port, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = signal::ctrl_c().await {
                error!(error = %e, "failed to install SIGINT handler");
            }
            info!("shutdown complete");
        })
        .await?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
