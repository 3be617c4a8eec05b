//! Development HTTP server for the output directory.
//!
//! A blocking `tiny_http` server that serves the built site as static files.
//! It does not rebuild or watch for changes; run `bsw serve` again after
//! editing sources.
//!
//! ## Request resolution
//!
//! 1. Decode the URL, drop query and fragment, trim slashes.
//! 2. Reject any path containing a `..` segment (404).
//! 3. File → served with a content type guessed from its extension.
//! 4. Directory with `index.html` → that file.
//! 5. Other directory → generated listing.
//! 6. Anything else → 404 page.
//!
//! The server binds to the configured interface and port, moving up to
//! [`MAX_PORT_RETRIES`] ports higher if the port is taken, and exits
//! cleanly on Ctrl+C.

use crate::config::ServeConfig;
use maud::{DOCTYPE, Markup, html};
use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tiny_http::{Header, Request, Response, Server};

/// Number of consecutive ports tried before giving up.
pub const MAX_PORT_RETRIES: u16 = 10;

#[derive(Error, Debug)]
pub enum ServeError {
    #[error("invalid interface address '{interface}': {source}")]
    InvalidInterface {
        interface: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to bind after {attempts} attempts (ports {first}-{last}): {message}")]
    Bind {
        attempts: u16,
        first: u16,
        last: u16,
        message: String,
    },
    #[error("failed to set Ctrl+C handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// A bound server and the address it listens on.
pub struct DevServer {
    server: Arc<Server>,
    addr: SocketAddr,
    /// Port from the config, when a different one had to be used.
    requested_port: Option<u16>,
}

impl DevServer {
    /// Bind to `config.interface:config.port`, trying higher ports if taken.
    pub fn bind(config: &ServeConfig) -> Result<Self, ServeError> {
        let interface: IpAddr =
            config
                .interface
                .parse()
                .map_err(|source| ServeError::InvalidInterface {
                    interface: config.interface.clone(),
                    source,
                })?;
        let (server, addr) = try_bind_port(interface, config.port, MAX_PORT_RETRIES)?;
        let requested_port = (addr.port() != config.port).then_some(config.port);
        Ok(Self {
            server: Arc::new(server),
            addr,
            requested_port,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// The configured port, if it was in use and another was picked.
    pub fn requested_port(&self) -> Option<u16> {
        self.requested_port
    }

    /// Serve `root` until Ctrl+C.
    pub fn run(self, root: &Path) -> Result<(), ServeError> {
        let server_for_signal = Arc::clone(&self.server);
        ctrlc::set_handler(move || {
            println!("Shutting down...");
            server_for_signal.unblock();
        })?;

        for request in self.server.incoming_requests() {
            let url = request.url().to_string();
            if let Err(e) = handle_request(request, root) {
                eprintln!("Request for {url} failed: {e}");
            }
        }
        Ok(())
    }
}

fn try_bind_port(
    interface: IpAddr,
    base_port: u16,
    max_retries: u16,
) -> Result<(Server, SocketAddr), ServeError> {
    let mut last_error = String::new();
    let mut last_port = base_port;
    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);
        match Server::http(addr) {
            Ok(server) => return Ok((server, addr)),
            Err(e) => {
                last_error = e.to_string();
                last_port = port;
            }
        }
    }
    Err(ServeError::Bind {
        attempts: max_retries,
        first: base_port,
        last: last_port,
        message: last_error,
    })
}

// ============================================================================
// Request handling
// ============================================================================

/// What a request URL maps to inside the served directory.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Resolved {
    File(PathBuf),
    Listing { dir: PathBuf, request_path: String },
    NotFound,
}

/// Turn a raw request URL into a slash-trimmed relative path.
///
/// Returns `None` for paths that try to escape the root.
pub(crate) fn request_path(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    let decoded = urlencoding::decode(path).ok()?;
    let trimmed = decoded.trim_matches('/');
    let escapes = Path::new(trimmed)
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    (!escapes).then(|| trimmed.to_string())
}

pub(crate) fn resolve(root: &Path, url: &str) -> Resolved {
    let Some(request_path) = request_path(url) else {
        return Resolved::NotFound;
    };
    let local = root.join(&request_path);
    if local.is_file() {
        return Resolved::File(local);
    }
    if local.is_dir() {
        let index = local.join("index.html");
        if index.is_file() {
            return Resolved::File(index);
        }
        return Resolved::Listing {
            dir: local,
            request_path,
        };
    }
    Resolved::NotFound
}

fn handle_request(request: Request, root: &Path) -> io::Result<()> {
    match resolve(root, request.url()) {
        Resolved::File(path) => {
            let body = fs::read(&path)?;
            respond(request, 200, guess_content_type(&path), body)
        }
        Resolved::Listing { dir, request_path } => {
            let page = directory_listing(&dir, &request_path)?;
            respond(request, 200, HTML, page.into_string().into_bytes())
        }
        Resolved::NotFound => {
            let page = not_found_page(request.url());
            respond(request, 404, HTML, page.into_string().into_bytes())
        }
    }
}

const HTML: &str = "text/html; charset=utf-8";

fn respond(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> io::Result<()> {
    let mut response = Response::from_data(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes("Content-Type", content_type) {
        response.add_header(header);
    }
    request.respond(response)
}

/// Guess MIME content type from file extension.
pub(crate) fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match ext.as_deref() {
        Some("html" | "htm") => HTML,
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",
        Some("txt") => "text/plain; charset=utf-8",

        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        Some("pdf") => "application/pdf",
        _ => "application/octet-stream",
    }
}

// ============================================================================
// Generated pages
// ============================================================================

fn base_page(title: &str, content: Markup) -> Markup {
    html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="UTF-8";
                title { (title) }
            }
            body {
                (content)
            }
        }
    }
}

/// Listing of a directory without `index.html`. Hidden entries are skipped;
/// directories sort first.
pub(crate) fn directory_listing(dir: &Path, request_path: &str) -> io::Result<Markup> {
    let mut entries: Vec<(String, bool)> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') {
                return None;
            }
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            Some((name, is_dir))
        })
        .collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let base = if request_path.is_empty() {
        String::new()
    } else {
        format!("/{}", encode_path(request_path))
    };
    let parent = (!request_path.is_empty()).then(|| {
        match Path::new(request_path).parent().and_then(|p| p.to_str()) {
            Some(p) if !p.is_empty() => format!("/{}/", encode_path(p)),
            _ => "/".to_string(),
        }
    });
    let title = format!("Index of /{request_path}");

    Ok(base_page(
        &title,
        html! {
            h1 { (title) }
            ul {
                @if let Some(parent) = &parent {
                    li { a href=(parent) { ".." } }
                }
                @for (name, is_dir) in &entries {
                    @let href = format!("{base}/{}{}", urlencoding::encode(name), if *is_dir { "/" } else { "" });
                    li {
                        a href=(href) {
                            (name)
                            @if *is_dir { "/" }
                        }
                    }
                }
            }
        },
    ))
}

fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

pub(crate) fn not_found_page(url: &str) -> Markup {
    base_page(
        "404 Not Found",
        html! {
            h1 { "404 Not Found" }
            p { "Nothing is served at " code { (url) } "." }
        },
    )
}
