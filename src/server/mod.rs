//! Development HTTP server.
//!
//! Serves the build output and the live asset tree straight from disk with
//! `tiny_http`. Nothing is cached: each request reads the file again, so a
//! rebuild is visible on the next reload.

pub mod mime;
pub mod path;

use std::fs;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use serde::Serialize;
use tiny_http::{Header, Method, Request, Response, Server, StatusCode};

pub use path::{resolve_request, DevServerMapping};

use crate::config::{BuildConfig, ServeSection};
use crate::error::{BuildError, Result};
use crate::{debug, log};

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

/// Request worker threads.
const WORKERS: usize = 4;

/// Where the dev server listens and what it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DevServerConfig {
    pub host: IpAddr,
    pub port: u16,
    pub mappings: Vec<DevServerMapping>,
}

impl DevServerConfig {
    /// Mappings for a build: the asset source tree under the `[serve]`
    /// prefix, then the output directory at `/`.
    pub fn from_build(build: &BuildConfig, serve: &ServeSection) -> Self {
        let mut mappings = Vec::with_capacity(2);
        if let Some(assets) = &build.asset_source_dir {
            mappings.push(DevServerMapping::new(&serve.url_prefix, assets));
        }
        mappings.push(DevServerMapping::new("/", &build.output_dir));
        Self {
            host: serve.host,
            port: serve.port,
            mappings,
        }
    }

    pub fn resolve(&self, url: &str) -> Option<std::path::PathBuf> {
        resolve_request(url, &self.mappings)
    }
}

/// A bound server, ready to run its request loop.
pub struct DevServer {
    server: Arc<Server>,
    addr: SocketAddr,
    mappings: Arc<Vec<DevServerMapping>>,
}

impl DevServer {
    /// Bind, moving to the next port while the requested one is taken.
    pub fn bind(config: DevServerConfig) -> Result<Self> {
        let (server, addr) = bind_with_retry(config.host, config.port)?;
        for mapping in &config.mappings {
            debug!("serve"; "{} -> {}", mapping.url_prefix, mapping.fs_root.display());
        }
        Ok(Self {
            server: Arc::new(server),
            addr,
            mappings: Arc::new(config.mappings),
        })
    }

    /// The address actually bound.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// A handle that can stop [`DevServer::run`] via `Server::unblock`.
    pub fn handle(&self) -> Arc<Server> {
        Arc::clone(&self.server)
    }

    /// Handle requests until the server is unblocked.
    pub fn run(self) -> Result<()> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(WORKERS)
            .build()
            .map_err(|e| BuildError::serve(format!("cannot start worker pool: {e}")))?;

        log!("serve"; "http://{}", self.addr);
        for request in self.server.incoming_requests() {
            let mappings = Arc::clone(&self.mappings);
            pool.spawn(move || {
                if let Err(e) = handle_request(request, &mappings) {
                    log!("serve"; "request error: {e}");
                }
            });
        }
        Ok(())
    }
}

/// Bind to `host:port`, trying the following ports when it is taken.
pub fn bind_with_retry(host: IpAddr, base_port: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = String::new();
    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        match Server::http(SocketAddr::new(host, port)) {
            Ok(server) => {
                let addr = server
                    .server_addr()
                    .to_ip()
                    .unwrap_or_else(|| SocketAddr::new(host, port));
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, addr.port());
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
        // Port 0 asks the OS for any free port; retrying cannot help.
        if base_port == 0 {
            break;
        }
    }
    Err(BuildError::serve(format!(
        "cannot bind {host} after {MAX_PORT_RETRIES} attempts from port {base_port}: {last_error}"
    )))
}

/// Serve one request from the mapped roots.
fn handle_request(request: Request, mappings: &[DevServerMapping]) -> io::Result<()> {
    let method = request.method().clone();
    if !matches!(method, Method::Get | Method::Head) {
        return respond(request, 405, mime::types::PLAIN, b"method not allowed".to_vec());
    }

    let url = request.url().to_string();
    let Some(path) = resolve_request(&url, mappings) else {
        debug!("serve"; "{method} {url} -> 404");
        return respond(request, 404, mime::types::PLAIN, b"not found".to_vec());
    };

    // The file may vanish between resolution and read during a rebuild.
    match fs::read(&path) {
        Ok(body) => {
            debug!("serve"; "{method} {url} -> {}", path.display());
            respond(request, 200, mime::from_path(&path), body)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            respond(request, 404, mime::types::PLAIN, b"not found".to_vec())
        }
        Err(e) => Err(e),
    }
}

/// `tiny_http` omits the body for `HEAD` on its own.
fn respond(request: Request, status: u16, content_type: &str, body: Vec<u8>) -> io::Result<()> {
    let mut response = Response::from_data(body).with_status_code(StatusCode(status));
    for (field, value) in [("Content-Type", content_type), ("Cache-Control", "no-store")] {
        if let Ok(header) = Header::from_bytes(field, value) {
            response.add_header(header);
        }
    }
    request.respond(response)
}
