//! ============================================================================
//! Proxy Server - HTTP listener for the try-on endpoint
//! ============================================================================
//! A blocking tiny_http accept loop. Each request gets its own thread, which
//! drives the async handler on the shared Tokio runtime, so one slow or
//! failing request never holds up (or takes down) the others.
//! ============================================================================

use anyhow::{anyhow, Result};
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tiny_http::{Header, Request, Response, Server};
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use super::handler::{ProxyResponse, TryOnProxy, CORS_HEADERS};

/// Bound HTTP listener
pub struct ProxyServer {
    server: Arc<Server>,
    addr: SocketAddr,
}

/// Stops a running `ProxyServer` from another thread
#[derive(Clone)]
pub struct ShutdownHandle {
    server: Arc<Server>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.server.unblock();
    }
}

impl ProxyServer {
    /// Bind the listener; port 0 picks a free port
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let server = Server::http(addr)
            .map_err(|e| anyhow!("Failed to start proxy server on {}: {}", addr, e))?;
        let addr = server
            .server_addr()
            .to_ip()
            .ok_or_else(|| anyhow!("Proxy server is not listening on an IP address"))?;

        info!("Virtual try-on proxy listening on http://{}", addr);
        Ok(Self {
            server: Arc::new(server),
            addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            server: self.server.clone(),
        }
    }

    /// Serve until shut down. Blocks the calling thread.
    pub fn run(&self, proxy: Arc<TryOnProxy>, runtime: Handle) {
        for request in self.server.incoming_requests() {
            let proxy = proxy.clone();
            let runtime = runtime.clone();

            let spawned = std::thread::Builder::new()
                .name("tryon-request".to_string())
                .spawn(move || handle_request(request, &proxy, &runtime));
            if let Err(e) = spawned {
                error!("Failed to spawn request thread: {}", e);
            }
        }
        info!("Proxy server stopped");
    }
}

fn handle_request(mut request: Request, proxy: &TryOnProxy, runtime: &Handle) {
    let method = request.method().to_string();
    debug!("{} {}", method, request.url());

    // Only POST carries a payload; preflights are answered without reading one
    let max_body = proxy.config().max_body_bytes;
    let body = if method == "POST" {
        read_body(&mut request, max_body)
    } else {
        Ok(Some(Vec::new()))
    };

    let response = match body {
        Ok(Some(body)) => runtime.block_on(proxy.handle(&method, &body)),
        Ok(None) => {
            warn!("Rejecting request body over {} bytes", max_body);
            ProxyResponse::error(413, "Request body too large")
        }
        Err(e) => {
            error!("Failed to read request body: {}", e);
            ProxyResponse::error(500, e.to_string())
        }
    };

    if let Err(e) = request.respond(to_http(response)) {
        warn!("Failed to send response: {}", e);
    }
}

/// Read the body, `None` when it exceeds `max` bytes
fn read_body(request: &mut Request, max: usize) -> Result<Option<Vec<u8>>> {
    if request.body_length().is_some_and(|len| len > max) {
        return Ok(None);
    }

    let mut body = Vec::new();
    request
        .as_reader()
        .take(max as u64 + 1)
        .read_to_end(&mut body)
        .map_err(|e| anyhow!("Failed to read request body: {}", e))?;

    Ok((body.len() <= max).then_some(body))
}

fn to_http(response: ProxyResponse) -> Response<std::io::Cursor<Vec<u8>>> {
    let has_body = response.body.is_some();
    let mut http = Response::from_data(response.body.unwrap_or_default().into_bytes())
        .with_status_code(response.status);

    let content_type = has_body.then_some(("Content-Type", "application/json"));
    for (name, value) in CORS_HEADERS.iter().copied().chain(content_type) {
        match Header::from_bytes(name.as_bytes(), value.as_bytes()) {
            Ok(header) => http.add_header(header),
            Err(_) => warn!("Skipping invalid header {}", name),
        }
    }
    http
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProxyConfig;
    use crate::proxy::{ChatRequest, ImageGateway, UpstreamReply};
    use async_trait::async_trait;
    use serde_json::json;

    struct RateLimited;

    #[async_trait]
    impl ImageGateway for RateLimited {
        async fn complete(&self, _api_key: &str, _request: &ChatRequest) -> Result<UpstreamReply> {
            Ok(UpstreamReply {
                status: 429,
                body: String::new(),
            })
        }
    }

    fn start(max_body_bytes: usize) -> (SocketAddr, ShutdownHandle, std::thread::JoinHandle<()>) {
        let config = ProxyConfig {
            api_key: Some("key".to_string()),
            max_body_bytes,
            ..ProxyConfig::default()
        };
        let proxy = Arc::new(TryOnProxy::new(config, Arc::new(RateLimited)));
        let server = ProxyServer::bind(SocketAddr::from(([127, 0, 0, 1], 0))).unwrap();
        let addr = server.local_addr();
        let shutdown = server.shutdown_handle();
        let runtime = Handle::current();
        let thread = std::thread::spawn(move || server.run(proxy, runtime));
        (addr, shutdown, thread)
    }

    fn assert_cors(response: &reqwest::Response) {
        for (name, value) in CORS_HEADERS {
            assert_eq!(response.headers()[*name], *value, "missing {}", name);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_serves_with_cors() {
        let (addr, shutdown, thread) = start(1024 * 1024);
        let url = format!("http://{}/", addr);
        let client = reqwest::Client::new();

        let preflight = client
            .request(reqwest::Method::OPTIONS, &url)
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status(), 200);
        assert_cors(&preflight);
        assert!(preflight.bytes().await.unwrap().is_empty());

        let missing = client.post(&url).json(&json!({})).send().await.unwrap();
        assert_eq!(missing.status(), 400);
        assert_cors(&missing);

        let limited = client
            .post(&url)
            .json(&json!({ "personImage": "data:a", "outfitImage": "data:b" }))
            .send()
            .await
            .unwrap();
        assert_eq!(limited.status(), 429);
        assert_cors(&limited);
        assert_eq!(
            limited.json::<serde_json::Value>().await.unwrap()["error"],
            crate::types::RATE_LIMIT_MESSAGE
        );

        shutdown.shutdown();
        thread.join().unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_oversized_body_rejected() {
        let (addr, shutdown, thread) = start(16);
        let response = reqwest::Client::new()
            .post(format!("http://{}/", addr))
            .body("x".repeat(64))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 413);
        assert_cors(&response);

        let preflight = reqwest::Client::new()
            .request(reqwest::Method::OPTIONS, format!("http://{}/", addr))
            .body("x".repeat(64))
            .send()
            .await
            .unwrap();
        assert_eq!(preflight.status(), 200);
        assert_cors(&preflight);

        shutdown.shutdown();
        thread.join().unwrap();
    }
}
