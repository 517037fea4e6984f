//! Shared utilities for integration tests: a programmable mock NYT
//! upstream and a gateway started on an ephemeral port.

#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use news_gateway::cache::MemoryBackend;
use news_gateway::config::GatewayConfig;
use news_gateway::http::HttpServer;
use news_gateway::lifecycle::Shutdown;

pub const ADMIN_KEY: &str = "test-admin-key";

/// Mock upstream address plus the number of requests it has answered.
pub struct MockUpstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl MockUpstream {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a mock upstream whose every response comes from `f`.
pub async fn start_programmable_backend<F, Fut>(f: F) -> MockUpstream
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let f = f.clone();
            let counter = counter.clone();
            tokio::spawn(async move {
                respond(socket, f.as_ref(), &counter).await;
            });
        }
    });

    MockUpstream { addr, hits }
}

/// Mock upstream answering 200 with a fixed JSON body.
pub async fn start_mock_backend(body: &'static str) -> MockUpstream {
    start_programmable_backend(move || async move { (200, body.to_string()) }).await
}

async fn respond<F, Fut>(mut socket: TcpStream, f: &F, counter: &AtomicUsize)
where
    F: Fn() -> Fut,
    Fut: Future<Output = (u16, String)>,
{
    // Consume the request head before answering.
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
        if buf.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    counter.fetch_add(1, Ordering::SeqCst);
    let (status, body) = f().await;
    let status_text = match status {
        200 => "200 OK",
        404 => "404 Not Found",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        502 => "502 Bad Gateway",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status_text,
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Gateway config pointed at `upstream`: no jitter, no metrics exporter,
/// admin API enabled with [`ADMIN_KEY`].
pub fn test_config(upstream: SocketAddr) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.listener.bind_address = "127.0.0.1:0".to_string();
    config.upstream.base_url = format!("http://{upstream}/svc");
    config.upstream.api_key = "test-key".to_string();
    config.resilience.jitter_min_ms = 0;
    config.resilience.jitter_max_ms = 0;
    config.observability.metrics_enabled = false;
    config.admin.enabled = true;
    config.admin.api_key = ADMIN_KEY.to_string();
    config
}

/// Run the gateway on an ephemeral port with an in-process cache.
pub async fn start_gateway(config: GatewayConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config, Arc::new(MemoryBackend::new())).unwrap();

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let (_, config_updates) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _ = server.run(listener, config_updates, server_shutdown).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
