//! TLS configuration and serving.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::sync::broadcast;

/// Load TLS configuration from certificate and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, std::io::Error> {
    for (what, path) in [("Certificate", cert_path), ("Private key", key_path)] {
        if !path.exists() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{what} file not found: {}", path.display()),
            ));
        }
    }
    RustlsConfig::from_pem_file(cert_path, key_path).await
}

/// Serve `router` over TLS until `shutdown` fires, then drain for up to
/// `grace`.
pub async fn serve_tls(
    router: Router,
    addr: SocketAddr,
    tls_config: RustlsConfig,
    mut shutdown: broadcast::Receiver<()>,
    grace: Duration,
) -> Result<(), std::io::Error> {
    let handle = Handle::new();
    let signal_handle = handle.clone();
    tokio::spawn(async move {
        let _ = shutdown.recv().await;
        tracing::info!(grace = ?grace, "Shutdown signal received, draining TLS connections");
        signal_handle.graceful_shutdown(Some(grace));
    });

    tracing::info!(address = %addr, "HTTPS server starting");
    axum_server::bind_rustls(addr, tls_config)
        .handle(handle)
        .serve(router.into_make_service_with_connect_info::<SocketAddr>())
        .await
}
