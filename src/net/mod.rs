//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Plain TCP: tokio TcpListener → axum::serve
//! TLS:       tls.rs (rustls config from PEM) → axum-server
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - TLS is optional and selected by `listener.tls`
//! - Both paths drain in-flight requests on shutdown

pub mod tls;
