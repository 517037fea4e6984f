//! NYT news gateway library: caching, conditional requests, circuit
//! breakers and bulkheads in front of the New York Times APIs.

pub mod admin;
pub mod cache;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod saved;
pub mod upstream;

pub use config::schema::GatewayConfig;
pub use error::GatewayError;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
