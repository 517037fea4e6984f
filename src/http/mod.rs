//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (correlation ID set, propagated, attached to span)
//!     → middleware/bulkhead.rs (per-route admission)
//!     → news.rs | saved.rs (cache, breakers, conditional requests)
//!         → conditional.rs (ETag, Cache-Control, 304/412)
//!     → response.rs (Problem Details enrichment)
//!     → Send to client
//! ```

pub mod conditional;
pub mod middleware;
pub mod news;
pub mod request;
pub mod response;
pub mod saved;
pub mod server;

pub use request::{CorrelationId, X_CORRELATION_ID};
pub use response::Problem;
pub use server::{AppState, HttpServer};
