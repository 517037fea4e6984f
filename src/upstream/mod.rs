//! Upstream NYT API subsystem.
//!
//! # Data Flow
//! ```text
//! handler
//!     → types.rs (validate parameters into an NytRequest)
//!     → registry execute(External, ...)
//!         → client.rs (reqwest GET {base}{path}?api-key=...)
//!     → Fetched::Fresh | Fetched::Degraded
//! ```
//!
//! # Design Decisions
//! - The per-call deadline belongs to the `external` breaker; reqwest only
//!   carries a connect timeout
//! - Transient failures (transport, 5xx, 429, bad JSON) feed the breaker;
//!   business errors (other 4xx) do not

pub mod client;
pub mod types;

use serde_json::Value;

pub use client::NytClient;
pub use types::{NytRequest, SearchParams};

/// Error type for upstream calls.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("upstream rate limited")]
    RateLimited { retry_after: Option<u64> },

    #[error("upstream returned {status}")]
    Status { status: u16, message: String },

    #[error("upstream payload undecodable: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Whether the failure says something about upstream health.
    pub fn is_transient(&self) -> bool {
        match self {
            UpstreamError::Transport(_) | UpstreamError::RateLimited { .. } | UpstreamError::Decode(_) => true,
            UpstreamError::Status { status, .. } => *status >= 500,
            // Other 4xx are business errors: they surface as 502 without tripping the breaker.
            UpstreamError::InvalidParams(_) => false,
        }
    }
}

/// Result of a guarded upstream read.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Real upstream payload; cacheable.
    Fresh(Value),
    /// Fallback payload; never cached.
    Degraded(Value),
}
