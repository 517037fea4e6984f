//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! gateway.toml
//!     → loader.rs (parse, env overrides: NYT_API_KEY, GATEWAY_REDIS_URL,
//!                  GATEWAY_ADMIN_KEY)
//!     → validation.rs (semantic checks, all errors collected)
//!     → GatewayConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs + validation.rs
//!     → mpsc to the server
//!     → ArcSwap of cache policies (other sections apply on restart)
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - An invalid reload is logged and dropped; the running config stays

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{default_config, load_config, ConfigError};
pub use schema::{
    BreakerConfig, BulkheadConfig, CacheConfig, CachePolicies, EndpointPolicy, GatewayConfig,
    ListenerConfig,
};
pub use validation::ValidationError;
pub use watcher::ConfigWatcher;
