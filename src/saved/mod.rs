//! Saved-articles resource.
//!
//! The entity store behind `/api/saved`. It plays the role of the
//! gateway's `database` dependency: every store call runs under the
//! `database` circuit breaker, and mutations use optimistic concurrency
//! (`If-Match` against the entity's ETag, then a version compare-and-set).

pub mod store;
pub mod types;

pub use store::SavedStore;
pub use types::{NewSavedArticle, SavedArticle, SavedArticlePatch};

/// Error type for saved-article operations.
#[derive(Debug, thiserror::Error)]
pub enum SavedError {
    #[error("saved article '{0}' not found")]
    NotFound(String),

    #[error("invalid saved article: {0}")]
    Invalid(String),

    #[error("saved article was modified concurrently (now version {})", .current.version)]
    VersionConflict { current: Box<SavedArticle> },
}
