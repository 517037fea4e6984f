//! Saved-article entity and request bodies.

use serde::{Deserialize, Serialize};

/// A user-saved article reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedArticle {
    pub id: String,
    pub url: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Unix milliseconds.
    pub created_at: u64,
    /// Unix milliseconds.
    pub updated_at: u64,
    /// Incremented on every update.
    pub version: u64,
}

/// Body of `POST /api/saved`.
#[derive(Debug, Clone, Deserialize)]
pub struct NewSavedArticle {
    pub url: String,
    pub title: String,
    pub note: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Body of `PATCH /api/saved/{id}`. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SavedArticlePatch {
    pub title: Option<String>,
    pub note: Option<String>,
    pub tags: Option<Vec<String>>,
}
