//! In-process saved-article store.
//!
//! # Responsibilities
//! - Create, read, list, update and delete saved articles
//! - Reject updates against a stale version (compare-and-set)

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::saved::types::{NewSavedArticle, SavedArticle, SavedArticlePatch};
use crate::saved::SavedError;

const MAX_TITLE_LEN: usize = 500;
const MAX_NOTE_LEN: usize = 2_000;
const MAX_TAGS: usize = 20;

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Thread-safe saved-article store keyed by id.
#[derive(Debug, Clone, Default)]
pub struct SavedStore {
    items: Arc<DashMap<String, SavedArticle>>,
}

impl SavedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, new: NewSavedArticle) -> Result<SavedArticle, SavedError> {
        validate_url(&new.url)?;
        let title = validate_title(&new.title)?;
        let note = new.note.map(|n| validate_note(&n)).transpose()?;
        let tags = normalize_tags(new.tags)?;

        let now = now_millis();
        let article = SavedArticle {
            id: uuid::Uuid::new_v4().to_string(),
            url: new.url.trim().to_string(),
            title,
            note,
            tags,
            created_at: now,
            updated_at: now,
            version: 1,
        };
        self.items.insert(article.id.clone(), article.clone());
        tracing::debug!(id = %article.id, "Saved article created");
        Ok(article)
    }

    pub fn get(&self, id: &str) -> Result<SavedArticle, SavedError> {
        self.items
            .get(id)
            .map(|r| r.value().clone())
            .ok_or_else(|| SavedError::NotFound(id.to_string()))
    }

    /// All articles, newest first.
    pub fn list(&self) -> Vec<SavedArticle> {
        let mut all: Vec<SavedArticle> = self.items.iter().map(|r| r.value().clone()).collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        all
    }

    /// Apply `patch` if the stored version still equals `expected_version`.
    pub fn update(
        &self,
        id: &str,
        expected_version: u64,
        patch: SavedArticlePatch,
    ) -> Result<SavedArticle, SavedError> {
        let title = patch.title.as_deref().map(validate_title).transpose()?;
        let note = patch.note.as_deref().map(validate_note).transpose()?;
        let tags = patch.tags.map(normalize_tags).transpose()?;

        let Some(mut entry) = self.items.get_mut(id) else {
            return Err(SavedError::NotFound(id.to_string()));
        };
        if entry.version != expected_version {
            return Err(SavedError::VersionConflict {
                current: Box::new(entry.value().clone()),
            });
        }
        if let Some(title) = title {
            entry.title = title;
        }
        if let Some(note) = note {
            entry.note = Some(note);
        }
        if let Some(tags) = tags {
            entry.tags = tags;
        }
        entry.version += 1;
        entry.updated_at = now_millis().max(entry.updated_at);
        Ok(entry.value().clone())
    }

    /// Remove the article if the stored version still equals `expected_version`.
    pub fn delete(&self, id: &str, expected_version: u64) -> Result<(), SavedError> {
        match self.items.entry(id.to_string()) {
            Entry::Occupied(entry) if entry.get().version == expected_version => {
                entry.remove();
                tracing::debug!(id = %id, "Saved article deleted");
                Ok(())
            }
            Entry::Occupied(entry) => Err(SavedError::VersionConflict {
                current: Box::new(entry.get().clone()),
            }),
            Entry::Vacant(_) => Err(SavedError::NotFound(id.to_string())),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

fn validate_url(raw: &str) -> Result<(), SavedError> {
    let parsed = url::Url::parse(raw.trim())
        .map_err(|e| SavedError::Invalid(format!("url: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SavedError::Invalid(format!("url: unsupported scheme '{other}'"))),
    }
}

fn validate_title(raw: &str) -> Result<String, SavedError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(SavedError::Invalid("title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(SavedError::Invalid(format!("title exceeds {MAX_TITLE_LEN} characters")));
    }
    Ok(title.to_string())
}

fn validate_note(raw: &str) -> Result<String, SavedError> {
    if raw.chars().count() > MAX_NOTE_LEN {
        return Err(SavedError::Invalid(format!("note exceeds {MAX_NOTE_LEN} characters")));
    }
    Ok(raw.to_string())
}

fn normalize_tags(tags: Vec<String>) -> Result<Vec<String>, SavedError> {
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    if out.len() > MAX_TAGS {
        return Err(SavedError::Invalid(format!("at most {MAX_TAGS} tags allowed")));
    }
    Ok(out)
}
