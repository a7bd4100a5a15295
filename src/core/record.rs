use std::fmt::Debug;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::error::{Error, Result};

/// A row kind that lives in an owner-scoped collection and can be mirrored.
pub trait Record: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Patch: RecordPatch;

    /// Lower-case kind name, used in logs.
    const KIND: &'static str;
    /// Capitalized kind name, used in user-facing notices.
    const LABEL: &'static str;
    /// Remote collection name.
    const TABLE: &'static str;

    fn id(&self) -> Uuid;
    fn owner(&self) -> Uuid;
    fn created_at(&self) -> DateTime<Utc>;
    fn title(&self) -> &str;

    /// Merge every field the patch sets into this record.
    /// Identity, owner and creation time are never touched.
    fn apply_patch(&mut self, patch: &Self::Patch);

    /// Full patch carrying every mutable field, used to seed an edit draft.
    fn to_patch(&self) -> Self::Patch;

    /// Materialize a freshly inserted row. Only stores call this.
    fn from_insert(id: Uuid, owner: Uuid, created_at: DateTime<Utc>, patch: &Self::Patch) -> Self;

    /// Case-insensitive substring match on the searchable text fields.
    /// `query` is already lower-cased.
    fn matches_query(&self, query: &str) -> bool;

    /// Submission check for a create or full update. Title is the only
    /// required field for both kinds.
    fn validate(patch: &Self::Patch) -> Result<()> {
        match patch.title() {
            Some(t) if !t.trim().is_empty() => Ok(()),
            _ => Err(Error::Validation(format!("{} title is required", Self::LABEL))),
        }
    }
}

/// A partial record: every mutable field optional.
pub trait RecordPatch: Clone + Debug + Default + PartialEq + Serialize + Send + Sync + 'static {
    /// Seed for a create-mode draft.
    fn defaults() -> Self;

    fn title(&self) -> Option<&str>;

    /// Set one field from its textual form. An empty value clears an
    /// optional field.
    fn set_field(&mut self, name: &str, value: &str) -> Result<()>;
}

/// Lower-cases a search query once so records can compare cheaply.
pub fn normalize_query(query: &str) -> String {
    query.to_lowercase()
}

pub(crate) fn contains_folded(haystack: &str, folded_query: &str) -> bool {
    haystack.to_lowercase().contains(folded_query)
}

/// Empty input clears an optional text field.
pub(crate) fn optional_text(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}
