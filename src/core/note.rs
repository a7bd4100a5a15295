use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{Record, RecordPatch, contains_folded, optional_text};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub id: Uuid,
    pub title: String,
    pub content: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NotePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Option<String>>,
}

impl RecordPatch for NotePatch {
    fn defaults() -> Self {
        Self {
            title: Some(String::new()),
            content: Some(Some(String::new())),
        }
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "title" => self.title = Some(value.to_string()),
            "content" | "body" => self.content = Some(optional_text(value)),
            _ => {
                return Err(Error::UnknownField {
                    kind: Note::KIND,
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Record for Note {
    type Patch = NotePatch;

    const KIND: &'static str = "note";
    const LABEL: &'static str = "Note";
    const TABLE: &'static str = "notes";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner(&self) -> Uuid {
        self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn apply_patch(&mut self, patch: &NotePatch) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(ref content) = patch.content {
            self.content = content.clone();
        }
    }

    fn to_patch(&self) -> NotePatch {
        NotePatch {
            title: Some(self.title.clone()),
            content: Some(self.content.clone()),
        }
    }

    fn from_insert(id: Uuid, owner: Uuid, created_at: DateTime<Utc>, patch: &NotePatch) -> Self {
        Self {
            id,
            title: patch.title.clone().unwrap_or_default(),
            content: patch.content.clone().flatten(),
            user_id: owner,
            created_at,
        }
    }

    fn matches_query(&self, query: &str) -> bool {
        contains_folded(&self.title, query)
            || self
                .content
                .as_deref()
                .is_some_and(|c| contains_folded(c, query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::normalize_query;

    fn note(title: &str, content: Option<&str>) -> Note {
        Note::from_insert(
            Uuid::from_u128(1),
            Uuid::from_u128(2),
            Utc::now(),
            &NotePatch {
                title: Some(title.into()),
                content: Some(content.map(String::from)),
            },
        )
    }

    #[test]
    fn search_is_case_insensitive_over_title_and_content() {
        let n = note("Groceries", Some("Buy OAT milk"));
        assert!(n.matches_query(&normalize_query("grocer")));
        assert!(n.matches_query(&normalize_query("oat Milk")));
        assert!(!n.matches_query(&normalize_query("bread")));
    }

    #[test]
    fn query_whitespace_is_significant() {
        let n = note("Groceries", Some("Buy OAT milk"));
        assert!(n.matches_query(&normalize_query(" Milk")));
        assert!(!n.matches_query(&normalize_query("milk ")));
    }

    #[test]
    fn missing_content_never_matches() {
        let n = note("Ideas", None);
        assert!(!n.matches_query("milk"));
        assert!(n.matches_query(""));
    }

    #[test]
    fn blank_title_fails_validation() {
        assert!(matches!(Note::validate(&NotePatch::defaults()), Err(Error::Validation(msg)) if msg == "Note title is required"));
    }

    #[test]
    fn set_field_clears_content() {
        let mut n = note("Ideas", Some("draft"));
        let mut patch = NotePatch::default();
        patch.set_field("content", "").unwrap();
        n.apply_patch(&patch);
        assert_eq!(n.content, None);
        assert_eq!(n.title, "Ideas");
    }
}
