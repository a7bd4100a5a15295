use uuid::Uuid;

use super::record::{Record, RecordPatch};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftMode {
    Create,
    Edit(Uuid),
}

/// A record being created or edited, held outside the mirror until it is
/// submitted through [`SyncManager::submit`](crate::sync::SyncManager::submit).
#[derive(Debug, Clone)]
pub struct Draft<R: Record> {
    mode: DraftMode,
    fields: R::Patch,
    open: bool,
}

impl<R: Record> Draft<R> {
    /// Start a session. With an existing record the draft is a copy of it in
    /// edit mode; otherwise it holds the kind's defaults in create mode.
    pub fn begin(existing: Option<&R>) -> Self {
        match existing {
            Some(record) => Self {
                mode: DraftMode::Edit(record.id()),
                fields: record.to_patch(),
                open: true,
            },
            None => Self {
                mode: DraftMode::Create,
                fields: R::Patch::defaults(),
                open: true,
            },
        }
    }

    pub fn mode(&self) -> DraftMode {
        self.mode
    }

    pub fn is_editing(&self) -> bool {
        matches!(self.mode, DraftMode::Edit(_))
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn fields(&self) -> &R::Patch {
        &self.fields
    }

    pub fn fields_mut(&mut self) -> &mut R::Patch {
        &mut self.fields
    }

    /// Merge one field into the draft. Only the value's shape is checked here.
    pub fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        self.fields.set_field(name, value)
    }

    pub fn validate_for_submit(&self) -> Result<()> {
        R::validate(&self.fields)
    }

    /// Drop the draft without touching the store.
    pub fn discard(&mut self) {
        self.fields = R::Patch::default();
        self.mode = DraftMode::Create;
        self.open = false;
    }

    /// Called after a successful submission. Resets to a fresh create-mode
    /// draft and closes the session.
    pub(crate) fn close(&mut self) {
        self.fields = R::Patch::defaults();
        self.mode = DraftMode::Create;
        self.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::{Note, NotePatch};
    use crate::core::task::{Priority, Task, TaskPatch, TaskStatus};
    use crate::error::Error;
    use chrono::Utc;

    #[test]
    fn create_mode_seeds_defaults() {
        let draft = Draft::<Task>::begin(None);
        assert_eq!(draft.mode(), DraftMode::Create);
        assert_eq!(draft.fields().status, Some(TaskStatus::NotStarted));
        assert_eq!(draft.fields().priority, Some(Priority::Medium));
        assert_eq!(draft.fields().title.as_deref(), Some(""));

        let note = Draft::<Note>::begin(None);
        assert_eq!(note.fields(), &NotePatch::defaults());
    }

    #[test]
    fn edit_mode_copies_record() {
        let task = Task::from_insert(
            Uuid::from_u128(4),
            Uuid::from_u128(1),
            Utc::now(),
            &TaskPatch {
                title: Some("Plan sprint".into()),
                ..TaskPatch::defaults()
            },
        );
        let mut draft = Draft::begin(Some(&task));
        assert_eq!(draft.mode(), DraftMode::Edit(task.id));

        draft.set_field("title", "Plan next sprint").unwrap();
        assert_eq!(task.title, "Plan sprint");
        assert_eq!(draft.fields().title.as_deref(), Some("Plan next sprint"));
    }

    #[test]
    fn empty_title_fails_submit_check() {
        let mut draft = Draft::<Task>::begin(None);
        draft.set_field("status", "Not started").unwrap();
        assert!(matches!(draft.validate_for_submit(), Err(Error::Validation(msg)) if msg == "Task title is required"));

        draft.set_field("title", "Write tests").unwrap();
        assert!(draft.validate_for_submit().is_ok());
    }

    #[test]
    fn discard_closes_session() {
        let mut draft = Draft::<Note>::begin(None);
        draft.set_field("title", "scratch").unwrap();
        draft.discard();
        assert!(!draft.is_open());
        assert_eq!(draft.fields(), &NotePatch::default());
    }
}
