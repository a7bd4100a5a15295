use uuid::Uuid;

use super::record::{Record, normalize_query};
use super::task::{Task, TaskStatus};

/// The session-local copy of one owner's records, newest first.
///
/// Every mutation is a deterministic patch applied after the store has
/// confirmed the corresponding remote change.
#[derive(Debug, Clone)]
pub struct Mirror<R: Record> {
    records: Vec<R>,
}

impl<R: Record> Default for Mirror<R> {
    fn default() -> Self {
        Self { records: Vec::new() }
    }
}

impl<R: Record> Mirror<R> {
    pub fn new(records: Vec<R>) -> Self {
        Self { records }
    }

    /// Replace the whole mirror.
    pub fn initialize(&mut self, records: Vec<R>) {
        self.records = records;
    }

    /// Borrowing view of the records matching `predicate`.
    pub fn filter<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a R> + 'a
    where
        P: Fn(&R) -> bool + 'a,
    {
        self.records.iter().filter(move |r| predicate(r))
    }

    /// Records whose searchable text contains `query`, ignoring case.
    pub fn search<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a R> + 'a {
        let query = normalize_query(query);
        self.filter(move |r| r.matches_query(&query))
    }

    /// Prepend a newly created record. Existing entries keep their order.
    pub fn apply_create(&mut self, record: R) {
        self.records.insert(0, record);
    }

    /// Merge `patch` into the entry with `id`. Unknown ids are ignored.
    pub fn apply_update(&mut self, id: Uuid, patch: &R::Patch) {
        if let Some(record) = self.records.iter_mut().find(|r| r.id() == id) {
            record.apply_patch(patch);
        }
    }

    /// Remove the entry with `id`. Unknown ids are ignored.
    pub fn apply_delete(&mut self, id: Uuid) {
        self.records.retain(|r| r.id() != id);
    }

    pub fn get(&self, id: Uuid) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, R> {
        self.records.iter()
    }

    pub fn records(&self) -> &[R] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// The task list tabs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskTab {
    All,
    NotStarted,
    InProgress,
    Completed,
}

impl TaskTab {
    pub fn status(&self) -> Option<TaskStatus> {
        match self {
            Self::All => None,
            Self::NotStarted => Some(TaskStatus::NotStarted),
            Self::InProgress => Some(TaskStatus::InProgress),
            Self::Completed => Some(TaskStatus::Completed),
        }
    }

    pub fn includes(&self, task: &Task) -> bool {
        self.status().is_none_or(|s| task.status == s)
    }

    /// Status a click on the status toggle moves the task to. Status tabs
    /// always advance to their natural next state; the All tab walks the
    /// full cycle from the task's current status.
    pub fn toggle_target(&self, current: TaskStatus) -> TaskStatus {
        match self.status() {
            Some(tab_status) => tab_status.next(),
            None => current.next(),
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Some(Self::All),
            "not-started" | "not_started" | "notstarted" => Some(Self::NotStarted),
            "in-progress" | "in_progress" | "inprogress" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl Mirror<Task> {
    pub fn tab<'a>(&'a self, tab: TaskTab) -> impl Iterator<Item = &'a Task> + 'a {
        self.filter(move |t| tab.includes(t))
    }

    /// One column per status, in status order.
    pub fn kanban(&self) -> Vec<KanbanColumn<'_>> {
        TaskStatus::ALL
            .iter()
            .map(|&status| KanbanColumn {
                status,
                tasks: self.filter(move |t| t.status == status).collect(),
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct KanbanColumn<'a> {
    pub status: TaskStatus,
    pub tasks: Vec<&'a Task>,
}

impl KanbanColumn<'_> {
    pub fn count(&self) -> usize {
        self.tasks.len()
    }

    pub fn blurb(&self) -> &'static str {
        match self.status {
            TaskStatus::NotStarted => "Tasks that need to be started",
            TaskStatus::InProgress => "Tasks currently being worked on",
            TaskStatus::Completed => "Tasks that have been completed",
        }
    }
}
