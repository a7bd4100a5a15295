use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::{Record, RecordPatch, contains_folded, optional_text};
use crate::error::{Error, Result};

/// Suggested values for the free-form task type tag.
pub const TASK_TYPES: [&str; 6] = [
    "Feature",
    "Bug",
    "Documentation",
    "Research",
    "Meeting",
    "Brain storm",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TaskStatus {
    #[default]
    #[serde(rename = "Not started")]
    NotStarted,
    #[serde(rename = "In progress")]
    InProgress,
    Completed,
}

impl TaskStatus {
    pub const ALL: [Self; 3] = [Self::NotStarted, Self::InProgress, Self::Completed];

    pub fn as_label(&self) -> &'static str {
        match self {
            Self::NotStarted => "Not started",
            Self::InProgress => "In progress",
            Self::Completed => "Completed",
        }
    }

    /// Accepts the wire label as well as kebab/snake forms typed on a command line.
    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace(['-', '_'], " ").as_str() {
            "not started" | "notstarted" | "todo" => Some(Self::NotStarted),
            "in progress" | "inprogress" | "doing" => Some(Self::InProgress),
            "completed" | "done" => Some(Self::Completed),
            _ => None,
        }
    }

    /// One step of the three-state cycle.
    pub fn next(&self) -> Self {
        match self {
            Self::NotStarted => Self::InProgress,
            Self::InProgress => Self::Completed,
            Self::Completed => Self::NotStarted,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EffortLevel {
    Small,
    Medium,
    Large,
}

impl EffortLevel {
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::Small => "Small",
            Self::Medium => "Medium",
            Self::Large => "Large",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "small" => Some(Self::Small),
            "medium" => Some(Self::Medium),
            "large" => Some(Self::Large),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    pub task_type: Option<String>,
    pub effort_level: Option<EffortLevel>,
    pub assignee: Option<String>,
    pub user_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Mutable task columns. Nullable columns are tri-state: `None` leaves the
/// column alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_type: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effort_level: Option<Option<EffortLevel>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<Option<String>>,
}

impl TaskPatch {
    pub fn status_only(status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }
}

impl RecordPatch for TaskPatch {
    fn defaults() -> Self {
        Self {
            title: Some(String::new()),
            status: Some(TaskStatus::NotStarted),
            priority: Some(Priority::Medium),
            ..Self::default()
        }
    }

    fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "title" => self.title = Some(value.to_string()),
            "description" => self.description = Some(optional_text(value)),
            "status" => {
                let status = TaskStatus::from_label(value)
                    .ok_or_else(|| Error::Validation(format!("Invalid status: {}", value)))?;
                self.status = Some(status);
            }
            "priority" => {
                let priority = Priority::from_label(value)
                    .ok_or_else(|| Error::Validation(format!("Invalid priority: {}", value)))?;
                self.priority = Some(priority);
            }
            "due_date" | "due" => {
                let date = match optional_text(value) {
                    Some(s) => Some(
                        NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                            .map_err(|_| Error::Validation(format!("Invalid due date: {}", value)))?,
                    ),
                    None => None,
                };
                self.due_date = Some(date);
            }
            "task_type" | "type" => self.task_type = Some(optional_text(value)),
            "effort_level" | "effort" => {
                let effort = match optional_text(value) {
                    Some(s) => Some(
                        EffortLevel::from_label(&s)
                            .ok_or_else(|| Error::Validation(format!("Invalid effort level: {}", value)))?,
                    ),
                    None => None,
                };
                self.effort_level = Some(effort);
            }
            "assignee" => self.assignee = Some(optional_text(value)),
            _ => {
                return Err(Error::UnknownField {
                    kind: Task::KIND,
                    field: name.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl Record for Task {
    type Patch = TaskPatch;

    const KIND: &'static str = "task";
    const LABEL: &'static str = "Task";
    const TABLE: &'static str = "tasks";

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

    fn apply_patch(&mut self, patch: &TaskPatch) {
        if let Some(ref title) = patch.title {
            self.title = title.clone();
        }
        if let Some(ref description) = patch.description {
            self.description = description.clone();
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(priority) = patch.priority {
            self.priority = priority;
        }
        if let Some(due_date) = patch.due_date {
            self.due_date = due_date;
        }
        if let Some(ref task_type) = patch.task_type {
            self.task_type = task_type.clone();
        }
        if let Some(effort_level) = patch.effort_level {
            self.effort_level = effort_level;
        }
        if let Some(ref assignee) = patch.assignee {
            self.assignee = assignee.clone();
        }
    }

    fn to_patch(&self) -> TaskPatch {
        TaskPatch {
            title: Some(self.title.clone()),
            description: Some(self.description.clone()),
            status: Some(self.status),
            priority: Some(self.priority),
            due_date: Some(self.due_date),
            task_type: Some(self.task_type.clone()),
            effort_level: Some(self.effort_level),
            assignee: Some(self.assignee.clone()),
        }
    }

    fn from_insert(id: Uuid, owner: Uuid, created_at: DateTime<Utc>, patch: &TaskPatch) -> Self {
        let mut task = Self {
            id,
            title: String::new(),
            description: None,
            status: TaskStatus::NotStarted,
            priority: Priority::Medium,
            due_date: None,
            task_type: None,
            effort_level: None,
            assignee: None,
            user_id: owner,
            created_at,
        };
        task.apply_patch(patch);
        task
    }

    fn matches_query(&self, query: &str) -> bool {
        contains_folded(&self.title, query)
            || self
                .description
                .as_deref()
                .is_some_and(|d| contains_folded(d, query))
    }
}
