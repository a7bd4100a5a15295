use std::fmt;

use crate::core::record::Record;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Success,
    Error,
}

/// A transient notification for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: &'static str,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    Delete,
    StatusChange,
}

impl Notice {
    pub fn success(description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            title: "Success",
            description: description.into(),
        }
    }

    pub fn error(description: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: "Error",
            description: description.into(),
        }
    }

    /// The notice to show after `op` on a record of kind `R` finished with
    /// `result`. Status changes only notify on failure.
    pub fn for_result<R: Record, T>(op: Operation, result: &Result<T>) -> Option<Self> {
        match result {
            Ok(_) => match op {
                Operation::Create => Some(Self::success(format!("{} created successfully", R::LABEL))),
                Operation::Update => Some(Self::success(format!("{} updated successfully", R::LABEL))),
                Operation::Delete => Some(Self::success(format!("{} deleted successfully", R::LABEL))),
                Operation::StatusChange => None,
            },
            Err(e) => Some(Self::from_error::<R>(op, e)),
        }
    }

    fn from_error<R: Record>(op: Operation, e: &Error) -> Self {
        let description = match e {
            Error::Validation(msg) => msg.clone(),
            Error::RemoteUnavailable(_) => "Database connection not available".to_string(),
            Error::Store { message, .. } if !message.trim().is_empty() => message.clone(),
            Error::Store { .. } => fallback::<R>(op),
            other => other.to_string(),
        };
        Self::error(description)
    }
}

fn fallback<R: Record>(op: Operation) -> String {
    let kind = R::KIND;
    match op {
        Operation::Create | Operation::Update => format!("Failed to save {}", kind),
        Operation::Delete => format!("Failed to delete {}", kind),
        Operation::StatusChange => format!("Failed to update {} status", kind),
    }
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title, self.description)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::note::Note;
    use crate::core::task::Task;

    #[test]
    fn success_wording_per_kind() {
        let ok: Result<()> = Ok(());
        assert_eq!(
            Notice::for_result::<Task, _>(Operation::Create, &ok).unwrap().description,
            "Task created successfully"
        );
        assert_eq!(
            Notice::for_result::<Note, _>(Operation::Delete, &ok).unwrap().description,
            "Note deleted successfully"
        );
        assert_eq!(Notice::for_result::<Task, _>(Operation::StatusChange, &ok), None);
    }

    #[test]
    fn errors_map_to_user_text() {
        let unavailable: Result<()> = Err(Error::RemoteUnavailable("no url".into()));
        let notice = Notice::for_result::<Task, _>(Operation::Create, &unavailable).unwrap();
        assert_eq!(notice.level, NoticeLevel::Error);
        assert_eq!(notice.to_string(), "Error: Database connection not available");

        let blank: Result<()> = Err(Error::Store { status: 500, message: String::new() });
        assert_eq!(
            Notice::for_result::<Task, _>(Operation::StatusChange, &blank).unwrap().description,
            "Failed to update task status"
        );

        let invalid: Result<()> = Err(Error::Validation("Note title is required".into()));
        assert_eq!(
            Notice::for_result::<Note, _>(Operation::Create, &invalid).unwrap().description,
            "Note title is required"
        );
    }
}
