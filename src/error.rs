use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, Error>;

/// Everything a sync operation, draft or store call can fail with.
///
/// None of these are fatal to a session: callers log them and turn them into
/// a [`Notice`](crate::notice::Notice).
#[derive(Error, Debug)]
pub enum Error {
    /// A required field is missing or a field value could not be parsed.
    /// Raised before any remote call is attempted.
    #[error("{0}")]
    Validation(String),

    /// The store is not configured or could not be reached.
    #[error("store unavailable: {0}")]
    RemoteUnavailable(String),

    /// The store answered, but reported a failure.
    #[error("store error ({status}): {message}")]
    Store { status: u16, message: String },

    #[error("not signed in")]
    Unauthenticated,

    /// Another operation on the same record has not resolved yet.
    #[error("an operation on {0} is already in flight")]
    InFlight(Uuid),

    #[error("unknown {kind} field: {field}")]
    UnknownField { kind: &'static str, field: String },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("keyring: {0}")]
    Keyring(String),
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return Self::Store {
                status: e.status().map_or(200, |s| s.as_u16()),
                message: format!("unreadable response: {}", e),
            };
        }
        match e.status() {
            Some(status) => Self::Store {
                status: status.as_u16(),
                message: e.to_string(),
            },
            None => Self::RemoteUnavailable(e.to_string()),
        }
    }
}
