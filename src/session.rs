use uuid::Uuid;

use crate::config::TaskpadConfig;
use crate::error::{Error, Result};

/// Who is signed in, as far as this process knows.
///
/// The sign-in handshake happens elsewhere; a session is built from an
/// already-issued user id and access token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    user_id: Option<Uuid>,
    access_token: Option<String>,
}

impl Session {
    pub fn new(user_id: Uuid, access_token: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id),
            access_token: Some(access_token.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Build from config, letting a keyring token stand in for a missing one.
    pub fn from_config(config: &TaskpadConfig, keyring_token: Option<String>) -> Self {
        let access_token = config
            .access_token
            .clone()
            .filter(|t| !t.trim().is_empty())
            .or(keyring_token);
        match (config.user_id, access_token) {
            (Some(user_id), Some(token)) => Self::new(user_id, token),
            (user_id, _) => {
                if user_id.is_some() {
                    log::warn!("User id configured without an access token");
                }
                Self::anonymous()
            }
        }
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// The owner identity for store calls.
    pub fn require_owner(&self) -> Result<Uuid> {
        self.user_id.ok_or(Error::Unauthenticated)
    }
}
