use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::Result;
use crate::sync::OverlapPolicy;

pub const CONFIG_FILE: &str = "config.json";

pub const ENV_URL: &str = "TASKPAD_URL";
pub const ENV_ANON_KEY: &str = "TASKPAD_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "TASKPAD_ACCESS_TOKEN";
pub const ENV_USER_ID: &str = "TASKPAD_USER_ID";
pub const ENV_DEBUG: &str = "TASKPAD_DEBUG";

fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("~/.config"))
        .join("taskpad")
}

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct TaskpadConfig {
    /// Base URL of the hosted store, e.g. `https://xyz.supabase.co`.
    pub store_url: String,
    /// Public API key sent with every request.
    pub anon_key: String,
    pub user_id: Option<Uuid>,
    /// Prefer the keyring; this is for throwaway setups and CI.
    pub access_token: Option<String>,
    pub debug_logging: bool,
    pub overlap_policy: OverlapPolicy,
}

impl TaskpadConfig {
    pub fn default_path() -> PathBuf {
        default_config_dir().join(CONFIG_FILE)
    }

    /// Read the config file (missing file means defaults), then apply
    /// environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_file(path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// The file contents alone. Anything that gets saved back starts from this,
    /// so environment values never end up on disk.
    pub fn load_file(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Overlay values from `lookup` (the process environment in practice).
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL).filter(|v| !v.is_empty()) {
            self.store_url = url;
        }
        if let Some(key) = lookup(ENV_ANON_KEY).filter(|v| !v.is_empty()) {
            self.anon_key = key;
        }
        if let Some(token) = lookup(ENV_ACCESS_TOKEN).filter(|v| !v.is_empty()) {
            self.access_token = Some(token);
        }
        if let Some(raw) = lookup(ENV_USER_ID) {
            match Uuid::parse_str(raw.trim()) {
                Ok(id) => self.user_id = Some(id),
                Err(e) => log::warn!("Ignoring {}: {}", ENV_USER_ID, e),
            }
        }
        if let Some(flag) = lookup(ENV_DEBUG) {
            self.debug_logging = matches!(flag.trim(), "1" | "true" | "yes" | "on");
        }
    }

    /// Record a sign-in. `file_token` is only set when the keyring could not
    /// take the token; otherwise any older file token is dropped so it cannot
    /// shadow the keyring one.
    pub fn record_login(&mut self, user_id: Uuid, file_token: Option<String>) {
        self.user_id = Some(user_id);
        self.access_token = file_token;
    }

    pub fn record_logout(&mut self) {
        self.user_id = None;
        self.access_token = None;
    }

    /// Names of the settings the store connection still needs.
    pub fn missing_store_settings(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.store_url.trim().is_empty() {
            missing.push(ENV_URL);
        }
        if self.anon_key.trim().is_empty() {
            missing.push(ENV_ANON_KEY);
        }
        missing
    }
}
