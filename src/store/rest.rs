use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use super::RecordStore;
use crate::config::TaskpadConfig;
use crate::core::record::Record;
use crate::error::{Error, Result};
use crate::session::Session;

/// Error payload returned by the REST layer.
#[derive(Debug, Deserialize)]
struct StoreErrorBody {
    message: Option<String>,
    code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// HTTP client for a PostgREST-style store (`/rest/v1/<table>`), with
/// row-level security deciding what the access token may see.
#[derive(Clone)]
pub struct RestStore {
    base_url: String,
    anon_key: String,
    access_token: String,
    http: Client,
}

impl std::fmt::Debug for RestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl RestStore {
    pub fn new(base_url: &str, anon_key: &str, access_token: &str) -> Result<Self> {
        if base_url.trim().is_empty() || anon_key.trim().is_empty() {
            return Err(Error::RemoteUnavailable(
                "Database connection not available".to_string(),
            ));
        }
        let http = Client::builder()
            .build()
            .map_err(|e| Error::RemoteUnavailable(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
            access_token: access_token.to_string(),
            http,
        })
    }

    /// Build a client from settings plus the current session's token.
    pub fn from_config(config: &TaskpadConfig, session: &Session) -> Result<Self> {
        let missing = config.missing_store_settings();
        if !missing.is_empty() {
            return Err(Error::RemoteUnavailable(format!(
                "Database connection not available (missing {})",
                missing.join(", ")
            )));
        }
        let token = session.access_token().ok_or(Error::Unauthenticated)?;
        Self::new(&config.store_url, &config.anon_key, token)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }
}

fn eq(value: Uuid) -> String {
    format!("eq.{}", value)
}

/// Turn a non-success response into [`Error::Store`].
async fn check(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    Err(store_error(status, &text))
}

fn store_error(status: StatusCode, body: &str) -> Error {
    let message = match serde_json::from_str::<StoreErrorBody>(body) {
        Ok(parsed) => {
            let mut message = parsed
                .message
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
            if let Some(details) = parsed.details.filter(|d| !d.is_empty()) {
                message.push_str(&format!(" ({})", details));
            }
            if let Some(hint) = parsed.hint.filter(|h| !h.is_empty()) {
                message.push_str(&format!(" hint: {}", hint));
            }
            if let Some(code) = parsed.code {
                log::debug!("Store error code {}", code);
            }
            message
        }
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    };
    Error::Store {
        status: status.as_u16(),
        message,
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for RestStore {
    async fn select_by_owner(&self, owner: Uuid) -> Result<Vec<R>> {
        log::debug!("GET {} for {}", R::TABLE, owner);
        let resp = self
            .request(Method::GET, R::TABLE)
            .query(&[
                ("select", "*".to_string()),
                ("user_id", eq(owner)),
                ("order", "created_at.desc".to_string()),
            ])
            .send()
            .await?;
        let rows = check(resp).await?.json::<Vec<R>>().await?;
        Ok(rows)
    }

    async fn insert(&self, owner: Uuid, fields: &R::Patch) -> Result<R> {
        let mut body = serde_json::to_value(fields)?;
        if let Some(map) = body.as_object_mut() {
            map.insert("user_id".to_string(), serde_json::Value::String(owner.to_string()));
        }
        log::debug!("POST {} for {}", R::TABLE, owner);
        let resp = self
            .request(Method::POST, R::TABLE)
            .header("Prefer", "return=representation")
            .json(&body)
            .send()
            .await?;
        let mut rows = check(resp).await?.json::<Vec<R>>().await?;
        if rows.is_empty() {
            return Err(Error::Store {
                status: StatusCode::OK.as_u16(),
                message: format!("insert into {} returned no row", R::TABLE),
            });
        }
        Ok(rows.swap_remove(0))
    }

    async fn update(&self, owner: Uuid, id: Uuid, fields: &R::Patch) -> Result<()> {
        log::debug!("PATCH {} {}", R::TABLE, id);
        let resp = self
            .request(Method::PATCH, R::TABLE)
            .query(&[("id", eq(id)), ("user_id", eq(owner))])
            .json(fields)
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<()> {
        log::debug!("DELETE {} {}", R::TABLE, id);
        let resp = self
            .request(Method::DELETE, R::TABLE)
            .query(&[("id", eq(id)), ("user_id", eq(owner))])
            .send()
            .await?;
        check(resp).await?;
        Ok(())
    }
}
