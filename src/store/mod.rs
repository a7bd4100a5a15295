pub mod memory;
pub mod rest;

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::record::Record;
use crate::error::Result;

pub use memory::MemoryStore;
pub use rest::RestStore;

/// Owner-scoped CRUD over one remote collection.
///
/// Implementations must never return or touch a row owned by anyone other
/// than `owner`.
#[async_trait]
pub trait RecordStore<R: Record>: Send + Sync {
    /// Every row owned by `owner`, newest first.
    async fn select_by_owner(&self, owner: Uuid) -> Result<Vec<R>>;

    /// Insert a row for `owner`. The store assigns id and creation time and
    /// returns the stored row.
    async fn insert(&self, owner: Uuid, fields: &R::Patch) -> Result<R>;

    async fn update(&self, owner: Uuid, id: Uuid, fields: &R::Patch) -> Result<()>;

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<()>;
}
