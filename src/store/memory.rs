use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::RecordStore;
use crate::core::record::Record;
use crate::error::{Error, Result};

struct Rows<R> {
    rows: Vec<R>,
    last_created: Option<DateTime<Utc>>,
}

/// In-process store with the same owner rules as the hosted one.
///
/// Ids are random v4 uuids and creation times are strictly increasing, so
/// newest-first ordering is stable even for back-to-back inserts.
pub struct MemoryStore<R: Record> {
    inner: Mutex<Rows<R>>,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> MemoryStore<R> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Rows {
                rows: Vec::new(),
                last_created: None,
            }),
        }
    }

    /// Seed rows as if another session had created them.
    pub fn with_rows(rows: Vec<R>) -> Self {
        let last_created = rows.iter().map(|r| r.created_at()).max();
        Self {
            inner: Mutex::new(Rows { rows, last_created }),
        }
    }

    /// Total row count across all owners.
    pub fn len(&self) -> usize {
        self.lock().rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Rows<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<R> Rows<R> {
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_created {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_created = Some(ts);
        ts
    }
}

fn forbidden(kind: &str, id: Uuid) -> Error {
    Error::Store {
        status: 403,
        message: format!("{} {} belongs to another user", kind, id),
    }
}

#[async_trait]
impl<R: Record> RecordStore<R> for MemoryStore<R> {
    async fn select_by_owner(&self, owner: Uuid) -> Result<Vec<R>> {
        let mut rows: Vec<R> = self
            .lock()
            .rows
            .iter()
            .filter(|r| r.owner() == owner)
            .cloned()
            .collect();
        rows.sort_by_key(|r| std::cmp::Reverse(r.created_at()));
        Ok(rows)
    }

    async fn insert(&self, owner: Uuid, fields: &R::Patch) -> Result<R> {
        let mut inner = self.lock();
        let created_at = inner.next_timestamp();
        let record = R::from_insert(Uuid::new_v4(), owner, created_at, fields);
        inner.rows.push(record.clone());
        Ok(record)
    }

    async fn update(&self, owner: Uuid, id: Uuid, fields: &R::Patch) -> Result<()> {
        let mut inner = self.lock();
        if let Some(row) = inner.rows.iter_mut().find(|r| r.id() == id) {
            if row.owner() != owner {
                return Err(forbidden(R::KIND, id));
            }
            row.apply_patch(fields);
        }
        Ok(())
    }

    async fn delete(&self, owner: Uuid, id: Uuid) -> Result<()> {
        let mut inner = self.lock();
        if inner.rows.iter().any(|r| r.id() == id && r.owner() != owner) {
            return Err(forbidden(R::KIND, id));
        }
        inner.rows.retain(|r| r.id() != id);
        Ok(())
    }
}
