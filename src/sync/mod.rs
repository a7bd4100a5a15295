use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::draft::{Draft, DraftMode};
use crate::core::mirror::{Mirror, TaskTab};
use crate::core::record::Record;
use crate::core::task::{Task, TaskPatch, TaskStatus};
use crate::error::{Error, Result};
use crate::session::Session;
use crate::store::RecordStore;

/// What happens when a second edit on a record starts before the first
/// one has resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Both calls go out; the mirror ends up reflecting whichever response
    /// arrives last.
    #[default]
    LastResolvedWins,
    /// A second update/delete/status change on an id with an outstanding
    /// operation fails with [`Error::InFlight`] before reaching the store.
    RejectConcurrent,
}

/// Keeps one owner's mirror in step with a remote collection.
///
/// Each operation calls the store first and patches the mirror only if the
/// call succeeded. The mirror lock is never held across an await, so
/// operations may overlap.
pub struct SyncManager<R: Record, S: RecordStore<R>> {
    store: Arc<S>,
    owner: Uuid,
    policy: OverlapPolicy,
    mirror: Mutex<Mirror<R>>,
    in_flight: Mutex<HashSet<Uuid>>,
}

/// Releases an id from the in-flight set when the operation finishes or its
/// future is dropped.
struct InFlightGuard<'a> {
    set: &'a Mutex<HashSet<Uuid>>,
    id: Uuid,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

impl<R: Record, S: RecordStore<R>> SyncManager<R, S> {
    pub fn new(store: Arc<S>, owner: Uuid) -> Self {
        Self {
            store,
            owner,
            policy: OverlapPolicy::default(),
            mirror: Mutex::new(Mirror::default()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    /// Owner-scoped operations are refused outright without a signed-in user.
    pub fn for_session(store: Arc<S>, session: &Session) -> Result<Self> {
        Ok(Self::new(store, session.require_owner()?))
    }

    /// Mount with rows already read elsewhere.
    pub fn with_records(self, records: Vec<R>) -> Self {
        self.lock_mirror().initialize(records);
        self
    }

    pub fn with_policy(mut self, policy: OverlapPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn owner(&self) -> Uuid {
        self.owner
    }

    pub fn policy(&self) -> OverlapPolicy {
        self.policy
    }

    /// Run `f` against the current mirror.
    pub fn with_mirror<T>(&self, f: impl FnOnce(&Mirror<R>) -> T) -> T {
        f(&*self.lock_mirror())
    }

    pub fn snapshot(&self) -> Vec<R> {
        self.lock_mirror().records().to_vec()
    }

    pub fn get(&self, id: Uuid) -> Option<R> {
        self.lock_mirror().get(id).cloned()
    }

    /// True while an operation on `id` is outstanding under
    /// [`OverlapPolicy::RejectConcurrent`]. Front ends use this to disable
    /// the record's controls.
    pub fn is_in_flight(&self, id: Uuid) -> bool {
        self.in_flight
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&id)
    }

    fn lock_mirror(&self) -> MutexGuard<'_, Mirror<R>> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn claim(&self, id: Uuid) -> Result<Option<InFlightGuard<'_>>> {
        if self.policy == OverlapPolicy::LastResolvedWins {
            return Ok(None);
        }
        let mut set = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(id) {
            log::warn!("Rejecting overlapping {} operation on {}", R::KIND, id);
            return Err(Error::InFlight(id));
        }
        Ok(Some(InFlightGuard {
            set: &self.in_flight,
            id,
        }))
    }

    /// Await `call`; on success apply `on_success` to the mirror as it is at
    /// resolution time. On failure the mirror is left alone.
    async fn run<T, F, P>(&self, op: &'static str, call: F, on_success: P) -> Result<T>
    where
        F: Future<Output = Result<T>>,
        P: FnOnce(&mut Mirror<R>, &T),
    {
        match call.await {
            Ok(value) => {
                on_success(&mut *self.lock_mirror(), &value);
                log::info!("{} {} succeeded", op, R::KIND);
                Ok(value)
            }
            Err(e) => {
                log::error!("Failed to {} {}: {}", op, R::KIND, e);
                Err(e)
            }
        }
    }

    /// Replace the mirror with the owner's rows. A failed read is logged and
    /// shows up as an empty list.
    pub async fn list(&self) -> Vec<R> {
        self.refresh().await.unwrap_or_default()
    }

    /// Like [`list`](Self::list), but hands the read error back. The mirror
    /// is still left empty on failure.
    pub async fn refresh(&self) -> Result<Vec<R>> {
        let result = self
            .run("list", self.store.select_by_owner(self.owner), |mirror, rows: &Vec<R>| {
                mirror.initialize(rows.clone())
            })
            .await;
        if result.is_err() {
            self.lock_mirror().initialize(Vec::new());
        }
        result
    }

    /// Insert the draft's fields and prepend the stored row. The draft is
    /// closed on success and left open on any failure.
    pub async fn create(&self, draft: &mut Draft<R>) -> Result<R> {
        draft.validate_for_submit()?;
        let record = self
            .run("create", self.store.insert(self.owner, draft.fields()), |mirror, row: &R| {
                mirror.apply_create(row.clone())
            })
            .await?;
        draft.close();
        Ok(record)
    }

    /// Replace the mutable fields of `id`. The title must be present.
    pub async fn update(&self, id: Uuid, patch: R::Patch) -> Result<()> {
        R::validate(&patch)?;
        self.patch(id, patch, "update").await
    }

    /// Store call plus mirror merge without the submission check; status
    /// changes go through here.
    async fn patch(&self, id: Uuid, patch: R::Patch, op: &'static str) -> Result<()> {
        let _guard = self.claim(id)?;
        self.run(op, self.store.update(self.owner, id, &patch), |mirror, _: &()| {
            mirror.apply_update(id, &patch)
        })
        .await
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        let _guard = self.claim(id)?;
        self.run("delete", self.store.delete(self.owner, id), |mirror, _: &()| {
            mirror.apply_delete(id)
        })
        .await
    }

    /// Create or update depending on the draft's mode. Returns the id of the
    /// affected record.
    pub async fn submit(&self, draft: &mut Draft<R>) -> Result<Uuid> {
        match draft.mode() {
            DraftMode::Create => self.create(draft).await.map(|r| r.id()),
            DraftMode::Edit(id) => {
                draft.validate_for_submit()?;
                self.update(id, draft.fields().clone()).await?;
                draft.close();
                Ok(id)
            }
        }
    }
}

impl<S: RecordStore<Task>> SyncManager<Task, S> {
    /// Change only the status column.
    pub async fn set_status(&self, id: Uuid, status: TaskStatus) -> Result<()> {
        self.patch(id, TaskPatch::status_only(status), "change status of")
            .await
    }

    /// The status toggle as clicked from `tab`. Returns the status that was set.
    pub async fn toggle_status(&self, id: Uuid, tab: TaskTab) -> Result<TaskStatus> {
        let target = match (tab.status(), self.get(id)) {
            (Some(_), _) => tab.toggle_target(TaskStatus::NotStarted),
            (None, Some(task)) => tab.toggle_target(task.status),
            (None, None) => {
                return Err(Error::Validation(format!("Task {} is not in the list", id)));
            }
        };
        self.set_status(id, target).await?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::record::RecordPatch;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::oneshot;

    const OWNER: Uuid = Uuid::from_u128(0xA11CE);

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn task(id: u128, title: &str, status: TaskStatus) -> Task {
        Task::from_insert(
            Uuid::from_u128(id),
            OWNER,
            at(id as i64),
            &TaskPatch {
                title: Some(title.into()),
                status: Some(status),
                ..TaskPatch::defaults()
            },
        )
    }

    fn titled(title: &str) -> TaskPatch {
        TaskPatch {
            title: Some(title.into()),
            ..TaskPatch::default()
        }
    }

    /// Store double that records calls, can fail on demand, and can hold an
    /// update until the test releases it.
    #[derive(Default)]
    struct ScriptedStore {
        calls: AtomicUsize,
        fail_status: Option<u16>,
        rows: Vec<Task>,
        insert_result: Mutex<Option<Task>>,
        gates: Mutex<HashMap<String, oneshot::Receiver<()>>>,
    }

    impl ScriptedStore {
        fn failing(status: u16) -> Self {
            Self {
                fail_status: Some(status),
                ..Self::default()
            }
        }

        fn gate(&self, title: &str, rx: oneshot::Receiver<()>) {
            self.gates.lock().unwrap().insert(title.to_string(), rx);
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn outcome(&self) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.fail_status {
                Some(status) => Err(Error::Store {
                    status,
                    message: "permission denied".into(),
                }),
                None => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RecordStore<Task> for ScriptedStore {
        async fn select_by_owner(&self, _owner: Uuid) -> Result<Vec<Task>> {
            self.outcome()?;
            Ok(self.rows.clone())
        }

        async fn insert(&self, owner: Uuid, fields: &TaskPatch) -> Result<Task> {
            self.outcome()?;
            let scripted = self.insert_result.lock().unwrap().take();
            Ok(scripted.unwrap_or_else(|| Task::from_insert(Uuid::new_v4(), owner, Utc::now(), fields)))
        }

        async fn update(&self, _owner: Uuid, _id: Uuid, fields: &TaskPatch) -> Result<()> {
            let gate = fields
                .title
                .as_ref()
                .and_then(|t| self.gates.lock().unwrap().remove(t));
            if let Some(rx) = gate {
                let _ = rx.await;
            }
            self.outcome()
        }

        async fn delete(&self, _owner: Uuid, _id: Uuid) -> Result<()> {
            self.outcome()
        }
    }

    fn manager(store: ScriptedStore, records: Vec<Task>) -> (Arc<ScriptedStore>, SyncManager<Task, ScriptedStore>) {
        let store = Arc::new(store);
        let mgr = SyncManager::new(store.clone(), OWNER).with_records(records);
        (store, mgr)
    }

    #[tokio::test]
    async fn list_keeps_only_the_callers_rows() {
        let stranger = Uuid::from_u128(0xB0B);
        let mut theirs = task(9, "not mine", TaskStatus::NotStarted);
        theirs.user_id = stranger;
        let store = Arc::new(MemoryStore::with_rows(vec![
            task(1, "old", TaskStatus::NotStarted),
            theirs,
            task(2, "new", TaskStatus::Completed),
        ]));
        let session = Session::new(OWNER, "token");
        let mgr: SyncManager<Task, _> = SyncManager::for_session(store, &session).unwrap();

        let rows = mgr.list().await;
        let titles: Vec<_> = rows.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["new", "old"]);
        assert!(mgr.snapshot().iter().all(|t| t.user_id == OWNER));
    }

    #[test]
    fn anonymous_session_cannot_build_a_manager() {
        let store = Arc::new(MemoryStore::<Task>::new());
        assert!(matches!(
            SyncManager::<Task, _>::for_session(store, &Session::anonymous()),
            Err(Error::Unauthenticated)
        ));
    }

    #[tokio::test]
    async fn failed_list_renders_empty() {
        let (_, mgr) = manager(ScriptedStore::failing(500), vec![task(1, "A", TaskStatus::NotStarted)]);
        assert!(mgr.list().await.is_empty());
        assert!(mgr.with_mirror(|m| m.is_empty()));
    }

    #[tokio::test]
    async fn blank_title_never_reaches_the_store() {
        let (store, mgr) = manager(ScriptedStore::default(), Vec::new());
        let mut draft = Draft::<Task>::begin(None);
        draft.set_field("status", "Not started").unwrap();

        let err = mgr.create(&mut draft).await.unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert_eq!(store.calls(), 0);
        assert!(draft.is_open());
        assert!(mgr.with_mirror(|m| m.is_empty()));

        assert!(mgr.update(Uuid::from_u128(1), TaskPatch::default()).await.is_err());
        assert_eq!(store.calls(), 0);
    }

    #[tokio::test]
    async fn create_prepends_the_stored_row() {
        let stored = Task {
            id: Uuid::from_u128(2),
            title: "B".into(),
            ..task(2, "B", TaskStatus::NotStarted)
        };
        let store = ScriptedStore::default();
        *store.insert_result.lock().unwrap() = Some(stored.clone());
        let (_, mgr) = manager(store, Vec::new());

        let mut draft = Draft::<Task>::begin(None);
        draft.set_field("title", "B").unwrap();
        let created = mgr.create(&mut draft).await.unwrap();

        assert_eq!(created, stored);
        assert_eq!(mgr.snapshot(), vec![stored]);
        assert!(!draft.is_open());
    }

    #[tokio::test]
    async fn failed_create_keeps_draft_for_retry() {
        let (store, mgr) = manager(ScriptedStore::failing(403), vec![task(1, "A", TaskStatus::NotStarted)]);
        let mut draft = Draft::<Task>::begin(None);
        draft.set_field("title", "B").unwrap();

        assert!(matches!(mgr.create(&mut draft).await, Err(Error::Store { status: 403, .. })));
        assert_eq!(store.calls(), 1);
        assert!(draft.is_open());
        assert_eq!(draft.fields().title.as_deref(), Some("B"));
        assert_eq!(mgr.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn refresh_reports_failed_read() {
        let (_, mgr) = manager(ScriptedStore::failing(500), vec![task(1, "A", TaskStatus::NotStarted)]);
        assert!(matches!(mgr.refresh().await, Err(Error::Store { status: 500, .. })));
        assert!(mgr.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_update_keeps_mirror_and_draft() {
        let before = vec![task(1, "A", TaskStatus::NotStarted)];
        let (store, mgr) = manager(ScriptedStore::failing(500), before.clone());
        let mut draft = Draft::begin(Some(&before[0]));
        draft.set_field("title", "A edited").unwrap();

        assert!(matches!(mgr.submit(&mut draft).await, Err(Error::Store { status: 500, .. })));
        assert_eq!(store.calls(), 1);
        assert!(draft.is_open());
        assert!(draft.is_editing());
        assert_eq!(draft.fields().title.as_deref(), Some("A edited"));
        assert_eq!(mgr.snapshot(), before);
    }

    #[tokio::test]
    async fn status_change_patches_in_place() {
        let (_, mgr) = manager(ScriptedStore::default(), vec![task(1, "A", TaskStatus::NotStarted)]);
        mgr.set_status(Uuid::from_u128(1), TaskStatus::InProgress).await.unwrap();

        let rows = mgr.snapshot();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].title, "A");
        assert_eq!(rows[0].status, TaskStatus::InProgress);
    }

    #[tokio::test]
    async fn failed_status_change_leaves_mirror() {
        let before = vec![task(1, "A", TaskStatus::NotStarted)];
        let (_, mgr) = manager(ScriptedStore::failing(500), before.clone());
        assert!(mgr.set_status(Uuid::from_u128(1), TaskStatus::Completed).await.is_err());
        assert_eq!(mgr.snapshot(), before);
    }

    #[tokio::test]
    async fn toggle_follows_the_tab() {
        let (_, mgr) = manager(
            ScriptedStore::default(),
            vec![task(1, "A", TaskStatus::Completed), task(2, "B", TaskStatus::InProgress)],
        );
        let set = mgr.toggle_status(Uuid::from_u128(1), TaskTab::All).await.unwrap();
        assert_eq!(set, TaskStatus::NotStarted);
        let set = mgr.toggle_status(Uuid::from_u128(2), TaskTab::InProgress).await.unwrap();
        assert_eq!(set, TaskStatus::Completed);
        assert_eq!(mgr.get(Uuid::from_u128(2)).unwrap().status, TaskStatus::Completed);

        assert!(mgr.toggle_status(Uuid::from_u128(7), TaskTab::All).await.is_err());
    }

    #[tokio::test]
    async fn delete_removes_and_absent_is_noop() {
        let (_, mgr) = manager(ScriptedStore::default(), vec![task(2, "B", TaskStatus::NotStarted)]);
        mgr.delete(Uuid::from_u128(2)).await.unwrap();
        assert!(mgr.snapshot().is_empty());

        mgr.delete(Uuid::from_u128(2)).await.unwrap();
        assert!(mgr.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failed_delete_leaves_mirror() {
        let before = vec![task(2, "B", TaskStatus::NotStarted)];
        let (_, mgr) = manager(ScriptedStore::failing(403), before.clone());
        assert!(mgr.delete(Uuid::from_u128(2)).await.is_err());
        assert_eq!(mgr.snapshot(), before);
    }

    #[tokio::test]
    async fn overlapping_updates_last_resolved_wins() {
        let id = Uuid::from_u128(5);
        let (tx_first, rx_first) = oneshot::channel();
        let (tx_second, rx_second) = oneshot::channel();
        let store = ScriptedStore::default();
        store.gate("first", rx_first);
        store.gate("second", rx_second);
        let (_, mgr) = manager(store, vec![task(5, "original", TaskStatus::NotStarted)]);

        // The second-issued update resolves first; the first-issued one lands last.
        let release = async {
            tx_second.send(()).unwrap();
            while mgr.get(id).map(|t| t.title) != Some("second".to_string()) {
                tokio::task::yield_now().await;
            }
            tx_first.send(()).unwrap();
        };
        let (first, second, ()) = tokio::join!(
            mgr.update(id, titled("first")),
            mgr.update(id, titled("second")),
            release
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(mgr.get(id).unwrap().title, "first");
    }

    #[tokio::test]
    async fn reject_policy_refuses_second_edit() {
        let id = Uuid::from_u128(5);
        let (tx, rx) = oneshot::channel();
        let store = ScriptedStore::default();
        store.gate("slow", rx);
        let (store, mgr) = manager(store, vec![task(5, "original", TaskStatus::NotStarted)]);
        let mgr = mgr.with_policy(OverlapPolicy::RejectConcurrent);

        let second = async {
            while !mgr.is_in_flight(id) {
                tokio::task::yield_now().await;
            }
            let rejected = mgr.update(id, titled("fast")).await;
            let delete_rejected = mgr.delete(id).await;
            tx.send(()).unwrap();
            (rejected, delete_rejected)
        };
        let (first, (rejected, delete_rejected)) = tokio::join!(mgr.update(id, titled("slow")), second);

        first.unwrap();
        assert!(matches!(rejected, Err(Error::InFlight(x)) if x == id));
        assert!(matches!(delete_rejected, Err(Error::InFlight(_))));
        assert_eq!(store.calls(), 1);
        assert!(!mgr.is_in_flight(id));
        assert_eq!(mgr.get(id).unwrap().title, "slow");

        mgr.update(id, titled("later")).await.unwrap();
        assert_eq!(mgr.get(id).unwrap().title, "later");
    }

    #[tokio::test]
    async fn submit_round_trip_against_memory_store() {
        let store = Arc::new(MemoryStore::<Task>::new());
        let mgr: SyncManager<Task, _> = SyncManager::new(store.clone(), OWNER);
        mgr.list().await;

        let mut draft = Draft::<Task>::begin(None);
        draft.set_field("title", "Draft plan").unwrap();
        draft.set_field("priority", "High").unwrap();
        let id = mgr.submit(&mut draft).await.unwrap();

        let created = mgr.get(id).unwrap();
        let mut edit = Draft::begin(Some(&created));
        edit.set_field("assignee", "sam").unwrap();
        assert_eq!(mgr.submit(&mut edit).await.unwrap(), id);
        assert!(!edit.is_open());

        let remote = store.select_by_owner(OWNER).await.unwrap();
        assert_eq!(remote, mgr.snapshot());
        assert_eq!(remote[0].assignee.as_deref(), Some("sam"));

        mgr.delete(id).await.unwrap();
        assert!(store.is_empty());
        assert!(mgr.snapshot().is_empty());
    }
}
