//! Reconciliation engine.
//!
//! Each direction walks every item on its source side and moves it through
//! a small per-item state machine, evaluated fresh on every pass:
//!
//! ```text
//! UNMAPPED --create counterpart-----------> MAPPED
//! MAPPED   --counterpart missing/unreached-> STALE   (skip, no writes)
//! MAPPED   --fields differ----------------> MAPPED  (update issued)
//! MAPPED   --fields equal-----------------> MAPPED  (no-op)
//! ```
//!
//! Per-item remote failures are logged and recorded in the
//! [`DirectionReport`]; they never abort the pass. Store failures do.
//!
//! Tracker→Board diffs a mapped item only when the tracker's `updated_at`
//! moved past the version recorded by the last complete push. A pair whose
//! Tracker→Board push failed is left alone by the following Board→Tracker
//! run, so a half-written board task is never copied back onto the tracker.

use std::collections::HashSet;

use tandem_core::{
    normalize::{canonical_from_board, canonical_from_tracker, fields_equal, strip_url_trailer},
    status::completion_to_open_state,
    BoardId, BoardItem, CanonicalView, FieldChanges, Mapping, SyncDirection, TrackerItem,
};

use crate::error::{PortError, StoreError, SyncError};
use crate::mapping_store::{MappingKey, MappingStore, TouchOutcome};
use crate::ports::{BoardPort, CoreUpdate, NewTrackerItem, TrackerPort, TrackerUpdate};

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Why an item was left alone this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Closed tracker item with no board counterpart.
    ClosedUnmapped,
    /// Finished board task with no tracker counterpart.
    CompleteUnmapped,
    /// Mapped counterpart missing or unreachable.
    Stale,
    /// The last Tracker→Board push for this pair failed; the board task may
    /// be half-written.
    Unsettled,
}

/// What happened to a single item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Created,
    /// Counterpart created and mapped, but a follow-up write failed. The next
    /// pass repairs the fields through the mapped path.
    CreatedIncomplete(PortError),
    Updated,
    Unchanged,
    Skipped(SkipReason),
}

/// A per-item failure that was logged and skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub item: String,
    pub error: PortError,
}

/// Counts for one direction of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectionReport {
    pub direction: SyncDirection,
    pub seen: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped: usize,
    pub failures: Vec<ItemFailure>,
}

impl DirectionReport {
    fn new(direction: SyncDirection) -> Self {
        Self {
            direction,
            seen: 0,
            created: 0,
            updated: 0,
            unchanged: 0,
            skipped: 0,
            failures: Vec::new(),
        }
    }

    fn record(&mut self, item: &str, outcome: ItemOutcome) {
        self.seen += 1;
        match outcome {
            ItemOutcome::Created => self.created += 1,
            ItemOutcome::CreatedIncomplete(error) => {
                self.created += 1;
                self.failures.push(ItemFailure {
                    item: item.to_string(),
                    error,
                });
            }
            ItemOutcome::Updated => self.updated += 1,
            ItemOutcome::Unchanged => self.unchanged += 1,
            ItemOutcome::Skipped(_) => self.skipped += 1,
        }
    }

    fn fail(&mut self, item: &str, error: PortError) {
        self.seen += 1;
        self.failures.push(ItemFailure {
            item: item.to_string(),
            error,
        });
    }
}

/// Which tracker items Tracker→Board considers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackerScope {
    /// Full history, open and closed.
    #[default]
    All,
    /// Open items only. Closed items never reach the board and mapped items
    /// closed upstream are not propagated.
    Open,
}

// ---------------------------------------------------------------------------
// Per-item errors
// ---------------------------------------------------------------------------

enum ItemError {
    Port(PortError),
    Store(StoreError),
}

impl From<PortError> for ItemError {
    fn from(err: PortError) -> Self {
        ItemError::Port(err)
    }
}

impl From<StoreError> for ItemError {
    fn from(err: StoreError) -> Self {
        ItemError::Store(err)
    }
}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

/// Owns both ports and the mapping store for the lifetime of the process.
pub struct Reconciler<T, B> {
    tracker: T,
    board: B,
    store: MappingStore,
    scope: TrackerScope,
    unsettled: HashSet<BoardId>,
}

impl<T: TrackerPort, B: BoardPort> Reconciler<T, B> {
    pub fn new(tracker: T, board: B, store: MappingStore) -> Self {
        Self {
            tracker,
            board,
            store,
            scope: TrackerScope::All,
            unsettled: HashSet::new(),
        }
    }

    pub fn with_scope(mut self, scope: TrackerScope) -> Self {
        self.scope = scope;
        self
    }

    pub fn tracker(&self) -> &T {
        &self.tracker
    }

    pub fn board(&self) -> &B {
        &self.board
    }

    pub fn store(&self) -> &MappingStore {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Tracker → Board
    // -----------------------------------------------------------------------

    /// Push every tracker item onto the board.
    pub fn tracker_to_board(&mut self) -> Result<DirectionReport, SyncError> {
        let items = match self.scope {
            TrackerScope::All => self.tracker.list_all()?,
            TrackerScope::Open => self.tracker.list_open()?,
        };
        tracing::info!("tracker->board: {} tracker item(s)", items.len());

        self.unsettled.clear();
        let mut report = DirectionReport::new(SyncDirection::FromTracker);
        for item in &items {
            let label = format!("#{}", item.id);
            match self.push_tracker_item(item) {
                Ok(outcome) => report.record(&label, outcome),
                Err(ItemError::Port(err)) => {
                    tracing::warn!("tracker item {label} skipped: {err}");
                    report.fail(&label, err);
                }
                Err(ItemError::Store(err)) => return Err(SyncError::Store(err)),
            }
        }
        Ok(report)
    }

    fn push_tracker_item(&mut self, item: &TrackerItem) -> Result<ItemOutcome, ItemError> {
        let wanted = canonical_from_tracker(item);

        let Some(mapping) = self.store.get(&item.id)? else {
            if item.state.is_closed() {
                tracing::debug!("tracker item #{} is closed and unmapped; not pushed", item.id);
                return Ok(ItemOutcome::Skipped(SkipReason::ClosedUnmapped));
            }
            return self.create_board_item(item, &wanted);
        };

        let current = match self.board.get(&mapping.board_id) {
            Ok(Some(task)) => task,
            Ok(None) => {
                tracing::warn!(
                    "board task {} for tracker item #{} not found; skipping",
                    mapping.board_id,
                    item.id
                );
                return Ok(ItemOutcome::Skipped(SkipReason::Stale));
            }
            Err(err) => {
                tracing::warn!(
                    "board task {} for tracker item #{} unreachable: {err}",
                    mapping.board_id,
                    item.id
                );
                return Ok(ItemOutcome::Skipped(SkipReason::Stale));
            }
        };

        let outcome = if unchanged_since_last_push(item, &mapping) {
            tracing::debug!("tracker item #{} unchanged since last sync", item.id);
            ItemOutcome::Unchanged
        } else {
            let changes = canonical_from_board(&current).differences(&wanted);
            if changes.any() {
                if let Err(err) = self.apply_board_changes(&mapping.board_id, &wanted, changes) {
                    self.unsettled.insert(mapping.board_id.clone());
                    return Err(err.into());
                }
                tracing::info!(
                    "updated board task {} from tracker item #{} ({})",
                    mapping.board_id,
                    item.id,
                    describe(changes)
                );
                ItemOutcome::Updated
            } else {
                ItemOutcome::Unchanged
            }
        };

        self.touch(MappingKey::Tracker(&item.id))?;
        self.record_version(item)?;
        Ok(outcome)
    }

    fn create_board_item(
        &mut self,
        item: &TrackerItem,
        wanted: &CanonicalView,
    ) -> Result<ItemOutcome, ItemError> {
        let task = self.board.create(&item.title)?;
        // Persist before the follow-up writes so a failure below can never
        // lead to a second create on the next pass. The tracker version
        // stays unset until the follow-ups land.
        self.store.upsert(&item.id, &task.id)?;
        tracing::info!("created board task {} for tracker item #{}", task.id, item.id);

        let changes = canonical_from_board(&task).differences(wanted);
        let changes = FieldChanges {
            title: false,
            ..changes
        };
        match self.apply_board_changes(&task.id, wanted, changes) {
            Ok(()) => {
                self.record_version(item)?;
                Ok(ItemOutcome::Created)
            }
            Err(err) => {
                tracing::warn!(
                    "board task {} created but follow-up update failed: {err}",
                    task.id
                );
                self.unsettled.insert(task.id);
                Ok(ItemOutcome::CreatedIncomplete(err))
            }
        }
    }

    /// Write the changed fields, fetching a fresh token right before each write.
    fn apply_board_changes(
        &self,
        board_id: &BoardId,
        wanted: &CanonicalView,
        changes: FieldChanges,
    ) -> Result<(), PortError> {
        if changes.core() {
            let update = CoreUpdate {
                title: changes.title.then(|| wanted.title.clone()),
                completion: changes.completion.then_some(wanted.completion),
            };
            let token = self.board.core_token(board_id)?;
            self.board.update_core(board_id, &update, &token)?;
        }
        if changes.description {
            let token = self.board.details_token(board_id)?;
            self.board
                .update_details(board_id, &wanted.description, &token)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Board → Tracker
    // -----------------------------------------------------------------------

    /// Push every board task onto the tracker.
    pub fn board_to_tracker(&mut self) -> Result<DirectionReport, SyncError> {
        let tasks = self.board.list_tasks()?;
        tracing::info!("board->tracker: {} board task(s)", tasks.len());

        let mut report = DirectionReport::new(SyncDirection::FromBoard);
        for task in &tasks {
            match self.push_board_item(task) {
                Ok(outcome) => report.record(&task.id.0, outcome),
                Err(ItemError::Port(err)) => {
                    tracing::warn!("board task {} skipped: {err}", task.id);
                    report.fail(&task.id.0, err);
                }
                Err(ItemError::Store(err)) => return Err(SyncError::Store(err)),
            }
        }
        Ok(report)
    }

    fn push_board_item(&mut self, task: &BoardItem) -> Result<ItemOutcome, ItemError> {
        let body = strip_url_trailer(task.description.as_deref().unwrap_or_default());

        let Some(tracker_id) = self.store.lookup_by_board(&task.id)? else {
            if task.is_complete() {
                tracing::debug!("board task {} is complete and unmapped; not pushed", task.id);
                return Ok(ItemOutcome::Skipped(SkipReason::CompleteUnmapped));
            }
            let issue = self.tracker.create(&NewTrackerItem {
                title: task.title.clone(),
                body,
                labels: Vec::new(),
            })?;
            self.store.upsert(&issue.id, &task.id)?;
            tracing::info!("created tracker item #{} for board task {}", issue.id, task.id);
            return Ok(ItemOutcome::Created);
        };

        if self.unsettled.contains(&task.id) {
            tracing::debug!(
                "board task {} has a pending tracker->board repair; not pushed",
                task.id
            );
            return Ok(ItemOutcome::Skipped(SkipReason::Unsettled));
        }

        let issue = match self.tracker.get(&tracker_id) {
            Ok(Some(issue)) => issue,
            Ok(None) => {
                tracing::warn!(
                    "tracker item #{tracker_id} for board task {} not found; skipping",
                    task.id
                );
                return Ok(ItemOutcome::Skipped(SkipReason::Stale));
            }
            Err(err) => {
                tracing::warn!(
                    "tracker item #{tracker_id} for board task {} unreachable: {err}",
                    task.id
                );
                return Ok(ItemOutcome::Skipped(SkipReason::Stale));
            }
        };

        let state = completion_to_open_state(task.completion);
        let update = TrackerUpdate {
            title: (!fields_equal(Some(&issue.title), Some(&task.title)))
                .then(|| task.title.clone()),
            body: (!fields_equal(issue.body.as_deref(), Some(&body))).then_some(body),
            state: (issue.state != state).then_some(state),
        };

        let outcome = if update.is_empty() {
            ItemOutcome::Unchanged
        } else {
            self.tracker.update(&tracker_id, &update)?;
            tracing::info!("updated tracker item #{tracker_id} from board task {}", task.id);
            ItemOutcome::Updated
        };

        self.touch(MappingKey::Board(&task.id))?;
        Ok(outcome)
    }

    fn touch(&self, key: MappingKey<'_>) -> Result<(), StoreError> {
        if self.store.touch(key)? == TouchOutcome::NotFound {
            tracing::warn!("no mapping to touch for {key:?} ({})", key.direction());
        }
        Ok(())
    }

    fn record_version(&self, item: &TrackerItem) -> Result<(), StoreError> {
        if self.store.record_tracker_version(&item.id, item.updated_at)? == TouchOutcome::NotFound {
            tracing::warn!("no mapping to record tracker item #{} against", item.id);
        }
        Ok(())
    }
}

/// True when the tracker's `updated_at` has not moved since the last
/// complete push, so any difference on the board is a board-side edit that
/// must not be overwritten. Both sides of the comparison come from the
/// tracker's clock.
fn unchanged_since_last_push(item: &TrackerItem, mapping: &Mapping) -> bool {
    match (item.updated_at, mapping.tracker_updated_at) {
        (Some(updated_at), Some(seen)) => updated_at <= seen,
        _ => false,
    }
}

fn describe(changes: FieldChanges) -> String {
    let mut fields = Vec::new();
    if changes.title {
        fields.push("title");
    }
    if changes.completion {
        fields.push("completion");
    }
    if changes.description {
        fields.push("description");
    }
    fields.join(", ")
}
