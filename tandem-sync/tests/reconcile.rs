//! Reconciliation behaviour against in-memory ports that record every call.

use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use chrono::{DateTime, Duration, TimeZone, Utc};
use tandem_core::{BoardId, BoardItem, ConcurrencyToken, ItemState, TrackerId, TrackerItem};
use tandem_sync::{
    pipeline, BoardPort, CoreUpdate, DirectionResult, ManualClock, MappingStore, NewTrackerItem,
    PortError, Reconciler, StoreError, SyncError, TrackerPort, TrackerScope, TrackerUpdate,
};

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone)]
struct TrackerState {
    items: BTreeMap<String, TrackerItem>,
    next_number: u64,
    creates: Vec<NewTrackerItem>,
    updates: Vec<(TrackerId, TrackerUpdate)>,
    unreachable: HashSet<String>,
    fail_listing: bool,
}

#[derive(Debug, Default)]
struct FakeTracker {
    state: Mutex<TrackerState>,
}

impl FakeTracker {
    fn with(items: Vec<TrackerItem>) -> Self {
        let tracker = Self::default();
        {
            let mut state = tracker.state.lock().unwrap();
            state.next_number = 100;
            for item in items {
                state.items.insert(item.id.0.clone(), item);
            }
        }
        tracker
    }

    fn snapshot(&self) -> TrackerState {
        self.state.lock().unwrap().clone()
    }

    fn edit(&self, f: impl FnOnce(&mut TrackerState)) {
        f(&mut *self.state.lock().unwrap());
    }
}

impl TrackerPort for FakeTracker {
    fn list_open(&self) -> Result<Vec<TrackerItem>, PortError> {
        Ok(self
            .list_all()?
            .into_iter()
            .filter(|item| item.state == ItemState::Open)
            .collect())
    }

    fn list_all(&self) -> Result<Vec<TrackerItem>, PortError> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(PortError::transport("list issues", "connection reset"));
        }
        Ok(state.items.values().cloned().collect())
    }

    fn get(&self, id: &TrackerId) -> Result<Option<TrackerItem>, PortError> {
        let state = self.state.lock().unwrap();
        if state.unreachable.contains(&id.0) {
            return Err(PortError::transport("get issue", "timed out"));
        }
        Ok(state.items.get(&id.0).cloned())
    }

    fn create(&self, item: &NewTrackerItem) -> Result<TrackerItem, PortError> {
        let mut state = self.state.lock().unwrap();
        state.next_number += 1;
        let id = TrackerId::from(state.next_number);
        let created = TrackerItem {
            id: id.clone(),
            title: item.title.clone(),
            body: Some(item.body.clone()).filter(|body| !body.is_empty()),
            state: ItemState::Open,
            labels: item.labels.clone(),
            url: issue_url(&id.0),
            updated_at: None,
        };
        state.items.insert(id.0.clone(), created.clone());
        state.creates.push(item.clone());
        Ok(created)
    }

    fn update(&self, id: &TrackerId, update: &TrackerUpdate) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        state.updates.push((id.clone(), update.clone()));
        let Some(item) = state.items.get_mut(&id.0) else {
            return Err(PortError::Status {
                operation: "update issue".to_string(),
                status: 404,
            });
        };
        if let Some(title) = &update.title {
            item.title = title.clone();
        }
        if let Some(body) = &update.body {
            item.body = Some(body.clone());
        }
        if let Some(state) = update.state {
            item.state = state;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct StoredTask {
    item: BoardItem,
    details_etag: u64,
}

#[derive(Debug, Default, Clone)]
struct BoardState {
    tasks: BTreeMap<String, StoredTask>,
    next_task: u64,
    creates: Vec<String>,
    core_updates: Vec<(BoardId, CoreUpdate)>,
    detail_updates: Vec<(BoardId, String)>,
    token_fetches: usize,
    conflict_on_core: HashSet<String>,
    fail_details: HashSet<String>,
    fail_listing: bool,
}

#[derive(Debug, Default)]
struct FakeBoard {
    state: Mutex<BoardState>,
}

impl FakeBoard {
    fn with(tasks: Vec<BoardItem>) -> Self {
        let board = Self::default();
        {
            let mut state = board.state.lock().unwrap();
            for item in tasks {
                state.tasks.insert(
                    item.id.0.clone(),
                    StoredTask {
                        item,
                        details_etag: 1,
                    },
                );
            }
        }
        board
    }

    fn snapshot(&self) -> BoardState {
        self.state.lock().unwrap().clone()
    }

    fn edit(&self, f: impl FnOnce(&mut BoardState)) {
        f(&mut *self.state.lock().unwrap());
    }

    fn task(&self, id: &str) -> BoardItem {
        self.snapshot().tasks[id].item.clone()
    }
}

fn bump(token: &ConcurrencyToken) -> ConcurrencyToken {
    let n: u64 = token.0.parse().unwrap_or(0);
    ConcurrencyToken::from((n + 1).to_string())
}

impl BoardPort for FakeBoard {
    fn list_tasks(&self) -> Result<Vec<BoardItem>, PortError> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(PortError::Auth {
                reason: "token request rejected".to_string(),
            });
        }
        Ok(state.tasks.values().map(|task| task.item.clone()).collect())
    }

    fn get(&self, id: &BoardId) -> Result<Option<BoardItem>, PortError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .tasks
            .get(&id.0)
            .map(|task| task.item.clone()))
    }

    fn create(&self, title: &str) -> Result<BoardItem, PortError> {
        let mut state = self.state.lock().unwrap();
        state.next_task += 1;
        let item = BoardItem {
            id: BoardId::from(format!("task-{}", state.next_task)),
            title: title.to_string(),
            description: None,
            completion: 0,
            token: ConcurrencyToken::from("1"),
        };
        state.creates.push(title.to_string());
        state.tasks.insert(
            item.id.0.clone(),
            StoredTask {
                item: item.clone(),
                details_etag: 1,
            },
        );
        Ok(item)
    }

    fn core_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError> {
        let mut state = self.state.lock().unwrap();
        state.token_fetches += 1;
        state
            .tasks
            .get(&id.0)
            .map(|task| task.item.token.clone())
            .ok_or_else(|| PortError::Status {
                operation: "get task".to_string(),
                status: 404,
            })
    }

    fn details_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError> {
        let mut state = self.state.lock().unwrap();
        state.token_fetches += 1;
        state
            .tasks
            .get(&id.0)
            .map(|task| ConcurrencyToken::from(task.details_etag.to_string()))
            .ok_or_else(|| PortError::Status {
                operation: "get task details".to_string(),
                status: 404,
            })
    }

    fn update_core(
        &self,
        id: &BoardId,
        update: &CoreUpdate,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        state.core_updates.push((id.clone(), update.clone()));
        if state.conflict_on_core.contains(&id.0) {
            return Err(PortError::Conflict { id: id.0.clone() });
        }
        let task = state.tasks.get_mut(&id.0).expect("task exists");
        if &task.item.token != token {
            return Err(PortError::Conflict { id: id.0.clone() });
        }
        if let Some(title) = &update.title {
            task.item.title = title.clone();
        }
        if let Some(completion) = update.completion {
            task.item.completion = completion;
        }
        task.item.token = bump(&task.item.token);
        Ok(())
    }

    fn update_details(
        &self,
        id: &BoardId,
        description: &str,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError> {
        let mut state = self.state.lock().unwrap();
        state
            .detail_updates
            .push((id.clone(), description.to_string()));
        if state.fail_details.contains(&id.0) {
            return Err(PortError::transport("update details", "gateway timeout"));
        }
        let task = state.tasks.get_mut(&id.0).expect("task exists");
        if token.0 != task.details_etag.to_string() {
            return Err(PortError::Conflict { id: id.0.clone() });
        }
        task.item.description = Some(description.to_string());
        task.details_etag += 1;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
}

fn issue_url(number: &str) -> String {
    format!("https://github.com/acme/widgets/issues/{number}")
}

fn issue(number: &str, title: &str, body: Option<&str>, state: ItemState, labels: &[&str]) -> TrackerItem {
    TrackerItem {
        id: TrackerId::from(number),
        title: title.to_string(),
        body: body.map(str::to_string),
        state,
        labels: labels.iter().map(|l| l.to_string()).collect(),
        url: issue_url(number),
        updated_at: None,
    }
}

fn task(id: &str, title: &str, description: Option<&str>, completion: u8) -> BoardItem {
    BoardItem {
        id: BoardId::from(id),
        title: title.to_string(),
        description: description.map(str::to_string),
        completion,
        token: ConcurrencyToken::from("1"),
    }
}

type TestReconciler = Reconciler<FakeTracker, FakeBoard>;

fn reconciler(tracker: FakeTracker, board: FakeBoard) -> (TestReconciler, ManualClock) {
    init_logging();
    let clock = ManualClock::new(t0());
    let store = MappingStore::open_in_memory_with_clock(Box::new(clock.clone())).unwrap();
    (Reconciler::new(tracker, board, store), clock)
}

fn seeded(
    tracker: FakeTracker,
    board: FakeBoard,
    links: &[(&str, &str)],
) -> (TestReconciler, ManualClock) {
    init_logging();
    let clock = ManualClock::new(t0());
    let mut store = MappingStore::open_in_memory_with_clock(Box::new(clock.clone())).unwrap();
    let items = tracker.snapshot().items;
    for (tracker_id, board_id) in links {
        let tracker_id = TrackerId::from(*tracker_id);
        store.upsert(&tracker_id, &BoardId::from(*board_id)).unwrap();
        // Seeded pairs count as fully pushed at the issue's current version.
        let version = items.get(&tracker_id.0).and_then(|item| item.updated_at);
        store.record_tracker_version(&tracker_id, version).unwrap();
    }
    (Reconciler::new(tracker, board, store), clock)
}

fn stamped(mut item: TrackerItem, updated_at: DateTime<Utc>) -> TrackerItem {
    item.updated_at = Some(updated_at);
    item
}

// ---------------------------------------------------------------------------
// 1. Tracker → Board
// ---------------------------------------------------------------------------

#[test]
fn new_open_issue_creates_board_task_with_completion_and_trailer() {
    let tracker = FakeTracker::with(vec![issue(
        "1",
        "Fix bug",
        Some("oops"),
        ItemState::Open,
        &["in review"],
    )]);
    let (mut r, _) = reconciler(tracker, FakeBoard::default());

    let report = r.tracker_to_board().expect("pass");
    assert_eq!(report.created, 1);
    assert!(report.failures.is_empty(), "{:?}", report.failures);

    let board = r.board().snapshot();
    assert_eq!(board.creates, vec!["Fix bug".to_string()]);
    let created = r.board().task("task-1");
    assert_eq!(created.title, "Fix bug");
    assert_eq!(created.completion, 75);
    let description = created.description.expect("description set");
    assert!(description.starts_with("oops"));
    assert!(description.ends_with(&format!("**URL:** {}", issue_url("1"))));

    assert_eq!(
        r.store().lookup_by_tracker(&TrackerId::from("1")).unwrap(),
        Some(BoardId::from("task-1"))
    );
}

#[test]
fn second_pass_without_changes_issues_no_writes() {
    let tracker = FakeTracker::with(vec![
        issue("1", "Fix bug", Some("oops"), ItemState::Open, &["todo"]),
        issue("2", "Docs", None, ItemState::Open, &["in progress"]),
    ]);
    let (mut r, clock) = reconciler(tracker, FakeBoard::default());

    r.tracker_to_board().expect("first pass");
    let after_first = r.board().snapshot();

    clock.advance(Duration::minutes(15));
    let report = r.tracker_to_board().expect("second pass");
    let after_second = r.board().snapshot();

    assert_eq!(report.unchanged, 2);
    assert_eq!(report.created + report.updated, 0);
    assert_eq!(after_second.creates.len(), after_first.creates.len());
    assert_eq!(after_second.core_updates.len(), after_first.core_updates.len());
    assert_eq!(after_second.detail_updates.len(), after_first.detail_updates.len());
}

#[test]
fn mapped_issue_is_never_recreated_despite_drift() {
    let tracker = FakeTracker::with(vec![issue("1", "Fix bug", None, ItemState::Open, &[])]);
    let (mut r, _) = reconciler(tracker, FakeBoard::default());
    r.tracker_to_board().expect("first pass");

    r.tracker().edit(|state| {
        let item = state.items.get_mut("1").unwrap();
        item.title = "Fix the bug properly".to_string();
        item.body = Some("more detail".to_string());
        item.labels = vec!["in progress".to_string()];
    });
    let report = r.tracker_to_board().expect("second pass");

    assert_eq!(report.created, 0);
    assert_eq!(report.updated, 1);
    assert_eq!(r.board().snapshot().creates.len(), 1);
    let task = r.board().task("task-1");
    assert_eq!(task.title, "Fix the bug properly");
    assert_eq!(task.completion, 50);
    assert!(task.description.unwrap().starts_with("more detail"));
}

#[test]
fn closed_unmapped_issue_is_not_pushed() {
    let tracker = FakeTracker::with(vec![issue("5", "Old", None, ItemState::Closed, &["todo"])]);
    let (mut r, _) = reconciler(tracker, FakeBoard::default());

    let report = r.tracker_to_board().expect("pass");
    assert_eq!(report.skipped, 1);
    assert!(r.board().snapshot().creates.is_empty());
    assert!(r.store().list().unwrap().is_empty());
}

#[test]
fn closed_mapped_issue_completes_board_task() {
    let tracker = FakeTracker::with(vec![issue("1", "Ship", None, ItemState::Closed, &["todo"])]);
    let board = FakeBoard::with(vec![task(
        "task-a",
        "Ship",
        Some(&format!("**URL:** {}", issue_url("1"))),
        20,
    )]);
    let (mut r, _) = seeded(tracker, board, &[("1", "task-a")]);

    let report = r.tracker_to_board().expect("pass");
    assert_eq!(report.updated, 1);
    let snapshot = r.board().snapshot();
    assert_eq!(
        snapshot.core_updates,
        vec![(
            BoardId::from("task-a"),
            CoreUpdate {
                title: None,
                completion: Some(100)
            }
        )]
    );
    assert!(snapshot.detail_updates.is_empty());
}

#[test]
fn description_and_core_use_fresh_tokens() {
    let tracker = FakeTracker::with(vec![issue("1", "New title", Some("body"), ItemState::Open, &[])]);
    let board = FakeBoard::with(vec![task("task-a", "Old title", Some("old"), 0)]);
    // Someone else touched the task after we would have read it.
    board.edit(|state| {
        let t = state.tasks.get_mut("task-a").unwrap();
        t.item.token = ConcurrencyToken::from("7");
        t.details_etag = 9;
    });
    let (mut r, _) = seeded(tracker, board, &[("1", "task-a")]);

    let report = r.tracker_to_board().expect("pass");
    assert_eq!(report.updated, 1, "failures: {:?}", report.failures);
    let snapshot = r.board().snapshot();
    assert_eq!(snapshot.token_fetches, 2);
    assert_eq!(snapshot.core_updates.len(), 1);
    assert_eq!(snapshot.detail_updates.len(), 1);
    assert_eq!(r.board().task("task-a").title, "New title");
}

#[test]
fn conflict_is_recorded_once_and_other_items_continue() {
    let tracker = FakeTracker::with(vec![
        issue("1", "Renamed", None, ItemState::Open, &[]),
        issue("2", "Fresh", None, ItemState::Open, &[]),
    ]);
    let board = FakeBoard::with(vec![task("task-a", "Original", None, 0)]);
    board.edit(|state| {
        state.conflict_on_core.insert("task-a".to_string());
    });
    let (mut r, clock) = seeded(tracker, board, &[("1", "task-a")]);
    let before = r.store().get(&TrackerId::from("1")).unwrap().unwrap();

    clock.advance(Duration::minutes(1));
    let report = r.tracker_to_board().expect("pass");

    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].item, "#1");
    assert!(matches!(report.failures[0].error, PortError::Conflict { .. }));
    assert_eq!(report.created, 1, "issue #2 still synced");
    let snapshot = r.board().snapshot();
    let attempts = snapshot
        .core_updates
        .iter()
        .filter(|(id, _)| id.0 == "task-a")
        .count();
    assert_eq!(attempts, 1, "conflicts are not retried within a pass");

    let after = r.store().get(&TrackerId::from("1")).unwrap().unwrap();
    assert_eq!(
        after.last_synced_from_tracker, before.last_synced_from_tracker,
        "failed update must not advance the sync timestamp"
    );
}

#[test]
fn missing_board_task_is_stale_and_untouched() {
    let tracker = FakeTracker::with(vec![issue("1", "Lost", None, ItemState::Open, &[])]);
    let (mut r, clock) = seeded(tracker, FakeBoard::default(), &[("1", "task-gone")]);
    let before = r.store().get(&TrackerId::from("1")).unwrap().unwrap();

    clock.advance(Duration::minutes(1));
    let report = r.tracker_to_board().expect("pass");

    assert_eq!(report.skipped, 1);
    let snapshot = r.board().snapshot();
    assert!(snapshot.creates.is_empty(), "stale mapping must not recreate");
    assert!(snapshot.core_updates.is_empty());
    assert_eq!(r.store().get(&TrackerId::from("1")).unwrap().unwrap(), before);
}

#[test]
fn failed_follow_up_after_create_does_not_duplicate() {
    let tracker = FakeTracker::with(vec![issue("1", "Fix", Some("body"), ItemState::Open, &[])]);
    let board = FakeBoard::default();
    board.edit(|state| {
        state.fail_details.insert("task-1".to_string());
    });
    let (mut r, clock) = reconciler(tracker, board);

    let first = r.tracker_to_board().expect("first pass");
    assert_eq!(first.created, 1);
    assert_eq!(first.failures.len(), 1);
    assert!(r.store().lookup_by_tracker(&TrackerId::from("1")).unwrap().is_some());

    r.board().edit(|state| {
        state.fail_details.clear();
    });
    clock.advance(Duration::minutes(15));
    let second = r.tracker_to_board().expect("second pass");

    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 1);
    assert_eq!(r.board().snapshot().creates.len(), 1);
    assert!(r
        .board()
        .task("task-1")
        .description
        .unwrap()
        .starts_with("body"));
}

#[test]
fn open_scope_ignores_closed_issues() {
    let tracker = FakeTracker::with(vec![
        issue("1", "Open one", None, ItemState::Open, &[]),
        issue("2", "Closed one", None, ItemState::Closed, &[]),
    ]);
    let (r, _) = seeded(tracker, FakeBoard::default(), &[]);
    let mut r = r.with_scope(TrackerScope::Open);

    let report = r.tracker_to_board().expect("pass");
    assert_eq!(report.seen, 1);
    assert_eq!(report.created, 1);
}

#[test]
fn versioned_issues_settle_after_one_pass() {
    let tracker = FakeTracker::with(vec![
        stamped(
            issue("1", "Fix bug", Some("oops"), ItemState::Open, &["todo"]),
            t0() - Duration::hours(3),
        ),
        stamped(
            issue("2", "Docs", None, ItemState::Open, &["in progress"]),
            t0() - Duration::hours(2),
        ),
    ]);
    let (mut r, clock) = reconciler(tracker, FakeBoard::default());

    let first = r.tracker_to_board().expect("first pass");
    assert_eq!(first.created, 2);
    let after_first = r.board().snapshot();

    clock.advance(Duration::minutes(15));
    let second = r.tracker_to_board().expect("second pass");
    let after_second = r.board().snapshot();

    assert_eq!(second.unchanged, 2);
    assert_eq!(second.created + second.updated, 0);
    assert!(second.failures.is_empty());
    assert_eq!(after_second.token_fetches, after_first.token_fetches);
    assert_eq!(after_second.core_updates.len(), after_first.core_updates.len());
    assert_eq!(after_second.detail_updates.len(), after_first.detail_updates.len());
    assert_eq!(
        r.store().get(&TrackerId::from("1")).unwrap().unwrap().tracker_updated_at,
        Some(t0() - Duration::hours(3))
    );
}

#[test]
fn tracker_edit_stamped_behind_local_clock_is_still_pushed() {
    let tracker = FakeTracker::with(vec![stamped(
        issue("1", "Fix bug", None, ItemState::Open, &["todo"]),
        t0() - Duration::hours(2),
    )]);
    let board = FakeBoard::with(vec![task(
        "task-a",
        "Fix bug",
        Some(&format!("**URL:** {}", issue_url("1"))),
        20,
    )]);
    let (mut r, clock) = seeded(tracker, board, &[("1", "task-a")]);

    clock.advance(Duration::minutes(15));
    let quiet = r.tracker_to_board().expect("quiet pass");
    assert_eq!(quiet.unchanged, 1);
    let synced_at = r
        .store()
        .get(&TrackerId::from("1"))
        .unwrap()
        .unwrap()
        .last_synced_from_tracker
        .unwrap();

    // The tracker's clock lags ours: the edit is stamped before our last sync.
    let edited_at = synced_at - Duration::minutes(5);
    r.tracker().edit(|state| {
        let item = state.items.get_mut("1").unwrap();
        item.title = "Fix bug for real".to_string();
        item.labels = vec!["in progress".to_string()];
        item.updated_at = Some(edited_at);
    });
    clock.advance(Duration::minutes(15));
    let report = r.tracker_to_board().expect("pass after edit");

    assert_eq!(report.updated, 1, "failures: {:?}", report.failures);
    let task = r.board().task("task-a");
    assert_eq!(task.title, "Fix bug for real");
    assert_eq!(task.completion, 50);
    assert_eq!(
        r.store().get(&TrackerId::from("1")).unwrap().unwrap().tracker_updated_at,
        Some(edited_at)
    );
}

// ---------------------------------------------------------------------------
// 2. Board → Tracker
// ---------------------------------------------------------------------------

#[test]
fn unmapped_open_task_creates_issue_without_trailer() {
    let board = FakeBoard::with(vec![task(
        "task-a",
        "From planner",
        Some("notes\n\n---\n**URL:** https://example.invalid/x"),
        30,
    )]);
    let (mut r, _) = reconciler(FakeTracker::with(vec![]), board);

    let report = r.board_to_tracker().expect("pass");
    assert_eq!(report.created, 1);
    let tracker = r.tracker().snapshot();
    assert_eq!(tracker.creates.len(), 1);
    assert_eq!(tracker.creates[0].title, "From planner");
    assert_eq!(tracker.creates[0].body, "notes");
    assert_eq!(
        r.store().lookup_by_board(&BoardId::from("task-a")).unwrap(),
        Some(TrackerId::from("101"))
    );
}

#[test]
fn complete_unmapped_task_is_not_pushed() {
    let board = FakeBoard::with(vec![task("task-a", "Done already", None, 100)]);
    let (mut r, _) = reconciler(FakeTracker::with(vec![]), board);

    let report = r.board_to_tracker().expect("pass");
    assert_eq!(report.skipped, 1);
    assert!(r.tracker().snapshot().creates.is_empty());
}

#[test]
fn complete_task_closes_open_issue_and_keeps_completion() {
    let tracker = FakeTracker::with(vec![issue("1", "Ship", None, ItemState::Open, &["todo"])]);
    let board = FakeBoard::with(vec![task(
        "task-a",
        "Ship",
        Some(&format!("**URL:** {}", issue_url("1"))),
        100,
    )]);
    let (mut r, _) = seeded(tracker, board, &[("1", "task-a")]);

    let report = r.board_to_tracker().expect("pass");
    assert_eq!(report.updated, 1);
    let tracker = r.tracker().snapshot();
    assert_eq!(
        tracker.updates,
        vec![(
            TrackerId::from("1"),
            TrackerUpdate {
                title: None,
                body: None,
                state: Some(ItemState::Closed),
            }
        )]
    );
    assert_eq!(r.board().task("task-a").completion, 100);
    assert!(r.board().snapshot().core_updates.is_empty());
}

#[test]
fn board_edits_are_combined_into_one_update() {
    let tracker = FakeTracker::with(vec![issue("1", "Old", Some("old body"), ItemState::Closed, &[])]);
    let board = FakeBoard::with(vec![task("task-a", "New", Some("new body"), 40)]);
    let (mut r, _) = seeded(tracker, board, &[("1", "task-a")]);

    r.board_to_tracker().expect("pass");
    let tracker = r.tracker().snapshot();
    assert_eq!(tracker.updates.len(), 1);
    assert_eq!(
        tracker.updates[0].1,
        TrackerUpdate {
            title: Some("New".to_string()),
            body: Some("new body".to_string()),
            state: Some(ItemState::Open),
        }
    );
}

#[test]
fn unreachable_issue_is_skipped_silently() {
    let tracker = FakeTracker::with(vec![issue("1", "Flaky", None, ItemState::Open, &[])]);
    tracker.edit(|state| {
        state.unreachable.insert("1".to_string());
    });
    let board = FakeBoard::with(vec![task("task-a", "Renamed", None, 0)]);
    let (mut r, _) = seeded(tracker, board, &[("1", "task-a")]);

    let report = r.board_to_tracker().expect("pass");
    assert_eq!(report.skipped, 1);
    assert!(report.failures.is_empty());
    assert!(r.tracker().snapshot().updates.is_empty());
}

// ---------------------------------------------------------------------------
// 3. Full passes
// ---------------------------------------------------------------------------

#[test]
fn trailer_is_not_echoed_back_into_issue_body() {
    let tracker = FakeTracker::with(vec![issue("1", "Fix", Some("oops"), ItemState::Open, &["ready"])]);
    let (mut r, _) = reconciler(tracker, FakeBoard::default());

    pipeline::run(&mut r).expect("pass");
    let tracker = r.tracker().snapshot();
    assert!(tracker.updates.is_empty(), "got: {:?}", tracker.updates);
    assert!(tracker.creates.is_empty(), "synced task must not come back as a new issue");
}

#[test]
fn board_completion_survives_tracker_first_ordering() {
    let open = stamped(
        issue("1", "Ship", None, ItemState::Open, &["todo"]),
        t0() - Duration::hours(1),
    );
    let tracker = FakeTracker::with(vec![open]);
    let board = FakeBoard::with(vec![task(
        "task-a",
        "Ship",
        Some(&format!("**URL:** {}", issue_url("1"))),
        100,
    )]);
    let (mut r, clock) = seeded(tracker, board, &[("1", "task-a")]);
    clock.advance(Duration::minutes(15));

    let report = pipeline::run(&mut r).expect("pass");
    assert!(report.is_clean());
    assert_eq!(r.board().task("task-a").completion, 100);
    assert_eq!(r.tracker().snapshot().items["1"].state, ItemState::Closed);
}

#[test]
fn half_written_task_is_repaired_and_never_copied_back() {
    let tracker = FakeTracker::with(vec![stamped(
        issue("1", "Fix", Some("body"), ItemState::Open, &["in review"]),
        t0() - Duration::hours(1),
    )]);
    let board = FakeBoard::default();
    board.edit(|state| {
        state.fail_details.insert("task-1".to_string());
    });
    let (mut r, clock) = reconciler(tracker, board);

    let first = pipeline::run(&mut r).expect("first pass");
    let t2b = first.tracker_to_board.report().expect("tracker->board ran");
    assert_eq!(t2b.created, 1);
    assert_eq!(t2b.failures.len(), 1);
    let b2t = first.board_to_tracker.report().expect("board->tracker ran");
    assert_eq!(b2t.skipped, 1);
    let tracker = r.tracker().snapshot();
    assert!(tracker.updates.is_empty(), "got: {:?}", tracker.updates);
    assert_eq!(tracker.items["1"].body.as_deref(), Some("body"));
    assert_eq!(
        r.store().get(&TrackerId::from("1")).unwrap().unwrap().tracker_updated_at,
        None
    );

    r.board().edit(|state| {
        state.fail_details.clear();
    });
    clock.advance(Duration::minutes(15));
    let second = pipeline::run(&mut r).expect("second pass");

    assert!(second.is_clean(), "{second:?}");
    let t2b = second.tracker_to_board.report().expect("tracker->board ran");
    assert_eq!(t2b.updated, 1);
    let repaired = r.board().task("task-1");
    assert_eq!(repaired.completion, 75);
    let description = repaired.description.expect("description repaired");
    assert!(description.starts_with("body"));
    assert!(description.ends_with(&format!("**URL:** {}", issue_url("1"))));
    assert!(r.tracker().snapshot().updates.is_empty());
    assert_eq!(r.board().snapshot().creates.len(), 1);
}

#[test]
fn board_created_pair_gains_trailer_on_next_pass() {
    let board = FakeBoard::with(vec![task("task-a", "From planner", Some("notes"), 30)]);
    let (mut r, clock) = reconciler(FakeTracker::with(vec![]), board);

    pipeline::run(&mut r).expect("first pass");
    // The new issue is stamped by the tracker, a little behind our clock.
    r.tracker().edit(|state| {
        let item = state.items.get_mut("101").unwrap();
        item.updated_at = Some(t0() - Duration::minutes(2));
    });

    clock.advance(Duration::minutes(15));
    let second = pipeline::run(&mut r).expect("second pass");
    assert!(second.is_clean(), "{second:?}");

    let synced = r.board().task("task-a");
    assert_eq!(
        synced.description.as_deref(),
        Some(format!("notes\n\n---\n**URL:** {}", issue_url("101")).as_str())
    );
    assert_eq!(synced.completion, 0);
    assert!(r.tracker().snapshot().updates.is_empty());

    let before = r.board().snapshot();
    clock.advance(Duration::minutes(15));
    let third = pipeline::run(&mut r).expect("third pass");
    let t2b = third.tracker_to_board.report().expect("tracker->board ran");
    assert_eq!(t2b.unchanged, 1);
    let after = r.board().snapshot();
    assert_eq!(after.core_updates.len(), before.core_updates.len());
    assert_eq!(after.detail_updates.len(), before.detail_updates.len());
}

#[test]
fn listing_failure_in_one_direction_still_runs_the_other() {
    let tracker = FakeTracker::with(vec![]);
    tracker.edit(|state| state.fail_listing = true);
    let board = FakeBoard::with(vec![task("task-a", "Board only", None, 0)]);
    let (mut r, _) = reconciler(tracker, board);

    let report = pipeline::run(&mut r).expect("pass");
    assert!(matches!(report.tracker_to_board, DirectionResult::Failed(_)));
    assert!(!report.is_clean());
    let b2t = report.board_to_tracker.report().expect("board->tracker ran");
    assert_eq!(b2t.created, 1);
}

#[test]
fn store_conflict_aborts_the_pass() {
    // A board id already linked to another issue cannot be linked again.
    let tracker = FakeTracker::with(vec![]);
    let board = FakeBoard::with(vec![]);
    let (mut r, _) = seeded(tracker, board, &[("1", "task-1")]);
    r.tracker().edit(|state| {
        state.items.insert(
            "2".to_string(),
            issue("2", "Collides", None, ItemState::Open, &[]),
        );
    });

    let err = pipeline::run(&mut r).expect_err("store error is fatal");
    assert!(
        matches!(err, SyncError::Store(StoreError::BoardAlreadyMapped { .. })),
        "got: {err}"
    );
}
