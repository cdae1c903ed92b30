//! Mapping store — durable tracker-id ↔ board-id links.
//!
//! Persists one SQLite table:
//!
//! ```text
//! mappings(tracker_id TEXT PRIMARY KEY, board_id TEXT NOT NULL UNIQUE,
//!          last_synced_from_tracker TEXT, last_synced_from_board TEXT,
//!          tracker_updated_at TEXT)
//! ```
//!
//! `tracker_updated_at` is the tracker's own `updated_at` as of the last
//! complete Tracker→Board push. It stays NULL until such a push happens.
//!
//! The table is created lazily on open; stores written before
//! `tracker_updated_at` existed gain the column on open.
//! Timestamps are RFC 3339 UTC strings. Rows are never deleted.
//!
//! The store is single-writer. Running two sync processes against the same
//! file is prevented by the daemon's instance lock, not by this module.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use tandem_core::{BoardId, Mapping, SyncDirection, TrackerId};

use crate::error::{io_err, StoreError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS mappings (
    tracker_id               TEXT PRIMARY KEY,
    board_id                 TEXT NOT NULL,
    last_synced_from_tracker TEXT,
    last_synced_from_board   TEXT,
    tracker_updated_at       TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS mappings_board_id ON mappings (board_id);
";

const COLUMNS: &str =
    "tracker_id, board_id, last_synced_from_tracker, last_synced_from_board, tracker_updated_at";

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Source of "now" for sync timestamps.
pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = at;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Keys and outcomes
// ---------------------------------------------------------------------------

/// Which id a caller holds when refreshing a sync timestamp.
///
/// The tracker key refreshes `last_synced_from_tracker`, the board key
/// refreshes `last_synced_from_board`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKey<'a> {
    Tracker(&'a TrackerId),
    Board(&'a BoardId),
}

impl MappingKey<'_> {
    pub fn direction(self) -> SyncDirection {
        match self {
            MappingKey::Tracker(_) => SyncDirection::FromTracker,
            MappingKey::Board(_) => SyncDirection::FromBoard,
        }
    }

    fn id(&self) -> &str {
        match self {
            MappingKey::Tracker(id) => &id.0,
            MappingKey::Board(id) => &id.0,
        }
    }
}

/// Result of [`MappingStore::touch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchOutcome {
    Touched,
    /// No mapping exists for the key; nothing was written.
    NotFound,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// SQLite-backed identity map.
pub struct MappingStore {
    conn: Connection,
    clock: Box<dyn Clock>,
}

impl std::fmt::Debug for MappingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappingStore")
            .field("path", &self.conn.path())
            .finish_non_exhaustive()
    }
}

impl MappingStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with_clock(path, Box::new(SystemClock))
    }

    pub fn open_with_clock(path: &Path, clock: Box<dyn Clock>) -> Result<Self, StoreError> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        }
        let conn = Connection::open(path)?;
        Self::init(conn, clock)
    }

    /// Private in-memory store.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::open_in_memory_with_clock(Box::new(SystemClock))
    }

    pub fn open_in_memory_with_clock(clock: Box<dyn Clock>) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, clock)
    }

    fn init(conn: Connection, clock: Box<dyn Clock>) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        add_tracker_updated_at(&conn)?;
        Ok(Self { conn, clock })
    }

    /// Current time according to the store's clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn lookup_by_tracker(&self, tracker_id: &TrackerId) -> Result<Option<BoardId>, StoreError> {
        let board = self
            .conn
            .query_row(
                "SELECT board_id FROM mappings WHERE tracker_id = ?1",
                params![tracker_id.0],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(board.map(BoardId::from))
    }

    pub fn lookup_by_board(&self, board_id: &BoardId) -> Result<Option<TrackerId>, StoreError> {
        let tracker = self
            .conn
            .query_row(
                "SELECT tracker_id FROM mappings WHERE board_id = ?1",
                params![board_id.0],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(tracker.map(TrackerId::from))
    }

    /// Full mapping row for a tracker item.
    pub fn get(&self, tracker_id: &TrackerId) -> Result<Option<Mapping>, StoreError> {
        let raw = self
            .conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM mappings WHERE tracker_id = ?1"),
                params![tracker_id.0],
                RawMapping::from_row,
            )
            .optional()?;
        raw.map(RawMapping::into_mapping).transpose()
    }

    /// Every mapping, ordered by tracker id (numeric ids sort numerically).
    pub fn list(&self) -> Result<Vec<Mapping>, StoreError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {COLUMNS} FROM mappings ORDER BY length(tracker_id), tracker_id"
        ))?;
        let rows = stmt.query_map([], RawMapping::from_row)?;
        let mut mappings = Vec::new();
        for row in rows {
            mappings.push(row?.into_mapping()?);
        }
        Ok(mappings)
    }

    /// Link `tracker_id` to `board_id` and refresh both sync timestamps.
    ///
    /// An existing row keeps its identity columns; calling this repeatedly
    /// with the same pair is harmless. The recorded tracker version is
    /// cleared, so the next Tracker→Board pass diffs the pair. Fails if
    /// `board_id` already belongs to another tracker item.
    pub fn upsert(&mut self, tracker_id: &TrackerId, board_id: &BoardId) -> Result<Mapping, StoreError> {
        let now = format_timestamp(self.clock.now());
        let tx = self.conn.transaction()?;

        let owner: Option<String> = tx
            .query_row(
                "SELECT tracker_id FROM mappings WHERE board_id = ?1",
                params![board_id.0],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(owner) = owner.filter(|owner| *owner != tracker_id.0) {
            return Err(StoreError::BoardAlreadyMapped {
                board_id: board_id.clone(),
                existing: TrackerId::from(owner),
            });
        }

        tx.execute(
            "INSERT INTO mappings (tracker_id, board_id, last_synced_from_tracker, last_synced_from_board)
             VALUES (?1, ?2, ?3, ?3)
             ON CONFLICT (tracker_id) DO UPDATE SET
                 last_synced_from_tracker = excluded.last_synced_from_tracker,
                 last_synced_from_board   = excluded.last_synced_from_board,
                 tracker_updated_at       = NULL",
            params![tracker_id.0, board_id.0, now],
        )?;

        let raw = tx.query_row(
            &format!("SELECT {COLUMNS} FROM mappings WHERE tracker_id = ?1"),
            params![tracker_id.0],
            RawMapping::from_row,
        )?;
        tx.commit()?;
        raw.into_mapping()
    }

    /// Refresh one direction's timestamp to now.
    pub fn touch(&self, key: MappingKey<'_>) -> Result<TouchOutcome, StoreError> {
        self.touch_at(key, self.clock.now())
    }

    /// Refresh one direction's timestamp to `at`.
    pub fn touch_at(&self, key: MappingKey<'_>, at: DateTime<Utc>) -> Result<TouchOutcome, StoreError> {
        let sql = match key {
            MappingKey::Tracker(_) => {
                "UPDATE mappings SET last_synced_from_tracker = ?1 WHERE tracker_id = ?2"
            }
            MappingKey::Board(_) => {
                "UPDATE mappings SET last_synced_from_board = ?1 WHERE board_id = ?2"
            }
        };
        let changed = self
            .conn
            .execute(sql, params![format_timestamp(at), key.id()])?;
        if changed == 0 {
            Ok(TouchOutcome::NotFound)
        } else {
            Ok(TouchOutcome::Touched)
        }
    }

    /// Remember the tracker's `updated_at` as seen by the last complete
    /// Tracker→Board push. `None` forces the next pass to diff the pair.
    pub fn record_tracker_version(
        &self,
        tracker_id: &TrackerId,
        updated_at: Option<DateTime<Utc>>,
    ) -> Result<TouchOutcome, StoreError> {
        let changed = self.conn.execute(
            "UPDATE mappings SET tracker_updated_at = ?1 WHERE tracker_id = ?2",
            params![updated_at.map(format_timestamp), tracker_id.0],
        )?;
        if changed == 0 {
            Ok(TouchOutcome::NotFound)
        } else {
            Ok(TouchOutcome::Touched)
        }
    }
}

// ---------------------------------------------------------------------------
// Row decoding
// ---------------------------------------------------------------------------

struct RawMapping {
    tracker_id: String,
    board_id: String,
    from_tracker: Option<String>,
    from_board: Option<String>,
    tracker_version: Option<String>,
}

impl RawMapping {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            tracker_id: row.get(0)?,
            board_id: row.get(1)?,
            from_tracker: row.get(2)?,
            from_board: row.get(3)?,
            tracker_version: row.get(4)?,
        })
    }

    fn into_mapping(self) -> Result<Mapping, StoreError> {
        let tracker_id = TrackerId::from(self.tracker_id);
        let last_synced_from_tracker = parse_timestamp(&tracker_id, self.from_tracker)?;
        let last_synced_from_board = parse_timestamp(&tracker_id, self.from_board)?;
        let tracker_updated_at = parse_timestamp(&tracker_id, self.tracker_version)?;
        Ok(Mapping {
            tracker_id,
            board_id: BoardId::from(self.board_id),
            last_synced_from_tracker,
            last_synced_from_board,
            tracker_updated_at,
        })
    }
}

fn add_tracker_updated_at(conn: &Connection) -> Result<(), StoreError> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('mappings')")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    for name in names {
        if name? == "tracker_updated_at" {
            return Ok(());
        }
    }
    conn.execute_batch("ALTER TABLE mappings ADD COLUMN tracker_updated_at TEXT")?;
    Ok(())
}

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(
    tracker_id: &TrackerId,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    let Some(value) = value else {
        return Ok(None);
    };
    DateTime::parse_from_rfc3339(&value)
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(|_| StoreError::Timestamp {
            tracker_id: tracker_id.clone(),
            value,
        })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
