//! Domain types shared by the reconciliation engine and the remote adapters.
//!
//! Items on either side are transient copies owned by their remote system;
//! only [`Mapping`] rows are persisted locally.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Stable identifier of an issue in the tracker (the issue number).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackerId(pub String);

impl fmt::Display for TrackerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for TrackerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TrackerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<u64> for TrackerId {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Stable identifier of a task on the board.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BoardId(pub String);

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for BoardId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for BoardId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Opaque optimistic-concurrency token (an ETag on the board side).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConcurrencyToken(pub String);

impl fmt::Display for ConcurrencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ConcurrencyToken {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ConcurrencyToken {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Open/closed state of a tracker item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    #[default]
    Open,
    Closed,
}

impl ItemState {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemState::Open => "open",
            ItemState::Closed => "closed",
        }
    }

    pub fn is_closed(self) -> bool {
        self == ItemState::Closed
    }
}

impl fmt::Display for ItemState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which side a sync timestamp refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncDirection {
    /// Tracker → board; timestamp keyed by tracker id.
    FromTracker,
    /// Board → tracker; timestamp keyed by board id.
    FromBoard,
}

impl SyncDirection {
    pub fn label(self) -> &'static str {
        match self {
            SyncDirection::FromTracker => "tracker->board",
            SyncDirection::FromBoard => "board->tracker",
        }
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// Items
// ---------------------------------------------------------------------------

/// An issue as read from the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerItem {
    pub id: TrackerId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub state: ItemState,
    #[serde(default)]
    pub labels: Vec<String>,
    pub url: String,
    /// Last modification time reported by the tracker, when it provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A task as read from the board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardItem {
    pub id: BoardId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Completion percentage, `0..=100`.
    pub completion: u8,
    pub token: ConcurrencyToken,
}

impl BoardItem {
    pub fn is_complete(&self) -> bool {
        self.completion >= 100
    }
}

/// Comparable projection of an item, used only for change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalView {
    pub title: String,
    pub description: String,
    pub completion: u8,
}

/// Which canonical fields differ between two views.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldChanges {
    pub title: bool,
    pub description: bool,
    pub completion: bool,
}

impl FieldChanges {
    pub fn any(self) -> bool {
        self.title || self.description || self.completion
    }

    /// True when the board's core resource (title / percent complete) needs a write.
    pub fn core(self) -> bool {
        self.title || self.completion
    }
}

// ---------------------------------------------------------------------------
// Mapping
// ---------------------------------------------------------------------------

/// Durable 1:1 link between a tracker item and a board item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mapping {
    pub tracker_id: TrackerId,
    pub board_id: BoardId,
    pub last_synced_from_tracker: Option<DateTime<Utc>>,
    pub last_synced_from_board: Option<DateTime<Utc>>,
    /// Tracker-side `updated_at` as of the last complete Tracker→Board push.
    pub tracker_updated_at: Option<DateTime<Utc>>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
