//! Boundaries to the two remote systems.
//!
//! Calls are blocking. `get` returns `Ok(None)` when the remote reports the
//! item as missing and `Err` when it could not be reached; the engine treats
//! both as "stale for this pass".

use tandem_core::{BoardId, BoardItem, ConcurrencyToken, ItemState, TrackerId, TrackerItem};

use crate::error::PortError;

/// Payload for creating a tracker item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTrackerItem {
    pub title: String,
    pub body: String,
    pub labels: Vec<String>,
}

/// Partial tracker update; `None` fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TrackerUpdate {
    pub title: Option<String>,
    pub body: Option<String>,
    pub state: Option<ItemState>,
}

impl TrackerUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.body.is_none() && self.state.is_none()
    }
}

/// Partial update of the board's core task resource.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CoreUpdate {
    pub title: Option<String>,
    pub completion: Option<u8>,
}

impl CoreUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.completion.is_none()
    }
}

/// The issue tracker.
pub trait TrackerPort {
    fn list_open(&self) -> Result<Vec<TrackerItem>, PortError>;
    /// Every item regardless of state.
    fn list_all(&self) -> Result<Vec<TrackerItem>, PortError>;
    fn get(&self, id: &TrackerId) -> Result<Option<TrackerItem>, PortError>;
    fn create(&self, item: &NewTrackerItem) -> Result<TrackerItem, PortError>;
    fn update(&self, id: &TrackerId, update: &TrackerUpdate) -> Result<(), PortError>;
}

/// The task board. Plan and bucket are fixed by the adapter's configuration.
///
/// Writes are conditional on a concurrency token; a stale token yields
/// [`PortError::Conflict`]. Core fields and the description live on separate
/// resources with separate tokens.
pub trait BoardPort {
    fn list_tasks(&self) -> Result<Vec<BoardItem>, PortError>;
    fn get(&self, id: &BoardId) -> Result<Option<BoardItem>, PortError>;
    fn create(&self, title: &str) -> Result<BoardItem, PortError>;
    /// Current token of the core resource.
    fn core_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError>;
    /// Current token of the details (description) resource.
    fn details_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError>;
    fn update_core(
        &self,
        id: &BoardId,
        update: &CoreUpdate,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError>;
    fn update_details(
        &self,
        id: &BoardId,
        description: &str,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError>;
}

impl<P: TrackerPort + ?Sized> TrackerPort for Box<P> {
    fn list_open(&self) -> Result<Vec<TrackerItem>, PortError> {
        (**self).list_open()
    }

    fn list_all(&self) -> Result<Vec<TrackerItem>, PortError> {
        (**self).list_all()
    }

    fn get(&self, id: &TrackerId) -> Result<Option<TrackerItem>, PortError> {
        (**self).get(id)
    }

    fn create(&self, item: &NewTrackerItem) -> Result<TrackerItem, PortError> {
        (**self).create(item)
    }

    fn update(&self, id: &TrackerId, update: &TrackerUpdate) -> Result<(), PortError> {
        (**self).update(id, update)
    }
}

impl<P: BoardPort + ?Sized> BoardPort for Box<P> {
    fn list_tasks(&self) -> Result<Vec<BoardItem>, PortError> {
        (**self).list_tasks()
    }

    fn get(&self, id: &BoardId) -> Result<Option<BoardItem>, PortError> {
        (**self).get(id)
    }

    fn create(&self, title: &str) -> Result<BoardItem, PortError> {
        (**self).create(title)
    }

    fn core_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError> {
        (**self).core_token(id)
    }

    fn details_token(&self, id: &BoardId) -> Result<ConcurrencyToken, PortError> {
        (**self).details_token(id)
    }

    fn update_core(
        &self,
        id: &BoardId,
        update: &CoreUpdate,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError> {
        (**self).update_core(id, update, token)
    }

    fn update_details(
        &self,
        id: &BoardId,
        description: &str,
        token: &ConcurrencyToken,
    ) -> Result<(), PortError> {
        (**self).update_details(id, description, token)
    }
}
