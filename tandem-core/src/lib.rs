//! Tandem core library — domain types, status translation, normalisation,
//! configuration.
//!
//! - [`types`] — ids, items, mappings
//! - [`status`] — labels/state ↔ completion percentage
//! - [`normalize`] — canonical views and the description URL trailer
//! - [`config`] — [`SyncConfig`] and its validation
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod normalize;
pub mod status;
pub mod types;

pub use config::{BoardConfig, RetryPolicy, SyncConfig, TrackerConfig};
pub use error::ConfigError;
pub use types::{
    BoardId, BoardItem, CanonicalView, ConcurrencyToken, FieldChanges, ItemState, Mapping,
    SyncDirection, TrackerId, TrackerItem,
};
