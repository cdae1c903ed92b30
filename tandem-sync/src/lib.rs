//! # tandem-sync
//!
//! Identity map and reconciliation between the tracker and the board.
//!
//! Build a [`Reconciler`] from two ports and a [`MappingStore`], then call
//! [`pipeline::run`] (or [`PassRunner::run_pass`]) once per cycle.

pub mod engine;
pub mod error;
pub mod mapping_store;
pub mod pipeline;
pub mod ports;

pub use engine::{DirectionReport, ItemFailure, ItemOutcome, Reconciler, SkipReason, TrackerScope};
pub use error::{PortError, StoreError, SyncError};
pub use mapping_store::{Clock, ManualClock, MappingKey, MappingStore, SystemClock, TouchOutcome};
pub use pipeline::{DirectionResult, PassReport, PassRunner};
pub use ports::{BoardPort, CoreUpdate, NewTrackerItem, TrackerPort, TrackerUpdate};
