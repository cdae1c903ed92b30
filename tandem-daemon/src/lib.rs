//! Sync driver: repeats reconciliation passes on a fixed interval.

mod error;
pub mod lock;
mod runtime;

pub use error::DaemonError;
pub use lock::{lock_path, InstanceLock};
pub use runtime::{
    init_tracing, run, run_once, start_blocking, DriverMode, DriverSummary, PassSummary,
};
