//! One full reconciliation pass: Tracker→Board, then Board→Tracker.
//!
//! The directions run strictly in sequence so they never race on the same
//! mapping rows. A remote listing failure in one direction is recorded and
//! the other direction still runs; a store failure aborts the pass.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::engine::{DirectionReport, Reconciler};
use crate::error::{PortError, SyncError};
use crate::ports::{BoardPort, TrackerPort};

/// Outcome of one direction within a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectionResult {
    Completed(DirectionReport),
    /// The source listing could not be fetched; nothing was diffed.
    Failed(PortError),
}

impl DirectionResult {
    pub fn report(&self) -> Option<&DirectionReport> {
        match self {
            DirectionResult::Completed(report) => Some(report),
            DirectionResult::Failed(_) => None,
        }
    }
}

/// Summary of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub tracker_to_board: DirectionResult,
    pub board_to_tracker: DirectionResult,
}

impl PassReport {
    /// Both directions completed without item failures.
    pub fn is_clean(&self) -> bool {
        [&self.tracker_to_board, &self.board_to_tracker]
            .iter()
            .all(|result| matches!(result.report(), Some(report) if report.failures.is_empty()))
    }

    pub fn created(&self) -> usize {
        self.sum(|report| report.created)
    }

    pub fn updated(&self) -> usize {
        self.sum(|report| report.updated)
    }

    pub fn failures(&self) -> usize {
        self.sum(|report| report.failures.len())
    }

    fn sum(&self, field: impl Fn(&DirectionReport) -> usize) -> usize {
        [&self.tracker_to_board, &self.board_to_tracker]
            .iter()
            .filter_map(|result| result.report())
            .map(field)
            .sum()
    }
}

/// Anything the sync driver can run once per cycle.
pub trait PassRunner {
    fn run_pass(&mut self) -> Result<PassReport, SyncError>;
}

impl<T: TrackerPort, B: BoardPort> PassRunner for Reconciler<T, B> {
    fn run_pass(&mut self) -> Result<PassReport, SyncError> {
        run(self)
    }
}

/// Run both directions in order.
pub fn run<T: TrackerPort, B: BoardPort>(
    reconciler: &mut Reconciler<T, B>,
) -> Result<PassReport, SyncError> {
    let started_at = Utc::now();
    let started = Instant::now();

    let tracker_to_board = settle("tracker->board", reconciler.tracker_to_board())?;
    let board_to_tracker = settle("board->tracker", reconciler.board_to_tracker())?;

    let report = PassReport {
        started_at,
        duration: started.elapsed(),
        tracker_to_board,
        board_to_tracker,
    };
    tracing::info!(
        "pass finished in {} ms: {} created, {} updated, {} failure(s)",
        report.duration.as_millis(),
        report.created(),
        report.updated(),
        report.failures()
    );
    Ok(report)
}

fn settle(
    label: &str,
    result: Result<DirectionReport, SyncError>,
) -> Result<DirectionResult, SyncError> {
    match result {
        Ok(report) => Ok(DirectionResult::Completed(report)),
        Err(SyncError::Port(err)) => {
            tracing::error!("{label} aborted: {err}");
            Ok(DirectionResult::Failed(err))
        }
        Err(err) => Err(err),
    }
}
