use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast::{self, error::TryRecvError};

use tandem_sync::{PassReport, PassRunner};

use crate::error::{io_err, DaemonError};

/// How many passes the driver runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverMode {
    /// A single pass, then return.
    Once,
    /// Passes separated by `interval` until shutdown.
    Forever { interval: Duration },
}

/// Condensed view of one completed pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    pub started_at: DateTime<Utc>,
    pub duration_ms: u128,
    pub created: usize,
    pub updated: usize,
    pub failures: usize,
    pub clean: bool,
}

impl From<&PassReport> for PassSummary {
    fn from(report: &PassReport) -> Self {
        Self {
            started_at: report.started_at,
            duration_ms: report.duration.as_millis(),
            created: report.created(),
            updated: report.updated(),
            failures: report.failures(),
            clean: report.is_clean(),
        }
    }
}

/// Totals over the driver's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DriverSummary {
    pub passes: usize,
    pub failed_passes: usize,
    pub last_pass: Option<PassSummary>,
}

/// Run one pass on the blocking pool.
pub async fn run_once<R>(runner: Arc<Mutex<R>>) -> Result<PassReport, DaemonError>
where
    R: PassRunner + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        // A panic in an earlier pass leaves nothing half-applied that the
        // next pass would not re-evaluate, so a poisoned lock is usable.
        let mut runner = runner.lock().unwrap_or_else(PoisonError::into_inner);
        runner.run_pass()
    })
    .await
    .map_err(|err| DaemonError::Join(err.to_string()))?
    .map_err(DaemonError::from)
}

/// Drive passes until `mode` is exhausted or shutdown is signalled.
///
/// Shutdown is honoured between passes only; a running pass always finishes.
/// Dropping every sender counts as a shutdown request.
pub async fn run<R>(
    runner: Arc<Mutex<R>>,
    mode: DriverMode,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<DriverSummary, DaemonError>
where
    R: PassRunner + Send + 'static,
{
    let mut summary = DriverSummary::default();
    loop {
        if shutdown_requested(&mut shutdown) {
            tracing::info!("shutdown requested; no further passes");
            break;
        }

        let pass = summary.passes + 1;
        tracing::info!(pass, "sync pass starting");
        summary.passes += 1;
        match run_once(runner.clone()).await {
            Ok(report) => {
                let pass_summary = PassSummary::from(&report);
                if pass_summary.clean {
                    tracing::info!(
                        pass,
                        duration_ms = pass_summary.duration_ms as u64,
                        created = pass_summary.created,
                        updated = pass_summary.updated,
                        "sync pass completed"
                    );
                } else {
                    tracing::warn!(
                        pass,
                        duration_ms = pass_summary.duration_ms as u64,
                        failures = pass_summary.failures,
                        "sync pass completed with failures"
                    );
                }
                summary.last_pass = Some(pass_summary);
            }
            Err(err) => {
                summary.failed_passes += 1;
                tracing::error!(pass, error = %err, "sync pass failed");
            }
        }

        let DriverMode::Forever { interval } = mode else {
            break;
        };
        if shutdown_requested(&mut shutdown) {
            tracing::info!("shutdown requested; no further passes");
            break;
        }
        tracing::info!(next_in_secs = interval.as_secs(), "waiting for next pass");
        tokio::select! {
            _ = shutdown.recv() => {
                tracing::info!("shutdown requested while idle");
                break;
            }
            _ = tokio::time::sleep(interval) => {}
        }
    }
    Ok(summary)
}

fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Run the driver on a fresh current-thread runtime, stopping on ctrl-c.
pub fn start_blocking<R>(runner: R, mode: DriverMode) -> Result<DriverSummary, DaemonError>
where
    R: PassRunner + Send + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    runtime.block_on(async move {
        let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(4);
        let signal_handle = tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("received ctrl-c, finishing current pass");
                    let _ = shutdown_tx.send(());
                }
                Err(err) => {
                    tracing::warn!(error = %err, "ctrl-c handler unavailable");
                    // Keep the sender alive so the driver is not stopped.
                    std::future::pending::<()>().await;
                }
            }
        });

        let result = run(Arc::new(Mutex::new(runner)), mode, shutdown_rx).await;
        signal_handle.abort();
        result
    })
}

/// Install the global subscriber. `RUST_LOG` overrides the `info` default.
pub fn init_tracing(json: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
