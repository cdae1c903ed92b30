//! `tandem run` — the sync process.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;

use tandem_core::config::{DEFAULT_AUTHORITY, DEFAULT_BOARD_API, DEFAULT_TRACKER_API};
use tandem_core::{BoardConfig, RetryPolicy, SyncConfig, TrackerConfig};
use tandem_daemon::{init_tracing, start_blocking, DriverMode, InstanceLock};
use tandem_sync::{MappingStore, Reconciler, TrackerScope};

use super::DatabaseArg;

/// Arguments for `tandem run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// GitHub token with issue read/write access.
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub github_token: String,

    /// Repository as `owner/name`.
    #[arg(long, env = "GITHUB_REPO")]
    pub github_repo: String,

    #[arg(long, env = "GITHUB_API_URL", default_value = DEFAULT_TRACKER_API, hide = true)]
    pub github_api: String,

    /// Planner plan that owns the bucket.
    #[arg(long, env = "PLAN_ID")]
    pub plan_id: String,

    /// Planner bucket to mirror.
    #[arg(long, env = "BUCKET_ID")]
    pub bucket_id: String,

    #[arg(long, env = "AZURE_TENANT_ID")]
    pub tenant_id: String,

    #[arg(long, env = "AZURE_CLIENT_ID")]
    pub client_id: String,

    #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    #[arg(long, env = "GRAPH_API_URL", default_value = DEFAULT_BOARD_API, hide = true)]
    pub graph_api: String,

    #[arg(long, env = "AZURE_AUTHORITY_HOST", default_value = DEFAULT_AUTHORITY, hide = true)]
    pub authority: String,

    #[command(flatten)]
    pub database: DatabaseArg,

    /// Minutes between passes.
    #[arg(long, env = "POLL_INTERVAL_MINUTES", default_value_t = 15)]
    pub poll_interval_minutes: u64,

    /// Per-request timeout in seconds.
    #[arg(long, env = "TANDEM_REQUEST_TIMEOUT_SECS", default_value_t = 30)]
    pub request_timeout_secs: u64,

    /// Attempts per remote call on transient failures (1 disables retries).
    #[arg(long, env = "TANDEM_RETRY_ATTEMPTS", default_value_t = 3)]
    pub retry_attempts: u32,

    /// Run a single pass and exit.
    #[arg(long)]
    pub once: bool,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,

    /// Only push open issues to the board.
    #[arg(long)]
    pub open_issues_only: bool,
}

impl RunArgs {
    fn config(&self) -> SyncConfig {
        SyncConfig {
            tracker: TrackerConfig {
                token: self.github_token.clone(),
                repository: self.github_repo.clone(),
                api_base: self.github_api.clone(),
            },
            board: BoardConfig {
                plan_id: self.plan_id.clone(),
                bucket_id: self.bucket_id.clone(),
                tenant_id: self.tenant_id.clone(),
                client_id: self.client_id.clone(),
                client_secret: self.client_secret.clone(),
                api_base: self.graph_api.clone(),
                authority: self.authority.clone(),
            },
            database_path: self.database.path.clone(),
            poll_interval: Duration::from_secs(self.poll_interval_minutes.saturating_mul(60)),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryPolicy {
                attempts: self.retry_attempts,
                ..RetryPolicy::default()
            },
        }
    }

    pub fn run(self) -> Result<()> {
        let config = self.config();
        config.validate().context("invalid configuration")?;
        init_tracing(self.log_json);
        tracing::info!(
            repository = %config.tracker.repository,
            bucket = %config.board.bucket_id,
            database = %config.database_path.display(),
            interval_secs = config.poll_interval.as_secs(),
            "starting sync"
        );

        let lock = InstanceLock::acquire(&config.database_path)
            .context("failed to acquire instance lock")?;
        let store = MappingStore::open(&config.database_path).with_context(|| {
            format!(
                "failed to open mapping store at {}",
                config.database_path.display()
            )
        })?;

        let (tracker, board) = tandem_remote::connect(&config);
        let scope = if self.open_issues_only {
            TrackerScope::Open
        } else {
            TrackerScope::All
        };
        let reconciler = Reconciler::new(tracker, board, store).with_scope(scope);

        let mode = if self.once {
            DriverMode::Once
        } else {
            DriverMode::Forever {
                interval: config.poll_interval,
            }
        };
        let summary = start_blocking(reconciler, mode).context("sync driver exited with error")?;
        drop(lock);

        println!(
            "✓ {} pass(es), {} failed",
            summary.passes, summary.failed_passes
        );
        if let Some(last) = summary.last_pass {
            println!(
                "  last pass: {} created, {} updated, {} failure(s) in {} ms",
                last.created, last.updated, last.failures, last.duration_ms
            );
        }
        Ok(())
    }
}
