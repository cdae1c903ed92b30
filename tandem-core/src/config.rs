//! Process configuration.
//!
//! [`SyncConfig`] is built once at startup (by the CLI, from flags and
//! environment) and passed by reference to everything that needs it.
//! Secrets are redacted from `Debug` output.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_DATABASE: &str = "sync_mappings.db";
pub const DEFAULT_TRACKER_API: &str = "https://api.github.com";
pub const DEFAULT_BOARD_API: &str = "https://graph.microsoft.com/v1.0";
pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tracker (GitHub) connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct TrackerConfig {
    pub token: String,
    /// `owner/name`.
    pub repository: String,
    pub api_base: String,
}

/// Board (Planner) connection settings.
#[derive(Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub plan_id: String,
    pub bucket_id: String,
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub api_base: String,
    pub authority: String,
}

/// Retry behaviour for transient transport failures on remote calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. `1` disables retries.
    pub attempts: u32,
    /// Backoff before the second attempt; doubles after each failure.
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_backoff: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// No retries at all.
    pub fn none() -> Self {
        Self {
            attempts: 1,
            base_backoff: Duration::ZERO,
        }
    }

    /// Backoff before attempt number `attempt` (1-based; attempt 1 has none).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 1u32.checked_shl(attempt - 2).unwrap_or(u32::MAX);
        self.base_backoff.saturating_mul(factor)
    }
}

/// Everything a sync process needs, resolved up front.
#[derive(Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub tracker: TrackerConfig,
    pub board: BoardConfig,
    pub database_path: PathBuf,
    pub poll_interval: Duration,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
}

impl SyncConfig {
    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("tracker.token", &self.tracker.token)?;
        require("tracker.repository", &self.tracker.repository)?;
        let mut parts = self.tracker.repository.split('/');
        let well_formed = matches!(
            (parts.next(), parts.next(), parts.next()),
            (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
        );
        if !well_formed {
            return Err(ConfigError::Invalid {
                field: "tracker.repository",
                reason: format!("expected `owner/name`, got `{}`", self.tracker.repository),
            });
        }
        require("tracker.api_base", &self.tracker.api_base)?;

        require("board.plan_id", &self.board.plan_id)?;
        require("board.bucket_id", &self.board.bucket_id)?;
        require("board.tenant_id", &self.board.tenant_id)?;
        require("board.client_id", &self.board.client_id)?;
        require("board.client_secret", &self.board.client_secret)?;
        require("board.api_base", &self.board.api_base)?;
        require("board.authority", &self.board.authority)?;

        if self.poll_interval.is_zero() {
            return Err(ConfigError::Invalid {
                field: "poll_interval",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                field: "request_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.retry.attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "retry.attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(ConfigError::Missing {
                field: "database_path",
            });
        }
        Ok(())
    }
}

fn require(field: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing { field })
    } else {
        Ok(())
    }
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for TrackerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrackerConfig")
            .field("token", &REDACTED)
            .field("repository", &self.repository)
            .field("api_base", &self.api_base)
            .finish()
    }
}

impl fmt::Debug for BoardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoardConfig")
            .field("plan_id", &self.plan_id)
            .field("bucket_id", &self.bucket_id)
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &REDACTED)
            .field("api_base", &self.api_base)
            .field("authority", &self.authority)
            .finish()
    }
}

impl fmt::Debug for SyncConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncConfig")
            .field("tracker", &self.tracker)
            .field("board", &self.board)
            .field("database_path", &self.database_path)
            .field("poll_interval", &self.poll_interval)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .finish()
    }
}
