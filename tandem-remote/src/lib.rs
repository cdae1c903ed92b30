//! # tandem-remote
//!
//! Blocking HTTP adapters implementing the tandem-sync ports:
//!
//! - [`GitHubTracker`] — issues of one GitHub repository
//! - [`PlannerBoard`] — tasks of one Planner bucket, authenticated through a
//!   [`TokenProvider`]
//!
//! Transient transport failures are retried per the configured
//! [`RetryPolicy`](tandem_core::RetryPolicy); everything else surfaces as a
//! [`PortError`](tandem_sync::PortError) for the engine to record.

pub mod auth;
pub mod github;
pub mod http;
pub mod planner;
pub mod retry;

pub use auth::{ClientCredentialTokenProvider, TokenProvider};
pub use github::GitHubTracker;
pub use planner::PlannerBoard;

use tandem_core::SyncConfig;

/// The concrete board type used by the daemon.
pub type GraphBoard = PlannerBoard<ClientCredentialTokenProvider>;

/// Build both adapters from a validated configuration.
pub fn connect(config: &SyncConfig) -> (GitHubTracker, GraphBoard) {
    let agent = http::agent(config.request_timeout);
    let tracker = GitHubTracker::new(&config.tracker, agent.clone(), config.retry);
    let tokens = ClientCredentialTokenProvider::new(&config.board, agent.clone(), config.retry);
    let board = PlannerBoard::new(&config.board, agent, tokens, config.retry);
    (tracker, board)
}
