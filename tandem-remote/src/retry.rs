//! Bounded retry with exponential backoff for transient failures.

use std::thread;

use tandem_core::RetryPolicy;
use tandem_sync::PortError;

/// Run `f` up to `policy.attempts` times, retrying only
/// [`PortError::Transport`] failures.
pub fn call<T>(
    policy: &RetryPolicy,
    operation: &str,
    mut f: impl FnMut() -> Result<T, PortError>,
) -> Result<T, PortError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match f() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                attempt += 1;
                let backoff = policy.backoff_for(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "retrying after transient failure: {err}"
                );
                thread::sleep(backoff);
            }
            Err(err) => return Err(err),
        }
    }
}
