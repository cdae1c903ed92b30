//! Shared HTTP plumbing: agent construction and error classification.

use std::time::Duration;

use serde::de::DeserializeOwned;

use tandem_sync::PortError;

/// Blocking agent with the same timeout applied to connect, read and write.
pub fn agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new()
        .timeout_connect(timeout)
        .timeout_read(timeout)
        .timeout_write(timeout)
        .user_agent("tandem")
        .build()
}

/// Map a non-success status to the port taxonomy.
///
/// `id` names the resource for conflict reports.
pub fn classify_status(operation: &str, id: &str, status: u16) -> PortError {
    match status {
        401 | 403 => PortError::Auth {
            reason: format!("{operation}: status {status}"),
        },
        409 | 412 => PortError::Conflict { id: id.to_string() },
        500..=599 => PortError::transport(operation, format!("status {status}")),
        _ => PortError::Status {
            operation: operation.to_string(),
            status,
        },
    }
}

/// Map a `ureq` error to the port taxonomy.
pub fn port_error(operation: &str, id: &str, err: ureq::Error) -> PortError {
    match err {
        ureq::Error::Status(status, _) => classify_status(operation, id, status),
        ureq::Error::Transport(transport) => PortError::transport(operation, transport),
    }
}

/// Decode a JSON body.
pub fn read_json<T: DeserializeOwned>(operation: &str, response: ureq::Response) -> Result<T, PortError> {
    response
        .into_json::<T>()
        .map_err(|err| PortError::decode(operation, err))
}

/// Treat "not found" as absence for single-item reads.
pub fn found<T>(result: Result<T, PortError>) -> Result<Option<T>, PortError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(PortError::Status { status: 404 | 410, .. }) => Ok(None),
        Err(err) => Err(err),
    }
}
