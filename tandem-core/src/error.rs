//! Error types for tandem-core.

use thiserror::Error;

/// Invalid or missing configuration, detected once at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required value was empty or absent.
    #[error("missing required setting `{field}`")]
    Missing { field: &'static str },

    /// A value was present but malformed.
    #[error("invalid setting `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
