//! Error types for the mutation core.
//!
//! None of these are retried; each one becomes a disallowed admission
//! response carrying the error text.

use thiserror::Error;

/// Error raised while deciding on or building a mutation
#[derive(Error, Debug)]
pub enum MutationError {
    /// The inbound object does not have the expected Pod/Service shape
    #[error("failed to decode {kind}: {message}")]
    Decode { kind: &'static str, message: String },

    /// The subject annotation names a service in another namespace
    #[error(
        "subject \"{subject}\" matches a namespace other than \"{namespace}\" and is not permitted. \
         This check can be disabled by setting restrictCertificatesToNamespace to false in the webhook config"
    )]
    Validation { subject: String, namespace: String },

    /// The ignore annotation is not a boolean
    #[error("annotation {key} has invalid boolean value {value:?}")]
    InvalidBoolean { key: String, value: String },

    /// The assembled patch could not be serialized
    #[error("failed to encode patch: {0}")]
    Encode(String),
}

impl MutationError {
    /// Short machine-readable reason, used as a metric and log label
    pub fn reason(&self) -> &'static str {
        match self {
            MutationError::Decode { .. } => "DecodeError",
            MutationError::Validation { .. } => "ValidationError",
            MutationError::InvalidBoolean { .. } => "BooleanParseError",
            MutationError::Encode(_) => "EncodeError",
        }
    }
}

impl From<serde_json::Error> for MutationError {
    fn from(e: serde_json::Error) -> Self {
        MutationError::Encode(e.to_string())
    }
}
