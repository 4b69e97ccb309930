//! Error types shared by Warden crates
//!
//! Errors carry the kind and name of the object involved so that a skipped
//! watch event can be traced back to the offending resource.

use thiserror::Error;

/// Default context value when no specific object is known
pub const UNKNOWN_CONTEXT: &str = "unknown";

/// Main error type for shared Warden operations
#[derive(Debug, Error)]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {source}")]
    Kube {
        /// The underlying kube-rs error
        #[from]
        source: kube::Error,
    },

    /// An object from the cluster could not be turned into a typed fact
    #[error("validation error for {kind} {name}: {message}")]
    Validation {
        /// Resource kind (UserBinding, ClusterRole, ...)
        kind: String,
        /// Object name
        name: String,
        /// Description of what's invalid
        message: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {message}")]
    Serialization {
        /// Description of what failed
        message: String,
    },
}

impl Error {
    /// Create a validation error without object context
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            kind: UNKNOWN_CONTEXT.to_string(),
            name: UNKNOWN_CONTEXT.to_string(),
            message: msg.into(),
        }
    }

    /// Create a validation error for a specific object
    pub fn validation_for(
        kind: impl Into<String>,
        name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self::Validation {
            kind: kind.into(),
            name: name.into(),
            message: msg.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::serialization(e.to_string())
    }
}
