//! Error types shared across notesync crates.

use thiserror::Error;

use crate::LocalId;

/// Failure reported by the transport for a dispatched operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The service could not be reached.
    #[error("network unavailable")]
    NetworkUnavailable,

    /// The service answered with something that could not be parsed.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The service answered with a non-success HTTP status.
    #[error("http {status}: {message}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Service error code from the response body, if any.
        code: Option<String>,
        /// Human-readable detail.
        message: String,
    },
}

impl ApiError {
    /// Shorthand for an HTTP failure without a service error code.
    pub fn status(status: u16) -> Self {
        ApiError::Http {
            status,
            code: None,
            message: String::new(),
        }
    }

    /// Shorthand for an HTTP failure carrying a service error code.
    pub fn with_code(status: u16, code: &str) -> Self {
        ApiError::Http {
            status,
            code: Some(code.to_string()),
            message: String::new(),
        }
    }
}

/// A local intent that cannot be turned into an operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntentError {
    /// The intent names an image the note does not contain.
    #[error("note {note} has no media {media}")]
    UnknownMedia {
        /// The note.
        note: LocalId,
        /// The missing image.
        media: LocalId,
    },

    /// Upload requested for an image with no bytes on this device.
    #[error("media {0} has no local file")]
    MediaNotOnDevice(LocalId),

    /// Download requested for an image that was never uploaded.
    #[error("media {0} has no remote id")]
    MediaNotUploaded(LocalId),
}
