//! Error types for the REST binder.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for binder operations.
pub type RestResult<T> = std::result::Result<T, RestError>;

/// Error taxonomy of the REST surface.
///
/// `Protocol` covers malformed requests and maps to 400; `Status` carries an
/// explicit business status and is propagated verbatim in both directions;
/// everything else maps to 500 with a sanitized debug message.
#[derive(Debug, Error)]
pub enum RestError {
    /// Malformed request: missing parameter, wrong content type,
    /// undeserializable body.
    #[error("{0}")]
    Protocol(String),

    /// Explicit business error with an HTTP status.
    #[error("HTTP {status}: {message}")]
    Status {
        /// Status code to respond with / received from the server.
        status: StatusCode,
        /// Human-readable message, carried as `statusMessage`.
        message: String,
    },

    /// Invalid contract description, reported at bind time.
    #[error("invalid contract: {0}")]
    Contract(String),

    /// Client-side transport failure.
    #[error("request failed: {0}")]
    Transport(String),

    /// JSON (de)serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Uncaught failure inside an operation body.
    #[error("{0}")]
    Internal(String),
}

impl RestError {
    /// Create a protocol (4xx) error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    /// Create an explicit status error.
    pub fn status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Status {
            status,
            message: message.into(),
        }
    }

    /// Create an internal (500) error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a contract-description error.
    pub fn contract(message: impl Into<String>) -> Self {
        Self::Contract(message.into())
    }

    /// The HTTP status the server responds with for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Protocol(_) => StatusCode::BAD_REQUEST,
            Self::Status { status, .. } => *status,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `statusMessage` value for this error.
    pub fn status_message(&self) -> String {
        match self {
            Self::Protocol(message) | Self::Internal(message) => message.clone(),
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Wire shape of an error response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable error message.
    #[serde(rename = "statusMessage")]
    pub status_message: String,

    /// Best-effort diagnostic string, present for unexpected errors only.
    /// Never contains structured data.
    #[serde(
        rename = "statusDebugMessage",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub status_debug_message: Option<String>,
}
