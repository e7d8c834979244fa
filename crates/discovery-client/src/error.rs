//! Error types for the discovery client

use thiserror::Error;

/// Result type for discovery client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur talking to the discovery service
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport-level failure (connect, timeout, TLS)
    #[error("HTTP error: {0}")]
    Http(String),

    /// The server answered with an unexpected status
    #[error("status: {status}, error: {message}")]
    Status { status: u16, message: String },

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The request body could not be encoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ClientError {
    /// HTTP status of a `Status` error
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ClientError::InvalidResponse(err.to_string())
        } else {
            ClientError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Serialization(err.to_string())
    }
}
