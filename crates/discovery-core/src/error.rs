//! Error types for the discovery core

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing identities or verifying signed requests
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Input was not valid hex
    #[error("Invalid hex encoding: {0}")]
    InvalidHex(String),

    /// Decoded value has the wrong size
    #[error("Invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Bytes do not describe an Ed25519 point
    #[error("Invalid public key: {0}")]
    InvalidPublicKey(String),

    /// Signature did not verify against the identity
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// A transport names the same identity twice
    #[error("Transport edges must be two distinct identities")]
    DegenerateEdges,

    /// Nonce could not be parsed as an unsigned decimal
    #[error("Invalid nonce: {0}")]
    InvalidNonce(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::SignatureInvalid(err.to_string())
    }
}

impl From<hex::FromHexError> for CoreError {
    fn from(err: hex::FromHexError) -> Self {
        CoreError::InvalidHex(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::SerializationError(err.to_string())
    }
}
