//! Signed-request authentication gate
//!
//! Mutating endpoints require three headers:
//!
//! | Header      | Content                                      |
//! |-------------|----------------------------------------------|
//! | `SW-Public` | hex Ed25519 public key of the caller         |
//! | `SW-Nonce`  | decimal nonce; must equal the ledger value   |
//! | `SW-Sig`    | hex signature of SHA-256(body ‖ nonce)       |
//!
//! The verified `SW-Public` identity is what the registry acts on; identities
//! named in the body are never trusted for authorization.

use axum::http::HeaderMap;
use discovery_core::{Identity, Nonce, Signature};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::nonce::NonceStore;
use crate::storage::StorageError;

pub const HEADER_PUBLIC: &str = "SW-Public";
pub const HEADER_NONCE: &str = "SW-Nonce";
pub const HEADER_SIG: &str = "SW-Sig";

/// Why a request was not authenticated
#[derive(Error, Debug)]
pub enum AuthError {
    /// A required header is absent
    #[error("{0} header missing")]
    MissingHeader(&'static str),

    /// A header is present but cannot be parsed
    #[error("Error parsing {header}: {reason}")]
    MalformedHeader {
        header: &'static str,
        reason: String,
    },

    /// Stale, reused or future nonce
    #[error("{header} does not match: expected {expected}, got {got}", header = HEADER_NONCE)]
    NonceMismatch { expected: Nonce, got: Nonce },

    #[error("Signature verification failed: {0}")]
    InvalidSignature(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// The three authentication headers, parsed
#[derive(Debug, Clone)]
pub struct SignedHeaders {
    pub identity: Identity,
    pub nonce: Nonce,
    pub signature: Signature,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &'static str) -> Result<Option<&'a str>, AuthError> {
    match headers.get(name) {
        None => Ok(None),
        Some(value) => value
            .to_str()
            .map(|s| Some(s.trim()))
            .map_err(|e| AuthError::MalformedHeader {
                header: name,
                reason: e.to_string(),
            }),
    }
}

fn parse_header<T, E>(headers: &HeaderMap, name: &'static str) -> Result<Option<T>, AuthError>
where
    T: std::str::FromStr<Err = E>,
    E: std::fmt::Display,
{
    match header_str(headers, name)? {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|e: E| AuthError::MalformedHeader {
            header: name,
            reason: e.to_string(),
        }),
    }
}

fn require_header<T, E>(headers: &HeaderMap, name: &'static str) -> Result<T, AuthError>
where
    T: std::str::FromStr<Err = E>,
    E: std::fmt::Display,
{
    parse_header(headers, name)?.ok_or(AuthError::MissingHeader(name))
}

impl SignedHeaders {
    /// Parse all three headers, failing on the first missing or malformed one
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, AuthError> {
        Ok(Self {
            identity: require_header(headers, HEADER_PUBLIC)?,
            nonce: require_header(headers, HEADER_NONCE)?,
            signature: require_header(headers, HEADER_SIG)?,
        })
    }
}

/// Verifies signed requests against the nonce ledger
#[derive(Debug, Clone)]
pub struct AuthGate {
    nonces: Arc<dyn NonceStore>,
    verify: bool,
}

impl AuthGate {
    /// Create a gate; with `verify` off, requests pass unauthenticated
    pub fn new(nonces: Arc<dyn NonceStore>, verify: bool) -> Self {
        Self { nonces, verify }
    }

    pub fn verifies(&self) -> bool {
        self.verify
    }

    pub fn nonces(&self) -> &Arc<dyn NonceStore> {
        &self.nonces
    }

    /// Authenticate a request from its headers and raw body bytes.
    ///
    /// Returns the verified caller. With verification disabled, returns the
    /// unverified `SW-Public` identity if one was sent, and consumes no nonce.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        body: &[u8],
    ) -> Result<Option<Identity>, AuthError> {
        if !self.verify {
            return parse_header(headers, HEADER_PUBLIC);
        }

        // Step 1: Parse headers
        let signed = SignedHeaders::from_headers(headers)?;

        // Step 2: Nonce must be exactly the current value
        let expected = self.nonces.current(&signed.identity).await?;
        if signed.nonce != expected {
            warn!(
                identity = %signed.identity,
                expected = %expected,
                got = %signed.nonce,
                "SECURITY: Nonce mismatch"
            );
            return Err(AuthError::NonceMismatch {
                expected,
                got: signed.nonce,
            });
        }

        // Step 3: Verify signature over body ‖ nonce
        signed
            .identity
            .verify_request(body, signed.nonce, &signed.signature)
            .map_err(|e| {
                warn!(identity = %signed.identity, "SECURITY: Invalid request signature");
                AuthError::InvalidSignature(e.to_string())
            })?;

        // Step 4: Consume the nonce; a concurrent request may have won it
        if !self.nonces.advance(&signed.identity, signed.nonce).await? {
            let current = self.nonces.current(&signed.identity).await?;
            warn!(identity = %signed.identity, nonce = %signed.nonce, "SECURITY: Nonce consumed concurrently");
            return Err(AuthError::NonceMismatch {
                expected: current,
                got: signed.nonce,
            });
        }

        debug!(identity = %signed.identity, nonce = %signed.nonce, "Authenticated request");
        Ok(Some(signed.identity))
    }
}
