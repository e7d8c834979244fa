//! Request signing primitives
//!
//! A mutating request is authenticated by signing the SHA-256 digest of
//! `body ‖ decimal(nonce)` with the caller's Ed25519 key. The server recomputes
//! the digest from the raw body bytes and the nonce header, then verifies the
//! signature against the `Identity` that claims to have sent it.
//!
//! Key types:
//! - `KeyPair`: Ed25519 key pair held by a node
//! - `Signature`: 64-byte Ed25519 signature, hex on the wire

use ed25519_dalek::{Signer, SigningKey, Verifier};
use rand::rngs::OsRng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::{CoreError, Result};
use crate::types::{Identity, Nonce};

/// Digest that gets signed for a request body and nonce
pub fn request_digest(payload: &[u8], nonce: Nonce) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(payload);
    hasher.update(nonce.to_string().as_bytes());
    hasher.finalize().into()
}

/// Ed25519 signature over a request digest
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Signature([u8; 64]);

impl Signature {
    /// Length of the raw signature in bytes
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded signature
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        let arr: [u8; 64] = bytes.as_slice().try_into().map_err(|_| CoreError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}…)", &self.to_hex()[..16])
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Signature {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Signature {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Signature {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Signature::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Ed25519 key pair for signing discovery requests
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
    identity: Identity,
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("identity", &self.identity)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate(&mut OsRng))
    }

    /// Create a key pair from raw secret key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(bytes))
    }

    fn from_signing_key(signing_key: SigningKey) -> Self {
        let identity = Identity::from_verifying_key(&signing_key.verifying_key());
        Self {
            signing_key,
            identity,
        }
    }

    /// The public identity of this key pair
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Raw secret key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign a request body bound to `nonce`
    pub fn sign_request(&self, payload: &[u8], nonce: Nonce) -> Signature {
        let digest = request_digest(payload, nonce);
        Signature(self.signing_key.sign(&digest).to_bytes())
    }
}

impl Identity {
    /// Verify that `signature` covers `payload ‖ nonce` under this identity
    pub fn verify_request(&self, payload: &[u8], nonce: Nonce, signature: &Signature) -> Result<()> {
        let digest = request_digest(payload, nonce);
        let signature = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
        self.verifying_key()?
            .verify(&digest, &signature)
            .map_err(CoreError::from)
    }
}
