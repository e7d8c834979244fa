//! Common types used across the discovery service
//!
//! - `Identity`: the Ed25519 public key naming a node (and authenticating it)
//! - `EdgePair`: the unordered pair of identities a transport connects
//! - `Transport` / `EntryWithStatus`: the canonical record and its liveness
//! - `Nonce`: the per-identity replay counter
//!
//! All identities travel as lowercase hex on the wire.

use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Identifier assigned to a transport when it is first persisted
pub type TransportId = Uuid;

// =============================================================================
// Identity
// =============================================================================

/// Public key naming one node of the mesh
///
/// Equality is exact byte equality. The bytes are checked to be a valid
/// Ed25519 point at construction, so every `Identity` can verify signatures.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 32]);

impl Identity {
    /// Length of the raw key in bytes
    pub const LEN: usize = 32;

    /// Create an identity from raw key bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self> {
        VerifyingKey::from_bytes(bytes)
            .map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
        Ok(Self(*bytes))
    }

    /// Create an identity from a byte slice of any length
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; 32] = bytes.try_into().map_err(|_| CoreError::InvalidLength {
            expected: Self::LEN,
            actual: bytes.len(),
        })?;
        Self::from_bytes(&arr)
    }

    /// Parse a hex-encoded identity
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())?;
        Self::from_slice(&bytes)
    }

    /// Hex form used in headers, paths and JSON
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub(crate) fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(key.to_bytes())
    }

    pub(crate) fn verifying_key(&self) -> Result<VerifyingKey> {
        VerifyingKey::from_bytes(&self.0).map_err(|e| CoreError::InvalidPublicKey(e.to_string()))
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({}…)", &self.to_hex()[..12])
    }
}

impl FromStr for Identity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Identity::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Nonce
// =============================================================================

/// Per-identity counter that makes each signed request single-use
///
/// The decimal `Display` form is exactly what gets appended to the body
/// before hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(pub u64);

impl Nonce {
    /// Value of a never-seen identity
    pub const ZERO: Nonce = Nonce(0);

    /// The nonce that follows this one, or `None` once the counter is spent
    pub fn next(self) -> Option<Nonce> {
        self.0.checked_add(1).map(Nonce)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Nonce {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        s.parse::<u64>()
            .map(Nonce)
            .map_err(|e| CoreError::InvalidNonce(e.to_string()))
    }
}

impl From<u64> for Nonce {
    fn from(value: u64) -> Self {
        Nonce(value)
    }
}

// =============================================================================
// Edge pair
// =============================================================================

/// The two endpoints of a transport
///
/// The supplied order is preserved for display and status indexing, but
/// equality and hashing ignore it: `{A,B}` and `{B,A}` are the same pair.
#[derive(Clone, Copy, Serialize, Deserialize)]
#[serde(try_from = "[Identity; 2]", into = "[Identity; 2]")]
pub struct EdgePair([Identity; 2]);

impl EdgePair {
    /// Create a pair from two distinct identities
    pub fn new(a: Identity, b: Identity) -> Result<Self> {
        if a == b {
            return Err(CoreError::DegenerateEdges);
        }
        Ok(Self([a, b]))
    }

    /// First edge as supplied
    pub fn first(&self) -> &Identity {
        &self.0[0]
    }

    /// Second edge as supplied
    pub fn second(&self) -> &Identity {
        &self.0[1]
    }

    /// Both edges in supplied order
    pub fn as_array(&self) -> &[Identity; 2] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &Identity> {
        self.0.iter()
    }

    pub fn contains(&self, identity: &Identity) -> bool {
        self.0.contains(identity)
    }

    /// Position of `identity` in supplied order
    pub fn index_of(&self, identity: &Identity) -> Option<usize> {
        self.0.iter().position(|e| e == identity)
    }

    /// The edge opposite `identity`
    pub fn peer_of(&self, identity: &Identity) -> Option<&Identity> {
        match self.index_of(identity)? {
            0 => Some(&self.0[1]),
            _ => Some(&self.0[0]),
        }
    }

    /// Same pair, opposite order
    pub fn reversed(&self) -> Self {
        Self([self.0[1], self.0[0]])
    }

    /// Order-insensitive form: (smaller, larger)
    pub fn canonical(&self) -> (Identity, Identity) {
        if self.0[0] <= self.0[1] {
            (self.0[0], self.0[1])
        } else {
            (self.0[1], self.0[0])
        }
    }

    /// Stable string key for the unordered pair, used as a unique column
    pub fn pair_key(&self) -> String {
        let (lo, hi) = self.canonical();
        format!("{}:{}", lo.to_hex(), hi.to_hex())
    }
}

impl PartialEq for EdgePair {
    fn eq(&self, other: &Self) -> bool {
        self.canonical() == other.canonical()
    }
}

impl Eq for EdgePair {}

impl std::hash::Hash for EdgePair {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.canonical().hash(state);
    }
}

impl fmt::Debug for EdgePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

impl TryFrom<[Identity; 2]> for EdgePair {
    type Error = CoreError;

    fn try_from(edges: [Identity; 2]) -> Result<Self> {
        Self::new(edges[0], edges[1])
    }
}

impl From<EdgePair> for [Identity; 2] {
    fn from(pair: EdgePair) -> Self {
        pair.0
    }
}

// =============================================================================
// Transport records
// =============================================================================

/// Canonical record of a link between two identities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transport {
    /// Assigned at first durable creation, stable afterwards
    pub id: TransportId,

    /// The two endpoints
    pub edges: EdgePair,

    /// When the record was first created (not when it converged)
    pub registered_at: DateTime<Utc>,
}

/// A transport together with the liveness each edge last reported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryWithStatus {
    pub entry: Transport,

    /// Aggregate liveness: both edges up
    pub is_up: bool,

    /// Per-edge liveness, indexed like `entry.edges`
    pub statuses: [bool; 2],
}

impl EntryWithStatus {
    pub fn new(entry: Transport, statuses: [bool; 2]) -> Self {
        Self {
            entry,
            is_up: statuses[0] && statuses[1],
            statuses,
        }
    }

    /// A record no edge has reported on yet; both edges count as up
    pub fn fresh(entry: Transport) -> Self {
        Self::new(entry, [true, true])
    }

    /// Record `reporter`'s own liveness. Returns false if it is not an edge.
    pub fn apply_status(&mut self, reporter: &Identity, is_up: bool) -> bool {
        match self.entry.edges.index_of(reporter) {
            Some(idx) => {
                self.statuses[idx] = is_up;
                self.is_up = self.statuses[0] && self.statuses[1];
                true
            }
            None => false,
        }
    }
}

// =============================================================================
// Wire payloads
// =============================================================================

/// One element of a `POST /transports/` body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportRequest {
    pub edges: EdgePair,
}

/// One element of a `POST /statuses` body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub id: TransportId,
    pub is_up: bool,
}

/// Response of `GET /security/nonces/{identity}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NonceResponse {
    pub edge: Identity,
    pub next_nonce: Nonce,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn identity() -> Identity {
        KeyPair::generate().identity()
    }

    #[test]
    fn test_identity_hex_round_trip() {
        let id = identity();
        let parsed: Identity = id.to_hex().parse().unwrap();
        assert_eq!(id, parsed);
        assert_eq!(id.to_string().len(), 64);
    }

    #[test]
    fn test_identity_rejects_bad_input() {
        assert!(matches!(Identity::from_hex("zz"), Err(CoreError::InvalidHex(_))));
        assert!(matches!(
            Identity::from_hex("abcd"),
            Err(CoreError::InvalidLength { expected: 32, actual: 2 })
        ));
        assert!(Identity::from_hex("").is_err());
    }

    #[test]
    fn test_edge_pair_is_unordered() {
        let (a, b) = (identity(), identity());
        let ab = EdgePair::new(a, b).unwrap();
        let ba = EdgePair::new(b, a).unwrap();

        assert_eq!(ab, ba);
        assert_eq!(ab.pair_key(), ba.pair_key());
        assert_eq!(ab.first(), &a);
        assert_eq!(ba.first(), &b);
        assert_eq!(ab.peer_of(&a), Some(&b));
        assert_eq!(ab.peer_of(&identity()), None);
    }

    #[test]
    fn test_edge_pair_rejects_self_loop() {
        let a = identity();
        assert_eq!(EdgePair::new(a, a).unwrap_err(), CoreError::DegenerateEdges);

        let json = format!(r#"["{a}","{a}"]"#);
        assert!(serde_json::from_str::<EdgePair>(&json).is_err());
    }

    #[test]
    fn test_status_aggregate_is_and() {
        let (a, b) = (identity(), identity());
        let mut entry = EntryWithStatus::fresh(Transport {
            id: Uuid::new_v4(),
            edges: EdgePair::new(a, b).unwrap(),
            registered_at: Utc::now(),
        });
        assert!(entry.is_up);

        assert!(entry.apply_status(&b, false));
        assert_eq!(entry.statuses, [true, false]);
        assert!(!entry.is_up);

        assert!(!entry.apply_status(&identity(), true));
        assert!(!entry.is_up);

        assert!(entry.apply_status(&b, true));
        assert!(entry.is_up);
    }

    #[test]
    fn test_nonce_display_is_decimal() {
        assert_eq!(Nonce(42).to_string(), "42");
        assert_eq!("7".parse::<Nonce>().unwrap(), Nonce(7));
        assert!("-1".parse::<Nonce>().is_err());
        assert_eq!(Nonce::ZERO.next(), Some(Nonce(1)));
        assert_eq!(Nonce(u64::MAX).next(), None);
    }

    #[test]
    fn test_transport_request_json_shape() {
        let (a, b) = (identity(), identity());
        let json = format!(r#"{{"edges":["{a}","{b}"]}}"#);
        let req: TransportRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(req.edges.first(), &a);
        assert_eq!(serde_json::to_string(&req).unwrap(), json);
    }
}
