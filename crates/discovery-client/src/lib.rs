//! Transport Discovery Client
//!
//! Talks to the discovery server on behalf of one mesh node.
//!
//! ## Usage
//!
//! ```ignore
//! use discovery_client::DiscoveryClient;
//! use discovery_core::{EdgePair, KeyPair};
//!
//! let keys = KeyPair::generate();
//! let me = keys.identity();
//! let client = DiscoveryClient::with_auth("localhost:8080", keys);
//!
//! // Blocks until the peer registers the same pair
//! let transports = client.register_transports(&[EdgePair::new(me, peer)?]).await?;
//! let entry = client.get_transport_by_id(transports[0].id).await?;
//! ```

pub mod client;
pub mod error;

pub use client::{sanitized_addr, DiscoveryClient};
pub use error::{ClientError, Result};
