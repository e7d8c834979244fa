//! Core request logic for the discovery server

mod auth;

pub use auth::{AuthError, AuthGate, SignedHeaders, HEADER_NONCE, HEADER_PUBLIC, HEADER_SIG};
