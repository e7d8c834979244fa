//! Nonce query handler

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use discovery_core::{Identity, NonceResponse};

use super::AppState;
use crate::api::error::ApiError;

/// GET /security/nonces/{identity}
///
/// The nonce the identity must sign its next request with. Unauthenticated:
/// the value is useless without the matching secret key.
pub async fn get_nonce(
    State(state): State<Arc<AppState>>,
    Path(edge): Path<String>,
) -> Result<Json<NonceResponse>, ApiError> {
    if edge.trim().is_empty() {
        return empty_nonce_identity().await;
    }
    let edge = Identity::from_hex(&edge)
        .map_err(|e| ApiError::BadRequest(format!("Error parsing public key: {}", e)))?;

    let next_nonce = state.gate.nonces().current(&edge).await?;
    Ok(Json(NonceResponse { edge, next_nonce }))
}

/// GET /security/nonces/
pub async fn empty_nonce_identity() -> Result<Json<NonceResponse>, ApiError> {
    Err(ApiError::BadRequest("Public key can't be empty".into()))
}
