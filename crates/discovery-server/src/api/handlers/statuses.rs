//! Liveness reporting handler

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tracing::{info, warn};

use discovery_core::{EntryWithStatus, Status};

use super::AppState;
use crate::api::error::ApiError;

/// POST /statuses
///
/// Body: `[{"id": uuid, "is_up": bool}, ...]`. Each status is recorded for
/// the authenticated caller's own side of the transport; the response holds
/// the updated entries in request order.
///
/// Every id is checked (converged, caller is an edge) before any status is
/// written, so a batch with a bad entry changes nothing. A transport removed
/// between the check and the write still fails the request part way.
pub async fn update_statuses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Vec<EntryWithStatus>>, ApiError> {
    let reporter = state.gate.authenticate(&headers, &body).await?.ok_or_else(|| {
        ApiError::Unauthorized("Status updates require an SW-Public identity".into())
    })?;

    let statuses: Vec<Status> = serde_json::from_slice(&body)?;
    let scope = state.request_scope();

    for status in &statuses {
        let current = state.registry.get(&scope, status.id).await?;
        if !current.entry.edges.contains(&reporter) {
            warn!(id = %status.id, reporter = %reporter, "Status report from non-edge rejected");
            return Err(ApiError::Unauthorized(format!(
                "{} is not an edge of transport {}",
                reporter, status.id
            )));
        }
    }

    let mut updated = Vec::with_capacity(statuses.len());
    for status in statuses {
        let entry = state
            .registry
            .set_status(&scope, status.id, &reporter, status.is_up)
            .await?;
        info!(id = %status.id, reporter = %reporter, is_up = status.is_up, "Updated transport status");
        updated.push(entry);
    }

    Ok(Json(updated))
}
