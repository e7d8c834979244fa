//! Transport registration and lookup handlers
//!
//! - `POST /transports/`: register (rendezvous) one or more transports
//! - `GET /transports/id:{uuid}`: one transport with status
//! - `GET /transports/edge:{identity}`: every usable transport of an identity
//! - `DELETE /transports/id:{uuid}`: remove a transport (edges only)

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::future::try_join_all;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use discovery_core::{Identity, Transport, TransportId, TransportRequest};

use super::AppState;
use crate::api::error::ApiError;

/// Path selector of `/transports/{selector}`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    /// `id:{uuid}`
    Id(TransportId),
    /// `edge:{identity}`
    Edge(Identity),
}

impl FromStr for Selector {
    type Err = ApiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(raw) = s.strip_prefix("id:") {
            let id = TransportId::parse_str(raw)
                .map_err(|e| ApiError::BadRequest(format!("Error parsing transport id: {}", e)))?;
            return Ok(Selector::Id(id));
        }
        if let Some(raw) = s.strip_prefix("edge:") {
            if raw.is_empty() {
                return Err(ApiError::BadRequest("Public key can't be empty".into()));
            }
            let edge = Identity::from_hex(raw)
                .map_err(|e| ApiError::BadRequest(format!("Error parsing public key: {}", e)))?;
            return Ok(Selector::Edge(edge));
        }
        Err(ApiError::NotFound(format!(
            "Unknown transport selector '{}': expected id:<uuid> or edge:<public key>",
            s
        )))
    }
}

/// POST /transports/
///
/// Registers every pair in the body and answers once all of them have
/// converged (both edges registered), or the request deadline passes.
///
/// 1. Authenticates the caller
/// 2. Parses the body as `[{"edges": [a, b]}, ...]`
/// 3. Runs one rendezvous per pair, concurrently
pub async fn register_transports(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Vec<Transport>>), ApiError> {
    // Step 1: Authenticate
    let caller = state.gate.authenticate(&headers, &body).await?;

    // Step 2: Parse body
    let requests: Vec<TransportRequest> = serde_json::from_slice(&body)?;
    if requests.is_empty() {
        return Err(ApiError::BadRequest("No transports to register".into()));
    }

    // Step 3: Rendezvous each pair
    let scope = state.request_scope();
    let registrations = requests.iter().map(|request| {
        // Unauthenticated deployments acknowledge on behalf of the first edge
        let acker = caller.unwrap_or(*request.edges.first());
        let scope = &scope;
        let registry = &state.registry;
        async move { registry.register(scope, request.edges, &acker).await }
    });

    let transports = try_join_all(registrations).await.map_err(|e| {
        warn!(caller = ?caller, error = %e, "Transport registration failed");
        ApiError::from(e)
    })?;

    info!(caller = ?caller, count = transports.len(), "Registered transports");
    Ok((StatusCode::CREATED, Json(transports)))
}

/// GET /transports/{selector}
///
/// `id:{uuid}` answers one `EntryWithStatus`; `edge:{identity}` answers a
/// (possibly empty) list of them.
pub async fn get_transports(
    State(state): State<Arc<AppState>>,
    Path(selector): Path<String>,
) -> Result<Response, ApiError> {
    let scope = state.request_scope();

    match selector.parse::<Selector>()? {
        Selector::Id(id) => {
            let entry = state.registry.get(&scope, id).await?;
            Ok(Json(entry).into_response())
        }
        Selector::Edge(edge) => {
            let entries = state.registry.list_by_edge(&scope, &edge).await?;
            Ok(Json(entries).into_response())
        }
    }
}

/// DELETE /transports/id:{uuid}
///
/// Only an authenticated edge of the transport may remove it. Answers the
/// removed record.
pub async fn deregister_transport(
    State(state): State<Arc<AppState>>,
    Path(selector): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Transport>, ApiError> {
    let caller = state.gate.authenticate(&headers, &body).await?.ok_or_else(|| {
        ApiError::Unauthorized("Deregistration requires an SW-Public identity".into())
    })?;

    let Selector::Id(id) = selector.parse::<Selector>()? else {
        return Err(ApiError::BadRequest(
            "Transports can only be deregistered by id".into(),
        ));
    };

    let removed = state
        .registry
        .deregister(&state.request_scope(), id, &caller)
        .await?;
    Ok(Json(removed))
}
