//! HTTP client for the discovery API
//!
//! A client built with [`DiscoveryClient::with_auth`] signs every request:
//! it asks the server for its identity's current nonce, signs
//! `body ‖ nonce`, and sends `SW-Public`, `SW-Nonce` and `SW-Sig`. Nonces are
//! fetched per request, so one key pair should not be shared by clients
//! issuing requests concurrently.

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use discovery_core::{
    EdgePair, EntryWithStatus, Identity, KeyPair, Nonce, NonceResponse, Status, Transport,
    TransportId, TransportRequest,
};

use crate::error::{ClientError, Result};

/// Error body returned by the server
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Normalize a service address: default host, default scheme, no trailing slash
pub fn sanitized_addr(addr: &str) -> String {
    let addr = addr.trim();
    if addr.is_empty() {
        return "http://localhost".to_string();
    }

    let with_scheme = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };
    with_scheme.trim_end_matches('/').to_string()
}

/// Client for the transport discovery service
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    addr: String,
    http: reqwest::Client,
    keys: Option<KeyPair>,
}

impl DiscoveryClient {
    /// Create a client that sends unsigned requests
    pub fn new(addr: &str) -> Self {
        Self {
            addr: sanitized_addr(addr),
            http: reqwest::Client::new(),
            keys: None,
        }
    }

    /// Create a client that signs requests with `keys`
    pub fn with_auth(addr: &str, keys: KeyPair) -> Self {
        Self {
            keys: Some(keys),
            ..Self::new(addr)
        }
    }

    /// Base address requests are sent to
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Identity requests are signed as, if any
    pub fn identity(&self) -> Option<Identity> {
        self.keys.as_ref().map(KeyPair::identity)
    }

    /// The nonce `identity` must sign its next request with
    pub async fn next_nonce(&self, identity: &Identity) -> Result<Nonce> {
        let response = self
            .http
            .get(format!("{}/security/nonces/{}", self.addr, identity))
            .send()
            .await?;
        let body: NonceResponse = expect_json(response, StatusCode::OK).await?;
        Ok(body.next_nonce)
    }

    /// Register transports and return the converged records.
    ///
    /// With a durable backend this waits until every peer has registered too.
    pub async fn register_transports(&self, edges: &[EdgePair]) -> Result<Vec<Transport>> {
        if edges.is_empty() {
            return Ok(Vec::new());
        }
        let body: Vec<TransportRequest> = edges
            .iter()
            .map(|edges| TransportRequest { edges: *edges })
            .collect();

        let response = self
            .send(Method::POST, "/transports/", serde_json::to_vec(&body)?)
            .await?;
        expect_json(response, StatusCode::CREATED).await
    }

    pub async fn get_transport_by_id(&self, id: TransportId) -> Result<EntryWithStatus> {
        let response = self
            .send(Method::GET, &format!("/transports/id:{}", id), Vec::new())
            .await?;
        expect_json(response, StatusCode::OK).await
    }

    pub async fn get_transports_by_edge(&self, edge: &Identity) -> Result<Vec<EntryWithStatus>> {
        let response = self
            .send(Method::GET, &format!("/transports/edge:{}", edge), Vec::new())
            .await?;
        expect_json(response, StatusCode::OK).await
    }

    /// Report this client's liveness on its transports
    pub async fn update_statuses(&self, statuses: &[Status]) -> Result<Vec<EntryWithStatus>> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }
        let response = self
            .send(Method::POST, "/statuses", serde_json::to_vec(statuses)?)
            .await?;
        expect_json(response, StatusCode::OK).await
    }

    pub async fn deregister_transport(&self, id: TransportId) -> Result<Transport> {
        let response = self
            .send(Method::DELETE, &format!("/transports/id:{}", id), Vec::new())
            .await?;
        expect_json(response, StatusCode::OK).await
    }

    async fn send(&self, method: Method, path: &str, body: Vec<u8>) -> Result<reqwest::Response> {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.addr, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json");

        if let Some(keys) = &self.keys {
            let identity = keys.identity();
            let nonce = self.next_nonce(&identity).await?;
            let signature = keys.sign_request(&body, nonce);
            debug!(identity = %identity, nonce = %nonce, path = path, "Signing request");

            request = request
                .header("SW-Public", identity.to_hex())
                .header("SW-Nonce", nonce.to_string())
                .header("SW-Sig", signature.to_hex());
        }

        Ok(request.body(body).send().await?)
    }
}

/// Decode a response of the expected status, or turn it into `ClientError::Status`
async fn expect_json<T: DeserializeOwned>(
    response: reqwest::Response,
    expected: StatusCode,
) -> Result<T> {
    let status = response.status();
    if status == expected {
        return Ok(response.json().await?);
    }

    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.error)
        .unwrap_or(text);
    warn!(status = status.as_u16(), error = %message, "Discovery request failed");

    Err(ClientError::Status {
        status: status.as_u16(),
        message,
    })
}
