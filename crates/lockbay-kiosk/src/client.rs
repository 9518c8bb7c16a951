//! HTTP client to the coordination server.
//!
//! [`CommandApi`] is the seam the runner is generic over: the real
//! implementation speaks JSON over reqwest, tests substitute a scripted
//! one. Claim races are part of the contract, not an error: a 409 on
//! claim means another pass already took the command, and the kiosk
//! simply moves on.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use lockbay_core::wire::{
    ClaimRequest, CommandDescriptor, CommandResultReport, HeartbeatRequest, HeartbeatResponse,
    RecoverResponse, ZoneLayoutView,
};
use lockbay_core::{CommandId, KioskId};

/// Time budget for one server round trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors talking to the coordination server.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never completed (DNS, refused connection, timeout).
    #[error("Server unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Server rejected request: {status}: {body}")]
    Rejected {
        status: reqwest::StatusCode,
        body: String,
    },
}

pub type ClientResult<T> = std::result::Result<T, ClientError>;

/// Server operations the kiosk daemon needs.
///
/// Not object-safe (native `async fn` methods); the runner takes it as
/// a generic parameter, the way the controller takes its link.
pub trait CommandApi: Send + Sync {
    /// Push a liveness heartbeat and collect the server's poll cadence.
    async fn heartbeat(&self, request: &HeartbeatRequest) -> ClientResult<HeartbeatResponse>;

    /// Fetch the pending command batch for this kiosk.
    async fn pending(&self, kiosk: &KioskId) -> ClientResult<Vec<CommandDescriptor>>;

    /// Claim a command before executing it.
    ///
    /// Returns `false` when another claimant won the race; the command
    /// must then be skipped, not executed.
    async fn claim(&self, id: CommandId, kiosk: &KioskId) -> ClientResult<bool>;

    /// Report the outcome of an executed command.
    async fn report(&self, id: CommandId, report: &CommandResultReport) -> ClientResult<()>;

    /// Ask the server to fail commands stranded in `executing`.
    async fn recover(&self, kiosk: &KioskId) -> ClientResult<Vec<CommandId>>;

    /// Fetch the zone table and card inventory for the coil mapper.
    async fn zone_layout(&self, kiosk: &KioskId) -> ClientResult<ZoneLayoutView>;
}

/// The server wraps successful payloads in a `data` envelope.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

/// [`CommandApi`] over HTTP.
pub struct HttpServerClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpServerClient {
    /// Build a client against the server's base URL.
    ///
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url)
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> ClientResult<T> {
        let response = check(response).await?;
        Ok(response.json::<Envelope<T>>().await?.data)
    }
}

async fn check(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ClientError::Rejected { status, body })
}

impl CommandApi for HttpServerClient {
    async fn heartbeat(&self, request: &HeartbeatRequest) -> ClientResult<HeartbeatResponse> {
        let response = self
            .http
            .post(self.url("/kiosks/heartbeat"))
            .json(request)
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn pending(&self, kiosk: &KioskId) -> ClientResult<Vec<CommandDescriptor>> {
        let response = self
            .http
            .get(self.url(&format!("/kiosks/{kiosk}/commands")))
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn claim(&self, id: CommandId, kiosk: &KioskId) -> ClientResult<bool> {
        let response = self
            .http
            .post(self.url(&format!("/commands/{id}/claim")))
            .json(&ClaimRequest {
                kiosk_id: kiosk.clone(),
            })
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::CONFLICT {
            return Ok(false);
        }
        check(response).await?;
        Ok(true)
    }

    async fn report(&self, id: CommandId, report: &CommandResultReport) -> ClientResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/commands/{id}/result")))
            .json(report)
            .send()
            .await?;
        check(response).await?;
        Ok(())
    }

    async fn recover(&self, kiosk: &KioskId) -> ClientResult<Vec<CommandId>> {
        let response = self
            .http
            .post(self.url(&format!("/kiosks/{kiosk}/recover")))
            .send()
            .await?;
        let recovered: RecoverResponse = Self::decode(response).await?;
        Ok(recovered.recovered)
    }

    async fn zone_layout(&self, kiosk: &KioskId) -> ClientResult<ZoneLayoutView> {
        let response = self
            .http
            .get(self.url(&format!("/kiosks/{kiosk}/zones")))
            .send()
            .await?;
        Self::decode(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_is_stripped() {
        let client = HttpServerClient::new("http://server:8080/").unwrap();
        assert_eq!(
            client.url("/kiosks/heartbeat"),
            "http://server:8080/api/v1/kiosks/heartbeat"
        );
    }

    #[test]
    fn test_envelope_unwraps_data() {
        let json = r#"{"data":{"status":"online","poll_interval_ms":1000}}"#;
        let envelope: Envelope<HeartbeatResponse> = serde_json::from_str(json).unwrap();
        assert!(envelope.data.status.is_online());
        assert_eq!(envelope.data.poll_interval_ms, 1000);
    }
}
