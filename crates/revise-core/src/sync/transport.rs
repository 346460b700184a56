//! How a sync request reaches the endpoint

use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::Deserialize;

use super::{SyncError, SyncRequest, SyncResponse};
use crate::config::ClientConfig;
use crate::util::compact_text;

pub const SYNC_PATH: &str = "/v1/sync";

/// Result of a push/pull exchange that reached the server.
#[derive(Debug, Clone, PartialEq)]
pub enum PushPullReply {
    Accepted(SyncResponse),
    /// The credential was refused; the round becomes a no-op
    Unauthorized,
}

/// Sends one combined push/pull call.
pub trait SyncTransport: Send + Sync + 'static {
    fn push_pull(
        &self,
        token: &str,
        request: &SyncRequest,
    ) -> impl Future<Output = Result<PushPullReply, SyncError>> + Send;
}

/// Transport over HTTPS to the Revise API.
#[derive(Clone)]
pub struct HttpSyncTransport {
    endpoint: String,
    client: Client,
}

impl HttpSyncTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, SyncError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(SyncError::Network)?;
        Ok(Self {
            endpoint: config.endpoint(SYNC_PATH),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SyncTransport for HttpSyncTransport {
    async fn push_pull(
        &self,
        token: &str,
        request: &SyncRequest,
    ) -> Result<PushPullReply, SyncError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            return Ok(PushPullReply::Unauthorized);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::from_status(status, parse_api_error(status, &body)));
        }

        let payload = response.json::<SyncResponse>().await?;
        Ok(PushPullReply::Accepted(payload))
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        trimmed
    }
}
