//! `reqwest` transport against the ember HTTP API.

use crate::transport::{MetricsTransport, TransportError};
use async_trait::async_trait;
use ember_core::api::{
    CommentRequest, CommentResponse, ErrorBody, ItemResponse, ShareRequest, ShareResponse,
    ViewRequest, ViewResponse, VoteRequest, VoteResponse,
};
use ember_core::model::{ItemId, VoteDirection};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("ember-client/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| TransportError::Network(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, TransportError> {
        let response = request
            .send()
            .await
            .map_err(|err| send_failure(err.is_timeout(), err.is_connect(), err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|err| TransportError::Decode(err.to_string()));
        }

        let retry_header = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body, retry_header))
    }
}

/// Only the connect timeout is configured on the client; any other timeout
/// is reported as a network error with reqwest's own message.
fn send_failure(timed_out: bool, connecting: bool, message: String) -> TransportError {
    if timed_out && connecting {
        TransportError::Timeout(CONNECT_TIMEOUT)
    } else {
        TransportError::Network(message)
    }
}

fn classify_failure(status: StatusCode, body: &str, retry_header: Option<u64>) -> TransportError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => TransportError::Rejected {
            status: status.as_u16(),
            code: parsed.code(),
            retry_after_secs: parsed.error.retry_after_seconds.or(retry_header),
            message: parsed.error.message,
        },
        Err(_) if matches!(status.as_u16(), 502..=504) => TransportError::Unavailable {
            status: status.as_u16(),
        },
        Err(_) => TransportError::Rejected {
            status: status.as_u16(),
            code: None,
            message: status.canonical_reason().unwrap_or("unexpected status").to_string(),
            retry_after_secs: retry_header,
        },
    }
}

#[async_trait]
impl MetricsTransport for HttpTransport {
    async fn vote(
        &self,
        item_id: &ItemId,
        direction: VoteDirection,
    ) -> Result<VoteResponse, TransportError> {
        let body = VoteRequest {
            item_id: item_id.to_string(),
            direction: direction.as_str().to_string(),
        };
        self.send(self.client.post(self.url("/api/vote")).json(&body)).await
    }

    async fn view(&self, item_id: &ItemId, hint: Option<&str>) -> Result<ViewResponse, TransportError> {
        let body = ViewRequest {
            item_id: item_id.to_string(),
            identity: hint.map(str::to_string),
        };
        self.send(self.client.post(self.url("/api/view")).json(&body)).await
    }

    async fn share(&self, item_id: &ItemId) -> Result<ShareResponse, TransportError> {
        let body = ShareRequest {
            item_id: item_id.to_string(),
        };
        self.send(self.client.post(self.url("/api/share")).json(&body)).await
    }

    async fn comment(&self, item_id: &ItemId, content: &str) -> Result<CommentResponse, TransportError> {
        let body = CommentRequest {
            item_id: item_id.to_string(),
            content: content.to_string(),
        };
        self.send(self.client.post(self.url("/api/comments")).json(&body)).await
    }

    async fn fetch(&self, item_id: &ItemId) -> Result<ItemResponse, TransportError> {
        self.send(self.client.get(self.url(&format!("/api/items/{item_id}"))))
            .await
    }
}
