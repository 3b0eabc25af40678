use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use shared::{
    domain::ConversationTurn,
    error::NoticeCode,
    protocol::{WebhookReply, WebhookRequest},
};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("invalid endpoint url '{url}': {source}")]
    InvalidEndpoint {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to webhook failed: {0}")]
    Network(#[source] reqwest::Error),
    #[error("webhook returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("failed to decode webhook response: {0}")]
    Decode(#[source] reqwest::Error),
}

impl TransportError {
    pub fn notice_code(&self) -> NoticeCode {
        match self {
            Self::Status { .. } => NoticeCode::BackendUnavailable,
            _ => NoticeCode::Unexpected,
        }
    }
}

/// One request/response exchange with the conversational backend.
#[async_trait]
pub trait TransportClient: Send + Sync {
    async fn exchange(
        &self,
        history: &[ConversationTurn],
        request: &WebhookRequest,
    ) -> Result<Vec<WebhookReply>, TransportError>;
}

/// REST channel webhook (`POST {sender, message}` → array of replies).
///
/// The backend keeps its own tracker per sender, so the local history is
/// only logged, not sent.
pub struct RestWebhookClient {
    http: Client,
    endpoint: Url,
}

impl RestWebhookClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, TransportError> {
        let endpoint = Url::parse(endpoint).map_err(|source| TransportError::InvalidEndpoint {
            url: endpoint.to_string(),
            source,
        })?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(TransportError::Client)?;
        Ok(Self { http, endpoint })
    }
}

#[async_trait]
impl TransportClient for RestWebhookClient {
    async fn exchange(
        &self,
        history: &[ConversationTurn],
        request: &WebhookRequest,
    ) -> Result<Vec<WebhookReply>, TransportError> {
        debug!(
            endpoint = %self.endpoint,
            sender = request.sender.as_str(),
            history_len = history.len(),
            "sending message to webhook"
        );
        let res = self
            .http
            .post(self.endpoint.clone())
            .json(request)
            .send()
            .await
            .map_err(TransportError::Network)?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(status = status.as_u16(), %body, "webhook returned error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let replies: Vec<WebhookReply> = res.json().await.map_err(TransportError::Decode)?;
        debug!(count = replies.len(), "webhook replied");
        Ok(replies)
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
