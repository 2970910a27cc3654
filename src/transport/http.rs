use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use super::{AgentCallRequest, AgentCallResponse, Transport};
use crate::error::TransportError;

/// HTTP implementation of the agent wire protocol: work units are POSTed as
/// JSON to the agent address, liveness is a GET against the probe path.
pub struct HttpTransport {
    client: Client,
    probe_path: String,
}

impl HttpTransport {
    pub fn new(probe_path: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            probe_path: probe_path.into(),
        })
    }

    fn probe_url(&self, address: &Url) -> Result<Url, TransportError> {
        address
            .join(&self.probe_path)
            .map_err(|e| TransportError::Connection(format!("invalid probe url: {}", e)))
    }
}

/// Maps an HTTP status to a transport error, or None for success statuses.
fn classify_status(status: StatusCode) -> Option<TransportError> {
    if status.is_success() {
        None
    } else if status.is_server_error() {
        Some(TransportError::ServerError {
            status: status.as_u16(),
        })
    } else {
        Some(TransportError::Rejected {
            status: status.as_u16(),
        })
    }
}

fn request_error(e: reqwest::Error) -> TransportError {
    // Anything that prevented a response from arriving counts as a
    // connection-level failure.
    TransportError::Connection(e.to_string())
}

#[async_trait]
impl Transport for HttpTransport {
    async fn call(
        &self,
        address: &Url,
        request: &AgentCallRequest,
    ) -> Result<AgentCallResponse, TransportError> {
        debug!(%address, work_unit = %request.work_unit_id, "issuing agent call");

        let response = self
            .client
            .post(address.clone())
            .json(request)
            .send()
            .await
            .map_err(request_error)?;

        if let Some(err) = classify_status(response.status()) {
            return Err(err);
        }

        let body = response.text().await.map_err(request_error)?;
        serde_json::from_str(&body)
            .map_err(|e| TransportError::InvalidResponse(format!("{}: {}", e, excerpt(&body))))
    }

    async fn probe(&self, address: &Url) -> Result<(), TransportError> {
        let url = self.probe_url(address)?;
        let response = self.client.get(url).send().await.map_err(request_error)?;

        match classify_status(response.status()) {
            None => Ok(()),
            Some(err) => Err(err),
        }
    }
}

fn excerpt(body: &str) -> String {
    body.chars().take(120).collect()
}
