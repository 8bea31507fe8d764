//! # HTTP Message Gateway
//!
//! Transport implementation speaking JSON to a message gateway endpoint.
//! Response classification drives the dispatcher's retry handling: rate
//! limiting and server-side failures are retryable, recipient-level
//! rejections are terminal.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.6.0

use crate::transport::{SendError, Transport};
use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use std::time::Duration;

pub struct HttpGatewayTransport {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpGatewayTransport {
    pub fn new(endpoint: String, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpGatewayTransport {
            client,
            endpoint,
            token,
        })
    }
}

#[async_trait]
impl Transport for HttpGatewayTransport {
    async fn send(&self, address: &str, body: &str) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "to": address, "body": body }));
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            // Connection refused, DNS, timeout: the gateway may come back.
            SendError::Retryable(format!("gateway request failed: {e}"))
        })?;

        let status = response.status();
        debug!("Gateway answered {status} for {address}");
        match status {
            s if s.is_success() => Ok(()),
            StatusCode::TOO_MANY_REQUESTS => {
                Err(SendError::Retryable("gateway throttled the session".to_string()))
            }
            s if s.is_server_error() => {
                Err(SendError::Retryable(format!("gateway error {s}")))
            }
            s => {
                let detail = response.text().await.unwrap_or_default();
                Err(SendError::Terminal(format!(
                    "gateway rejected {address}: {s} {detail}"
                )))
            }
        }
    }
}
