//! Outbound HTTP shared by the gateway, WhatsApp and AI clients.

use std::time::Duration;

use reqwest::{Client, Response};

use crate::error::{AppError, Result};

/// Payment gateways and the Evolution API.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Text generation is slower than the other integrations.
pub const AI_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// A client whose requests give up after `timeout`.
pub fn client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT.min(timeout))
        .build()
        .expect("Failed to create HTTP client")
}

/// Non-2xx responses become `Upstream` errors carrying the body.
pub async fn check_response(service: &str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Upstream(format!("{} API error: {} - {}", service, status, body)))
}
