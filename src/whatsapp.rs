//! WhatsApp delivery through an Evolution API instance.

use reqwest::Client;
use serde::Serialize;

use crate::config::EvolutionConfig;
use crate::error::{AppError, Result, msg};
use crate::http::{self, REQUEST_TIMEOUT, check_response};

/// Digits only, with Brazil's `55` country code prefixed when missing.
pub fn normalize_phone(phone: &str) -> Option<String> {
    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 8 {
        return None;
    }
    if digits.starts_with("55") && digits.len() >= 12 {
        Some(digits)
    } else {
        Some(format!("55{digits}"))
    }
}

#[derive(Debug, Serialize)]
struct SendTextRequest<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Debug, Clone)]
pub struct WhatsAppClient {
    client: Client,
    api_url: String,
    api_key: String,
    instance: String,
}

impl WhatsAppClient {
    pub fn new(config: &EvolutionConfig) -> Self {
        Self {
            client: http::client(REQUEST_TIMEOUT),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            instance: config.instance.clone(),
        }
    }

    /// `POST {api}/message/sendText/{instance}`.
    pub async fn send_text(&self, phone: &str, text: &str) -> Result<()> {
        let number = normalize_phone(phone)
            .ok_or_else(|| AppError::BadRequest(msg::PHONE_REQUIRED.into()))?;

        let response = self
            .client
            .post(format!("{}/message/sendText/{}", self.api_url, self.instance))
            .header("apikey", &self.api_key)
            .json(&SendTextRequest {
                number: &number,
                text,
            })
            .send()
            .await?;
        check_response("Evolution", response).await?;

        tracing::info!(number = %number, "WhatsApp message sent");
        Ok(())
    }
}
