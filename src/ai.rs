//! Reminder copywriting through Gemini `generateContent`.

use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::GeminiConfig;
use crate::error::{AppError, Result};
use crate::http::{self, AI_REQUEST_TIMEOUT, check_response};

/// What the dashboard sends to get a message drafted.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    #[serde(default)]
    pub client_name: String,
    /// Preformatted by the dashboard ("R$ 100,00"), or a bare number
    #[serde(default)]
    pub value: serde_json::Value,
    #[serde(default)]
    pub due_date: String,
    pub product: Option<String>,
    pub tone: Option<String>,
}

impl MessageRequest {
    fn value_text(&self) -> String {
        match &self.value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Number(n) => n
                .as_f64()
                .and_then(|v| crate::models::money::reais_to_cents(v).ok())
                .map(crate::templates::format_brl)
                .unwrap_or_else(|| n.to_string()),
            _ => String::new(),
        }
    }

    fn tone_instruction(&self) -> &'static str {
        match self.tone.as_deref().map(str::trim) {
            Some("formal") => "formal e profissional",
            Some("urgente") | Some("urgent") => "firme e urgente, mas educado",
            Some("divertido") | Some("funny") => "leve e bem-humorado",
            _ => "amigável e cordial",
        }
    }

    /// Prompt sent to the model.
    pub fn prompt(&self) -> String {
        let product = self.product.as_deref().filter(|p| !p.trim().is_empty()).unwrap_or("serviço");
        format!(
            "Escreva uma mensagem curta de WhatsApp em português do Brasil para lembrar o cliente \
             {name} sobre a fatura referente a {product}, no valor de {value}, com vencimento em {due}. \
             Tom: {tone}. Use no máximo 3 frases, pode usar *negrito* do WhatsApp, não use hashtags \
             e responda apenas com o texto da mensagem.",
            name = self.client_name.trim(),
            value = self.value_text(),
            due = self.due_date.trim(),
            tone = self.tone_instruction(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AiClient {
    client: Client,
    api_url: String,
    api_key: String,
    model: String,
}

impl AiClient {
    pub fn new(config: &GeminiConfig) -> Self {
        Self {
            client: http::client(AI_REQUEST_TIMEOUT),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        }
    }

    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/v1beta/models/{}:generateContent", self.api_url, self.model);
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": { "temperature": 0.7, "maxOutputTokens": 300 }
        });

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        let parsed: GenerateContentResponse = check_response("Gemini", response).await?.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        let text = text.trim().to_string();
        if text.is_empty() {
            return Err(AppError::Upstream("Gemini returned no text".into()));
        }
        Ok(text)
    }
}
