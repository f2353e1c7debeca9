use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{Payer, PixCharge};
use crate::config::MercadoPagoConfig;
use crate::error::{AppError, Result, msg};
use crate::http::{self, REQUEST_TIMEOUT, check_response};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Serialize)]
struct CreatePaymentRequest<'a> {
    transaction_amount: f64,
    description: &'a str,
    payment_method_id: &'static str,
    external_reference: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification_url: Option<&'a str>,
    payer: PayerBody<'a>,
}

#[derive(Debug, Serialize)]
struct PayerBody<'a> {
    email: &'a str,
    first_name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    identification: Option<Identification<'a>>,
}

#[derive(Debug, Serialize)]
struct Identification<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    number: &'a str,
}

/// The parts of a Mercado Pago payment this service reads.
#[derive(Debug, Deserialize)]
pub struct MercadoPagoPayment {
    pub id: serde_json::Value,
    pub status: String,
    pub external_reference: Option<String>,
    pub point_of_interaction: Option<PointOfInteraction>,
}

#[derive(Debug, Deserialize)]
pub struct PointOfInteraction {
    pub transaction_data: Option<TransactionData>,
}

#[derive(Debug, Deserialize)]
pub struct TransactionData {
    pub qr_code: Option<String>,
    pub qr_code_base64: Option<String>,
}

impl MercadoPagoPayment {
    /// Payment ids arrive as JSON numbers; store them as strings.
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn is_approved(&self) -> bool {
        self.status == "approved"
    }
}

/// Webhook notification body (`type=payment`).
#[derive(Debug, Deserialize)]
pub struct MercadoPagoNotification {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub action: Option<String>,
    pub data: Option<NotificationData>,
}

#[derive(Debug, Deserialize)]
pub struct NotificationData {
    pub id: serde_json::Value,
}

impl NotificationData {
    pub fn id_string(&self) -> String {
        match &self.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    api_url: String,
    access_token: String,
    webhook_secret: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(config: &MercadoPagoConfig) -> Self {
        Self {
            client: http::client(REQUEST_TIMEOUT),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            access_token: config.access_token.clone(),
            webhook_secret: config.webhook_secret.clone(),
        }
    }

    /// Create a PIX payment. `reference` is our plan payment id, echoed back as
    /// `external_reference` and used as the idempotency key.
    pub async fn create_pix_payment(
        &self,
        reference: &str,
        amount_cents: i64,
        description: &str,
        payer: &Payer<'_>,
        notification_url: Option<&str>,
    ) -> Result<PixCharge> {
        let body = CreatePaymentRequest {
            transaction_amount: amount_cents as f64 / 100.0,
            description,
            payment_method_id: "pix",
            external_reference: reference,
            notification_url,
            payer: PayerBody {
                email: payer.email,
                first_name: payer.name,
                identification: payer.cpf.map(|number| Identification { kind: "CPF", number }),
            },
        };

        let response = self
            .client
            .post(format!("{}/v1/payments", self.api_url))
            .bearer_auth(&self.access_token)
            .header("X-Idempotency-Key", reference)
            .json(&body)
            .send()
            .await?;
        let payment: MercadoPagoPayment = check_response("Mercado Pago", response).await?.json().await?;

        let data = payment
            .point_of_interaction
            .as_ref()
            .and_then(|p| p.transaction_data.as_ref());
        Ok(PixCharge {
            gateway_payment_id: payment.id_string(),
            pix_code: data.and_then(|d| d.qr_code.clone()),
            pix_qr_base64: data.and_then(|d| d.qr_code_base64.clone()),
        })
    }

    pub async fn get_payment(&self, payment_id: &str) -> Result<MercadoPagoPayment> {
        let response = self
            .client
            .get(format!("{}/v1/payments/{}", self.api_url, payment_id))
            .bearer_auth(&self.access_token)
            .send()
            .await?;
        Ok(check_response("Mercado Pago", response).await?.json().await?)
    }

    pub fn has_webhook_secret(&self) -> bool {
        self.webhook_secret.is_some()
    }

    /// Maximum age of a signed notification, in seconds.
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Allowed clock skew for timestamps ahead of ours.
    const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

    /// Verify the `x-signature` header (`ts=...,v1=...`).
    ///
    /// The signed manifest is `id:{data.id};request-id:{x-request-id};ts:{ts};`
    /// with alphanumeric ids lowercased. Without a configured secret this returns false.
    pub fn verify_webhook_signature(
        &self,
        data_id: &str,
        request_id: Option<&str>,
        signature: &str,
    ) -> Result<bool> {
        self.verify_webhook_signature_at(data_id, request_id, signature, chrono::Utc::now().timestamp())
    }

    /// As [`verify_webhook_signature`](Self::verify_webhook_signature), against a given clock.
    pub fn verify_webhook_signature_at(
        &self,
        data_id: &str,
        request_id: Option<&str>,
        signature: &str,
        now: i64,
    ) -> Result<bool> {
        let Some(ref secret) = self.webhook_secret else {
            return Ok(false);
        };

        let mut ts = None;
        let mut v1 = None;
        for part in signature.split(',') {
            match part.trim().split_once('=') {
                Some(("ts", value)) => ts = Some(value.trim()),
                Some(("v1", value)) => v1 = Some(value.trim()),
                _ => {}
            }
        }
        let (Some(ts), Some(v1)) = (ts, v1) else {
            return Ok(false);
        };

        let Ok(sent_at) = ts.parse::<i64>() else {
            return Ok(false);
        };
        // Some notifications carry milliseconds
        let sent_at = if sent_at > 10_000_000_000 { sent_at / 1000 } else { sent_at };
        let age = now - sent_at;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Mercado Pago webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }
        if age < -Self::WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!("Mercado Pago webhook rejected: timestamp in the future (age={}s)", age);
            return Ok(false);
        }

        let data_id = if data_id.chars().all(|c| c.is_ascii_alphanumeric()) {
            data_id.to_ascii_lowercase()
        } else {
            data_id.to_string()
        };
        let mut manifest = format!("id:{data_id};");
        if let Some(request_id) = request_id {
            manifest.push_str(&format!("request-id:{request_id};"));
        }
        manifest.push_str(&format!("ts:{ts};"));

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(manifest.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if expected.len() != v1.len() {
            return Ok(false);
        }
        Ok(expected.as_bytes().ct_eq(v1.as_bytes()).into())
    }
}
