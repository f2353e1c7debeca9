use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use super::{Payer, PixCharge};
use crate::config::AsaasConfig;
use crate::error::Result;
use crate::http::{self, REQUEST_TIMEOUT, check_response};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateCustomerRequest<'a> {
    name: &'a str,
    email: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cpf_cnpj: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreatePaymentRequest<'a> {
    customer: &'a str,
    billing_type: &'static str,
    value: f64,
    due_date: String,
    description: &'a str,
    external_reference: &'a str,
}

#[derive(Debug, Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PixQrCodeResponse {
    encoded_image: Option<String>,
    payload: Option<String>,
}

/// Webhook body. Only payment events are handled.
#[derive(Debug, Deserialize)]
pub struct AsaasWebhookEvent {
    pub event: String,
    pub payment: Option<AsaasPayment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AsaasPayment {
    pub id: String,
    pub status: Option<String>,
    pub external_reference: Option<String>,
}

impl AsaasWebhookEvent {
    pub fn is_payment_confirmation(&self) -> bool {
        matches!(self.event.as_str(), "PAYMENT_RECEIVED" | "PAYMENT_CONFIRMED")
    }
}

#[derive(Debug, Clone)]
pub struct AsaasClient {
    client: Client,
    api_url: String,
    api_key: String,
    webhook_token: Option<String>,
}

impl AsaasClient {
    pub fn new(config: &AsaasConfig) -> Self {
        Self {
            client: http::client(REQUEST_TIMEOUT),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            webhook_token: config.webhook_token.clone(),
        }
    }

    /// Create a customer and return its Asaas id.
    pub async fn create_customer(&self, payer: &Payer<'_>) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/v3/customers", self.api_url))
            .header("access_token", &self.api_key)
            .json(&CreateCustomerRequest {
                name: payer.name,
                email: payer.email,
                cpf_cnpj: payer.cpf,
            })
            .send()
            .await?;
        let customer: IdResponse = check_response("Asaas", response).await?.json().await?;
        Ok(customer.id)
    }

    /// Create a PIX charge and fetch its QR code.
    pub async fn create_pix_payment(
        &self,
        customer_id: &str,
        reference: &str,
        amount_cents: i64,
        description: &str,
        due_date: NaiveDate,
    ) -> Result<PixCharge> {
        let response = self
            .client
            .post(format!("{}/v3/payments", self.api_url))
            .header("access_token", &self.api_key)
            .json(&CreatePaymentRequest {
                customer: customer_id,
                billing_type: "PIX",
                value: amount_cents as f64 / 100.0,
                due_date: due_date.format("%Y-%m-%d").to_string(),
                description,
                external_reference: reference,
            })
            .send()
            .await?;
        let payment: IdResponse = check_response("Asaas", response).await?.json().await?;

        let response = self
            .client
            .get(format!("{}/v3/payments/{}/pixQrCode", self.api_url, payment.id))
            .header("access_token", &self.api_key)
            .send()
            .await?;
        let qr: PixQrCodeResponse = check_response("Asaas", response).await?.json().await?;

        Ok(PixCharge {
            gateway_payment_id: payment.id,
            pix_code: qr.payload,
            pix_qr_base64: qr.encoded_image,
        })
    }

    pub fn has_webhook_token(&self) -> bool {
        self.webhook_token.is_some()
    }

    /// Constant-time check of the `asaas-access-token` header.
    pub fn verify_webhook_token(&self, provided: &str) -> bool {
        let Some(ref expected) = self.webhook_token else {
            return false;
        };
        expected.len() == provided.len() && bool::from(expected.as_bytes().ct_eq(provided.as_bytes()))
    }
}
