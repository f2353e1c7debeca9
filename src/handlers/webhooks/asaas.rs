use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};

use super::{WebhookResult, confirm_payment};
use crate::db::AppState;
use crate::payments::{AsaasWebhookEvent, Gateway};

/// Asaas payment events, authenticated by the `asaas-access-token` header.
pub async fn handle_asaas_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let Some(asaas) = state.payments.asaas.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Gateway not configured");
    };
    if !asaas.has_webhook_token() {
        tracing::error!("Asaas webhook received but ASAAS_WEBHOOK_TOKEN is not set");
        return (StatusCode::UNAUTHORIZED, "Webhook token not configured");
    }

    let token = headers
        .get("asaas-access-token")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !asaas.verify_webhook_token(token) {
        tracing::warn!("Invalid Asaas webhook token");
        return (StatusCode::UNAUTHORIZED, "Invalid token");
    }

    let event: AsaasWebhookEvent = match serde_json::from_slice(&body) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Invalid Asaas event: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    if !event.is_payment_confirmation() {
        tracing::debug!(event = %event.event, "Asaas event ignored");
        return (StatusCode::OK, "Event ignored");
    }
    let Some(payment) = event.payment else {
        return (StatusCode::BAD_REQUEST, "Missing payment");
    };

    confirm_payment(
        &state,
        Gateway::Asaas,
        payment.external_reference.as_deref(),
        &payment.id,
    )
}
