use std::collections::HashMap;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
};

use super::{WebhookResult, confirm_payment};
use crate::db::AppState;
use crate::payments::{Gateway, MercadoPagoNotification};

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Mercado Pago payment notifications.
///
/// The notification only carries a payment id; the payment itself is always
/// fetched back from the API and must be `approved` before the plan changes.
pub async fn handle_mercadopago_webhook(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Bytes,
) -> WebhookResult {
    let Some(mp) = state.payments.mercadopago.as_ref() else {
        return (StatusCode::SERVICE_UNAVAILABLE, "Gateway not configured");
    };

    let notification: MercadoPagoNotification = match serde_json::from_slice(&body) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!("Invalid Mercado Pago notification: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid payload");
        }
    };

    let kind = notification
        .kind
        .as_deref()
        .or_else(|| query.get("type").map(String::as_str));
    if kind != Some("payment") {
        return (StatusCode::OK, "Event ignored");
    }

    let data_id = query
        .get("data.id")
        .cloned()
        .or_else(|| notification.data.as_ref().map(|d| d.id_string()));
    let Some(data_id) = data_id.filter(|id| !id.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing payment id");
    };

    if mp.has_webhook_secret() {
        let Some(signature) = header(&headers, "x-signature") else {
            return (StatusCode::UNAUTHORIZED, "Missing signature");
        };
        match mp.verify_webhook_signature(&data_id, header(&headers, "x-request-id"), signature) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(data_id = %data_id, "Invalid Mercado Pago signature");
                return (StatusCode::UNAUTHORIZED, "Invalid signature");
            }
            Err(e) => {
                tracing::error!("Signature verification error: {}", e);
                return (StatusCode::INTERNAL_SERVER_ERROR, "Signature verification error");
            }
        }
    } else {
        tracing::warn!("Mercado Pago webhook secret not set, relying on payment lookup");
    }

    let payment = match mp.get_payment(&data_id).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(data_id = %data_id, "Mercado Pago payment lookup failed: {}", e);
            return (StatusCode::BAD_GATEWAY, "Payment lookup failed");
        }
    };

    if !payment.is_approved() {
        tracing::debug!(data_id = %data_id, status = %payment.status, "Payment not approved yet");
        return (StatusCode::OK, "Payment not approved");
    }

    confirm_payment(
        &state,
        Gateway::MercadoPago,
        payment.external_reference.as_deref(),
        &payment.id_string(),
    )
}
