//! Gateway callbacks confirming plan payments.
//!
//! Handlers answer with a bare status and short text. Any non-2xx answer
//! makes the gateway retry.

mod asaas;
mod mercadopago;

pub use asaas::handle_asaas_webhook;
pub use mercadopago::handle_mercadopago_webhook;

use axum::{Router, http::StatusCode, routing::post};

use crate::db::{AppState, queries};
use crate::payments::Gateway;
use crate::util::today;

pub type WebhookResult = (StatusCode, &'static str);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/webhooks/mercadopago", post(handle_mercadopago_webhook))
        .route("/api/webhooks/asaas", post(handle_asaas_webhook))
}

/// Confirm the plan payment a gateway reported as paid.
///
/// Looks the payment up by our reference first, then by the gateway's id.
/// A payment already confirmed answers 200 so the gateway stops retrying.
fn confirm_payment(
    state: &AppState,
    gateway: Gateway,
    reference: Option<&str>,
    gateway_payment_id: &str,
) -> WebhookResult {
    let mut conn = match state.db.get() {
        Ok(conn) => conn,
        Err(e) => {
            tracing::error!("DB connection error: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    let lookup = match reference {
        Some(reference) => queries::get_plan_payment(&conn, reference),
        None => Ok(None),
    };
    let lookup = match lookup {
        Ok(None) => queries::get_plan_payment_by_gateway_id(&conn, gateway, gateway_payment_id),
        other => other,
    };
    let payment = match lookup {
        Ok(Some(payment)) => payment,
        Ok(None) => {
            tracing::warn!(
                gateway = gateway.as_ref(),
                gateway_payment_id,
                "Webhook for unknown plan payment"
            );
            return (StatusCode::OK, "Unknown payment");
        }
        Err(e) => {
            tracing::error!("Plan payment lookup failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "Database error");
        }
    };

    if payment.gateway != gateway {
        tracing::warn!(payment_id = %payment.id, "Webhook gateway does not match plan payment");
        return (StatusCode::BAD_REQUEST, "Gateway mismatch");
    }
    if payment
        .gateway_payment_id
        .as_deref()
        .is_some_and(|id| id != gateway_payment_id)
    {
        tracing::warn!(payment_id = %payment.id, gateway_payment_id, "Webhook payment id mismatch");
        return (StatusCode::BAD_REQUEST, "Payment id mismatch");
    }

    match queries::confirm_plan_payment(&mut conn, &payment.id, today()) {
        Ok(true) => (StatusCode::OK, "OK"),
        Ok(false) => (StatusCode::OK, "Already processed"),
        Err(e) => {
            tracing::error!(payment_id = %payment.id, "Failed to confirm plan payment: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Database error")
        }
    }
}
