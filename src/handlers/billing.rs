use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post},
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::models::money::reais_to_cents;
use crate::models::{CheckoutRequest, CheckoutResponse, PlanPayment};
use crate::payments::{Gateway, Payer, PixCharge};
use crate::util::today;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/billing/checkout", post(checkout))
        .route("/api/billing/payments", get(list_payments))
}

/// Start a PIX purchase of a paid plan at the configured gateway.
///
/// The plan payment row exists before the gateway is called so its id can be
/// used as the external reference; a failed gateway call marks it `failed`.
pub async fn checkout(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    if !input.plan.is_paid() {
        return Err(AppError::BadRequest(msg::PLAN_NOT_PURCHASABLE.into()));
    }
    let gateway = state.payments.resolve(input.gateway)?;

    let payment = {
        let conn = state.db.get()?;
        let settings = queries::get_settings(&conn)?;
        let amount_cents = reais_to_cents(settings.prices.for_plan(input.plan))?;
        if amount_cents <= 0 {
            return Err(AppError::BadRequest(msg::PLAN_PRICE_NOT_SET.into()));
        }
        queries::create_plan_payment(&conn, ctx.user_id(), input.plan, amount_cents, gateway)?
    };

    let charge = match create_charge(&state, &ctx, &payment).await {
        Ok(charge) => charge,
        Err(e) => {
            tracing::error!(payment_id = %payment.id, gateway = gateway.as_ref(), "Checkout failed: {}", e);
            let conn = state.db.get()?;
            queries::mark_plan_payment_failed(&conn, &payment.id)?;
            return Err(e);
        }
    };

    {
        let conn = state.db.get()?;
        queries::attach_gateway_charge(
            &conn,
            &payment.id,
            &charge.gateway_payment_id,
            charge.pix_code.as_deref(),
            charge.pix_qr_base64.as_deref(),
        )?;
    }

    tracing::info!(
        payment_id = %payment.id,
        user_id = ctx.user_id(),
        plan = payment.plan.as_ref(),
        gateway = gateway.as_ref(),
        "Plan checkout created"
    );

    Ok(Json(CheckoutResponse {
        id: payment.id,
        gateway,
        plan: payment.plan,
        amount: payment.amount_cents,
        pix_code: charge.pix_code,
        pix_qr_base64: charge.pix_qr_base64,
    }))
}

async fn create_charge(state: &AppState, ctx: &UserContext, payment: &PlanPayment) -> Result<PixCharge> {
    let user = &ctx.user;
    let payer = Payer {
        name: &user.name,
        email: &user.email,
        cpf: user.cpf.as_deref().filter(|c| !c.trim().is_empty()),
    };
    let description = format!("Meus Clientes - Plano {}", payment.plan.as_ref());

    match payment.gateway {
        Gateway::MercadoPago => {
            let mp = state.payments.mercadopago()?;
            // Mercado Pago rejects notification URLs that are not public https
            let notification_url = format!("{}/api/webhooks/mercadopago", state.base_url);
            let notification_url = notification_url.starts_with("https://").then_some(notification_url);
            mp.create_pix_payment(
                &payment.id,
                payment.amount_cents,
                &description,
                &payer,
                notification_url.as_deref(),
            )
            .await
        }
        Gateway::Asaas => {
            let asaas = state.payments.asaas()?;
            let customer_id = match user.asaas_customer_id.clone() {
                Some(id) => id,
                None => {
                    let id = asaas.create_customer(&payer).await?;
                    let conn = state.db.get()?;
                    queries::set_asaas_customer_id(&conn, user.id, &id)?;
                    id
                }
            };
            asaas
                .create_pix_payment(&customer_id, &payment.id, payment.amount_cents, &description, today())
                .await
        }
    }
}

/// The caller's plan purchases, newest first.
pub async fn list_payments(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Vec<PlanPayment>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_plan_payments(&conn, ctx.user_id())?))
}
