use axum::{Extension, Router, extract::State, routing::post};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::whatsapp::WhatsAppClient;

const TEST_MESSAGE: &str =
    "✅ Teste de conexão do Meus Clientes: sua integração com o WhatsApp está funcionando!";

/// `/api/admin/evolution/*` are the admin console's names for the same endpoints.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/whatsapp/send", post(send_message))
        .route("/api/whatsapp/test", post(send_test))
        .route("/api/admin/evolution/send", post(send_message))
        .route("/api/admin/evolution/test", post(send_test))
}

#[derive(Debug, Deserialize)]
pub struct SendMessageInput {
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct TestMessageInput {
    #[serde(default)]
    pub phone: String,
}

fn client_for<'a>(state: &'a AppState, ctx: &UserContext) -> Result<&'a WhatsAppClient> {
    if !ctx.user.has_paid_features() {
        return Err(AppError::Forbidden(msg::PAID_PLAN_REQUIRED.into()));
    }
    state
        .whatsapp
        .as_ref()
        .ok_or_else(|| AppError::Unavailable(msg::WHATSAPP_NOT_CONFIGURED.into()))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<SendMessageInput>,
) -> Result<Json<Value>> {
    let client = client_for(&state, &ctx)?;
    if input.phone.trim().is_empty() {
        return Err(AppError::BadRequest(msg::PHONE_REQUIRED.into()));
    }
    if input.message.trim().is_empty() {
        return Err(AppError::BadRequest(msg::MESSAGE_REQUIRED.into()));
    }

    client.send_text(&input.phone, &input.message).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn send_test(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<TestMessageInput>,
) -> Result<Json<Value>> {
    let client = client_for(&state, &ctx)?;
    if input.phone.trim().is_empty() {
        return Err(AppError::BadRequest(msg::PHONE_REQUIRED.into()));
    }

    client.send_text(&input.phone, TEST_MESSAGE).await?;
    Ok(Json(json!({ "success": true })))
}
