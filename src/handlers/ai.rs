use axum::{Extension, Router, extract::State, routing::post};
use serde_json::{Value, json};

use crate::ai::MessageRequest;
use crate::db::AppState;
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::UserContext;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/ai/generate-message", post(generate_message))
}

/// Draft a reminder with Gemini. Paid plans and admins only.
pub async fn generate_message(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<MessageRequest>,
) -> Result<Json<Value>> {
    if !ctx.user.has_paid_features() {
        return Err(AppError::Forbidden(msg::PAID_PLAN_REQUIRED.into()));
    }
    let ai = state
        .ai
        .as_ref()
        .ok_or_else(|| AppError::Unavailable(msg::AI_NOT_CONFIGURED.into()))?;

    let message = ai.generate(&input.prompt()).await?;
    tracing::debug!(user_id = ctx.user_id(), "AI message generated");
    Ok(Json(json!({ "message": message })))
}
