use axum::{Extension, Router, extract::State, routing::get};
use serde_json::{Value, json};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::util::today;

pub fn router() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    let stats = queries::invoice_stats(&conn, ctx.user_id(), today())?;
    Ok(Json(json!({ "data": stats })))
}
