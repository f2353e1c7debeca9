use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::{Json, Path};
use crate::jobs;
use crate::middleware::UserContext;
use crate::models::{Subscription, SubscriptionInput};
use crate::util::today;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/subscriptions", get(list_subscriptions).post(create_subscription))
        .route("/api/subscriptions/run", post(run_generator))
        .route(
            "/api/subscriptions/{id}",
            put(update_subscription).delete(delete_subscription),
        )
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Vec<Subscription>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_subscriptions(&conn, ctx.user_id())?))
}

pub async fn create_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<SubscriptionInput>,
) -> Result<Json<Subscription>> {
    let input = input.validate()?;
    let conn = state.db.get()?;
    let subscription = queries::create_subscription(&conn, ctx.user_id(), &input)?;
    tracing::info!(
        user_id = ctx.user_id(),
        subscription_id = subscription.id,
        "Subscription created"
    );
    Ok(Json(subscription))
}

pub async fn update_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<SubscriptionInput>,
) -> Result<Json<Value>> {
    let input = input.validate()?;
    let conn = state.db.get()?;
    let changes = queries::update_subscription(&conn, ctx.user_id(), id, &input)?;
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

pub async fn delete_subscription(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    let changes = queries::delete_subscription(&conn, ctx.user_id(), id)?;
    Ok(Json(json!({ "message": "deleted", "changes": changes })))
}

/// Run the generator for the caller's subscriptions only.
pub async fn run_generator(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Value>> {
    let summary = jobs::run_subscription_generator(&state, Some(ctx.user_id()), today()).await?;
    Ok(Json(json!({ "message": "executed", "generated": summary.generated })))
}
