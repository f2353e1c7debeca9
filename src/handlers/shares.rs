use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};

use crate::db::{AppState, queries};
use crate::error::{Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::UserContext;
use crate::models::{CreateShare, ShareCreated, ShareQuery};
use crate::templates::share_page_html;

/// Creating a link needs a session.
pub fn router() -> Router<AppState> {
    Router::new().route("/api/invoice-share", post(create_share))
}

/// The preview pages themselves are public, they are opened by WhatsApp's link unfurler.
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/share/{id}", get(share_page))
        .route("/share-invoice", get(legacy_share_page))
}

pub async fn create_share(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<CreateShare>,
) -> Result<Json<ShareCreated>> {
    let conn = state.db.get()?;
    let share = queries::create_share(&conn, Some(ctx.user_id()), &input)?;
    Ok(Json(ShareCreated {
        url: state.share_url(&share.id),
        id: share.id,
    }))
}

pub async fn share_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let conn = state.db.get()?;
    let Some(share) = queries::get_share(&conn, &id)? else {
        return Ok((StatusCode::NOT_FOUND, msg::SHARE_NOT_FOUND).into_response());
    };

    Ok(Html(share_page_html(
        &state.base_url,
        &share.client_name,
        &share.value,
        &share.due_date,
        share.logo.as_deref(),
    ))
    .into_response())
}

/// Query-string variant kept for links sent before short ids existed.
pub async fn legacy_share_page(
    State(state): State<AppState>,
    Query(query): Query<ShareQuery>,
) -> Html<String> {
    Html(share_page_html(
        &state.base_url,
        &query.name,
        &query.value,
        &query.due_date,
        query.logo.as_deref(),
    ))
}
