use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post},
};
use serde_json::{Value, json};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::UserContext;
use crate::models::{CreateTicket, ReplyTicket, Ticket, TicketQuery, TicketWithMessages};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tickets", get(list_tickets).post(create_ticket))
        .route("/api/tickets/{id}", get(get_ticket))
        .route("/api/tickets/{id}/messages", post(reply_ticket))
}

/// Mounted behind `require_admin`.
pub fn admin_router() -> Router<AppState> {
    Router::new().route("/api/tickets/stats", get(ticket_stats))
}

/// The ticket if the caller owns it or is an admin. Anything else is a 404.
fn visible_ticket(conn: &rusqlite::Connection, ctx: &UserContext, id: i64) -> Result<Ticket> {
    queries::get_ticket(conn, id)?
        .filter(|t| ctx.is_admin() || t.user_id == ctx.user_id())
        .ok_or_else(|| AppError::NotFound(msg::TICKET_NOT_FOUND.into()))
}

/// Admins see every ticket (optionally one tenant's); tenants see their own.
pub async fn list_tickets(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Query(query): Query<TicketQuery>,
) -> Result<Json<Vec<Ticket>>> {
    let scope = if ctx.is_admin() { query.user_id } else { Some(ctx.user_id()) };
    let conn = state.db.get()?;
    Ok(Json(queries::list_tickets(&conn, scope)?))
}

pub async fn get_ticket(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<TicketWithMessages>> {
    let conn = state.db.get()?;
    let ticket = visible_ticket(&conn, &ctx, id)?;
    let messages = queries::list_ticket_messages(&conn, ticket.id)?;
    Ok(Json(TicketWithMessages { ticket, messages }))
}

pub async fn create_ticket(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<CreateTicket>,
) -> Result<Json<Value>> {
    input.validate()?;
    let mut conn = state.db.get()?;
    let ticket_id = queries::create_ticket(&mut conn, ctx.user_id(), &input.subject, &input.message)?;
    tracing::info!(user_id = ctx.user_id(), ticket_id, "Support ticket opened");
    Ok(Json(json!({ "message": "Ticket created", "ticketId": ticket_id })))
}

pub async fn reply_ticket(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<ReplyTicket>,
) -> Result<Json<Value>> {
    input.validate(ctx.is_admin())?;
    let mut conn = state.db.get()?;
    let ticket = visible_ticket(&conn, &ctx, id)?;
    queries::add_ticket_message(&mut conn, ticket.id, ctx.user_id(), &input.message, input.status)?;
    Ok(Json(json!({ "message": "Reply added" })))
}

pub async fn ticket_stats(State(state): State<AppState>) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    Ok(Json(json!({ "open_count": queries::count_open_tickets(&conn)? })))
}
