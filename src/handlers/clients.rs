use axum::{
    Extension, Router,
    extract::State,
    http::header,
    response::IntoResponse,
    routing::{get, patch, post, put},
};
use serde_json::{Value, json};

use crate::db::{AppState, queries};
use crate::email::EmailSendResult;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::UserContext;
use crate::models::{InvoiceFilter, InvoiceInput, money};
use crate::notifications::{self, NEW_INVOICE_SUBJECT, RESEND_INVOICE_SUBJECT};
use crate::templates::format_date_br;
use crate::util::{csv_field, today};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/clients", get(list_clients).post(create_client))
        .route("/api/clients/export.csv", get(export_clients_csv))
        .route("/api/clients/{id}", put(update_client).delete(delete_client))
        .route("/api/clients/{id}/pay", patch(mark_paid))
        .route("/api/clients/{id}/email", post(resend_email))
}

pub async fn list_clients(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Query(filter): Query<InvoiceFilter>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    let invoices = queries::list_invoices(&conn, ctx.user_id(), &filter)?;
    Ok(Json(json!({ "message": "success", "data": invoices })))
}

pub async fn create_client(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<InvoiceInput>,
) -> Result<Json<Value>> {
    let input = input.validate()?;

    let invoice = {
        let mut conn = state.db.get()?;
        queries::create_invoice(&mut conn, ctx.user_id(), ctx.invoice_limit(), &input)?
    };
    tracing::info!(user_id = ctx.user_id(), invoice_id = invoice.id, "Invoice created");

    notifications::spawn_invoice_email(state, ctx.user, invoice.clone(), NEW_INVOICE_SUBJECT);

    Ok(Json(json!({ "message": "success", "data": invoice })))
}

pub async fn update_client(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<InvoiceInput>,
) -> Result<Json<Value>> {
    let input = input.validate()?;
    let conn = state.db.get()?;
    let changes = queries::update_invoice(&conn, ctx.user_id(), id, &input)?;
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    let changes = queries::mark_invoice_paid(&conn, ctx.user_id(), id, today())?;
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

pub async fn delete_client(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    let changes = queries::delete_invoice(&conn, ctx.user_id(), id)?;
    Ok(Json(json!({ "message": "deleted", "changes": changes })))
}

pub async fn resend_email(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    let invoice = {
        let conn = state.db.get()?;
        queries::get_invoice(&conn, ctx.user_id(), id).or_not_found(msg::CLIENT_NOT_FOUND)?
    };
    if invoice.email.is_none() {
        return Err(AppError::BadRequest(msg::CLIENT_WITHOUT_EMAIL.into()));
    }

    match notifications::send_invoice_email(&state, &ctx.user, &invoice, RESEND_INVOICE_SUBJECT).await {
        Ok(EmailSendResult::Sent) => Ok(Json(json!({ "message": "E-mail enviado com sucesso!" }))),
        Ok(EmailSendResult::NoCredentials) => Err(AppError::Email(msg::SMTP_NOT_CONFIGURED.into())),
        Err(e) => {
            tracing::error!(invoice_id = invoice.id, "Invoice email failed: {}", e);
            Err(AppError::Email(msg::EMAIL_SEND_FAILED.into()))
        }
    }
}

const CSV_HEADER: &str = "Nome,Email,Telefone,CPF,Produto,Vencimento,Valor,Status,Pago em";

/// All of the caller's invoices as CSV, in due-date order.
pub async fn export_clients_csv(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<impl IntoResponse> {
    let invoices = {
        let conn = state.db.get()?;
        queries::list_invoices(&conn, ctx.user_id(), &InvoiceFilter::default())?
    };

    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for invoice in &invoices {
        let row = [
            csv_field(&invoice.name),
            csv_field(invoice.email.as_deref().unwrap_or("")),
            csv_field(invoice.phone.as_deref().unwrap_or("")),
            csv_field(invoice.cpf.as_deref().unwrap_or("")),
            csv_field(invoice.product_label()),
            format_date_br(invoice.due_date),
            format!("{:.2}", money::cents_to_reais(invoice.value_cents)),
            invoice.status.as_ref().to_string(),
            invoice.paid_at.map(format_date_br).unwrap_or_default(),
        ];
        csv.push_str(&row.join(","));
        csv.push('\n');
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"clientes.csv\""),
        ],
        csv,
    ))
}
