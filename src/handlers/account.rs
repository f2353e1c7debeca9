use axum::{
    Extension, Router,
    extract::{DefaultBodyLimit, Multipart, State},
    routing::{get, post, put},
};
use serde_json::{Value, json};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::UserContext;
use crate::models::{PaymentMethod, PaymentPrefs, UpdatePaymentPrefs, UpdateSmtp, blank_to_none};

pub const MAX_LOGO_BYTES: usize = 2 * 1024 * 1024;
const LOGO_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/user/payment", get(get_payment_prefs).put(update_payment_prefs))
        .route("/api/user/smtp", put(update_smtp))
        .route(
            "/api/upload-logo",
            // Room for the multipart framing around a maximum-size image
            post(upload_logo).layer(DefaultBodyLimit::max(MAX_LOGO_BYTES + 64 * 1024)),
        )
}

pub async fn get_payment_prefs(Extension(ctx): Extension<UserContext>) -> Json<PaymentPrefs> {
    Json(PaymentPrefs::from(&ctx.user))
}

pub async fn update_payment_prefs(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<UpdatePaymentPrefs>,
) -> Result<Json<Value>> {
    let method = PaymentMethod::parse_or_default(input.payment_method.as_deref());
    let conn = state.db.get()?;
    let changes = queries::update_payment_prefs(
        &conn,
        ctx.user_id(),
        method,
        blank_to_none(input.payment_pix_key),
        blank_to_none(input.payment_instructions),
    )?;
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

/// A blank user clears the override. A blank password keeps the stored one.
pub async fn update_smtp(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<UpdateSmtp>,
) -> Result<Json<Value>> {
    let smtp_user = blank_to_none(input.smtp_user);
    let smtp_pass = input.smtp_pass.filter(|p| !p.is_empty());

    let encrypted = match (&smtp_user, smtp_pass) {
        (None, _) => None,
        (Some(_), Some(pass)) => Some(state.master_key.encrypt(ctx.user_id(), pass.as_bytes())?),
        (Some(_), None) => ctx.user.smtp_pass_encrypted.clone(),
    };

    let conn = state.db.get()?;
    queries::update_smtp(&conn, ctx.user_id(), smtp_user, encrypted)?;
    tracing::info!(user_id = ctx.user_id(), "SMTP settings updated");
    Ok(Json(json!({ "message": "success" })))
}

fn logo_extension(file_name: &str) -> Option<String> {
    let (_, ext) = file_name.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    LOGO_EXTENSIONS.contains(&ext.as_str()).then_some(ext)
}

/// Store the `logo` multipart field under the upload dir and point the tenant at it.
pub async fn upload_logo(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    mut multipart: Multipart,
) -> Result<Json<Value>> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("logo") {
            continue;
        }
        let ext = field
            .file_name()
            .and_then(logo_extension)
            .ok_or_else(|| AppError::BadRequest(msg::INVALID_IMAGE.into()))?;
        if field.content_type().is_some_and(|ct| !ct.starts_with("image/")) {
            return Err(AppError::BadRequest(msg::INVALID_IMAGE.into()));
        }
        let bytes = field.bytes().await?;
        upload = Some((ext, bytes));
        break;
    }

    let (ext, bytes) = upload.ok_or_else(|| AppError::BadRequest(msg::NO_FILE_UPLOADED.into()))?;
    if bytes.is_empty() {
        return Err(AppError::BadRequest(msg::NO_FILE_UPLOADED.into()));
    }
    if bytes.len() > MAX_LOGO_BYTES {
        return Err(AppError::BadRequest(msg::FILE_TOO_LARGE.into()));
    }

    let file_name = format!(
        "logo-{}-{}.{}",
        ctx.user_id(),
        chrono::Utc::now().timestamp_millis(),
        ext
    );
    tokio::fs::create_dir_all(&state.upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload dir: {}", e)))?;
    tokio::fs::write(state.upload_dir.join(&file_name), &bytes)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to store logo: {}", e)))?;

    let logo = format!("/uploads/{}", file_name);
    let conn = state.db.get()?;
    queries::update_logo(&conn, ctx.user_id(), &logo)?;
    tracing::info!(user_id = ctx.user_id(), size = bytes.len(), "Logo uploaded");

    Ok(Json(json!({ "logo": logo })))
}
