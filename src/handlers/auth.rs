use axum::{
    Extension, Router,
    extract::State,
    middleware,
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::crypto::{generate_temporary_password, hash_password, verify_password};
use crate::db::{AppState, queries};
use crate::email::EmailSendResult;
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::Json;
use crate::middleware::{UserContext, user_auth};
use crate::models::{
    ForgotPasswordInput, LoginInput, NewUser, Plan, RegisterInput, Role, User, UserSummary,
};
use crate::rate_limit;
use crate::templates;
use crate::util::today;

/// Login, register and forgot-password are public and rate limited; logout and `me` need a session.
pub fn router(state: AppState, rate_limit_rpm: u32) -> Router<AppState> {
    let mut public = Router::new()
        .route("/api/login", post(login))
        .route("/api/register", post(register))
        .route("/api/forgot-password", post(forgot_password));
    if let Some(layer) = rate_limit::auth_layer(rate_limit_rpm) {
        public = public.layer(layer);
    }

    public.merge(
        Router::new()
            .route("/api/logout", post(logout))
            .route("/api/me", get(me))
            .layer(middleware::from_fn_with_state(state, user_auth)),
    )
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    pub token: String,
    pub user: UserSummary,
}

pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginInput>,
) -> Result<Json<LoginResponse>> {
    let conn = state.db.get()?;

    let credentials = queries::get_user_credentials(&conn, &input.email)?;
    let Some((user, _)) = credentials.filter(|(_, hash)| verify_password(&input.password, hash))
    else {
        tracing::debug!(email = %input.email.trim(), "Login rejected");
        return Err(AppError::Unauthorized);
    };

    if user.is_blocked() {
        return Err(AppError::Forbidden(msg::ACCOUNT_BLOCKED.into()));
    }
    if user.is_overdue(today()) {
        return Err(AppError::PaymentRequired(msg::PLAN_OVERDUE.into()));
    }

    let token = queries::create_session(&conn, user.id, state.session_ttl_days)?;
    tracing::info!(user_id = user.id, "User logged in");

    Ok(Json(LoginResponse {
        message: "success",
        token,
        user: UserSummary::from(&user),
    }))
}

pub async fn register(
    State(state): State<AppState>,
    Json(input): Json<RegisterInput>,
) -> Result<Json<Value>> {
    input.validate()?;
    let password_hash = hash_password(&input.password)?;

    let conn = state.db.get()?;
    let user = queries::create_user(
        &conn,
        &NewUser {
            name: &input.name,
            email: &input.email,
            password_hash: &password_hash,
            whatsapp: input.whatsapp.as_deref().filter(|w| !w.trim().is_empty()),
            cpf: input.cpf.as_deref().filter(|c| !c.trim().is_empty()),
            plan: Plan::Free,
            role: Role::User,
            is_master: false,
            owner_id: None,
            created_at: today(),
        },
    )?;
    tracing::info!(user_id = user.id, "User registered");

    Ok(Json(json!({
        "message": "success",
        "user": { "id": user.id, "name": user.name, "email": user.email }
    })))
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Value>> {
    let conn = state.db.get()?;
    queries::delete_session(&conn, &ctx.token)?;
    Ok(Json(json!({ "message": "success" })))
}

pub async fn me(Extension(ctx): Extension<UserContext>) -> Json<User> {
    Json(ctx.user)
}

/// Reset the password to a temporary one and email it through the system SMTP account.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(input): Json<ForgotPasswordInput>,
) -> Result<Json<Value>> {
    let user = {
        let conn = state.db.get()?;
        queries::get_user_by_email(&conn, &input.email).or_not_found(msg::EMAIL_NOT_FOUND)?
    };

    if !state.email.system_configured() {
        tracing::error!("Password reset requested but SMTP credentials are not configured");
        return Err(AppError::Email(msg::SMTP_NOT_CONFIGURED.into()));
    }

    let temporary = generate_temporary_password();
    let credentials = state.email.credentials_for(None, &state.master_key);
    let sent = state
        .email
        .send(
            credentials,
            &user.email,
            "Recuperação de Senha - Meus Clientes",
            templates::password_reset_html(&user.name, &temporary, &state.base_url),
            Some(templates::password_reset_text(&user.name, &temporary, &state.base_url)),
        )
        .await;

    match sent {
        Ok(EmailSendResult::Sent) => {}
        Ok(EmailSendResult::NoCredentials) => {
            return Err(AppError::Email(msg::SMTP_NOT_CONFIGURED.into()));
        }
        Err(e) => {
            tracing::error!(user_id = user.id, "Password reset email failed: {}", e);
            return Err(AppError::Email(msg::EMAIL_SEND_FAILED.into()));
        }
    }

    // The password changes only after the email went out.
    let password_hash = hash_password(&temporary)?;
    let conn = state.db.get()?;
    queries::set_password_hash(&conn, user.id, &password_hash)?;
    queries::delete_user_sessions(&conn, user.id)?;
    tracing::info!(user_id = user.id, "Temporary password issued");

    Ok(Json(json!({ "message": "success" })))
}
