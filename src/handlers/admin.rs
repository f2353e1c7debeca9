use axum::{
    Extension, Router,
    extract::State,
    routing::{get, post, put},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::crypto::hash_password;
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::jobs::{self, JobKind, JobSummary};
use crate::middleware::UserContext;
use crate::models::{
    AccountStatus, AdminCreateUser, AdminStats, NewUser, PaymentStatus, Plan, Role,
    UpdateSettings, User, UserWithClientCount, validate_password,
};
use crate::util::today;

/// Mounted behind `require_admin`.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin/users", get(list_users).post(create_user))
        .route("/api/admin/users/{id}/role", put(update_role))
        .route("/api/admin/users/{id}/payment_status", put(update_payment_status))
        .route("/api/admin/users/{id}/password", put(reset_password))
        .route("/api/admin/users/{id}/plan", put(update_plan))
        .route("/api/admin/users/{id}/status", put(update_status))
        .route("/api/admin/stats", get(get_stats))
        .route("/api/admin/settings", put(update_settings))
        .route("/api/admin/jobs/{job}", post(run_job))
}

#[derive(Debug, Deserialize)]
pub struct RoleInput {
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Deserialize)]
pub struct PlanInput {
    #[serde(default)]
    pub plan: String,
}

#[derive(Debug, Deserialize)]
pub struct StatusInput {
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusInput {
    #[serde(default)]
    pub payment_status: String,
    pub due_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PasswordInput {
    #[serde(default)]
    pub password: String,
}

fn parse_field<T: std::str::FromStr>(value: &str, message: &'static str) -> Result<T> {
    value
        .trim()
        .to_lowercase()
        .parse()
        .map_err(|_| AppError::BadRequest(message.into()))
}

/// Load a user the calling admin is allowed to manage.
fn managed_user(state: &AppState, admin: &User, id: i64) -> Result<User> {
    let conn = state.db.get()?;
    queries::get_user_visible_to(&conn, admin, id).or_not_found(msg::USER_NOT_FOUND)
}

pub async fn list_users(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
) -> Result<Json<Vec<UserWithClientCount>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_users_for_admin(&conn, &ctx.user)?))
}

pub async fn create_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Json(input): Json<AdminCreateUser>,
) -> Result<Json<Value>> {
    input.validate()?;
    let role = input.role.unwrap_or(Role::User);
    if role == Role::Admin && !ctx.user.is_master {
        return Err(AppError::Forbidden(msg::MASTER_ONLY_PROMOTE.into()));
    }

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
            plan: input.plan.unwrap_or(Plan::Free),
            role,
            is_master: false,
            owner_id: Some(ctx.user_id()),
            created_at: today(),
        },
    )?;
    tracing::info!(admin_id = ctx.user_id(), user_id = user.id, "User created by admin");

    Ok(Json(json!({ "message": "success", "user": user })))
}

/// Only the master may grant admin, and the master's own role is fixed.
pub async fn update_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<RoleInput>,
) -> Result<Json<Value>> {
    let role: Role = parse_field(&input.role, msg::INVALID_ROLE)?;
    let target = managed_user(&state, &ctx.user, id)?;

    if target.is_master {
        return Err(AppError::Forbidden(msg::MASTER_ROLE_LOCKED.into()));
    }
    if role == Role::Admin && !ctx.user.is_master {
        return Err(AppError::Forbidden(msg::MASTER_ONLY_PROMOTE.into()));
    }

    let conn = state.db.get()?;
    queries::set_user_role(&conn, target.id, role)?;
    tracing::info!(admin_id = ctx.user_id(), user_id = target.id, role = role.as_ref(), "Role updated");
    Ok(Json(json!({ "message": "Role atualizado" })))
}

pub async fn update_payment_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<PaymentStatusInput>,
) -> Result<Json<Value>> {
    let status: PaymentStatus = parse_field(&input.payment_status, msg::INVALID_PAYMENT_STATUS)?;
    let due_date = match input.due_date.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        Some(d) => Some(
            NaiveDate::parse_from_str(d, "%Y-%m-%d")
                .map_err(|_| AppError::BadRequest(msg::INVALID_DATE.into()))?,
        ),
        None => None,
    };
    let target = managed_user(&state, &ctx.user, id)?;

    let conn = state.db.get()?;
    let changes = queries::set_user_payment_status(&conn, target.id, status, due_date)?;
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

pub async fn reset_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<PasswordInput>,
) -> Result<Json<Value>> {
    if input.password.is_empty() {
        return Err(AppError::BadRequest(msg::NEW_PASSWORD_REQUIRED.into()));
    }
    validate_password(&input.password)?;
    let target = managed_user(&state, &ctx.user, id)?;

    let password_hash = hash_password(&input.password)?;
    let conn = state.db.get()?;
    let changed = queries::set_password_hash(&conn, target.id, &password_hash)?;
    queries::delete_user_sessions(&conn, target.id)?;
    tracing::info!(admin_id = ctx.user_id(), user_id = target.id, "Password reset by admin");
    Ok(Json(json!({ "message": "success", "changes": changed as usize })))
}

pub async fn update_plan(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<PlanInput>,
) -> Result<Json<Value>> {
    let plan: Plan = parse_field(&input.plan, msg::INVALID_PLAN)?;
    let target = managed_user(&state, &ctx.user, id)?;

    let conn = state.db.get()?;
    let changes = queries::set_user_plan(&conn, target.id, plan)?;
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

/// Blocking also ends the user's sessions.
pub async fn update_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(id): Path<i64>,
    Json(input): Json<StatusInput>,
) -> Result<Json<Value>> {
    let status: AccountStatus = parse_field(&input.status, msg::INVALID_STATUS)?;
    let target = managed_user(&state, &ctx.user, id)?;

    let conn = state.db.get()?;
    let changes = queries::set_user_status(&conn, target.id, status)?;
    if status == AccountStatus::Blocked {
        queries::delete_user_sessions(&conn, target.id)?;
    }
    tracing::info!(admin_id = ctx.user_id(), user_id = target.id, status = status.as_ref(), "Status updated");
    Ok(Json(json!({ "message": "success", "changes": changes })))
}

pub async fn get_stats(State(state): State<AppState>) -> Result<Json<AdminStats>> {
    let conn = state.db.get()?;
    Ok(Json(queries::admin_stats(&conn)?))
}

pub async fn update_settings(
    State(state): State<AppState>,
    Json(input): Json<UpdateSettings>,
) -> Result<Json<Value>> {
    let mut conn = state.db.get()?;
    queries::update_settings(&mut conn, &input)?;
    Ok(Json(json!({ "message": "Configurações atualizadas" })))
}

/// Run a background job now: `subscriptions`, `reminders` or `billing`.
pub async fn run_job(
    State(state): State<AppState>,
    Extension(ctx): Extension<UserContext>,
    Path(job): Path<String>,
) -> Result<Json<JobSummary>> {
    let kind: JobKind = job
        .parse()
        .map_err(|_| AppError::NotFound(msg::UNKNOWN_JOB.into()))?;
    tracing::info!(admin_id = ctx.user_id(), job = kind.as_ref(), "Job triggered manually");
    Ok(Json(jobs::run_job(&state, kind, today()).await?))
}
