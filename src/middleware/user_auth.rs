use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::models::User;
use crate::util::extract_bearer_token;

/// The authenticated tenant, inserted into request extensions by [`user_auth`].
#[derive(Clone)]
pub struct UserContext {
    pub user: User,
    /// Raw session token, kept so logout can revoke exactly this session
    pub token: String,
}

impl UserContext {
    pub fn user_id(&self) -> i64 {
        self.user.id
    }

    pub fn is_admin(&self) -> bool {
        self.user.is_admin()
    }

    /// Invoice cap for this tenant; `None` means unlimited.
    pub fn invoice_limit(&self) -> Option<i64> {
        if self.user.plan.is_paid() || self.user.is_admin() {
            None
        } else {
            Some(crate::models::FREE_PLAN_INVOICE_LIMIT)
        }
    }
}

/// Resolve the bearer session token. The pooled connection is released before returning.
fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<UserContext> {
    let token = extract_bearer_token(headers).ok_or(AppError::Unauthorized)?;
    let conn = state.db.get()?;

    let user = queries::get_user_by_session(&conn, token)?.ok_or(AppError::Unauthorized)?;
    if user.is_blocked() {
        return Err(AppError::Forbidden(msg::ACCOUNT_BLOCKED.into()));
    }

    Ok(UserContext {
        user,
        token: token.to_string(),
    })
}

pub async fn user_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = authenticate(&state, request.headers())?;

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let ctx = authenticate(&state, request.headers())?;

    if !ctx.is_admin() {
        return Err(AppError::Forbidden(msg::ADMIN_REQUIRED.into()));
    }

    request.extensions_mut().insert(ctx);
    Ok(next.run(request).await)
}
