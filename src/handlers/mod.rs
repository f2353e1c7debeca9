pub mod account;
pub mod admin;
pub mod ai;
pub mod auth;
pub mod billing;
pub mod clients;
pub mod shares;
pub mod stats;
pub mod subscriptions;
pub mod tickets;
pub mod webhooks;
pub mod whatsapp;

use axum::{Router, middleware};

use crate::db::AppState;
use crate::middleware::{require_admin, user_auth};

/// Every API route. Static files and the health check are mounted by the binary.
pub fn router(state: AppState, auth_rate_limit_rpm: u32) -> Router<AppState> {
    // Tenant dashboard (session auth)
    let tenant_routes = Router::new()
        .merge(clients::router())
        .merge(subscriptions::router())
        .merge(stats::router())
        .merge(account::router())
        .merge(shares::router())
        .merge(tickets::router())
        .merge(ai::router())
        .merge(whatsapp::router())
        .merge(billing::router())
        .layer(middleware::from_fn_with_state(state.clone(), user_auth));

    // Admin console
    let admin_routes = Router::new()
        .merge(admin::router())
        .merge(tickets::admin_router())
        .layer(middleware::from_fn_with_state(state.clone(), require_admin));

    Router::new()
        .merge(auth::router(state, auth_rate_limit_rpm))
        .merge(shares::public_router())
        .merge(webhooks::router())
        .merge(tenant_routes)
        .merge(admin_routes)
}
