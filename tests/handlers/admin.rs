//! Admin console

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn session_for(t: &TestApp, user: &User) -> String {
    let conn = t.state.db.get().unwrap();
    queries::create_session(&conn, user.id, 30).unwrap()
}

fn master(t: &TestApp) -> (User, String) {
    let admin = {
        let conn = t.state.db.get().unwrap();
        create_master_admin(&conn, "master@example.com")
    };
    let token = session_for(t, &admin);
    (admin, token)
}

fn sub_admin(t: &TestApp) -> (User, String) {
    let admin = {
        let conn = t.state.db.get().unwrap();
        create_test_admin(&conn, "admin@example.com")
    };
    let token = session_for(t, &admin);
    (admin, token)
}

#[tokio::test]
async fn test_admin_routes_reject_tenants() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Premium);

    let (status, _) = t.request("GET", "/api/admin/users", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.request("GET", "/api/admin/users", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_master_sees_everyone_admin_sees_own() {
    let t = test_app();
    let (_, master_token) = master(&t);
    let (admin, admin_token) = sub_admin(&t);
    {
        let mut conn = t.state.db.get().unwrap();
        let owned = create_owned_user(&conn, "owned@example.com", admin.id);
        create_test_invoice(&mut conn, owned.id, "Maria", date("2024-03-10"), 1000);
        create_test_user(&conn, "stranger@example.com", Plan::Free);
    }

    let (status, users) = t.request("GET", "/api/admin/users", Some(&master_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(users.as_array().unwrap().len(), 4);

    let (_, users) = t.request("GET", "/api/admin/users", Some(&admin_token), None).await;
    let users = users.as_array().unwrap();
    let emails: Vec<&str> = users.iter().map(|u| u["email"].as_str().unwrap()).collect();
    assert_eq!(emails, vec!["admin@example.com", "owned@example.com"]);
    assert_eq!(users[1]["client_count"], 1);
    assert!(users[1].get("password_hash").is_none());
}

#[tokio::test]
async fn test_create_user_owned_by_admin() {
    let t = test_app();
    let (admin, token) = sub_admin(&t);

    let (status, body) = t
        .request(
            "POST",
            "/api/admin/users",
            Some(&token),
            Some(json!({ "name": "Loja", "email": "Loja@Example.com", "password": "123456", "plan": "pro" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "loja@example.com");
    assert_eq!(body["user"]["plan"], "pro");
    assert_eq!(body["user"]["owner_id"], admin.id);

    let (status, _) = t
        .request(
            "POST",
            "/api/admin/users",
            Some(&token),
            Some(json!({ "name": "Outro", "email": "outro@example.com", "password": "123456", "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN, "only the master creates admins");
}

#[tokio::test]
async fn test_role_changes() {
    let t = test_app();
    let (master_user, master_token) = master(&t);
    let (admin, admin_token) = sub_admin(&t);
    let owned = {
        let conn = t.state.db.get().unwrap();
        create_owned_user(&conn, "owned@example.com", admin.id)
    };

    let (status, body) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/role", master_user.id),
            Some(&master_token),
            Some(json!({ "role": "user" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "O papel do administrador master não pode ser alterado");

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/role", owned.id),
            Some(&admin_token),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/role", owned.id),
            Some(&master_token),
            Some(json!({ "role": "admin" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Role atualizado");

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/role", owned.id),
            Some(&master_token),
            Some(json!({ "role": "superuser" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_cannot_manage_foreign_users() {
    let t = test_app();
    let (_, token) = sub_admin(&t);
    let stranger = {
        let conn = t.state.db.get().unwrap();
        create_test_user(&conn, "stranger@example.com", Plan::Free)
    };

    let (status, body) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/plan", stranger.id),
            Some(&token),
            Some(json!({ "plan": "premium" })),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Usuário não encontrado");
}

#[tokio::test]
async fn test_plan_and_payment_status_updates() {
    let t = test_app();
    let (_, token) = master(&t);
    let (tenant, _) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/plan", tenant.id),
            Some(&token),
            Some(json!({ "plan": "Premium" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/payment_status", tenant.id),
            Some(&token),
            Some(json!({ "payment_status": "paid", "due_date": "2024-12-31" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/payment_status", tenant.id),
            Some(&token),
            Some(json!({ "payment_status": "paid", "due_date": "31/12/2024" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let conn = t.state.db.get().unwrap();
    let user = queries::get_user_by_id(&conn, tenant.id).unwrap().unwrap();
    assert_eq!(user.plan, Plan::Premium);
    assert_eq!(user.payment_status, PaymentStatus::Paid);
    assert_eq!(user.due_date, Some(date("2024-12-31")));
}

#[tokio::test]
async fn test_reset_password_ends_sessions() {
    let t = test_app();
    let (_, token) = master(&t);
    let (tenant, tenant_token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/password", tenant.id),
            Some(&token),
            Some(json!({ "password": "" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/password", tenant.id),
            Some(&token),
            Some(json!({ "password": "novasenha" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.request("GET", "/api/me", Some(&tenant_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .request(
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": "tenant@example.com", "password": "novasenha" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_blocking_ends_sessions() {
    let t = test_app();
    let (_, token) = master(&t);
    let (tenant, tenant_token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, _) = t
        .request(
            "PUT",
            &format!("/api/admin/users/{}/status", tenant.id),
            Some(&token),
            Some(json!({ "status": "blocked" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.request("GET", "/api/me", Some(&tenant_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_settings_and_stats() {
    let t = test_app();
    let (_, token) = master(&t);
    {
        let conn = t.state.db.get().unwrap();
        create_test_user(&conn, "pro@example.com", Plan::Pro);
    }

    let (status, body) = t
        .request(
            "PUT",
            "/api/admin/settings",
            Some(&token),
            Some(json!({ "prices": { "free": 0, "pro": 29.9, "premium": 59.9 }, "pix_key": " pix@example.com " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Configurações atualizadas");

    let (status, stats) = t.request("GET", "/api/admin/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["total_users"], 2);
    assert_eq!(stats["users_pro"], 1);
    assert_eq!(stats["users_premium"], 1);
    assert_eq!(stats["prices"]["pro"], 29.9);
    assert_eq!(stats["pix_key"], "pix@example.com");
}

#[tokio::test]
async fn test_run_jobs_manually() {
    let t = test_app();
    let (_, token) = master(&t);

    let (status, body) = t.request("POST", "/api/admin/jobs/billing", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["marked_overdue"], 0);

    let (status, body) = t.request("POST", "/api/admin/jobs/reminders", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["candidates"], 0);

    let (status, body) = t.request("POST", "/api/admin/jobs/subscriptions", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["generated"], 0);

    let (status, _) = t.request("POST", "/api/admin/jobs/backup", Some(&token), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
