//! Login, registration, sessions and password recovery

use axum::http::StatusCode;
use serde_json::{Value, json};

#[path = "../common/mod.rs"]
mod common;
use common::*;

async fn login(t: &TestApp, email: &str, password: &str) -> (StatusCode, Value) {
    t.request("POST", "/api/login", None, Some(json!({ "email": email, "password": password })))
        .await
}

#[tokio::test]
async fn test_register_then_login() {
    let t = test_app();

    let (status, body) = t
        .request(
            "POST",
            "/api/register",
            None,
            Some(json!({ "name": "Maria", "email": "maria@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["email"], "maria@example.com");

    let (status, body) = t
        .request(
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": "maria@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["plan"], "free");
    assert_eq!(body["user"]["role"], "user");
    let token = body["token"].as_str().expect("login should return a token").to_string();

    let (status, me) = t.request("GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["name"], "Maria");
    assert!(me.get("password_hash").is_none());
    assert!(me.get("smtp_pass_encrypted").is_none());
}

#[tokio::test]
async fn test_register_validation() {
    let t = test_app();

    let (status, _) = t
        .request("POST", "/api/register", None, Some(json!({ "email": "x@example.com" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .request(
            "POST",
            "/api/register",
            None,
            Some(json!({ "name": "X", "email": "x@example.com", "password": "123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "short passwords are rejected");

    {
        let conn = t.state.db.get().unwrap();
        create_test_user(&conn, "taken@example.com", Plan::Free);
    }
    let (status, body) = t
        .request(
            "POST",
            "/api/register",
            None,
            Some(json!({ "name": "X", "email": "taken@example.com", "password": "secret123" })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email já cadastrado");
}

#[tokio::test]
async fn test_login_rejections() {
    let t = test_app();
    {
        let conn = t.state.db.get().unwrap();
        create_test_user(&conn, "user@example.com", Plan::Free);
        let blocked = create_test_user(&conn, "blocked@example.com", Plan::Free);
        queries::set_user_status(&conn, blocked.id, AccountStatus::Blocked).unwrap();
        let late = create_test_user(&conn, "late@example.com", Plan::Pro);
        queries::set_user_payment_status(&conn, late.id, PaymentStatus::Overdue, Some(date("2020-01-01")))
            .unwrap();
    }

    let (status, _) = login(&t, "user@example.com", "wrong-password").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&t, "nobody@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = login(&t, "blocked@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = login(&t, "late@example.com", TEST_PASSWORD).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["is_overdue"], true);
}

#[tokio::test]
async fn test_protected_routes_require_session() {
    let t = test_app();

    let (status, _) = t.request("GET", "/api/clients", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.request("GET", "/api/clients", Some("bogus-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_revokes_only_this_session() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "user@example.com", Plan::Free);
    let other = {
        let conn = t.state.db.get().unwrap();
        queries::create_session(&conn, user.id, 30).unwrap()
    };

    let (status, _) = t.request("POST", "/api/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t.request("GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.request("GET", "/api/me", Some(&other), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_blocked_user_session_rejected() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "user@example.com", Plan::Free);
    {
        let conn = t.state.db.get().unwrap();
        queries::set_user_status(&conn, user.id, AccountStatus::Blocked).unwrap();
    }

    let (status, body) = t.request("GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "Conta bloqueada. Contate o administrador.");
}

#[tokio::test]
async fn test_forgot_password_emails_temporary_password() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "forgot@example.com", Plan::Free);

    let (status, _) = t
        .request("POST", "/api/forgot-password", None, Some(json!({ "email": "forgot@example.com" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let emails = t.sent_emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "forgot@example.com");
    assert!(emails[0].from.contains(SYSTEM_SMTP_USER));

    let text = emails[0].text.clone().expect("reset email has a text part");
    let temporary = text
        .split("Sua senha temporária é: ")
        .nth(1)
        .and_then(|rest| rest.lines().next())
        .expect("temporary password in email")
        .trim()
        .to_string();

    let (status, _) = t.request("GET", "/api/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED, "existing sessions end on reset");

    let (status, _) = t
        .request(
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": "forgot@example.com", "password": temporary })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_forgot_password_unknown_email() {
    let t = test_app();
    let (status, body) = t
        .request("POST", "/api/forgot-password", None, Some(json!({ "email": "ghost@example.com" })))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "E-mail não encontrado.");
    assert!(t.sent_emails().is_empty());
}

#[tokio::test]
async fn test_forgot_password_without_smtp_keeps_password() {
    let (state, outbox) = test_state(test_pool(), false);
    let app = handlers::router(state.clone(), 0).with_state(state.clone());
    let t = TestApp { app, state, outbox };
    {
        let conn = t.state.db.get().unwrap();
        create_test_user(&conn, "nosmtp@example.com", Plan::Free);
    }

    let (status, body) = t
        .request("POST", "/api/forgot-password", None, Some(json!({ "email": "nosmtp@example.com" })))
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Servidor de e-mail não configurado.");

    let (status, _) = t
        .request(
            "POST",
            "/api/login",
            None,
            Some(json!({ "email": "nosmtp@example.com", "password": TEST_PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "the old password still works");
}
