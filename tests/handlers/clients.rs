//! Invoice ("client") endpoints

use axum::http::{StatusCode, header};
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_create_and_list_clients() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);

    let (status, body) = t
        .request(
            "POST",
            "/api/clients",
            Some(&token),
            Some(json!({
                "name": "Maria",
                "phone": "(11) 99999-0000",
                "product": "Mensalidade",
                "due_date": "2024-03-10",
                "value": "1.500,00"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["name"], "Maria");
    assert_eq!(body["data"]["value"], 1500.0);
    assert_eq!(body["data"]["status"], "Pendente");

    let (status, body) = t.request("GET", "/api/clients", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_create_requires_name_date_and_value() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, body) = t
        .request("POST", "/api/clients", Some(&token), Some(json!({ "name": "Maria", "value": 10 })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Nome, vencimento e valor são obrigatórios");
}

#[tokio::test]
async fn test_free_plan_limited_to_five_clients() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "free@example.com", Plan::Free);
    {
        let mut conn = t.state.db.get().unwrap();
        for i in 0..FREE_PLAN_INVOICE_LIMIT {
            create_test_invoice(&mut conn, user.id, &format!("Client {i}"), date("2024-03-10"), 1000);
        }
    }

    let (status, _) = t
        .request(
            "POST",
            "/api/clients",
            Some(&token),
            Some(json!({ "name": "Sixth", "due_date": "2024-03-10", "value": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    {
        let conn = t.state.db.get().unwrap();
        queries::set_user_plan(&conn, user.id, Plan::Pro).unwrap();
    }
    let (status, _) = t
        .request(
            "POST",
            "/api/clients",
            Some(&token),
            Some(json!({ "name": "Sixth", "due_date": "2024-03-10", "value": 10 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK, "paid plans have no cap");
}

#[tokio::test]
async fn test_update_pay_and_delete() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);
    let invoice = {
        let mut conn = t.state.db.get().unwrap();
        create_test_invoice(&mut conn, user.id, "Maria", date("2024-03-10"), 1000)
    };

    let (status, body) = t
        .request(
            "PUT",
            &format!("/api/clients/{}", invoice.id),
            Some(&token),
            Some(json!({ "name": "Maria Silva", "due_date": "2024-04-10", "value": 25 })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changes"], 1);

    let (status, body) = t
        .request("PATCH", &format!("/api/clients/{}/pay", invoice.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changes"], 1);

    {
        let conn = t.state.db.get().unwrap();
        let invoice = queries::get_invoice(&conn, user.id, invoice.id).unwrap().unwrap();
        assert_eq!(invoice.name, "Maria Silva");
        assert_eq!(invoice.value_cents, 2500);
        assert!(invoice.is_paid());
    }

    let (status, body) = t
        .request("DELETE", &format!("/api/clients/{}", invoice.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changes"], 1);
}

#[tokio::test]
async fn test_other_tenants_invoices_untouchable() {
    let t = test_app();
    let (owner, _) = create_user_with_session(&t.state.db, "owner@example.com", Plan::Pro);
    let (_, intruder) = create_user_with_session(&t.state.db, "intruder@example.com", Plan::Pro);
    let invoice = {
        let mut conn = t.state.db.get().unwrap();
        create_test_invoice(&mut conn, owner.id, "Maria", date("2024-03-10"), 1000)
    };

    let (_, body) = t.request("GET", "/api/clients", Some(&intruder), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());

    let (status, body) = t
        .request("DELETE", &format!("/api/clients/{}", invoice.id), Some(&intruder), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["changes"], 0);

    let (status, _) = t
        .request("POST", &format!("/api/clients/{}/email", invoice.id), Some(&intruder), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_non_numeric_id_is_bad_request() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);

    let (status, _) = t.request("PATCH", "/api/clients/abc/pay", Some(&token), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_resend_email_uses_system_account() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);
    let invoice = {
        let mut conn = t.state.db.get().unwrap();
        let mut input = new_invoice("Maria", date("2024-03-10"), 15_000);
        input.email = Some("maria@example.com".into());
        queries::create_invoice(&mut conn, user.id, None, &input).unwrap()
    };

    let (status, body) = t
        .request("POST", &format!("/api/clients/{}/email", invoice.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "E-mail enviado com sucesso!");

    let emails = t.sent_emails();
    assert_eq!(emails.len(), 1);
    assert_eq!(emails[0].to, "maria@example.com");
    assert_eq!(emails[0].subject, "Lembrete de Fatura - Mensalidade");
    assert!(emails[0].from.contains(SYSTEM_SMTP_USER));
    assert!(emails[0].html.contains("Maria"));
}

#[tokio::test]
async fn test_resend_email_prefers_tenant_smtp() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);
    let invoice = {
        let mut conn = t.state.db.get().unwrap();
        let mut input = new_invoice("Maria", date("2024-03-10"), 15_000);
        input.email = Some("maria@example.com".into());
        queries::create_invoice(&mut conn, user.id, None, &input).unwrap()
    };

    let (status, _) = t
        .request(
            "PUT",
            "/api/user/smtp",
            Some(&token),
            Some(json!({ "smtp_user": "loja@gmail.com", "smtp_pass": "app-password" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = t
        .request("POST", &format!("/api/clients/{}/email", invoice.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let emails = t.sent_emails();
    assert_eq!(emails.len(), 1);
    assert!(emails[0].from.contains("loja@gmail.com"));
}

#[tokio::test]
async fn test_resend_email_errors() {
    let (state, outbox) = test_state(test_pool(), false);
    let app = handlers::router(state.clone(), 0).with_state(state.clone());
    let t = TestApp { app, state, outbox };
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);
    let (no_email, with_email) = {
        let mut conn = t.state.db.get().unwrap();
        let no_email = create_test_invoice(&mut conn, user.id, "Sem email", date("2024-03-10"), 1000);
        let mut input = new_invoice("Maria", date("2024-03-10"), 1000);
        input.email = Some("maria@example.com".into());
        let with_email = queries::create_invoice(&mut conn, user.id, None, &input).unwrap();
        (no_email, with_email)
    };

    let (status, body) = t
        .request("POST", &format!("/api/clients/{}/email", no_email.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Cliente sem e-mail cadastrado");

    let (status, body) = t
        .request("POST", &format!("/api/clients/{}/email", with_email.id), Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Servidor de e-mail não configurado.");
}

#[tokio::test]
async fn test_csv_export() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);
    {
        let mut conn = t.state.db.get().unwrap();
        create_test_invoice(&mut conn, user.id, "Silva, Maria", date("2024-03-10"), 15_050);
    }

    let (status, headers, body) = t
        .request_raw("GET", "/api/clients/export.csv", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(headers[header::CONTENT_TYPE].to_str().unwrap().starts_with("text/csv"));
    assert!(headers[header::CONTENT_DISPOSITION].to_str().unwrap().contains("clientes.csv"));

    let mut lines = body.lines();
    assert_eq!(lines.next(), Some("Nome,Email,Telefone,CPF,Produto,Vencimento,Valor,Status,Pago em"));
    assert_eq!(
        lines.next(),
        Some("\"Silva, Maria\",,,,Mensalidade,10/03/2024,150.50,Pendente,")
    );
}

#[tokio::test]
async fn test_stats_endpoint() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);
    {
        let mut conn = t.state.db.get().unwrap();
        create_test_invoice(&mut conn, user.id, "A", date("2024-03-10"), 10_000);
        create_test_invoice(&mut conn, user.id, "B", date("2024-03-11"), 5_000);
    }

    let (status, body) = t.request("GET", "/api/stats", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 2);
    assert_eq!(body["data"]["pending_count"], 2);
    assert_eq!(body["data"]["pending_value"], 150.0);
}
