//! Plan checkout through the PIX gateways

use axum::http::StatusCode;
use serde_json::json;

use meus_clientes::config::{AsaasConfig, MercadoPagoConfig};
use meus_clientes::payments::{AsaasClient, Gateway, MercadoPagoClient};

#[path = "../common/mod.rs"]
mod common;
use common::*;

fn set_prices(t: &TestApp, pro: f64, premium: f64) {
    let mut conn = t.state.db.get().unwrap();
    queries::update_settings(
        &mut conn,
        &UpdateSettings {
            prices: Some(PlanPrices { free: 0.0, pro, premium }),
            pix_key: None,
        },
    )
    .unwrap();
}

fn mercadopago_app(url: &str) -> TestApp {
    let client = MercadoPagoClient::new(&MercadoPagoConfig {
        api_url: url.to_string(),
        access_token: "TEST-token".into(),
        webhook_secret: None,
    });
    test_app_with(|state| state.payments.mercadopago = Some(client))
}

#[tokio::test]
async fn test_checkout_without_gateway_is_unavailable() {
    let t = test_app();
    set_prices(&t, 29.9, 59.9);
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, body) = t
        .request("POST", "/api/billing/checkout", Some(&token), Some(json!({ "plan": "pro" })))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "Gateway de pagamento não configurado");
}

#[tokio::test]
async fn test_free_plan_not_purchasable() {
    let server = mockito::Server::new_async().await;
    let t = mercadopago_app(&server.url());
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, body) = t
        .request("POST", "/api/billing/checkout", Some(&token), Some(json!({ "plan": "free" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Plano indisponível para compra");
}

#[tokio::test]
async fn test_price_must_be_configured() {
    let server = mockito::Server::new_async().await;
    let t = mercadopago_app(&server.url());
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, body) = t
        .request("POST", "/api/billing/checkout", Some(&token), Some(json!({ "plan": "premium" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Preço do plano não configurado");
}

#[tokio::test]
async fn test_mercadopago_checkout() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/v1/payments")
        .match_header("authorization", "Bearer TEST-token")
        .match_body(mockito::Matcher::PartialJson(json!({
            "transaction_amount": 29.9,
            "payment_method_id": "pix",
            "payer": { "email": "tenant@example.com" }
        })))
        .with_status(201)
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "id": 123456789,
                "status": "pending",
                "point_of_interaction": {
                    "transaction_data": { "qr_code": "00020126PIX", "qr_code_base64": "iVBORw0KGgo=" }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let t = mercadopago_app(&server.url());
    set_prices(&t, 29.9, 59.9);
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, body) = t
        .request("POST", "/api/billing/checkout", Some(&token), Some(json!({ "plan": "pro" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["gateway"], "mercadopago");
    assert_eq!(body["plan"], "pro");
    assert_eq!(body["amount"], 29.9);
    assert_eq!(body["pix_code"], "00020126PIX");
    mock.assert_async().await;

    let id = body["id"].as_str().unwrap();
    let conn = t.state.db.get().unwrap();
    let payment = queries::get_plan_payment(&conn, id).unwrap().unwrap();
    assert_eq!(payment.user_id, user.id);
    assert_eq!(payment.gateway, Gateway::MercadoPago);
    assert_eq!(payment.gateway_payment_id.as_deref(), Some("123456789"));
    assert_eq!(payment.status, PlanPaymentStatus::Pending);
    assert_eq!(payment.amount_cents, 2990);
}

#[tokio::test]
async fn test_gateway_error_marks_payment_failed() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/v1/payments")
        .with_status(400)
        .with_body(r#"{"message":"invalid payer"}"#)
        .create_async()
        .await;

    let t = mercadopago_app(&server.url());
    set_prices(&t, 29.9, 59.9);
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    let (status, _) = t
        .request("POST", "/api/billing/checkout", Some(&token), Some(json!({ "plan": "pro" })))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);

    let (status, payments) = t.request("GET", "/api/billing/payments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["status"], "failed");
    assert_eq!(payments[0]["user_id"], user.id);
}

#[tokio::test]
async fn test_asaas_checkout_creates_customer_once() {
    let mut server = mockito::Server::new_async().await;
    let customer = server
        .mock("POST", "/v3/customers")
        .match_header("access_token", "asaas-key")
        .with_status(200)
        .with_body(r#"{"id":"cus_001"}"#)
        .expect(1)
        .create_async()
        .await;
    let payment = server
        .mock("POST", "/v3/payments")
        .match_body(mockito::Matcher::PartialJson(json!({
            "customer": "cus_001",
            "billingType": "PIX",
            "value": 59.9
        })))
        .with_status(200)
        .with_body(r#"{"id":"pay_001"}"#)
        .expect(2)
        .create_async()
        .await;
    server
        .mock("GET", "/v3/payments/pay_001/pixQrCode")
        .with_status(200)
        .with_body(r#"{"encodedImage":"iVBOR","payload":"00020126ASAAS"}"#)
        .expect(2)
        .create_async()
        .await;

    let client = AsaasClient::new(&AsaasConfig {
        api_url: server.url(),
        api_key: "asaas-key".into(),
        webhook_token: Some("tok".into()),
    });
    let t = test_app_with(|state| state.payments.asaas = Some(client));
    set_prices(&t, 29.9, 59.9);
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);

    for _ in 0..2 {
        let (status, body) = t
            .request(
                "POST",
                "/api/billing/checkout",
                Some(&token),
                Some(json!({ "plan": "premium", "gateway": "asaas" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["gateway"], "asaas");
        assert_eq!(body["pix_code"], "00020126ASAAS");
        assert_eq!(body["pix_qr_base64"], "iVBOR");
    }
    customer.assert_async().await;
    payment.assert_async().await;

    let conn = t.state.db.get().unwrap();
    let stored = queries::get_user_by_id(&conn, user.id).unwrap().unwrap();
    assert_eq!(stored.asaas_customer_id.as_deref(), Some("cus_001"));
}

#[tokio::test]
async fn test_list_payments_is_per_user() {
    let t = test_app();
    let (user, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Free);
    let (other, _) = create_user_with_session(&t.state.db, "other@example.com", Plan::Free);
    {
        let conn = t.state.db.get().unwrap();
        queries::create_plan_payment(&conn, user.id, Plan::Pro, 2990, Gateway::MercadoPago).unwrap();
        queries::create_plan_payment(&conn, other.id, Plan::Premium, 5990, Gateway::Asaas).unwrap();
    }

    let (status, payments) = t.request("GET", "/api/billing/payments", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    let payments = payments.as_array().unwrap();
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0]["plan"], "pro");
    assert_eq!(payments[0]["amount"], 29.9);
}
