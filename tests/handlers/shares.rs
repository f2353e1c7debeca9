//! Shareable invoice previews

use axum::http::StatusCode;
use serde_json::json;

#[path = "../common/mod.rs"]
mod common;
use common::*;

#[tokio::test]
async fn test_create_share_and_render_page() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);

    let (status, created) = t
        .request(
            "POST",
            "/api/invoice-share",
            Some(&token),
            Some(json!({
                "client_name": "Maria <Silva>",
                "value": "R$ 150,00",
                "due_date": "10/03/2024",
                "logo": "/uploads/logo-1.png"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_str().unwrap();
    assert_eq!(id.len(), 8);
    assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(created["url"], format!("http://localhost:3000/share/{}", id));

    let (status, _, html) = t.request_raw("GET", &format!("/share/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("Maria &lt;Silva&gt;"));
    assert!(!html.contains("<Silva>"));
    assert!(html.contains("R$ 150,00"));
    assert!(html.contains("10/03/2024"));
    assert!(html.contains(r#"<meta property="og:image" content="http://localhost:3000/uploads/logo-1.png">"#));
}

#[tokio::test]
async fn test_share_without_logo_has_no_image() {
    let t = test_app();
    let (_, token) = create_user_with_session(&t.state.db, "tenant@example.com", Plan::Pro);

    let (_, created) = t
        .request(
            "POST",
            "/api/invoice-share",
            Some(&token),
            Some(json!({ "client_name": "Maria", "value": "R$ 10,00", "due_date": "01/04/2024", "logo": "" })),
        )
        .await;
    let id = created["id"].as_str().unwrap();

    let (status, _, html) = t.request_raw("GET", &format!("/share/{}", id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!html.contains("og:image"));
}

#[tokio::test]
async fn test_creating_share_requires_session() {
    let t = test_app();
    let (status, _) = t
        .request("POST", "/api/invoice-share", None, Some(json!({ "client_name": "Maria" })))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_unknown_share_is_not_found() {
    let t = test_app();
    let (status, _, body) = t.request_raw("GET", "/share/deadbeef", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, "Fatura não encontrada");
}

#[tokio::test]
async fn test_legacy_query_string_page() {
    let t = test_app();
    let (status, _, html) = t
        .request_raw(
            "GET",
            "/share-invoice?name=Jo%C3%A3o&value=R%24%2050%2C00&due_date=05%2F05%2F2024",
            None,
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(html.contains("João"));
    assert!(html.contains("R$ 50,00"));
    assert!(html.contains("05/05/2024"));
}
