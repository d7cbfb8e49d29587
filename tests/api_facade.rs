//! Facade behaviour: validation before I/O, typed responses, session handoff.

use std::sync::Arc;

use cambio_client::api::{AlertRequest, GoogleCredential, RateBoard};
use cambio_client::session::{SessionEndReason, SessionEvent, SessionStorage, StorageError};
use cambio_client::{ApiError, Services};

mod common;

use common::{base_url, MockResponse};

fn validation_field(result: Result<impl std::fmt::Debug, ApiError>) -> &'static str {
    match result {
        Err(ApiError::Validation { field, .. }) => field,
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_invalid_input_never_reaches_backend() {
    let (addr, log) = common::start_mock_backend(MockResponse::json(200, serde_json::json!({}))).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));
    assert!(services.session.login(&common::user_token(), None));
    let api = &services.api;

    assert_eq!(validation_field(api.login("not-an-email", "longenough").await), "email");
    assert_eq!(validation_field(api.register("ana@example.ao", "short").await), "password");
    assert_eq!(
        validation_field(
            api.google_auth(&GoogleCredential { credential: "  ".into(), client_id: None })
                .await
        ),
        "credential"
    );

    let alert = AlertRequest {
        currency: "gbp".into(),
        value: 10.0,
        rate_type: "buy".into(),
        direction: None,
    };
    assert_eq!(validation_field(api.create_alert(&alert).await), "currency");
    let alert = AlertRequest { currency: "usd".into(), value: -1.0, ..alert };
    assert_eq!(validation_field(api.create_alert(&alert).await), "value");

    assert_eq!(validation_field(api.delete_alert("").await), "alertId");
    assert_eq!(validation_field(api.admin_set_premium("123", true).await), "userId");
    assert_eq!(validation_field(api.save_phone_number("+351 912345678").await), "phoneNumber");
    assert_eq!(validation_field(api.admin_update_rates(&RateBoard::default()).await), "usdBuy");

    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_login_starts_session() {
    let token = common::user_token();
    let response = serde_json::json!({
        "message": "Login realizado com sucesso",
        "token": token,
        "user": { "_id": "64b7f0c2a1b2c3d4e5f60718", "email": "ana@example.ao", "isPremium": true }
    });
    let (addr, log) = common::start_mock_backend(MockResponse::json(200, response)).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));
    let mut events = services.session.subscribe();

    let outcome = services.api.login(" ana@example.ao ", "correct-horse").await.unwrap();

    assert!(outcome.session_started);
    assert_eq!(services.session.current_token(), Some(token));
    assert!(services.session.is_premium());
    assert!(!services.session.is_admin());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Started { email: "ana@example.ao".into() }
    );

    let requests = log.lock().unwrap().clone();
    assert_eq!(requests[0].path, "/api/auth/login");
    let body: serde_json::Value = serde_json::from_str(&requests[0].body).unwrap();
    assert_eq!(body["email"], "ana@example.ao");
    assert!(requests[0].header("authorization").is_none());
}

#[tokio::test]
async fn test_expired_token_from_backend_is_not_adopted() {
    let stale = common::make_token(serde_json::json!({
        "userId": "1", "email": "ana@example.ao",
        "exp": chrono::Utc::now().timestamp() + 60,
    }));
    let (addr, _) = common::start_mock_backend(MockResponse::json(200, serde_json::json!({ "token": stale }))).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));

    let outcome = services.api.login("ana@example.ao", "correct-horse").await.unwrap();
    assert!(!outcome.session_started);
    assert!(!services.session.is_authenticated());
}

#[tokio::test]
async fn test_fetch_rates_is_public_and_typed() {
    let rates = serde_json::json!([
        { "_id": "b", "date": "2024-07-24", "usdBuy": 870.0, "usdSell": 880.0, "eurBuy": 940.0,
          "eurSell": 955.0, "zarBuy": 47.0, "zarSell": 49.0, "cadBuy": 630.0, "cadSell": 640.0 },
        { "_id": "a", "date": "2024-07-23", "usdBuy": 869.0, "usdSell": 879.0, "eurBuy": 939.0,
          "eurSell": 954.0, "zarBuy": 46.0, "zarSell": 48.0, "cadBuy": 629.0, "cadSell": 639.0 }
    ]);
    let (addr, log) = common::start_mock_backend(MockResponse::json(200, rates)).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));

    let rates = services.api.fetch_rates().await.unwrap();
    assert_eq!(rates.len(), 2);
    assert_eq!(rates[0].date.as_deref(), Some("2024-07-24"));
    assert_eq!(rates[0].board.usd_sell, 880.0);
    assert!(log.lock().unwrap()[0].header("authorization").is_none());
}

#[tokio::test]
async fn test_malformed_rates_are_a_decode_error() {
    let (addr, log) = common::start_mock_backend(MockResponse::json(200, serde_json::json!({ "unexpected": 1 }))).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));

    assert!(matches!(services.api.fetch_rates().await, Err(ApiError::Decode(_))));
    assert_eq!(log.lock().unwrap().len(), 1, "decode errors are not retried");
}

#[tokio::test]
async fn test_create_alert_sends_normalised_body() {
    let (addr, log) =
        common::start_mock_backend(MockResponse::json(201, serde_json::json!({ "message": "Alerta criado" }))).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));
    assert!(services.session.login(&common::user_token(), None));

    let alert = AlertRequest {
        currency: " EUR ".into(),
        value: 1000.0,
        rate_type: "Sell".into(),
        direction: Some("below".into()),
    };
    let reply = services.api.create_alert(&alert).await.unwrap();
    assert_eq!(reply.message.as_deref(), Some("Alerta criado"));

    let request = log.lock().unwrap()[0].clone();
    assert_eq!(request.path, "/api/alerts");
    let body: serde_json::Value = serde_json::from_str(&request.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({ "currency": "eur", "value": 1000.0, "type": "below", "rateType": "sell" })
    );
}

#[tokio::test]
async fn test_admin_paths() {
    let users = serde_json::json!({ "users": [
        { "_id": "64b7f0c2a1b2c3d4e5f60718", "email": "ana@example.ao", "isPremium": false,
          "isAdmin": false, "alertsCount": 2, "dateCreated": "2024-01-01" },
        { "_id": "64b7f0c2a1b2c3d4e5f60719", "email": "joao@example.ao", "isPremium": true, "isAdmin": true }
    ]});
    let (addr, log) = common::start_programmable_backend("127.0.0.1:0".parse().unwrap(), move |req| {
        let users = users.clone();
        async move {
            if req.method == "GET" {
                MockResponse::json(200, users)
            } else {
                MockResponse::json(200, serde_json::json!({ "message": "updated" }))
            }
        }
    })
    .await;
    let services = common::services(common::test_config(vec![base_url(addr)]));
    assert!(services.session.login(&common::user_token(), None));
    let api = &services.api;

    let listed = api.admin_list_users().await.unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0].alerts_count, Some(2));
    assert_eq!(listed[0].created_at.as_deref(), Some("2024-01-01"));

    let found = api.admin_find_user_by_email("joao@example.ao").await.unwrap().unwrap();
    assert!(found.is_admin);
    assert!(api.admin_find_user_by_email("nobody@example.ao").await.unwrap().is_none());

    api.admin_set_premium("64b7f0c2a1b2c3d4e5f60718", true).await.unwrap();
    api.admin_set_premium_by_email("ana@example.ao", false).await.unwrap();

    let requests = log.lock().unwrap().clone();
    let patches: Vec<_> = requests.iter().filter(|r| r.method == "PATCH").collect();
    assert_eq!(patches[0].path, "/api/admin/users/64b7f0c2a1b2c3d4e5f60718/premium");
    assert_eq!(patches[0].body, r#"{"isPremium":true}"#);
    assert_eq!(patches[1].path, "/api/admin/users/email/ana%40example.ao/premium");
}

#[tokio::test]
async fn test_export_returns_workbook() {
    let (addr, log) = common::start_mock_backend(MockResponse {
        status: 200,
        content_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        body: "PK\u{3}\u{4}fake-xlsx".to_string(),
        delay: std::time::Duration::ZERO,
    })
    .await;
    let services = common::services(common::test_config(vec![base_url(addr)]));
    assert!(services.session.login(&common::user_token(), None));

    let export = services.api.export_rates().await.unwrap();
    assert!(export.bytes.starts_with(b"PK"));
    assert!(export.file_name.starts_with("taxas_cambio_"));
    assert!(export.file_name.ends_with(".xlsx"));
    assert_eq!(log.lock().unwrap()[0].path, "/api/export-rates");
}

#[tokio::test]
async fn test_empty_export_is_an_error() {
    let (addr, _) = common::start_mock_backend(MockResponse::text(200, "")).await;
    let services = common::services(common::test_config(vec![base_url(addr)]));
    assert!(services.session.login(&common::user_token(), None));

    assert!(matches!(services.api.export_rates().await, Err(ApiError::Decode(_))));
}

#[tokio::test]
async fn test_logout_clears_session() {
    let services = common::services(common::test_config(vec![base_url(common::dead_address().await)]));
    assert!(services.session.login(&common::user_token(), None));
    services.api.logout().unwrap();
    assert!(services.api.current_user().is_none());
    assert!(matches!(services.api.fetch_user_alerts().await, Err(ApiError::Auth(_))));
}

/// Storage that accepts writes but can never delete.
#[derive(Debug)]
struct UndeletableStorage;

impl SessionStorage for UndeletableStorage {
    fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Ok(None)
    }

    fn set(&self, _key: &str, _value: &str) -> Result<(), StorageError> {
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        Err(StorageError::Io {
            path: format!("/readonly/{}.json", key).into(),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        })
    }
}

#[tokio::test]
async fn test_logout_reports_undeletable_session() {
    let config = common::test_config(vec![base_url(common::dead_address().await)]);
    let client = reqwest::Client::builder().no_proxy().build().unwrap();
    let services = Services::with_client(config, Arc::new(UndeletableStorage), client);
    assert!(services.session.login(&common::user_token(), None));
    let mut events = services.session.subscribe();

    let result = services.api.logout();

    assert!(matches!(result, Err(ApiError::Storage(_))));
    assert!(!services.session.is_authenticated());
    assert_eq!(
        events.try_recv().unwrap(),
        SessionEvent::Ended { reason: SessionEndReason::UserLogout }
    );
}
