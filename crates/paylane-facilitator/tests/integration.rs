use std::sync::Arc;

use actix_web::{test, web, App};

use paylane::replay::InMemoryReplayStore;
use paylane::{Facilitator, FacilitatorConfig, LedgerConfig};
use paylane_facilitator::routes;
use paylane_facilitator::state::AppState;

/// Build an AppState over a simulated single-ledger facilitator.
fn make_state(hmac_secret: Vec<u8>, metrics_token: Option<Vec<u8>>) -> web::Data<AppState> {
    let config = FacilitatorConfig::simulated(vec![LedgerConfig::NativeEvm {
        ledger: "eip155:10".to_string(),
        chain_id: 10,
        rpc_url: "http://localhost:1".to_string(),
        facilitator_address: "0x00000000000000000000000000000000000000fa".to_string(),
    }]);
    let facilitator = Facilitator::new(config, Arc::new(InMemoryReplayStore::new())).unwrap();

    web::Data::new(AppState {
        facilitator,
        hmac_secret,
        metrics_token,
    })
}

#[actix_rt::test]
async fn discover_lists_configured_kinds() {
    let state = make_state(b"test-secret".to_vec(), None);
    let app = test::init_service(App::new().app_data(state).service(routes::discover)).await;

    let req = test::TestRequest::get().uri("/discover").to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["kinds"][0]["scheme"], "exact");
    assert_eq!(body["kinds"][0]["ledger"], "eip155:10");
    assert_eq!(body["kinds"][0]["protocolVersion"], 1);
}

#[actix_rt::test]
async fn verify_requires_hmac() {
    let state = make_state(b"test-secret".to_vec(), None);
    let app = test::init_service(App::new().app_data(state).service(routes::verify)).await;

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload("{}")
        .insert_header(("Content-Type", "application/json"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication required");
}

#[actix_rt::test]
async fn verify_rejects_bad_hmac() {
    let state = make_state(b"test-secret".to_vec(), None);
    let app = test::init_service(App::new().app_data(state).service(routes::verify)).await;

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload("{}")
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", "deadbeef"))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 401);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["error"], "authentication failed");
}

#[actix_rt::test]
async fn verify_with_valid_hmac_rejects_malformed_body() {
    let state = make_state(b"test-secret".to_vec(), None);
    let app = test::init_service(App::new().app_data(state).service(routes::verify)).await;

    let body_bytes = b"{}";
    let mac = paylane::auth::request_mac(b"test-secret", body_bytes);

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload(&body_bytes[..])
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", mac))
        .to_request();
    let resp = test::call_service(&app, req).await;

    // HMAC passes, body parse fails -> 400, not 401
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isValid"], false);
    assert!(body["invalidReason"].as_str().unwrap().contains("invalid"));
}

#[actix_rt::test]
async fn undecodable_header_is_an_internal_error_with_wellformed_body() {
    let state = make_state(b"test-secret".to_vec(), None);
    let app = test::init_service(App::new().app_data(state).service(routes::verify)).await;

    let body_bytes = serde_json::to_vec(&serde_json::json!({
        "protocolVersion": 1,
        "paymentHeader": "!!!not-base64!!!",
        "paymentRequirement": {
            "scheme": "exact",
            "ledger": "eip155:10",
            "minAmount": "1",
            "payee": "0x00000000000000000000000000000000000000b2",
            "asset": "native",
            "facilitatorIdentity": "0x00000000000000000000000000000000000000fa",
            "timeoutSeconds": 300,
        },
    }))
    .unwrap();
    let mac = paylane::auth::request_mac(b"test-secret", &body_bytes);

    let req = test::TestRequest::post()
        .uri("/verify")
        .set_payload(body_bytes)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", mac))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 500);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isValid"], false);
    assert_eq!(body["payer"], "unknown");
    assert!(body["invalidReason"].as_str().unwrap().contains("malformed"));
}

#[actix_rt::test]
async fn settle_unsupported_scheme_reports_reason() {
    use base64::Engine as _;

    let state = make_state(b"test-secret".to_vec(), None);
    let app = test::init_service(App::new().app_data(state).service(routes::settle)).await;

    let proof = serde_json::json!({
        "protocolVersion": 1,
        "scheme": "upto",
        "ledger": "eip155:10",
        "payload": {
            "payer": "0x00000000000000000000000000000000000000a1",
            "payee": "0x00000000000000000000000000000000000000b2",
            "amount": "1000",
            "nonce": 1,
            "deadline": 4000000000u64,
            "signature": "0x00",
        },
    });
    let header = base64::engine::general_purpose::STANDARD
        .encode(serde_json::to_vec(&proof).unwrap());

    let body_bytes = serde_json::to_vec(&serde_json::json!({
        "protocolVersion": 1,
        "paymentHeader": header,
        "paymentRequirement": {
            "scheme": "upto",
            "ledger": "eip155:10",
            "minAmount": "1000",
            "payee": "0x00000000000000000000000000000000000000b2",
            "asset": "native",
            "facilitatorIdentity": "0x00000000000000000000000000000000000000fa",
            "timeoutSeconds": 300,
        },
    }))
    .unwrap();
    let mac = paylane::auth::request_mac(b"test-secret", &body_bytes);

    let req = test::TestRequest::post()
        .uri("/settle")
        .set_payload(body_bytes)
        .insert_header(("Content-Type", "application/json"))
        .insert_header(("X-Facilitator-Auth", mac))
        .to_request();
    let resp = test::call_service(&app, req).await;

    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["success"], false);
    assert!(body["errorReason"].as_str().unwrap().contains("scheme"));
    assert_eq!(body["transactionRef"], "");
}

#[actix_rt::test]
async fn metrics_requires_separate_token() {
    let state = make_state(b"hmac-secret".to_vec(), Some(b"metrics-token-123".to_vec()));
    let app =
        test::init_service(App::new().app_data(state).service(routes::metrics_endpoint)).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // The HMAC secret is not the metrics token
    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer hmac-secret"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    let req = test::TestRequest::get()
        .uri("/metrics")
        .insert_header(("Authorization", "Bearer metrics-token-123"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
}

#[actix_rt::test]
async fn metrics_forbidden_when_no_token_configured() {
    let state = make_state(b"hmac-secret".to_vec(), None);
    let app =
        test::init_service(App::new().app_data(state).service(routes::metrics_endpoint)).await;

    let req = test::TestRequest::get().uri("/metrics").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);
}
