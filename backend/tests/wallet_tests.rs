//! Integration tests for the wallet endpoints against a local stand-in for
//! the Xaman platform API.

use axum::{
    extract::{Path, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use axum_test::TestServer;
use chess_wager_server::{config::Config, create_test_app_with, Services};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

const SIGNED_UUID: &str = "5f1c2a9e-signed-0000-0000-000000000001";
const PENDING_UUID: &str = "5f1c2a9e-pending-000-0000-000000000002";
const PAYMENT_UUID: &str = "5f1c2a9e-payment-000-0000-000000000003";
const TOKEN_ONLY_UUID: &str = "5f1c2a9e-token-0000-0000-000000000004";

#[derive(Clone, Default)]
struct FakeXaman {
    created: Arc<Mutex<Vec<Value>>>,
}

async fn fake_create(
    State(fake): State<FakeXaman>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if headers.get("x-api-key").is_none() || headers.get("x-api-secret").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "no key" })));
    }
    fake.created.lock().unwrap().push(body);
    (
        StatusCode::OK,
        Json(json!({
            "uuid": "new-payload-uuid",
            "next": { "always": "https://xumm.app/sign/new-payload-uuid" },
            "refs": {
                "qr_png": "https://xumm.app/sign/new-payload-uuid_q.png",
                "websocket_status": "wss://xumm.app/sign/new-payload-uuid"
            }
        })),
    )
}

async fn fake_get(Path(uuid): Path<String>) -> (StatusCode, Json<Value>) {
    match uuid.as_str() {
        SIGNED_UUID => (
            StatusCode::OK,
            Json(json!({
                "meta": { "signed": true, "resolved": true, "expired": false, "cancelled": false },
                "response": { "account": null, "signer": "rSigner" },
                "application": {}
            })),
        ),
        PAYMENT_UUID => (
            StatusCode::OK,
            Json(json!({
                "meta": { "signed": true, "resolved": true, "expired": false, "cancelled": false },
                "payload": {
                    "tx_type": "Payment",
                    "request_json": {
                        "TransactionType": "Payment",
                        "Destination": "rHookTestnetDestination",
                        "Amount": "1000000",
                        "NetworkID": 21338
                    }
                },
                "response": { "account": "rSigner", "txid": "ABCDEF" }
            })),
        ),
        TOKEN_ONLY_UUID => (
            StatusCode::OK,
            Json(json!({
                "meta": { "signed": true, "resolved": true, "expired": false, "cancelled": false },
                "response": {},
                "application": { "issued_user_token": "xaman-user-token-123" }
            })),
        ),
        PENDING_UUID => (
            StatusCode::OK,
            Json(json!({
                "meta": { "signed": false, "resolved": false, "expired": false, "cancelled": false },
                "response": {}
            })),
        ),
        _ => (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown" }))),
    }
}

/// Starts the fake provider and an app configured to talk to it.
async fn setup() -> (TestServer, Services, FakeXaman) {
    let fake = FakeXaman::default();
    let provider = Router::new()
        .route("/payload", post(fake_create))
        .route("/payload/:uuid", get(fake_get))
        .with_state(fake.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, provider).await.unwrap();
    });

    let mut config = Config::for_tests();
    config.xaman.api_url = format!("http://{}", addr);
    config.public_base_url = "https://chess.example".to_string();

    let (app, services) = create_test_app_with(config).await;
    (TestServer::new(app).unwrap(), services, fake)
}

#[tokio::test]
async fn test_payment_payload_for_hook() {
    let (server, _services, fake) = setup().await;

    let response = server
        .post("/api/wallet/payment")
        .json(&json!({ "amount": 2.5, "memo": "{\"tournament\":\"t1\"}" }))
        .await;
    response.assert_status_ok();

    let body: Value = response.json();
    assert_eq!(body["ok"], true);
    assert_eq!(body["uuid"], "new-payload-uuid");
    assert_eq!(body["nextUrl"], "https://xumm.app/sign/new-payload-uuid");
    assert_eq!(body["websocketUrl"], "wss://xumm.app/sign/new-payload-uuid");

    let created = fake.created.lock().unwrap().clone();
    let txjson = &created[0]["txjson"];
    assert_eq!(txjson["TransactionType"], "Payment");
    assert_eq!(txjson["Destination"], "rHookTestnetDestination");
    assert_eq!(txjson["Amount"], "2500000");
    assert_eq!(txjson["NetworkID"], 21338);
    assert_eq!(
        created[0]["options"]["return_url"]["web"],
        "https://chess.example/chess"
    );
}

#[tokio::test]
async fn test_payment_validation() {
    let (server, _services, _fake) = setup().await;

    server
        .post("/api/wallet/payment")
        .json(&json!({ "amount": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    // No Hook address is configured for mainnet in tests.
    server
        .post("/api/wallet/payment")
        .json(&json!({ "amount": 1.0, "network": "mainnet" }))
        .await
        .assert_status(StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_signin_payload() {
    let (server, _services, fake) = setup().await;

    let response = server
        .post("/api/wallet/signin")
        .json(&json!({ "returnUrl": "https://chess.example/callback" }))
        .await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["qrUrl"], "https://xumm.app/sign/new-payload-uuid_q.png");

    let created = fake.created.lock().unwrap().clone();
    assert_eq!(created[0]["txjson"]["TransactionType"], "SignIn");
    assert_eq!(created[0]["options"]["submit"], false);
    assert!(created[0]["custom_meta"]["identifier"]
        .as_str()
        .unwrap()
        .starts_with("chess-signin-"));
}

#[tokio::test]
async fn test_verify_signin_issues_session() {
    let (server, services, _fake) = setup().await;

    let response = server
        .get(&format!("/api/wallet/verify-signin/{}", SIGNED_UUID))
        .await;
    response.assert_status_ok();
    assert_eq!(response.header("cache-control"), "no-store");

    let body: Value = response.json();
    assert_eq!(body["signed"], true);
    assert_eq!(body["account"], "rSigner");
    let token = body["token"].as_str().unwrap();
    assert_eq!(services.jwt_manager.verify_token(token).unwrap().sub, "rSigner");

    // Profile rows exist and the token works against session endpoints.
    let settings: Value = server
        .get("/api/profiles/me/settings")
        .add_header(AUTHORIZATION, format!("Bearer {}", token))
        .await
        .json();
    assert_eq!(settings["wallet_address"], "rSigner");
}

#[tokio::test]
async fn test_verify_signin_pending_and_invalid() {
    let (server, _services, _fake) = setup().await;

    let body: Value = server
        .get(&format!("/api/wallet/verify-signin/{}", PENDING_UUID))
        .await
        .json();
    assert_eq!(body["signed"], false);
    assert!(body.get("token").is_none());

    // A user token alone is not a wallet, so no session comes of it.
    let body: Value = server
        .get(&format!("/api/wallet/verify-signin/{}", TOKEN_ONLY_UUID))
        .await
        .json();
    assert_eq!(body["signed"], true);
    assert!(body.get("token").is_none());

    server
        .get("/api/wallet/verify-signin/short")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_get_payload_summary() {
    let (server, _services, _fake) = setup().await;

    let body: Value = server
        .post("/api/wallet/payload")
        .json(&json!({ "uuid": SIGNED_UUID }))
        .await
        .json();
    assert_eq!(body["signed"], true);
    assert_eq!(body["account"], "rSigner");
    assert_eq!(body["resolution"]["state"], "signed");

    server
        .post("/api/wallet/payload")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_join_checks_entry_payment() {
    let (server, services, _fake) = setup().await;
    let join = |address: &str, uuid: &str, fee: f64| {
        server
            .post("/api/tournaments/join")
            .add_header(
                AUTHORIZATION,
                format!("Bearer {}", services.jwt_manager.create_token(address).unwrap()),
            )
            .json(&json!({
                "playerAddress": address,
                "tournamentSize": 2,
                "entryFee": fee,
                "currency": "XAH",
                "paymentUuid": uuid
            }))
    };

    // Wrong signer, unsigned, a sign-in rather than a payment, too little.
    join("rSomeoneElse", PAYMENT_UUID, 1.0)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    join("rSigner", PENDING_UUID, 1.0)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    join("rSigner", SIGNED_UUID, 1.0)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    join("rSigner", PAYMENT_UUID, 2.0)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let body: Value = join("rSigner", PAYMENT_UUID, 1.0).await.json();
    assert_eq!(body["success"], true);
    let tournament_id = body["tournamentId"].as_str().unwrap().to_string();

    // The same payment cannot buy a second seat once the first is gone.
    server
        .post("/api/tournaments/leave")
        .add_header(
            AUTHORIZATION,
            format!("Bearer {}", services.jwt_manager.create_token("rSigner").unwrap()),
        )
        .json(&json!({ "playerAddress": "rSigner", "tournamentId": tournament_id }))
        .await
        .assert_status_ok();

    let response = join("rSigner", PAYMENT_UUID, 1.0).await;
    response.assert_status(StatusCode::CONFLICT);
    let body: Value = response.json();
    assert_eq!(body["error"], "Entry payment has already been used");

    let (seated,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM tournament_players WHERE player_address = 'rSigner'")
            .fetch_one(&services.pool)
            .await
            .unwrap();
    assert_eq!(seated, 0);
}

#[tokio::test]
async fn test_webhook_acknowledges() {
    let (server, _services, _fake) = setup().await;

    let body: Value = server
        .post("/api/wallet/webhook")
        .json(&json!({ "meta": { "payload_uuidv4": SIGNED_UUID } }))
        .await
        .json();
    assert_eq!(body["ok"], true);
}
