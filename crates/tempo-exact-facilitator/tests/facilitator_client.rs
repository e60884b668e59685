use actix_web::{web, App, HttpResponse, HttpServer};
use alloy::primitives::Address;
use alloy::providers::RootProvider;
use alloy::signers::local::PrivateKeySigner;
use serde_json::json;

use x402::{
    ExactTempoFacilitator, FacilitatorClient, PaymentPayload, PaymentRequirements, ProviderRpc,
    SettleErrorKind, VerifyErrorKind, X402Error, DEFAULT_PATHUSD, TEMPO_TESTNET_NETWORK,
};
use x402_facilitator::config::Environment;
use x402_facilitator::routes;
use x402_facilitator::state::AppState;

/// Serve `configure` on an ephemeral local port and return its base URL.
fn spawn<F>(configure: F) -> String
where
    F: Fn(&mut web::ServiceConfig) + Clone + Send + 'static,
{
    let server = HttpServer::new(move || App::new().configure(configure.clone()))
        .workers(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .unwrap();
    let addr = server.addrs()[0];
    actix_rt::spawn(server.run());
    format!("http://{addr}/")
}

/// The real facilitator routes, backed by an RPC endpoint that refuses connections.
fn spawn_facilitator(environment: Environment) -> (String, Address) {
    let signer = PrivateKeySigner::random();
    let sponsor = signer.address();
    let provider = RootProvider::new_http("http://localhost:1".parse().unwrap());
    let state = web::Data::new(AppState {
        facilitator: ExactTempoFacilitator::new(ProviderRpc::new(provider), signer),
        environment,
    });
    let url = spawn(move |cfg| {
        cfg.app_data(state.clone());
        routes::configure(cfg);
    });
    (url, sponsor)
}

fn requirements() -> PaymentRequirements {
    PaymentRequirements {
        scheme: "exact".to_string(),
        network: TEMPO_TESTNET_NETWORK.to_string(),
        asset: DEFAULT_PATHUSD,
        amount: "1000".to_string(),
        pay_to: Address::repeat_byte(0x11),
        max_timeout_seconds: 300,
        extra: serde_json::Map::new(),
    }
}

fn empty_payload(requirements: &PaymentRequirements) -> PaymentPayload {
    serde_json::from_value(json!({
        "x402Version": 2,
        "accepted": requirements,
        "payload": {},
    }))
    .unwrap()
}

fn assert_http_error(err: X402Error, needle: &str) {
    match err {
        X402Error::HttpError(msg) => assert!(msg.contains(needle), "unexpected message: {msg}"),
        other => panic!("expected HttpError, got {other:?}"),
    }
}

#[actix_rt::test]
async fn test_client_reads_supported_kinds() {
    let (url, sponsor) = spawn_facilitator(Environment::Development);
    let client = FacilitatorClient::new(url);

    let supported = client.supported().await.unwrap();
    assert_eq!(supported.kinds.len(), 1);
    assert_eq!(supported.kinds[0].scheme, "exact");
    assert_eq!(supported.kinds[0].network, TEMPO_TESTNET_NETWORK);
    assert_eq!(supported.signers["tempo:*"], vec![sponsor]);
}

#[actix_rt::test]
async fn test_client_verify_decodes_rejection() {
    let (url, _) = spawn_facilitator(Environment::Development);
    let client = FacilitatorClient::new(url);
    let reqs = requirements();

    let response = client.verify(&empty_payload(&reqs), &reqs).await.unwrap();
    assert!(!response.is_valid);
    assert_eq!(response.invalid_kind, Some(VerifyErrorKind::MissingTransaction));
    assert_eq!(
        response.invalid_reason.as_deref(),
        Some("Missing serializedTransaction in payload")
    );
}

#[actix_rt::test]
async fn test_client_settle_decodes_failure() {
    let (url, _) = spawn_facilitator(Environment::Development);
    let client = FacilitatorClient::new(url);
    let reqs = requirements();

    let response = client.settle(&empty_payload(&reqs), &reqs).await.unwrap();
    assert!(!response.success);
    assert_eq!(response.error_kind, Some(SettleErrorKind::Verification));
    assert_eq!(response.transaction, "");
}

async fn strict_verify(body: web::Json<serde_json::Value>) -> HttpResponse {
    let payload = &body["paymentPayload"];
    let requirements = &body["paymentRequirements"];
    let well_formed = payload["x402Version"] == 2
        && payload["accepted"]["payTo"].is_string()
        && requirements["payTo"].is_string()
        && requirements["maxTimeoutSeconds"] == 300
        && body.get("payment_payload").is_none();
    if well_formed {
        HttpResponse::Ok().json(json!({
            "isValid": true,
            "payer": "0x4444444444444444444444444444444444444444",
        }))
    } else {
        HttpResponse::BadRequest().body("unexpected request shape")
    }
}

#[actix_rt::test]
async fn test_client_sends_camel_case_request() {
    let url = spawn(|cfg| {
        cfg.route("/verify", web::post().to(strict_verify));
    });
    let client = FacilitatorClient::new(url);
    let reqs = requirements();

    let response = client.verify(&empty_payload(&reqs), &reqs).await.unwrap();
    assert!(response.is_valid);
    assert_eq!(response.payer, Some(Address::repeat_byte(0x44)));
}

#[actix_rt::test]
async fn test_client_non_2xx_is_http_error() {
    let url = spawn(|cfg| {
        cfg.route(
            "/settle",
            web::post().to(|| async { HttpResponse::ServiceUnavailable().body("down for maintenance") }),
        );
    });
    let client = FacilitatorClient::new(url);
    let reqs = requirements();

    let err = client.settle(&empty_payload(&reqs), &reqs).await.unwrap_err();
    assert_http_error(err, "503");
}

#[actix_rt::test]
async fn test_client_server_fault_is_http_error() {
    let (url, _) = spawn_facilitator(Environment::Production);
    let client = FacilitatorClient::new(url);

    // A signed payment reaches the unreachable RPC and the server answers 500
    let payer = x402::ExactTempoClient::with_private_key(PrivateKeySigner::random());
    let reqs = requirements();
    let payload = x402::SchemeClient::create_payment_payload(&payer, 2, &reqs)
        .await
        .unwrap();

    let err = client.verify(&payload, &reqs).await.unwrap_err();
    assert_http_error(err, "500");
}

#[actix_rt::test]
async fn test_client_unreadable_body_is_http_error() {
    let url = spawn(|cfg| {
        cfg.route("/supported", web::get().to(|| async { HttpResponse::Ok().body("not json") }));
    });
    let client = FacilitatorClient::new(url);

    let err = client.supported().await.unwrap_err();
    assert_http_error(err, "parse failed");
}

#[actix_rt::test]
async fn test_client_unreachable_facilitator_is_http_error() {
    let client = FacilitatorClient::new("http://127.0.0.1:1");

    let err = client.supported().await.unwrap_err();
    assert_http_error(err, "request failed");
}
