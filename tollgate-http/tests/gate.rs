//! End-to-end payment gate scenarios against an axum router.

use std::sync::Arc;

use alloy_primitives::{address, b256};
use alloy_signer_local::PrivateKeySigner;
use axum::body::Body;
use axum::routing::post;
use axum::{Json, Router};
use http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::method as http_method;
use wiremock::{Mock, MockServer, Respond, ResponseTemplate};

use tollgate::amount::TokenAmount;
use tollgate::proto::{self, encode_payment};
use tollgate::validator::ValidatorPipeline;
use tollgate::{
    Authorization, DomainHints, PaymentMethod, SignedAuthorization, UnixTimestamp,
};
use tollgate_evm::signer::{resolve_domain, sign_prepared_authorization};
use tollgate_evm::{ChainBackend, Erc3009Signer};
use tollgate_http::{FacilitatorBackend, PaymentDriver, PaymentGate, PaymentMode};
use tollgate::signer::AuthorizationSigner;

const RECIPIENT: &str = "0x501ab28fc3c7d29c2d12b243723eb5c5418b9de6";

fn payment_method() -> PaymentMethod {
    PaymentMethod {
        scheme: "exact".into(),
        network: "base-sepolia".into(),
        asset: address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"),
        recipient: address!("0x501ab28fc3c7d29c2d12b243723eb5c5418b9de6"),
        maximum_amount: TokenAmount::from(100_000u64),
        minimum_amount: TokenAmount::from(100_000u64),
        timeout: 300_000,
        description: Some("Sentiment Analysis".into()),
        extra: Some(DomainHints {
            name: Some("USDC".into()),
            version: Some("2".into()),
        }),
    }
}

fn wallet() -> PrivateKeySigner {
    PrivateKeySigner::from_bytes(&b256!(
        "0x4c0883a69102937d6231471b5dbb6204fe512961708279f2e3e8a5d4b8e3e974"
    ))
    .unwrap()
}

async fn analyze() -> Json<Value> {
    Json(json!({"sentiment": "positive"}))
}

fn protected_app(gate: &PaymentGate) -> Router {
    Router::new()
        .route("/analyze", post(analyze))
        .layer(gate.for_method(payment_method()))
}

fn facilitator_gate(url: &str) -> PaymentGate {
    let facilitator = FacilitatorBackend::try_new(url).unwrap();
    PaymentGate::new(ValidatorPipeline::new(vec![Arc::new(facilitator)]))
}

async fn signed_payment_header() -> String {
    let signer = Erc3009Signer::new(wallet());
    let signed = signer.sign(&payment_method()).await.unwrap();
    encode_payment(&signed).unwrap()
}

fn paid_request(header: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .header("X-PAYMENT", header)
        .body(Body::empty())
        .unwrap()
}

fn unpaid_request() -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/analyze")
        .body(Body::empty())
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn settling_facilitator(tx: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(http_method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"transactionHash": tx})))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn unpaid_request_receives_the_challenge() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let app = protected_app(&facilitator_gate(&facilitator.uri()));

    let response = app.oneshot(unpaid_request()).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);

    let body = body_json(response).await;
    assert_eq!(body["x402Version"], 1);
    assert_eq!(body["error"], "payment-required");
    assert_eq!(body["methods"][0]["maximumAmount"], "100000");
    assert_eq!(body["methods"][0]["recipient"], RECIPIENT);
    assert_eq!(body["methods"][0]["network"], "base-sepolia");
    assert_eq!(body["methods"][0]["description"], "Sentiment Analysis");

    // the challenge never reaches the facilitator
    assert!(facilitator.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn paid_request_reaches_the_resource() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let app = protected_app(&facilitator_gate(&facilitator.uri()));

    let header = signed_payment_header().await;
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("X-Payment-Response"));

    let body = body_json(response).await;
    assert_eq!(body["sentiment"], "positive");
    assert_eq!(body["payment"]["transactionHash"], "0xdeadbeef");
    assert_eq!(body["payment"]["network"], "base-sepolia");
    assert_eq!(body["payment"]["status"], "confirmed");
    assert_eq!(body["transactionHash"], "0xdeadbeef");
    assert!(body.get("error").is_none());
}

#[tokio::test]
async fn replayed_header_is_rejected_without_settlement() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let gate = facilitator_gate(&facilitator.uri());
    let app = protected_app(&gate);

    let header = signed_payment_header().await;
    let first = app.clone().oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let second = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = body_json(second).await;
    assert_eq!(body["error"], "replay");

    // exactly the one settlement call from the first request
    assert_eq!(facilitator.received_requests().await.unwrap().len(), 1);
}

async fn stale_payment_header(valid_after: u64, valid_before: u64, value: u64) -> String {
    let signer = wallet();
    let method = payment_method();
    let domain = resolve_domain(&method).unwrap();
    let authorization = Authorization {
        from: signer.address(),
        to: method.recipient,
        value: TokenAmount::from(value),
        valid_after: UnixTimestamp::from_secs(valid_after),
        valid_before: UnixTimestamp::from_secs(valid_before),
        nonce: b256!("0x0000000000000000000000000000000000000000000000000000000000000042"),
    };
    let payload = sign_prepared_authorization(&signer, &domain, authorization)
        .await
        .unwrap();
    let signed = SignedAuthorization {
        x402_version: proto::V1,
        scheme: method.scheme.clone(),
        network: method.network.clone(),
        payload,
    };
    encode_payment(&signed).unwrap()
}

#[tokio::test]
async fn expired_authorization_short_circuits() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let app = protected_app(&facilitator_gate(&facilitator.uri()));

    let now = UnixTimestamp::now().as_secs();
    let header = stale_payment_header(now - 600, now - 1, 100_000).await;
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "expired");

    assert!(facilitator.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn undervalued_authorization_is_rejected() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let app = protected_app(&facilitator_gate(&facilitator.uri()));

    let now = UnixTimestamp::now().as_secs();
    let header = stale_payment_header(now, now + 300, 50_000).await;
    let response = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid-authorization");

    assert!(facilitator.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn garbage_header_is_invalid_format() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let app = protected_app(&facilitator_gate(&facilitator.uri()));

    let response = app.oneshot(paid_request("definitely not a payment")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid-format");

    assert!(facilitator.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn facilitator_outage_rolls_back_the_nonce() {
    let facilitator = MockServer::start().await;
    // first call fails, the service then recovers
    Mock::given(http_method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .mount(&facilitator)
        .await;
    Mock::given(http_method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"transactionHash": "0xdeadbeef"})),
        )
        .mount(&facilitator)
        .await;

    let gate = facilitator_gate(&facilitator.uri());
    let app = protected_app(&gate);

    let header = signed_payment_header().await;
    let outage = app.clone().oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(outage.status(), StatusCode::BAD_GATEWAY);
    let body = body_json(outage).await;
    assert_eq!(body["error"], "facilitator-unavailable");

    // the identical signature succeeds after the outage, proving rollback
    let retried = app.oneshot(paid_request(&header)).await.unwrap();
    assert_eq!(retried.status(), StatusCode::OK);
}

#[tokio::test]
async fn the_payment_driver_satisfies_the_gate_end_to_end() {
    let facilitator = settling_facilitator("0xdeadbeef").await;
    let app = protected_app(&facilitator_gate(&facilitator.uri()));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let driver = PaymentDriver::new().with_signer(Erc3009Signer::new(wallet()));
    let tracker = driver.tracker();
    let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
        .with(driver)
        .build();

    let response = client
        .post(format!("http://{addr}/analyze"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["sentiment"], "positive");

    let settlement = tracker.last().unwrap();
    assert_eq!(settlement.transaction_hash, "0xdeadbeef");
    assert_eq!(settlement.network, "base-sepolia");
}

// -- legacy transaction-hash mode ------------------------------------------

const TX: &str = "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const TRANSFER_TOPIC: &str = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";
const PAYER: &str = "0x1111111111111111111111111111111111111111";

struct RpcStub {
    receipt: Value,
}

impl Respond for RpcStub {
    fn respond(&self, request: &wiremock::Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        let result = match body["method"].as_str() {
            Some("eth_getTransactionReceipt") => self.receipt.clone(),
            other => panic!("unexpected rpc method: {other:?}"),
        };
        ResponseTemplate::new(200).set_body_json(json!({
            "jsonrpc": "2.0",
            "id": body["id"],
            "result": result
        }))
    }
}

fn settlement_receipt_json(to: &str, value: u64) -> Value {
    let asset = "0x036cbd53842c5426634e7929541ec2318f3dcf7e";
    let topic = |addr: &str| format!("0x000000000000000000000000{}", &addr[2..]);
    json!({
        "transactionHash": TX,
        "transactionIndex": "0x0",
        "blockHash": format!("0x{:064x}", 2),
        "blockNumber": "0x10",
        "from": PAYER,
        "to": asset,
        "contractAddress": null,
        "gasUsed": "0x5208",
        "cumulativeGasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "logsBloom": format!("0x{}", "0".repeat(512)),
        "type": "0x2",
        "status": "0x1",
        "logs": [{
            "address": asset,
            "topics": [TRANSFER_TOPIC, topic(PAYER), topic(to)],
            "data": format!("0x{value:064x}"),
            "blockNumber": "0x10",
            "blockHash": format!("0x{:064x}", 2),
            "transactionHash": TX,
            "transactionIndex": "0x0",
            "logIndex": "0x0",
            "removed": false
        }]
    })
}

async fn chain_mode_app(receipt: Value) -> (Router, MockServer) {
    let rpc = MockServer::start().await;
    Mock::given(http_method("POST"))
        .respond_with(RpcStub { receipt })
        .mount(&rpc)
        .await;
    let backend = ChainBackend::new(rpc.uri().parse().unwrap());
    let gate = PaymentGate::new(ValidatorPipeline::new(vec![Arc::new(backend)]));
    let app = Router::new()
        .route("/analyze", post(analyze))
        .layer(
            gate.for_method(payment_method())
                .with_mode(PaymentMode::TransactionHash),
        );
    (app, rpc)
}

#[tokio::test]
async fn bare_hash_mode_verifies_on_chain() {
    let (app, _rpc) = chain_mode_app(settlement_receipt_json(RECIPIENT, 100_000)).await;

    let response = app.oneshot(paid_request(TX)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["payment"]["transactionHash"], TX);
    assert_eq!(body["payment"]["status"], "confirmed");
}

#[tokio::test]
async fn bare_hash_mode_rejects_transfers_to_other_recipients() {
    let other = "0x2222222222222222222222222222222222222222";
    let (app, _rpc) = chain_mode_app(settlement_receipt_json(other, 100_000)).await;

    let response = app.oneshot(paid_request(TX)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "amount-mismatch");
}

#[tokio::test]
async fn bare_hash_replay_is_rejected() {
    let (app, _rpc) = chain_mode_app(settlement_receipt_json(RECIPIENT, 100_000)).await;

    let first = app.clone().oneshot(paid_request(TX)).await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    // identical hash, different case: still the same replay key
    let second = app.oneshot(paid_request(&TX.to_uppercase().replace("0X", "0x"))).await.unwrap();
    assert_eq!(second.status(), StatusCode::BAD_REQUEST);
    let body = body_json(second).await;
    assert_eq!(body["error"], "replay");
}
