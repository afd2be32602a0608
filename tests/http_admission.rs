//! Admission behaviour through the full axum router.

use axum::body::{Body, to_bytes};
use axum::extract::ConnectInfo;
use axum::http::{Request, StatusCode, header};
use axum::Router;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceExt;

use calc_gateway::admission::AdmissionMiddleware;
use calc_gateway::build_router;
use calc_gateway::config::Policy;
use calc_gateway::state::AppState;

const KEY: &str = "A9d#4fG2kL@q";

fn app() -> Router {
    let policy = Policy::calculator().unwrap();
    build_router(Arc::new(AppState::new(AdmissionMiddleware::from_policy(policy))))
}

fn post(path: &str, key: Option<&str>, ip: [u8; 4], body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = key {
        builder = builder.header("X-API-KEY", key);
    }
    let mut request = builder.body(Body::from(body.to_string())).unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
    request
}

fn operands() -> Value {
    json!({"first_number": 8, "second_number": 2})
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Option<String>, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let retry_after = response
        .headers()
        .get(header::RETRY_AFTER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, retry_after, body)
}

#[tokio::test]
async fn home_is_open_and_unlimited() {
    let app = app();
    for _ in 0..20 {
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();
        let (status, _, body) = send(&app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");
    }
}

#[tokio::test]
async fn gated_route_requires_known_key() {
    let app = app();
    let expected = json!({"status": "error", "message": "API key missing or invalid"});

    let (status, _, body) = send(&app, post("/mul", None, [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, expected);

    let (status, _, body) =
        send(&app, post("/mul", Some("guess"), [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body, expected);

    let (status, _, body) = send(&app, post("/mul", Some(KEY), [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": 16.0}));
}

#[tokio::test]
async fn sixth_request_in_a_minute_is_limited() {
    let app = app();
    for _ in 0..5 {
        let (status, _, body) = send(&app, post("/add", None, [10, 0, 0, 1], operands())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": 10.0}));
    }

    let (status, retry_after, body) =
        send(&app, post("/add", None, [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["status"], "error");
    assert_eq!(body["message"], "Rate limit exceeded");
    let secs = body["retry_after_seconds"].as_u64().unwrap();
    assert!((1..=60).contains(&secs));
    assert_eq!(retry_after, Some(secs.to_string()));
}

#[tokio::test]
async fn origins_and_routes_have_separate_budgets() {
    let app = app();
    for _ in 0..5 {
        send(&app, post("/add", None, [10, 0, 0, 1], operands())).await;
    }
    let (status, _, _) = send(&app, post("/add", None, [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, _) = send(&app, post("/add", None, [10, 0, 0, 2], operands())).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _, _) = send(&app, post("/sub", None, [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn keyed_callers_are_limited_per_key_not_per_address() {
    let app = app();
    for i in 0..5u8 {
        let (status, _, _) = send(&app, post("/add", Some(KEY), [10, 0, 0, i], operands())).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, _, _) = send(&app, post("/add", Some(KEY), [10, 0, 0, 99], operands())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);

    let (status, _, _) = send(&app, post("/add", None, [10, 0, 0, 99], operands())).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn rejected_credentials_do_not_spend_quota() {
    let app = app();
    for _ in 0..10 {
        let (status, _, _) = send(&app, post("/div", None, [10, 0, 0, 1], operands())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
    for _ in 0..5 {
        let (status, _, body) =
            send(&app, post("/div", Some(KEY), [10, 0, 0, 1], operands())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": 4.0}));
    }
    let (status, _, _) = send(&app, post("/div", Some(KEY), [10, 0, 0, 1], operands())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn handler_input_errors_are_400() {
    let app = app();
    let ip = [10, 0, 0, 7];

    let (status, _, body) = send(
        &app,
        post("/div", Some(KEY), ip, json!({"first_number": 1, "second_number": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Division by zero is not allowed");

    let (status, _, body) = send(&app, post("/sub", None, ip, json!({"first_number": 1}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing keys: second_number");

    let (status, _, body) = send(
        &app,
        post("/sub", None, ip, json!({"first_number": "x", "second_number": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Numbers must be numeric");

    let (status, _, body) = send(&app, post("/sub", None, ip, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "JSON body is required");

    let (status, _, body) = send(&app, post("/add", None, ip, json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Missing keys: first_number, second_number");

    let (status, _, body) = send(&app, post("/add", None, ip, json!(0))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "JSON body is required");

    let mut request = Request::builder()
        .method("POST")
        .uri("/sub")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("1,2"))
        .unwrap();
    request
        .extensions_mut()
        .insert(ConnectInfo(SocketAddr::from((ip, 40000))));
    let (status, _, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Expecting JSON format");
}

#[tokio::test]
async fn metrics_are_exposed() {
    let app = app();
    send(&app, post("/add", None, [10, 0, 0, 1], operands())).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("calc_gateway_requests_total"));
    assert!(text.contains("calc_gateway_window_counters"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_burst_admits_exactly_the_budget() {
    let app = app();
    let handles: Vec<_> = (0..20)
        .map(|_| {
            let app = app.clone();
            tokio::spawn(async move {
                let request = post("/mul", Some(KEY), [10, 0, 0, 1], operands());
                app.oneshot(request).await.unwrap().status()
            })
        })
        .collect();

    let mut ok = 0;
    let mut limited = 0;
    for handle in handles {
        match handle.await.unwrap() {
            StatusCode::OK => ok += 1,
            StatusCode::TOO_MANY_REQUESTS => limited += 1,
            other => panic!("unexpected status {other}"),
        }
    }
    assert_eq!((ok, limited), (10, 10));
}
