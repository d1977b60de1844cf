mod common;

use std::sync::{Arc, Mutex};

use axum::{
    Router,
    body::Bytes,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use chrono::Duration;
use serde_json::{Value, json};

use common::{TestApp, delete, eventually, get, json};
use domain_diagnostics_server::services::{schedule_service, webhook_service};

#[tokio::test]
async fn bulk_job_runs_to_completion() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/advanced/bulk",
            &key,
            json!({ "domains": ["a.com", "A.com", "fail.b.com"], "type": "dns" }),
        ))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["data"]["total"], 2);
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v2/advanced/bulk/{id}");

    let app_ref = &app;
    let key_ref = key.as_str();
    let uri_ref = uri.as_str();
    eventually(|| async move {
        let (_, _, body) = app_ref.send(get(uri_ref, Some(key_ref))).await;
        body["data"]["status"] == "completed"
    })
    .await;

    let (_, _, body) = app.send(get(uri_ref, Some(&key))).await;
    assert!(body["data"].get("results").is_none());
    assert_eq!(body["data"]["processed"], 2);
    assert_eq!(body["data"]["failed"], 1);

    let (_, _, body) = app
        .send(get(&format!("{uri}?results"), Some(&key)))
        .await;
    assert_eq!(body["data"]["results"]["a.com"]["kind"], "dns");
    assert!(body["data"]["results"]["fail.b.com"]["error"].is_string());

    let (status, _, _) = app.send(delete(&uri, &key)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn bulk_jobs_are_private_and_validated() {
    let app = TestApp::new();
    let (_, alice) = app.active_key().await;
    let (_, bob) = app.active_key().await;

    let (status, _, _) = app
        .send(json("POST", "/api/v2/advanced/bulk", &alice, json!({ "domains": [] })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .send(json(
            "POST",
            "/api/v2/advanced/bulk",
            &alice,
            json!({ "domains": ["ok.com", "bad domain"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, _, body) = app
        .send(json("POST", "/api/v2/advanced/bulk", &alice, json!({ "domains": ["ok.com"] })))
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(get(&format!("/api/v2/advanced/bulk/{id}"), Some(&bob)))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_endpoints_crud() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;
    let (_, other) = app.active_key().await;

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/advanced/webhooks",
            &key,
            json!({ "url": "http://example.com/hook" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/advanced/webhooks",
            &key,
            json!({ "url": "https://example.com/hook", "events": ["bulk.completed"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["secret"].as_str().unwrap().len(), 64);
    assert_eq!(body["data"]["events"], json!(["bulk.completed"]));
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, _, body) = app.send(get("/api/v2/advanced/webhooks", Some(&key))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert!(body["data"][0].get("secret").is_none());

    let (status, _, body) = app
        .send(json(
            "PUT",
            &format!("/api/v2/advanced/webhooks/{id}"),
            &key,
            json!({ "events": ["scan.completed", "schedule.completed"], "is_active": false }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    let (status, _, _) = app
        .send(json(
            "PUT",
            &format!("/api/v2/advanced/webhooks/{id}"),
            &other,
            json!({ "is_active": true }),
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app.send(get("/api/v2/advanced/webhooks/logs", Some(&key))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app
        .send(delete(&format!("/api/v2/advanced/webhooks/{id}"), &key))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], id);

    let (status, _, _) = app
        .send(delete(&format!("/api/v2/advanced/webhooks/{id}"), &key))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

type Received = Arc<Mutex<Vec<(HeaderMap, Bytes)>>>;

async fn spawn_receiver() -> (String, Received) {
    let received: Received = Arc::default();
    let sink = received.clone();
    let receiver = Router::new().route(
        "/hook",
        post(move |headers: HeaderMap, body: Bytes| {
            let sink = sink.clone();
            async move {
                sink.lock().unwrap().push((headers, body));
                "ok"
            }
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, receiver).await.unwrap();
    });

    (format!("http://127.0.0.1:{}/hook", addr.port()), received)
}

#[tokio::test]
async fn test_event_is_signed_and_logged() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;
    let (url, received) = spawn_receiver().await;

    let (_, _, body) = app
        .send(json("POST", "/api/v2/advanced/webhooks", &key, json!({ "url": url })))
        .await;
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let secret = body["data"]["secret"].as_str().unwrap().to_string();

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/advanced/webhooks/test",
            &key,
            json!({ "webhook_id": id }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["event"], "webhook.test");
    assert_eq!(body["data"]["success"], true);
    assert_eq!(body["data"]["response_status"], 200);

    let (headers, payload) = received.lock().unwrap().pop().unwrap();
    let payload = std::str::from_utf8(&payload).unwrap();
    assert_eq!(
        headers["x-webhook-signature"],
        webhook_service::generate_signature(&secret, payload).as_str()
    );
    assert_eq!(headers["x-webhook-event"], "webhook.test");
    let decoded: Value = serde_json::from_str(payload).unwrap();
    assert_eq!(decoded["event_type"], "webhook.test");

    let (status, _, body) = app
        .send(get(&format!("/api/v2/advanced/webhooks/logs?webhook_id={id}"), Some(&key)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn fresh_scans_notify_subscribed_webhooks() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;
    let (url, received) = spawn_receiver().await;

    app.send(json(
        "POST",
        "/api/v2/advanced/webhooks",
        &key,
        json!({ "url": url, "events": ["scan.completed"] }),
    ))
    .await;

    app.send(get("/api/v2/complete?domain=example.com", Some(&key))).await;

    let received_ref = &received;
    eventually(|| async move { !received_ref.lock().unwrap().is_empty() }).await;

    let (headers, _) = received.lock().unwrap()[0].clone();
    assert_eq!(headers["x-webhook-event"], "scan.completed");
}

#[tokio::test]
async fn schedules_run_when_due() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;
    let (_, other) = app.active_key().await;

    let (status, _, _) = app
        .send(json(
            "POST",
            "/api/v2/advanced/schedules",
            &key,
            json!({ "name": "nightly", "domains": ["a.com"], "frequency": "fortnightly" }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/advanced/schedules",
            &key,
            json!({ "name": "nightly", "domains": ["A.com", "fail.b.com"], "frequency": "daily" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["scan_type"], "complete");
    assert_eq!(body["data"]["domains"], json!(["a.com", "fail.b.com"]));
    let id = body["data"]["id"].as_str().unwrap().to_string();
    let uri = format!("/api/v2/advanced/schedules/{id}");

    let (status, _, _) = app.send(get(&uri, Some(&other))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    assert_eq!(schedule_service::run_due(&app.state).await.unwrap(), 0);

    app.clock.advance(Duration::days(1));
    assert_eq!(schedule_service::run_due(&app.state).await.unwrap(), 1);
    assert_eq!(schedule_service::run_due(&app.state).await.unwrap(), 0);

    let (_, _, body) = app.send(get(&format!("{uri}?results"), Some(&key))).await;
    let executions = body["data"].as_array().unwrap();
    assert_eq!(executions.len(), 1);
    assert_eq!(executions[0]["status"], "completed");
    assert!(executions[0]["results"]["fail.b.com"]["error"].is_string());

    let (_, _, body) = app.send(get(&uri, Some(&key))).await;
    assert!(body["data"]["last_run_at"].is_string());

    let (status, _, body) = app
        .send(json("PUT", &uri, &key, json!({ "is_active": false })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["is_active"], false);

    app.clock.advance(Duration::days(2));
    assert_eq!(schedule_service::run_due(&app.state).await.unwrap(), 0);

    let (status, _, _) = app.send(delete(&uri, &key)).await;
    assert_eq!(status, StatusCode::OK);
    let (_, _, body) = app.send(get("/api/v2/advanced/schedules", Some(&key))).await;
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn screenshots_validate_and_need_a_renderer() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, _) = app
        .send(get("/api/v2/advanced/screenshots?domain=example.com&width=100", Some(&key)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = app
        .send(get("/api/v2/advanced/screenshots/responsive", Some(&key)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app
        .send(get("/api/v2/advanced/screenshots?domain=example.com", Some(&key)))
        .await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "upstream_failure");
}

#[tokio::test]
async fn competitive_needs_two_domains() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, _) = app
        .send(json(
            "POST",
            "/api/v2/advanced/competitive",
            &key,
            json!({ "domains": ["only.com"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/advanced/competitive",
            &key,
            json!({ "domains": ["expired.rival.com", "Good.com"] }),
        ))
        .await;
    assert_eq!(status, StatusCode::OK);

    let domains = body["data"]["domains"].as_object().unwrap();
    assert_eq!(domains.len(), 2);
    assert!(domains["good.com"]["summary"]["score"].as_u64().unwrap() > 0);
    assert_eq!(body["data"]["comparison"]["best"], "good.com");
}
