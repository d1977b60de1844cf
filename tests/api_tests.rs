mod common;

use axum::{body::Body, http::StatusCode};
use chrono::Duration;
use serde_json::json;

use common::{TestApp, delete, eventually, get, json, request};
use domain_diagnostics_server::models::api_key::{KeyStatus, UserStatus};

#[tokio::test]
async fn health_needs_no_key() {
    let app = TestApp::new();

    let (status, _, body) = app.send(get("/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["database"], "connected");
}

#[tokio::test]
async fn test_auth_failures() {
    let app = TestApp::new();

    let (status, _, body) = app.send(get("/api/v2/dns?domain=example.com", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "unauthorized");

    let (status, _, _) = app
        .send(get("/api/v2/dns?domain=example.com", Some("dk_not_a_real_key")))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let user = app.user(UserStatus::Active).await;
    let expired = app
        .key_for(&user, None, Some(common::start_time() - Duration::minutes(1)))
        .await;
    let (status, _, body) = app
        .send(get("/api/v2/dns?domain=example.com", Some(&expired)))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "API key has expired");

    let suspended = app.user(UserStatus::Suspended).await;
    let key = app.key_for(&suspended, None, None).await;
    let (status, _, body) = app.send(get("/api/v2/dns?domain=example.com", Some(&key))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    let issued = app.issue_key(&user, None, None).await;
    let (status, _, _) = app.send(get("/api/v2/domains", Some(&issued.secret))).await;
    assert_eq!(status, StatusCode::OK);

    let credentials = &app.state.stores.credentials;
    assert!(credentials.set_key_status(issued.key.id, KeyStatus::Revoked).await.unwrap());
    let (status, _, body) = app.send(get("/api/v2/domains", Some(&issued.secret))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["message"], "Invalid API key");

    let other = app.issue_key(&user, None, None).await;
    assert!(credentials.set_user_status(user.id, UserStatus::Suspended).await.unwrap());
    let (status, _, body) = app.send(get("/api/v2/domains", Some(&other.secret))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "forbidden");

    assert_eq!(app.provider_calls(), 0);
}

#[tokio::test]
async fn spellings_of_one_domain_share_a_cache_entry() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, body) = app.send(get("/api/v2/dns?domain=Example.COM", Some(&key))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["from_cache"], false);
    assert_eq!(body["data"]["domain"], "example.com");

    for spelling in [
        "https%3A%2F%2Fexample.com%2Fsome%2Fpath",
        "example.com.",
        "%20EXAMPLE.com%20",
        "http%3A%2F%2Fexample.com%3A8080",
    ] {
        let uri = format!("/api/v2/dns?domain={spelling}");
        let (status, _, body) = app.send(get(&uri, Some(&key))).await;
        assert_eq!(status, StatusCode::OK, "{spelling}");
        assert_eq!(body["from_cache"], true, "{spelling}");
    }

    assert_eq!(app.provider_calls(), 1);
}

#[tokio::test]
async fn domain_parameter_is_validated() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, body) = app.send(get("/api/v2/whois", Some(&key))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, _, _) = app
        .send(get("/api/v2/ssl?domain=not_a_domain", Some(&key)))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(app.provider_calls(), 0);
}

#[tokio::test]
async fn cache_entries_expire_after_their_ttl() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;
    let uri = "/api/v2/dns?domain=example.com";

    let (_, _, body) = app.send(get(uri, Some(&key))).await;
    assert_eq!(body["from_cache"], false);

    app.clock.advance(Duration::seconds(3_599));
    let (_, _, body) = app.send(get(uri, Some(&key))).await;
    assert_eq!(body["from_cache"], true);

    app.clock.advance(Duration::seconds(1));
    let (_, _, body) = app.send(get(uri, Some(&key))).await;
    assert_eq!(body["from_cache"], false);

    assert_eq!(app.provider_calls(), 2);
}

#[tokio::test]
async fn failed_lookups_are_not_cached() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    for _ in 0..2 {
        let (status, _, body) = app
            .send(get("/api/v2/blacklist?domain=fail.example.com", Some(&key)))
            .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "upstream_failure");
    }

    assert_eq!(app.provider_calls(), 2);
}

#[tokio::test]
async fn complete_scan_reports_execution_time() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, body) = app.send(get("/api/v2/scan?domain=example.com", Some(&key))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["execution_time_ms"].is_i64());

    let (_, _, body) = app
        .send(get("/api/v2/complete?domain=example.com", Some(&key)))
        .await;
    assert_eq!(body["from_cache"], true);
}

#[tokio::test]
async fn rate_limit_resets_in_the_next_hour() {
    let app = TestApp::new();
    let user = app.user(UserStatus::Active).await;
    let key = app.key_for(&user, Some(3), None).await;

    for remaining in ["2", "1", "0"] {
        let (status, headers, _) = app.send(get("/api/v2/domains", Some(&key))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(headers["x-ratelimit-limit"], "3");
        assert_eq!(headers["x-ratelimit-remaining"], remaining);
    }

    let (status, headers, body) = app.send(get("/api/v2/domains", Some(&key))).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "rate_limited");
    assert_eq!(headers["x-ratelimit-remaining"], "0");

    let reset: i64 = headers["x-ratelimit-reset"].to_str().unwrap().parse().unwrap();
    let expected_reset = (common::start_time() + Duration::minutes(45)).timestamp();
    assert_eq!(reset, expected_reset);

    app.clock.advance(Duration::hours(1));
    let (status, headers, _) = app.send(get("/api/v2/domains", Some(&key))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-ratelimit-remaining"], "2");
}

#[tokio::test]
async fn concurrent_requests_admit_exactly_the_ceiling() {
    let app = TestApp::new();
    let user = app.user(UserStatus::Active).await;
    let key = app.key_for(&user, Some(5), None).await;

    let responses = futures::future::join_all(
        (0..20).map(|_| app.send(get("/api/v2/domains", Some(&key)))),
    )
    .await;

    let admitted = responses
        .iter()
        .filter(|(status, _, _)| *status == StatusCode::OK)
        .count();
    let rejected = responses
        .iter()
        .filter(|(status, _, _)| *status == StatusCode::TOO_MANY_REQUESTS)
        .count();

    assert_eq!(admitted, 5);
    assert_eq!(rejected, 15);
}

#[tokio::test]
async fn bulk_rejects_oversized_lists_before_any_lookup() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let domains: Vec<String> = (0..51).map(|i| format!("site{i}.com")).collect();
    let (status, _, body) = app
        .send(json("POST", "/api/v2/bulk", &key, json!({ "domains": domains, "type": "dns" })))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(app.provider_calls(), 0);
}

#[tokio::test]
async fn bulk_inlines_per_domain_failures() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/bulk",
            &key,
            json!({ "domains": ["good.com", "fail.example.com", "not a domain"], "type": "whois" }),
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["good.com"]["kind"], "whois");
    assert!(body["data"]["fail.example.com"]["error"].is_string());
    assert!(body["data"]["not a domain"]["error"].is_string());
}

#[tokio::test]
async fn bulk_of_fifty_with_one_failure() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let mut domains: Vec<String> = (1..50).map(|n| format!("site{n}.com")).collect();
    domains.push("fail.example.com".to_string());
    assert_eq!(domains.len(), 50);

    let (status, _, body) = app
        .send(json("POST", "/api/v2/bulk", &key, json!({ "domains": domains, "type": "dns" })))
        .await;
    assert_eq!(status, StatusCode::OK);

    let results = body["data"].as_object().unwrap();
    assert_eq!(results.len(), 50);
    let failures: Vec<_> = results
        .iter()
        .filter(|(_, entry)| entry.get("error").is_some())
        .map(|(domain, _)| domain.as_str())
        .collect();
    assert_eq!(failures, ["fail.example.com"]);
    assert_eq!(body["data"]["site49.com"]["kind"], "dns");
    assert_eq!(app.provider_calls(), 50);
}

#[tokio::test]
async fn bulk_rejects_complete_type_and_bad_json() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, _) = app
        .send(json("POST", "/api/v2/bulk", &key, json!({ "domains": ["a.com"], "type": "complete" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let malformed = axum::http::Request::builder()
        .method("POST")
        .uri("/api/v2/bulk")
        .header("Content-Type", "application/json")
        .header("X-API-Key", &key)
        .body(Body::from("{\"domains\": [\"a.com\""))
        .unwrap();
    let (status, _, body) = app.send(malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn history_lists_lookups_newest_first() {
    let app = TestApp::new();
    let (user, key) = app.active_key().await;

    app.send(get("/api/v2/dns?domain=one.com", Some(&key))).await;
    app.clock.advance(Duration::seconds(5));
    app.send(get("/api/v2/dns?domain=two.com", Some(&key))).await;

    let history = app.state.stores.history.clone();
    eventually(|| {
        let history = history.clone();
        async move {
            let query = domain_diagnostics_server::models::analysis::HistoryQuery {
                user_id: user.id,
                domain: None,
                limit: 10,
                offset: 0,
            };
            history.list(&query).await.map(|(_, total)| total == 2).unwrap_or(false)
        }
    })
    .await;

    let (status, _, body) = app
        .send(get("/api/v2/history?limit=1", Some(&key)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["domain"], "two.com");
    assert_eq!(body["pagination"]["total"], 2);
    assert_eq!(body["pagination"]["has_more"], true);

    let (_, _, body) = app
        .send(get("/api/v2/history?domain=one.com", Some(&key)))
        .await;
    assert_eq!(body["pagination"]["total"], 1);
}

#[tokio::test]
async fn history_accepts_the_largest_offset() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, body) = app
        .send(get("/api/v2/history?offset=9223372036854775807", Some(&key)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 0);
    assert_eq!(body["pagination"]["has_more"], false);
    assert_eq!(body["pagination"]["offset"], i64::MAX);
}

#[tokio::test]
async fn usage_counts_cached_requests() {
    let app = TestApp::new();
    let (user, key) = app.active_key().await;

    app.send(get("/api/v2/dns?domain=example.com", Some(&key))).await;
    app.send(get("/api/v2/dns?domain=example.com", Some(&key))).await;

    let usage = app.state.stores.usage.clone();
    let since = common::start_time() - Duration::days(1);
    eventually(|| {
        let usage = usage.clone();
        async move {
            usage
                .summary(user.id, since)
                .await
                .map(|s| s.total_requests == 2)
                .unwrap_or(false)
        }
    })
    .await;

    let (status, _, body) = app.send(get("/api/v2/usage", Some(&key))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total_requests"], 2);
    assert_eq!(body["data"]["cached_requests"], 1);
    assert_eq!(body["data"]["period_days"], 30);
}

#[tokio::test]
async fn saved_domains_are_scoped_to_their_owner() {
    let app = TestApp::new();
    let (_, alice) = app.active_key().await;
    let (_, bob) = app.active_key().await;

    let (status, _, body) = app
        .send(json(
            "POST",
            "/api/v2/domains",
            &alice,
            json!({ "domain": "HTTPS://Example.com/", "label": "main site" }),
        ))
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["domain"], "example.com");
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (status, _, _) = app
        .send(json("POST", "/api/v2/domains", &alice, json!({ "domain": "example.com" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, _, body) = app.send(get("/api/v2/domains", Some(&bob))).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 0);

    let (status, _, body) = app.send(delete(&format!("/api/v2/domains/{id}"), &bob)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _, body) = app
        .send(delete(&format!("/api/v2/domains?id={id}"), &alice))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["deleted"], id);

    let (status, _, _) = app.send(delete(&format!("/api/v2/domains/{id}"), &alice)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _, _) = app.send(delete("/api/v2/domains/not-a-uuid", &alice)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_routes_are_json_errors_after_auth() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, _) = app.send(get("/api/v2/nothing-here", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app.send(get("/api/v2/nothing-here", Some(&key))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, headers, body) = app
        .send(request("POST", "/api/v2/dns", Some(&key), Body::empty()))
        .await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body["error"]["code"], "method_not_allowed");
    assert!(headers.contains_key("x-ratelimit-limit"));
}

#[tokio::test]
async fn options_short_circuits_before_auth() {
    let app = TestApp::new();

    let (status, _, body) = app
        .send(request("OPTIONS", "/api/v2/dns", None, Body::empty()))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.is_null());
}

#[tokio::test]
async fn query_string_key_only_works_on_advanced_routes() {
    let app = TestApp::new();
    let (_, key) = app.active_key().await;

    let (status, _, _) = app
        .send(get(&format!("/api/v2/domains?api_key={key}"), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, body) = app
        .send(get(&format!("/api/v2/advanced/schedules?api_key={key}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));
}

#[tokio::test]
async fn query_string_key_can_be_disabled() {
    let config = domain_diagnostics_server::config::Config {
        advanced_allow_query_key: false,
        ..Default::default()
    };
    let app = TestApp::with_config(config);
    let (_, key) = app.active_key().await;

    let (status, _, _) = app
        .send(get(&format!("/api/v2/advanced/schedules?api_key={key}"), None))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}
