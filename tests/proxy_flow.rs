//! End-to-end capture, forward and correlate behavior.

use reqwest::Method;
use serde_json::json;
use std::time::Duration;

use honeypot_proxy::store::RequestId;

mod common;

#[tokio::test]
async fn test_successful_call_is_captured_and_relayed() {
    let upstream = common::start_programmable_upstream(|_| async {
        tokio::time::sleep(Duration::from_millis(40)).await;
        (200, r#"{"name":"a"}"#.to_string())
    })
    .await;
    let proxy = common::start_proxy(&upstream.url(), |_| {}).await;

    let reply = proxy
        .client()
        .proxy(Method::GET, "/user-profile", None)
        .await
        .unwrap();

    assert_eq!(reply.status, 200);
    assert_eq!(reply.data, Some(json!({"name": "a"})));
    assert!(reply.error.is_none());

    let entry = proxy
        .store
        .get(RequestId(reply.request_id))
        .await
        .unwrap()
        .expect("request captured");
    assert_eq!(entry.request.endpoint, "/user-profile");
    assert_eq!(entry.request.http_method, "GET");
    assert_eq!(entry.request.ip_address, "127.0.0.1");
    assert_eq!(entry.request.payload, None);

    let response = entry.response.expect("response correlated");
    assert_eq!(response.request_id, entry.request.id);
    assert_eq!(response.response_status, 200);
    assert_eq!(response.response_payload, r#"{"name":"a"}"#);
    assert!(response.response_time >= 40, "took {}ms", response.response_time);
    assert!(response.response_time < 2_000);
    assert!(response.created_at >= entry.request.created_at);

    let received = upstream.received();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].path, "/user/profile");
}

#[tokio::test]
async fn test_unreachable_upstream_records_synthetic_500() {
    let proxy = common::start_proxy(&common::dead_upstream_url().await, |_| {}).await;

    let reply = proxy
        .client()
        .proxy(Method::POST, "/orders-create", Some(&json!({"qty": 1})))
        .await
        .unwrap();

    assert_eq!(reply.status, 500);
    assert_eq!(
        reply.error.as_deref(),
        Some("Error forwarding request to real system")
    );
    assert!(reply.message.is_some());

    let entry = proxy
        .store
        .get(RequestId(reply.request_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.request.endpoint, "/orders-create");
    assert_eq!(entry.request.http_method, "POST");
    assert_eq!(entry.request.payload.as_deref(), Some(r#"{"qty":1}"#));

    let response = entry.response.unwrap();
    assert_eq!(response.response_status, 500);
    let payload: serde_json::Value = serde_json::from_str(&response.response_payload).unwrap();
    assert!(payload.get("error").is_some());
    assert_eq!(payload["kind"], "connect");

    let stats = proxy.store.stats().await.unwrap();
    assert_eq!((stats.total_requests, stats.total_responses), (1, 1));
}

#[tokio::test]
async fn test_upstream_error_status_is_relayed() {
    let upstream = common::start_mock_upstream(404, r#"{"error":"no such order"}"#).await;
    let proxy = common::start_proxy(&upstream.url(), |_| {}).await;

    let resp = reqwest::get(format!("{}/api/orders-42", proxy.url()))
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::NOT_FOUND);

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], 404);
    assert_eq!(body["data"], json!({"error": "no such order"}));

    let id = body["requestId"].as_i64().unwrap();
    let entry = proxy.store.get(RequestId(id)).await.unwrap().unwrap();
    assert_eq!(entry.response.unwrap().response_status, 404);
}

#[tokio::test]
async fn test_path_translation_and_query_string() {
    let upstream = common::start_echo_upstream().await;
    let proxy = common::start_proxy(&upstream.url(), |_| {}).await;
    let client = proxy.client();

    let reply = client.proxy(Method::GET, "/foo-bar/baz", None).await.unwrap();
    assert_eq!(reply.data.unwrap()["path"], "/foo/bar/baz");

    let reply = client
        .proxy(Method::GET, "/search-items?q=a-b", None)
        .await
        .unwrap();
    assert_eq!(reply.data.unwrap()["path"], "/search/items?q=a-b");

    let entry = proxy
        .store
        .get(RequestId(reply.request_id))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.request.endpoint, "/search-items?q=a-b");
}

#[tokio::test]
async fn test_bare_prefix_maps_to_root() {
    let upstream = common::start_echo_upstream().await;
    let proxy = common::start_proxy(&upstream.url(), |_| {}).await;

    let resp = reqwest::get(format!("{}/api", proxy.url())).await.unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["data"]["path"], "/");
}

#[tokio::test]
async fn test_content_and_host_headers_are_not_copied() {
    let upstream = common::start_echo_upstream().await;
    let proxy = common::start_proxy(&upstream.url(), |_| {}).await;

    let resp = reqwest::Client::new()
        .put(format!("{}/api/profile-update", proxy.url()))
        .header("content-type", "text/plain")
        .header("content-language", "fr")
        .header("x-attacker-tool", "sqlmap")
        .header("connection", "keep-alive")
        .body(r#"{"bio":"hi"}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let received = upstream.received();
    assert_eq!(received.len(), 1);
    let seen = &received[0];
    assert_eq!(seen.method, "PUT");
    assert_eq!(seen.body, r#"{"bio":"hi"}"#);
    assert_eq!(seen.header("x-attacker-tool"), Some("sqlmap"));
    assert_eq!(seen.header("content-language"), None);
    assert_eq!(
        seen.header("content-type"),
        Some("application/json; charset=utf-8")
    );
    assert_eq!(seen.header("host"), Some(upstream.addr.to_string().as_str()));

    // The captured copy keeps everything the attacker sent.
    let page = proxy
        .store
        .query(&honeypot_proxy::store::AuditQuery {
            page: 1,
            page_size: 10,
            ..Default::default()
        })
        .await
        .unwrap();
    let headers: serde_json::Value =
        serde_json::from_str(&page.entries[0].request.headers).unwrap();
    assert_eq!(headers["content-language"], "fr");
    assert_eq!(headers["x-attacker-tool"], "sqlmap");
}
