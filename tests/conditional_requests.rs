//! Cache hits, ETags and 304s on the news read path.

use reqwest::header::{CACHE_CONTROL, CONTENT_TYPE, ETAG, IF_NONE_MATCH};
use reqwest::StatusCode;
use serde_json::Value;

mod common;

const TOP_STORIES: &str = r#"{"status":"OK","section":"world","num_results":1,"results":[{"title":"Headline"}]}"#;

#[tokio::test]
async fn test_miss_then_hit_then_not_modified() {
    let upstream = common::start_mock_backend(TOP_STORIES).await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;
    let client = common::client();
    let url = format!("http://{addr}/api/top-stories/world");

    let first = client.get(&url).send().await.unwrap();
    assert_eq!(first.status(), StatusCode::OK);
    assert_eq!(first.headers()["x-cache-status"], "MISS");
    assert_eq!(
        first.headers()[CACHE_CONTROL],
        "public, max-age=60, s-maxage=300, stale-while-revalidate=600"
    );
    let etag = first.headers()[ETAG].to_str().unwrap().to_string();
    let body: Value = first.json().await.unwrap();
    assert_eq!(body["results"][0]["title"], "Headline");

    let second = client.get(&url).send().await.unwrap();
    assert_eq!(second.status(), StatusCode::OK);
    assert_eq!(second.headers()["x-cache-status"], "HIT");
    assert_eq!(second.headers()[ETAG], etag.as_str());

    let revalidated = client
        .get(&url)
        .header(IF_NONE_MATCH, &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(revalidated.status(), StatusCode::NOT_MODIFIED);
    assert_eq!(revalidated.headers()[ETAG], etag.as_str());
    assert!(revalidated.bytes().await.unwrap().is_empty());

    assert_eq!(upstream.hits(), 1);
    shutdown.trigger();
}

#[tokio::test]
async fn test_distinct_params_use_distinct_entries() {
    let upstream = common::start_mock_backend(r#"{"status":"OK","response":{"docs":[]}}"#).await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;
    let client = common::client();

    for query in ["q=election&page=1", "page=1&q=election", "q=election&page=2"] {
        let res = client
            .get(format!("http://{addr}/api/articles/search?{query}"))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    // Parameter order does not change the key.
    assert_eq!(upstream.hits(), 2);
    shutdown.trigger();
}

#[tokio::test]
async fn test_invalid_params_are_problem_documents() {
    let upstream = common::start_mock_backend(TOP_STORIES).await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;
    let client = common::client();

    let res = client
        .get(format!("http://{addr}/api/top-stories/not-a-section"))
        .header("x-correlation-id", "corr-123")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()[CONTENT_TYPE], "application/problem+json");
    assert_eq!(res.headers()["x-correlation-id"], "corr-123");

    let problem: Value = res.json().await.unwrap();
    assert_eq!(problem["type"], "/problems/bad-request");
    assert_eq!(problem["status"], 400);
    assert_eq!(problem["instance"], "/api/top-stories/not-a-section");
    assert_eq!(problem["correlationId"], "corr-123");

    let archive = client
        .get(format!("http://{addr}/api/archive/1700/1"))
        .send()
        .await
        .unwrap();
    assert_eq!(archive.status(), StatusCode::BAD_REQUEST);

    assert_eq!(upstream.hits(), 0);
    shutdown.trigger();
}

#[tokio::test]
async fn test_correlation_id_generated_when_absent() {
    let upstream = common::start_mock_backend(TOP_STORIES).await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;

    let res = common::client()
        .get(format!("http://{addr}/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let id = res.headers()["x-correlation-id"].to_str().unwrap().to_string();
    assert!(uuid::Uuid::parse_str(&id).is_ok());
    assert_eq!(res.headers()["x-content-type-options"], "nosniff");

    let health: Value = res.json().await.unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["cacheBackend"], "memory");
    shutdown.trigger();
}

#[tokio::test]
async fn test_business_error_is_bad_gateway_and_not_cached() {
    let upstream = common::start_programmable_backend(|| async {
        (404, r#"{"fault":"no such list"}"#.to_string())
    })
    .await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;
    let client = common::client();
    let url = format!("http://{addr}/api/books/hardcover-fiction");

    for _ in 0..2 {
        let res = client.get(&url).send().await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    }
    assert_eq!(upstream.hits(), 2);

    let breaker: Value = client
        .get(format!("http://{addr}/admin/breakers/external"))
        .bearer_auth(common::ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(breaker["state"], "closed");
    shutdown.trigger();
}
