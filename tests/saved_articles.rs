//! Saved-article CRUD with optimistic concurrency.

use reqwest::header::{ETAG, IF_MATCH, LOCATION};
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

#[tokio::test]
async fn test_if_match_guards_updates() {
    let upstream = common::start_mock_backend("{}").await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;
    let client = common::client();
    let base = format!("http://{addr}/api/saved");

    let created = client
        .post(&base)
        .json(&json!({
            "url": "https://www.nytimes.com/2024/01/01/world/story.html",
            "title": "Original",
            "tags": ["World", "world"]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(created.status(), StatusCode::CREATED);
    let location = created.headers()[LOCATION].to_str().unwrap().to_string();
    let first_etag = created.headers()[ETAG].to_str().unwrap().to_string();
    let article: Value = created.json().await.unwrap();
    assert_eq!(article["tags"], json!(["world"]));
    assert_eq!(location, format!("/api/saved/{}", article["id"].as_str().unwrap()));
    let item_url = format!("http://{addr}{location}");

    let fetched = client.get(&item_url).send().await.unwrap();
    assert_eq!(fetched.headers()[ETAG], first_etag.as_str());

    // Warm the list cache.
    let list = client.get(&base).send().await.unwrap();
    assert_eq!(list.headers()["x-cache-status"], "MISS");
    let list = client.get(&base).send().await.unwrap();
    assert_eq!(list.headers()["x-cache-status"], "HIT");

    let updated = client
        .patch(&item_url)
        .header(IF_MATCH, &first_etag)
        .json(&json!({ "title": "Revised" }))
        .send()
        .await
        .unwrap();
    assert_eq!(updated.status(), StatusCode::OK);
    let second_etag = updated.headers()[ETAG].to_str().unwrap().to_string();
    assert_ne!(second_etag, first_etag);
    let body: Value = updated.json().await.unwrap();
    assert_eq!(body["version"], 2);

    let stale = client
        .patch(&item_url)
        .header(IF_MATCH, &first_etag)
        .json(&json!({ "title": "Lost update" }))
        .send()
        .await
        .unwrap();
    assert_eq!(stale.status(), StatusCode::PRECONDITION_FAILED);
    let problem: Value = stale.json().await.unwrap();
    assert_eq!(problem["currentEtag"], second_etag.as_str());
    assert_eq!(problem["providedEtag"], first_etag.as_str());

    // The mutation purged the list entry.
    let list = client.get(&base).send().await.unwrap();
    assert_eq!(list.headers()["x-cache-status"], "MISS");
    let list: Value = list.json().await.unwrap();
    assert_eq!(list["count"], 1);
    assert_eq!(list["items"][0]["title"], "Revised");

    let deleted = client
        .delete(&item_url)
        .header(IF_MATCH, &second_etag)
        .send()
        .await
        .unwrap();
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);
    let gone = client.get(&item_url).send().await.unwrap();
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    shutdown.trigger();
}

#[tokio::test]
async fn test_invalid_bodies_rejected() {
    let upstream = common::start_mock_backend("{}").await;
    let (addr, shutdown) = common::start_gateway(common::test_config(upstream.addr)).await;
    let client = common::client();
    let base = format!("http://{addr}/api/saved");

    let bad_url = client
        .post(&base)
        .json(&json!({ "url": "ftp://example.com/x", "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(bad_url.status(), StatusCode::BAD_REQUEST);

    let not_json = client
        .post(&base)
        .header("content-type", "application/json")
        .body("{")
        .send()
        .await
        .unwrap();
    assert_eq!(not_json.status(), StatusCode::BAD_REQUEST);

    let missing = client
        .patch(format!("{base}/does-not-exist"))
        .json(&json!({ "title": "x" }))
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    shutdown.trigger();
}

#[tokio::test]
async fn test_oversized_body_rejected() {
    let upstream = common::start_mock_backend("{}").await;
    let mut config = common::test_config(upstream.addr);
    config.security.max_body_size = 64;
    let (addr, shutdown) = common::start_gateway(config).await;

    let res = common::client()
        .post(format!("http://{addr}/api/saved"))
        .json(&json!({
            "url": "https://www.nytimes.com/2024/01/01/world/story.html",
            "title": "x".repeat(128)
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::PAYLOAD_TOO_LARGE);

    shutdown.trigger();
}
