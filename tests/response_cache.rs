mod common;
use common::{memory_logger, FailingStore, Scripted, ScriptedTransport};

use apilink::errors::ClientErrorKind;
use apilink::services::cache::{cache_key, ResponseCache};
use apilink::services::executor::{ExecutorOptions, RequestExecutor};
use apilink::services::request::{RequestDescriptor, ResponseEnvelope};
use apilink::stores::{CacheStore, FileCacheStore, MemoryCacheStore};
use reqwest::Method;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

fn cached_executor(
    transport: Arc<ScriptedTransport>,
    store: Arc<dyn CacheStore>,
) -> (RequestExecutor, ResponseCache) {
    let (logger, _) = memory_logger();
    let client = RequestExecutor::new(
        logger.clone(),
        transport,
        ExecutorOptions::new("http://api.local").with_base_path("/api/users"),
    );
    let cache = ResponseCache::new(logger, store)
        .with_prefix("users")
        .with_expire_secs(60);
    client.attach_cache(cache.clone());
    (client, cache)
}

#[tokio::test]
async fn cache_hit_skips_the_network() {
    let transport = ScriptedTransport::new();
    transport.push("/v1/user/1", Scripted::ok(json!({"id": 1, "name": "Ada"})));
    let store = MemoryCacheStore::new();
    let (client, cache) = cached_executor(transport.clone(), Arc::new(store.clone()));

    let first = client.get_cached("/v1/user/1").await.expect("first");
    let second = client.get_cached("/v1/user/1").await.expect("second");

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(first.response, second.response);
    assert_eq!(transport.count("/v1/user/1"), 1);
    assert_eq!(store.keys(), vec!["users:get:/api/users/v1/user/1".to_string()]);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(cache.stats().writes, 1);
}

#[tokio::test]
async fn writes_through_even_without_read_through() {
    let transport = ScriptedTransport::new();
    transport.always("/v1/user/2", Scripted::ok(json!({"id": 2})));
    let store = MemoryCacheStore::new();
    let (client, _) = cached_executor(transport.clone(), Arc::new(store.clone()));

    client.get("/v1/user/2").await.expect("first");
    client.get("/v1/user/2").await.expect("second");

    assert_eq!(transport.count("/v1/user/2"), 2);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn only_statuses_below_400_are_cached() {
    let transport = ScriptedTransport::new();
    transport.always("/gone", Scripted::status(404));
    transport.always("/moved", Scripted::status(302));
    let store = MemoryCacheStore::new();
    let (client, _) = cached_executor(transport.clone(), Arc::new(store.clone()));

    client.get_cached("/gone").await.expect("404");
    assert!(store.is_empty());

    client.get_cached("/moved").await.expect("302");
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn entries_expire_after_the_configured_ttl() {
    let transport = ScriptedTransport::new();
    transport.always("/v1/user/3", Scripted::ok(json!({"id": 3})));
    let (client, _) = cached_executor(transport.clone(), Arc::new(MemoryCacheStore::new()));

    client.get_cached("/v1/user/3").await.expect("prime");
    tokio::time::advance(Duration::from_secs(59)).await;
    assert!(client.get_cached("/v1/user/3").await.expect("hit").from_cache);

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!client.get_cached("/v1/user/3").await.expect("miss").from_cache);
    assert_eq!(transport.count("/v1/user/3"), 2);
}

#[tokio::test]
async fn read_errors_fall_back_to_the_network() {
    let transport = ScriptedTransport::new();
    transport.always("/v1/user/4", Scripted::ok(json!({"id": 4})));
    let store = FailingStore {
        fail_get: true,
        fail_set: false,
    };
    let (client, cache) = cached_executor(transport.clone(), Arc::new(store));

    let outcome = client.get_cached("/v1/user/4").await.expect("outcome");

    assert_eq!(outcome.status(), 200);
    assert!(!outcome.from_cache);
    assert!(outcome.cache_error.is_none());
    assert_eq!(cache.stats().errors, 1);
    assert_eq!(cache.stats().misses, 1);
}

#[tokio::test]
async fn write_failures_do_not_fail_the_call() {
    let transport = ScriptedTransport::new();
    transport.always("/v1/user/5", Scripted::ok(json!({"id": 5})));
    let store = FailingStore {
        fail_get: false,
        fail_set: true,
    };
    let (client, _) = cached_executor(transport.clone(), Arc::new(store));

    let outcome = client.get_cached("/v1/user/5").await.expect("outcome");

    assert_eq!(outcome.body()["id"], 5);
    let cache_error = outcome.cache_error.expect("cache error");
    assert_eq!(cache_error.kind, ClientErrorKind::CacheUnavailable);
}

#[tokio::test]
async fn query_order_does_not_change_the_entry() {
    let transport = ScriptedTransport::new();
    transport.always("/search", Scripted::ok(json!({"hits": 0})));
    let (client, _) = cached_executor(transport.clone(), Arc::new(MemoryCacheStore::new()));

    client
        .get_cached(RequestDescriptor::new("/search").query("q", "rust").query("page", 1))
        .await
        .expect("first");
    let second = client
        .get_cached(RequestDescriptor::new("/search").query("page", 1).query("q", "rust"))
        .await
        .expect("second");

    assert!(second.from_cache);
    assert_eq!(transport.count("/search"), 1);
}

#[test]
fn cache_keys_are_byte_identical_for_equal_queries() {
    let mut a = BTreeMap::new();
    a.insert("b".to_string(), Value::from("2"));
    a.insert("a".to_string(), Value::from("1 1"));
    let mut b = BTreeMap::new();
    b.insert("a".to_string(), Value::from("1 1"));
    b.insert("b".to_string(), Value::from("2"));

    let first = cache_key(Some("users"), &Method::GET, "/api/users/v1/list", &a);
    let second = cache_key(Some("users"), &Method::GET, "/api/users/v1/list", &b);

    assert_eq!(first.as_bytes(), second.as_bytes());
    assert_eq!(first, "users:get:/api/users/v1/list?a=1+1&b=2");
}

#[test]
fn delete_requests_are_keyed_as_del() {
    let query = BTreeMap::new();
    assert_eq!(
        cache_key(Some("users"), &Method::DELETE, "/api/users/v1/user/1", &query),
        "users:del:/api/users/v1/user/1"
    );
    assert_eq!(
        cache_key(None, &Method::PATCH, "/api/users/v1/user/1", &query),
        "patch:/api/users/v1/user/1"
    );
}

#[tokio::test]
async fn file_store_round_trips_envelopes() {
    let (logger, _) = memory_logger();
    let dir = std::env::temp_dir().join(format!("apilink-test-{}", uuid::Uuid::new_v4()));
    let store = FileCacheStore::with_dir(logger.clone(), &dir);
    let cache = ResponseCache::new(logger, Arc::new(store)).with_prefix("users");

    let mut headers = BTreeMap::new();
    headers.insert("etag".to_string(), "\"abc\"".to_string());
    let envelope = ResponseEnvelope {
        status_code: 200,
        status_message: "OK".to_string(),
        headers,
        body: json!({"id": 9, "tags": ["a", "b"]}),
    };
    let key = cache.key(&Method::GET, "/api/users/v1/user/9", &BTreeMap::new());

    cache.write(&key, &envelope).await.expect("write");
    let read = cache.read(&key).await.expect("hit");

    assert_eq!(read, envelope);
    let _ = std::fs::remove_dir_all(dir);
}
