//! Tests against a live Redis server
//!
//! Run with `REDIS_URL=redis://127.0.0.1:6379/15 cargo test -- --ignored`.
//! Every test works under its own key prefix and cleans it up afterwards.

use bincache::{CounterPair, StoreWrite, WireEntry, prelude::*, store::fields};
use bincache_redis::{RedisConfig, RedisStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

type TestResult = Result<(), Box<dyn std::error::Error>>;

async fn connect() -> Result<Arc<RedisStore>, CacheError> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379/15".to_string());
    Ok(Arc::new(RedisStore::connect(&RedisConfig::new(url)).await?))
}

async fn bin(store: &Arc<RedisStore>, prefix: &str, mode: FlushMode) -> Result<CacheBin, CacheError> {
    store.delete_by_prefix(&format!("{prefix}:")).await?;
    let config = BinConfig::new("cache")
        .with_key_prefix(prefix)
        .with_flush_mode(mode);
    CacheBin::new(config, store.clone())
}

#[tokio::test]
#[ignore = "requires a Redis server"]
async fn test_round_trip_and_ttl() -> TestResult {
    let store = connect().await?;
    let bin = bin(&store, "bincache-test-rt", FlushMode::Nothing).await?;

    bin.set("a", "plain", Expire::Permanent).await?;
    bin.set("b", json!({"n": 1}), Expire::Temporary).await?;
    bin.set_with_ttl("c", "timed", std::time::Duration::from_secs(60)).await?;

    assert_eq!(bin.get("a").await?.ok_or("a missing")?.data.as_str(), Some("plain"));
    assert_eq!(bin.get("b").await?.ok_or("b missing")?.data_as::<serde_json::Value>()?, json!({"n": 1}));

    let result = bin.get_multiple(&["a", "b", "c", "d"]).await?;
    assert_eq!(result.entries.len(), 3);
    assert_eq!(result.missing, vec!["d".to_string()]);

    store.delete_by_prefix("bincache-test-rt:").await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Redis server"]
async fn test_volatile_sweep_and_prefix_delete() -> TestResult {
    let store = connect().await?;
    let bin = bin(&store, "bincache-test-sweep", FlushMode::Temporary).await?;

    bin.set_multiple(&[
        CacheItem::new("p:1", "1", Expire::Permanent),
        CacheItem::new("p:2", "2", Expire::Temporary),
        CacheItem::new("q:1", "3", Expire::Permanent),
    ])
    .await?;

    bin.clear_args(None, false).await?;
    assert!(bin.get("p:2").await?.is_none());
    assert!(bin.get("p:1").await?.is_some());

    bin.clear_args(Some("p:"), true).await?;
    assert!(bin.get("p:1").await?.is_none());
    assert!(bin.get("q:1").await?.is_some());

    bin.clear_args(Some("*"), true).await?;
    assert!(bin.get("q:1").await?.is_none());
    // The floor record survives the bulk delete
    assert!(!bin.flush_floors().await?.permanent.is_zero());

    store.delete(":flush:bincache-test-sweep:cache").await?;
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Redis server"]
async fn test_batched_delete_over_chunk_size() -> TestResult {
    let store = connect().await?;
    let keys: Vec<String> = (0..45).map(|i| format!("bincache-test-chunks:{i}")).collect();
    let writes: Vec<StoreWrite> = keys
        .iter()
        .map(|key| StoreWrite {
            key: key.clone(),
            entry: WireEntry::new().with(fields::ID, key.clone()),
            ttl: Some(60),
        })
        .collect();

    store.set_multiple(&writes).await?;
    assert_eq!(store.get_multiple(&keys).await?.len(), 45);

    store.delete_multiple(&keys).await?;
    assert!(store.get_multiple(&keys).await?.is_empty());
    Ok(())
}

#[tokio::test]
#[ignore = "requires a Redis server"]
async fn test_counter_pair_partial_update() -> TestResult {
    let store = connect().await?;
    let key = "bincache-test-floors";
    store.delete(key).await?;

    assert_eq!(store.get_counter_pair(key).await?, CounterPair::default());

    store.set_counter_pair(key, "10.000", "10.000", false).await?;
    store.set_counter_pair(key, "ignored", "11.002", true).await?;

    let pair = store.get_counter_pair(key).await?;
    assert_eq!(pair.first.as_deref(), Some("10.000"));
    assert_eq!(pair.second.as_deref(), Some("11.002"));

    store.delete(key).await?;
    Ok(())
}
