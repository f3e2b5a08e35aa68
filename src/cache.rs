//! Read-through response cache for the HTTP API.
//!
//! Grid and episode responses are recomputed from the full outage history,
//! which changes only when the watch loop commits a snapshot. Entries are
//! held as serialized JSON and expire after `server.cache_ttl_secs`.
//!
//! Keys carry the endpoint name and every parameter that shapes the
//! response, e.g. `grid:45.446892:-75.790369:15`.

use std::future::Future;
use std::time::Duration;

use moka::future::Cache;
use serde::{de::DeserializeOwned, Serialize};

use crate::config::ServerConfig;

#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub json: String,
    pub cached_at: chrono::DateTime<chrono::Utc>,
}

pub type ResponseCache = Cache<String, CachedEntry>;

pub fn new_cache(config: &ServerConfig) -> ResponseCache {
    Cache::builder()
        .max_capacity(config.cache_capacity)
        .time_to_live(Duration::from_secs(config.cache_ttl_secs))
        .build()
}

/// Return the cached value for `key`, or compute, cache, and return it.
/// Errors are never cached.
pub async fn get_or_compute<T, E, F, Fut>(cache: &ResponseCache, key: &str, compute: F) -> Result<T, E>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if let Some(entry) = cache.get(key).await {
        match serde_json::from_str(&entry.json) {
            Ok(value) => {
                tracing::debug!(key = %key, cached_at = %entry.cached_at, "cache hit");
                return Ok(value);
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to deserialize cached entry");
            }
        }
    }

    tracing::debug!(key = %key, "cache miss, computing");
    let value = compute().await?;

    match serde_json::to_string(&value) {
        Ok(json) => {
            let entry = CachedEntry {
                json,
                cached_at: chrono::Utc::now(),
            };
            cache.insert(key.to_string(), entry).await;
        }
        Err(e) => tracing::warn!(key = %key, error = %e, "failed to serialize for cache"),
    }

    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_second_call_is_served_from_cache() {
        let cache = new_cache(&ServerConfig::default());
        let calls = AtomicUsize::new(0);

        for _ in 0..2 {
            let value: Result<Vec<i64>, String> = get_or_compute(&cache, "timestamps", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(vec![1, 2, 3])
            })
            .await;
            assert_eq!(value.unwrap(), vec![1, 2, 3]);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = new_cache(&ServerConfig::default());
        let failed: Result<i64, String> =
            get_or_compute(&cache, "k", || async { Err("boom".to_string()) }).await;
        assert!(failed.is_err());
        let ok: Result<i64, String> = get_or_compute(&cache, "k", || async { Ok(7) }).await;
        assert_eq!(ok.unwrap(), 7);
    }
}
