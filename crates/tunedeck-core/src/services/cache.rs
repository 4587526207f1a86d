//! TTL response cache
//!
//! Caches prior upstream responses keyed by normalized request parameters,
//! so equivalent queries (any parameter order) collide on the same entry.
//! Expiry is checked lazily on every read — an expired entry reads as absent
//! and is evicted on the spot — and a background sweeper bounds memory
//! growth from keys that are never read again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::UpstreamError;

// ============================================================================
// Constants
// ============================================================================

/// Default entry lifetime (search results stay fresh for 10 minutes)
pub const DEFAULT_TTL: Duration = Duration::from_secs(600);

/// Default background sweep interval
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// ============================================================================
// Configuration
// ============================================================================

/// Response cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Lifetime applied when `set_default` / `cached_fetch` omit a TTL
    pub default_ttl: Duration,
    /// Interval for the background expiry sweep
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl CacheConfig {
    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            default_ttl: self.default_ttl.max(Duration::from_millis(100)),
            sweep_interval: self.sweep_interval.max(Duration::from_secs(1)),
        }
    }
}

// ============================================================================
// Cache Keys
// ============================================================================

/// Deterministic cache key for a video-search query
///
/// Parameters are sorted by name so equivalent queries in different
/// parameter order collide in the cache.
pub fn search_cache_key(params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort();
    let joined: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("search:{}", joined.join("&"))
}

/// Deterministic cache key for an arbitrary GET request
pub fn fetch_cache_key(url: &str, params: &[(&str, &str)]) -> String {
    let mut sorted: Vec<(&str, &str)> = params.to_vec();
    sorted.sort();
    let joined: Vec<String> = sorted.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("fetch:{}?{}", url, joined.join("&"))
}

// ============================================================================
// Cache
// ============================================================================

/// One cached response
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    /// An entry is valid iff `now - stored_at <= ttl`
    fn is_valid(&self) -> bool {
        self.stored_at.elapsed() <= self.ttl
    }
}

/// TTL-keyed cache of upstream responses
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    config: CacheConfig,
    client: reqwest::Client,
}

impl ResponseCache {
    /// Create a cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            config: config.validate(),
            client: reqwest::Client::new(),
        }
    }

    /// Look up a key; expired entries read as absent and are evicted
    pub async fn get(&self, key: &str) -> Option<Value> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if entry.is_valid() => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        // Expired: evict as a side effect of the read.
        self.entries.write().await.remove(key);
        log::debug!("[cache] evicted expired entry {}", key);
        None
    }

    /// Typed lookup, deserializing the cached JSON
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        serde_json::from_value(value).ok()
    }

    /// Store a value under `key` for `ttl`
    pub async fn set(&self, key: impl Into<String>, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            stored_at: Instant::now(),
            ttl,
        };
        self.entries.write().await.insert(key.into(), entry);
    }

    /// Store a value with the configured default TTL
    pub async fn set_default(&self, key: impl Into<String>, value: Value) {
        self.set(key, value, self.config.default_ttl).await;
    }

    /// Whether a currently-valid entry exists for `key`
    pub async fn has(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    /// Remove one entry
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }

    /// Remove everything
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of stored entries, including not-yet-swept expired ones
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the cache holds no entries at all
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Fetch `url` through the cache
    ///
    /// On a hit the cached JSON is returned with no network call. On a miss
    /// the request is performed, a non-success status is classified into an
    /// [`UpstreamError`], and the parsed body is stored before being
    /// returned.
    pub async fn cached_fetch(
        &self,
        url: &str,
        params: &[(&str, &str)],
        cache_key: Option<String>,
        ttl: Option<Duration>,
    ) -> Result<Value, UpstreamError> {
        let key = cache_key.unwrap_or_else(|| fetch_cache_key(url, params));
        if let Some(hit) = self.get(&key).await {
            log::debug!("[cache] hit {}", key);
            return Ok(hit);
        }

        log::debug!("[cache] miss {}, fetching {}", key, url);
        let response = self.client.get(url).query(params).send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(UpstreamError::from_response(status, &body));
        }

        let value: Value = serde_json::from_str(&body)?;
        self.set(&key, value.clone(), ttl.unwrap_or(self.config.default_ttl))
            .await;
        Ok(value)
    }

    /// Start the background expiry sweep
    ///
    /// The task holds only a weak reference and exits once the cache's
    /// entries are dropped; abort the handle to stop it earlier.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        let interval = self.config.sweep_interval;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                let Some(entries) = entries.upgrade() else {
                    return;
                };
                let mut entries = entries.write().await;
                let before = entries.len();
                entries.retain(|_, entry| entry.is_valid());
                let swept = before - entries.len();
                if swept > 0 {
                    log::debug!("[cache] sweep removed {} expired entries", swept);
                }
            }
        })
    }
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

// ============================================================================
// Tests
// ============================================================================
