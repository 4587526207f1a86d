//! Request queue types
//!
//! Priorities, dedup keys, configuration, and the observer seam through
//! which failures are reported before the retry decision.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::UpstreamError;

// ============================================================================
// Priority
// ============================================================================

/// Dispatch priority of a queued request
///
/// `High` beats `Normal` beats `Low`; ties preserve arrival order. Retried
/// requests are downgraded to `Low` so a failing request never blocks
/// healthy traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Normal,
    Low,
}

impl Priority {
    /// Sort rank, lowest dispatches first
    pub(crate) fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Normal => 1,
            Priority::Low => 2,
        }
    }
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Normal
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Normal => write!(f, "normal"),
            Priority::Low => write!(f, "low"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Priority::High),
            "normal" => Ok(Priority::Normal),
            "low" => Ok(Priority::Low),
            _ => Err(format!("Unknown priority: {}", s)),
        }
    }
}

// ============================================================================
// Dedup Keys
// ============================================================================

/// Rebuild a JSON value with recursively sorted object keys
///
/// Keeps the dedup key independent of parameter order and of `serde_json`'s
/// map-ordering feature flags.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(inner) = map.get(key) {
                    sorted.insert(key.clone(), canonicalize(inner));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Deterministic identity of one logical request
///
/// Two enqueue calls with the same kind and equivalent parameters (any
/// parameter order) produce the same key and therefore the same logical
/// request.
pub fn dedup_key(kind: &str, params: &Value) -> String {
    format!("{}:{}", kind, canonicalize(params))
}

// ============================================================================
// Configuration
// ============================================================================

/// Retry policy for the request queue
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Base backoff delay; attempt n waits `base_delay * 2^(n-1)`
    pub base_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl QueueConfig {
    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            max_retries: self.max_retries,
            base_delay: self.base_delay.max(Duration::from_millis(10)),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Read-only queue introspection for observability panels
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStatus {
    /// Items waiting for dispatch
    pub queue_length: usize,
    /// Items in flight or waiting out a retry backoff
    pub active_requests: usize,
    /// Whether the drain loop is currently running
    pub processing: bool,
}

// ============================================================================
// Failure Observer
// ============================================================================

/// Hook shown every failed attempt before the queue decides whether to retry
///
/// The observer must not retry the request itself; it may repair ambient
/// state (rotate a credential) so the queue's next attempt succeeds.
#[async_trait]
pub trait FailureObserver: Send + Sync {
    async fn on_failure(&self, service: &str, error: &UpstreamError);
}

// ============================================================================
// Tests
// ============================================================================
