//! Unified error handling for tunedeck-core
//!
//! Upstream failures are classified into a tagged variant exactly once, at
//! the boundary where the raw error is first observed. Everything downstream
//! (retry vs. rotate vs. fail) switches on the variant, never on message
//! text.

use thiserror::Error;

// ============================================================================
// Upstream Errors
// ============================================================================

/// Failure reported by an external search/playlist backend
///
/// The scraper backend has no structured error contract, so raw messages and
/// HTTP statuses are mapped into these variants by [`UpstreamError::classify`]
/// and the `From` impls below. No other code inspects message strings.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpstreamError {
    /// The active credential's quota is exhausted
    #[error("quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The upstream service itself asked us to slow down
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    /// Network-level failure (timeout, connection refused, DNS)
    #[error("network error: {0}")]
    Network(String),

    /// Credentials rejected by the upstream service
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Upstream returned a non-success HTTP status
    #[error("API error: HTTP {0}")]
    Api(u16),

    /// Response body could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Anything the classifier could not recognize
    #[error("{0}")]
    Other(String),
}

impl UpstreamError {
    /// Map a raw upstream message into a tagged variant
    ///
    /// This is the single place where message substrings are inspected.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("quota") {
            UpstreamError::QuotaExceeded(message.to_string())
        } else if lower.contains("rate limit") || lower.contains("too many requests") {
            UpstreamError::RateLimited(message.to_string())
        } else if lower.contains("network")
            || lower.contains("timeout")
            || lower.contains("connection")
        {
            UpstreamError::Network(message.to_string())
        } else {
            UpstreamError::Other(message.to_string())
        }
    }

    /// Classify an HTTP response (status plus body) from an upstream service
    ///
    /// Quota exhaustion on the metered video API arrives as a 403 whose body
    /// mentions the quota, so the body is checked before the status fallback.
    pub fn from_response(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        if lower.contains("quota") {
            return UpstreamError::QuotaExceeded(format!("HTTP {}: quota exhausted", status));
        }
        match status {
            401 | 403 => UpstreamError::Unauthorized(format!("HTTP {}", status)),
            429 => UpstreamError::RateLimited(format!("HTTP {}", status)),
            _ => UpstreamError::Api(status),
        }
    }

    /// Whether this failure indicates the active credential ran out of quota
    pub fn is_quota(&self) -> bool {
        matches!(self, UpstreamError::QuotaExceeded(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Network("request timed out".to_string())
        } else if err.is_connect() {
            UpstreamError::Network("connection failed".to_string())
        } else if err.is_status() {
            match err.status() {
                Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                    UpstreamError::Unauthorized(format!("HTTP {}", status))
                }
                Some(status) if status.as_u16() == 429 => {
                    UpstreamError::RateLimited(format!("HTTP {}", status))
                }
                Some(status) => UpstreamError::Api(status.as_u16()),
                None => UpstreamError::Network(err.to_string()),
            }
        } else if err.is_decode() {
            UpstreamError::Parse(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Parse(err.to_string())
    }
}

// ============================================================================
// Queue Errors
// ============================================================================

/// Terminal outcome delivered to an enqueued request's caller
///
/// A queue failure is local to the one request it concerns; the queue as a
/// whole never halts because an item failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// A request with an identical dedup key is already queued or in flight
    ///
    /// The original request will still complete; callers can usually swallow
    /// this one silently.
    #[error("duplicate request already in progress: {0}")]
    DuplicateInProgress(String),

    /// Retries exhausted; carries the last upstream error unwrapped
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    /// The queue was torn down before the request completed
    #[error("request dropped before completion")]
    Dropped,
}

// ============================================================================
// Credential Pool Errors
// ============================================================================

/// Errors from credential selection and rotation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// No credential has usable quota left; manual configuration is required
    ///
    /// Distinct from a transient failure so the UI can prompt for a new key
    /// instead of silently retrying forever.
    #[error("no usable credential available")]
    NoCredentialAvailable,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota() {
        let err = UpstreamError::classify("Daily quota exceeded for this key");
        assert!(matches!(err, UpstreamError::QuotaExceeded(_)));
        assert!(err.is_quota());
    }

    #[test]
    fn test_classify_rate_limit() {
        assert!(matches!(
            UpstreamError::classify("rate limit reached, slow down"),
            UpstreamError::RateLimited(_)
        ));
        assert!(matches!(
            UpstreamError::classify("Too Many Requests"),
            UpstreamError::RateLimited(_)
        ));
    }

    #[test]
    fn test_classify_network() {
        assert!(matches!(
            UpstreamError::classify("connection refused"),
            UpstreamError::Network(_)
        ));
        assert!(matches!(
            UpstreamError::classify("request timeout"),
            UpstreamError::Network(_)
        ));
    }

    #[test]
    fn test_classify_other() {
        let err = UpstreamError::classify("something odd happened");
        assert!(matches!(err, UpstreamError::Other(_)));
        assert!(!err.is_quota());
    }

    #[test]
    fn test_from_response_quota_body_wins_over_status() {
        // YouTube-style quota exhaustion: 403 with a quota message
        let err = UpstreamError::from_response(403, r#"{"error":{"reason":"quotaExceeded"}}"#);
        assert!(err.is_quota());
    }

    #[test]
    fn test_from_response_status_mapping() {
        assert!(matches!(
            UpstreamError::from_response(401, "{}"),
            UpstreamError::Unauthorized(_)
        ));
        assert!(matches!(
            UpstreamError::from_response(429, "{}"),
            UpstreamError::RateLimited(_)
        ));
        assert_eq!(UpstreamError::from_response(500, "{}"), UpstreamError::Api(500));
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: UpstreamError = json_err.into();
        assert!(matches!(err, UpstreamError::Parse(_)));
    }

    #[test]
    fn test_queue_error_preserves_upstream() {
        let upstream = UpstreamError::QuotaExceeded("used up".to_string());
        let err: QueueError = upstream.clone().into();
        assert_eq!(err, QueueError::Upstream(upstream));
        assert_eq!(err.to_string(), "quota exceeded: used up");
    }

    #[test]
    fn test_pool_error_display() {
        assert_eq!(
            PoolError::NoCredentialAvailable.to_string(),
            "no usable credential available"
        );
    }
}
