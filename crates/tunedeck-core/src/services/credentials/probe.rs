//! Quota probe trait
//!
//! The pool learns each credential's quota usage through an out-of-band
//! side channel (a cheap usage-check call against the metered API). The
//! probe is fallible and may simply not know; the pool tolerates both.

use async_trait::async_trait;
use thiserror::Error;

use super::types::Credential;

// ============================================================================
// Error Types
// ============================================================================

/// Errors from a quota usage probe
#[derive(Error, Debug)]
pub enum ProbeError {
    /// Network request failed
    #[error("network error: {0}")]
    Network(String),

    /// The probed credential was rejected
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Probe response could not be parsed
    #[error("parse error: {0}")]
    Parse(String),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            ProbeError::Network(err.to_string())
        } else if err.is_status() {
            match err.status() {
                Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                    ProbeError::Unauthorized(format!("HTTP {}", status))
                }
                _ => ProbeError::Other(err.to_string()),
            }
        } else {
            ProbeError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProbeError {
    fn from(err: serde_json::Error) -> Self {
        ProbeError::Parse(err.to_string())
    }
}

// ============================================================================
// Probe Trait
// ============================================================================

/// Out-of-band quota usage probe for one credential
///
/// Implementations typically issue a minimal usage-check request against the
/// metered API and read the consumed-quota figure from the response.
///
/// Return values:
/// - `Ok(Some(percent))` — usage observed (0–100)
/// - `Ok(None)` — the provider reports nothing for this credential; the
///   pool records 0 % (preferred)
/// - `Err(_)` — the probe failed; the pool keeps the stale value
#[async_trait]
pub trait QuotaProbe: Send + Sync {
    async fn fetch_used_percent(&self, credential: &Credential) -> Result<Option<f64>, ProbeError>;
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        assert_eq!(
            ProbeError::Network("timed out".to_string()).to_string(),
            "network error: timed out"
        );
        assert_eq!(
            ProbeError::Unauthorized("HTTP 403".to_string()).to_string(),
            "unauthorized: HTTP 403"
        );
    }

    #[test]
    fn test_probe_error_from_serde() {
        let json_err = serde_json::from_str::<serde_json::Value>("nope").unwrap_err();
        let err: ProbeError = json_err.into();
        assert!(matches!(err, ProbeError::Parse(_)));
    }
}
