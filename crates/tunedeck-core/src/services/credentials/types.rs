//! Credential types
//!
//! A credential is one API key for the metered video service, together with
//! its last observed quota usage. Rotation events record every switch of the
//! active credential for the admin console.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Credential
// ============================================================================

/// One API key plus its observed quota usage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    /// The key itself (opaque secret)
    pub key: String,
    /// Percentage of quota consumed (0–100), refreshed by out-of-band probing
    #[serde(default)]
    pub quota_used_percent: f64,
    /// Whether the key was supplied by the operator rather than bundled
    #[serde(default)]
    pub is_custom: bool,
}

impl Credential {
    /// Create a credential with no observed usage
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            quota_used_percent: 0.0,
            is_custom: false,
        }
    }

    /// Create an operator-supplied credential
    pub fn custom(key: impl Into<String>) -> Self {
        Self {
            is_custom: true,
            ..Self::new(key)
        }
    }

    /// Set the observed usage percentage (clamped to 0–100)
    pub fn with_usage(mut self, percent: f64) -> Self {
        self.quota_used_percent = percent.clamp(0.0, 100.0);
        self
    }

    /// Whether the key looks like a real API key rather than a placeholder
    ///
    /// Real keys are long opaque strings; anything short, empty, or with
    /// whitespace is not worth rotating to.
    pub fn looks_valid(&self) -> bool {
        let key = self.key.trim();
        !key.is_empty() && key.len() >= 16 && !key.contains(char::is_whitespace)
    }

    /// Key with all but the last four characters hidden, for logs and UI
    pub fn masked_key(&self) -> String {
        let chars: Vec<char> = self.key.chars().collect();
        if chars.len() <= 4 {
            return "****".to_string();
        }
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("…{}", tail)
    }
}

// ============================================================================
// Rotation Event
// ============================================================================

/// Record of one active-credential switch
///
/// History is observability only; correctness never depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RotationEvent {
    /// Unique identifier
    pub id: String,
    /// When the rotation happened
    pub timestamp: DateTime<Utc>,
    /// Previously active key, if any
    pub from_key: Option<String>,
    /// Newly active key
    pub to_key: String,
    /// Why the rotation happened (e.g. "quota exhausted", "manual")
    pub reason: String,
}

impl RotationEvent {
    /// Create a rotation event stamped now
    pub fn new(from_key: Option<String>, to_key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            from_key,
            to_key: to_key.into(),
            reason: reason.into(),
        }
    }

    /// Whether the rotation actually changed the active credential
    pub fn changed(&self) -> bool {
        self.from_key.as_deref() != Some(&self.to_key)
    }
}

// ============================================================================
// Tests
// ============================================================================
