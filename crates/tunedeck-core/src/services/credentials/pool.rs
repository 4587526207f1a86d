//! Credential pool
//!
//! Tracks the set of available API keys for the metered video service,
//! selects the best usable one, and rotates away from keys whose quota is
//! running out. The pool exclusively owns the active-credential pointer and
//! the rotation history; callers interact by method call only.

use std::collections::VecDeque;

use tokio::sync::RwLock;

use super::probe::QuotaProbe;
use super::types::{Credential, RotationEvent};
use crate::error::PoolError;

// ============================================================================
// Constants
// ============================================================================

/// Usage percentage at which the active credential is rotated away from
pub const DEFAULT_ROTATE_THRESHOLD: f64 = 90.0;

/// Rotation events retained for the admin console
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

// ============================================================================
// Configuration
// ============================================================================

/// Credential pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Keep the active credential while its usage stays below this
    pub rotate_threshold: f64,
    /// Bounded rotation history length (newest first)
    pub history_limit: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            rotate_threshold: DEFAULT_ROTATE_THRESHOLD,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl PoolConfig {
    /// Validate and normalize the configuration
    pub fn validate(&self) -> Self {
        Self {
            rotate_threshold: self.rotate_threshold.clamp(1.0, 100.0),
            history_limit: self.history_limit.max(1),
        }
    }
}

// ============================================================================
// Pool
// ============================================================================

struct PoolState {
    credentials: Vec<Credential>,
    active_key: Option<String>,
    history: VecDeque<RotationEvent>,
}

/// Pool of credentials for the metered video API
///
/// One instance per process; the active credential is always a member of the
/// known set or explicitly unset (a terminal state requiring operator
/// intervention).
pub struct CredentialPool {
    state: RwLock<PoolState>,
    config: PoolConfig,
}

impl CredentialPool {
    /// Create a pool with no active credential and empty history
    pub fn new(credentials: Vec<Credential>, config: PoolConfig) -> Self {
        Self {
            state: RwLock::new(PoolState {
                credentials,
                active_key: None,
                history: VecDeque::new(),
            }),
            config: config.validate(),
        }
    }

    /// Restore a pool persisted across restarts
    ///
    /// The saved active key is honored only when it is still a member of the
    /// credential set; history beyond the configured limit is dropped.
    pub fn from_saved(
        credentials: Vec<Credential>,
        active_key: Option<String>,
        history: Vec<RotationEvent>,
        config: PoolConfig,
    ) -> Self {
        let config = config.validate();
        let active_key =
            active_key.filter(|key| credentials.iter().any(|cred| &cred.key == key));
        let mut bounded: VecDeque<RotationEvent> = history.into_iter().collect();
        bounded.truncate(config.history_limit);
        Self {
            state: RwLock::new(PoolState {
                credentials,
                active_key,
                history: bounded,
            }),
            config,
        }
    }

    /// Pick the best usable credential without changing any state
    ///
    /// The current active credential is kept while its usage stays below the
    /// rotate threshold; otherwise the valid-looking credential with the
    /// lowest usage wins. `None` means nothing is usable and the operator
    /// must supply a key.
    pub async fn select_active(&self) -> Option<Credential> {
        let state = self.state.read().await;
        Self::select(&state, self.config.rotate_threshold)
    }

    fn select(state: &PoolState, threshold: f64) -> Option<Credential> {
        if let Some(active_key) = &state.active_key {
            if let Some(active) = state.credentials.iter().find(|c| &c.key == active_key) {
                if active.looks_valid() && active.quota_used_percent < threshold {
                    return Some(active.clone());
                }
            }
        }
        state
            .credentials
            .iter()
            .filter(|cred| cred.looks_valid() && cred.quota_used_percent < threshold)
            .min_by(|a, b| a.quota_used_percent.total_cmp(&b.quota_used_percent))
            .cloned()
    }

    /// Switch the active credential to the best usable one
    ///
    /// When the selection equals the current active credential the call is a
    /// no-op: the returned event has `from_key == to_key` and nothing is
    /// appended to history. When nothing is usable the active pointer is
    /// cleared and [`PoolError::NoCredentialAvailable`] is returned.
    pub async fn rotate(&self, reason: impl Into<String>) -> Result<RotationEvent, PoolError> {
        let reason = reason.into();
        let mut state = self.state.write().await;
        let Some(selected) = Self::select(&state, self.config.rotate_threshold) else {
            log::error!("[credentials] rotation found no usable credential ({})", reason);
            state.active_key = None;
            return Err(PoolError::NoCredentialAvailable);
        };

        let previous = state.active_key.clone();
        let event = RotationEvent::new(previous.clone(), selected.key.clone(), reason);
        if !event.changed() {
            log::debug!(
                "[credentials] rotation is a no-op, staying on {}",
                selected.masked_key()
            );
            return Ok(event);
        }

        log::info!(
            "[credentials] rotated {} -> {} ({})",
            previous
                .map(|key| Credential::new(key).masked_key())
                .unwrap_or_else(|| "none".to_string()),
            selected.masked_key(),
            event.reason
        );
        state.active_key = Some(selected.key.clone());
        state.history.push_front(event.clone());
        state.history.truncate(self.config.history_limit);
        Ok(event)
    }

    /// The currently active credential, if one is selected
    pub async fn active(&self) -> Option<Credential> {
        let state = self.state.read().await;
        let key = state.active_key.as_ref()?;
        state.credentials.iter().find(|c| &c.key == key).cloned()
    }

    /// Snapshot of every known credential
    pub async fn credentials(&self) -> Vec<Credential> {
        self.state.read().await.credentials.clone()
    }

    /// Rotation history, newest first
    pub async fn history(&self) -> Vec<RotationEvent> {
        self.state.read().await.history.iter().cloned().collect()
    }

    /// Add a credential, or replace an existing one with the same key
    pub async fn upsert(&self, credential: Credential) {
        let mut state = self.state.write().await;
        match state
            .credentials
            .iter_mut()
            .find(|c| c.key == credential.key)
        {
            Some(existing) => *existing = credential,
            None => state.credentials.push(credential),
        }
    }

    /// Remove a credential; clears the active pointer if it was active
    pub async fn remove(&self, key: &str) -> bool {
        let mut state = self.state.write().await;
        let before = state.credentials.len();
        state.credentials.retain(|c| c.key != key);
        if state.active_key.as_deref() == Some(key) {
            state.active_key = None;
        }
        state.credentials.len() != before
    }

    /// Record an observed usage percentage for one credential
    ///
    /// Returns false when the key is not in the pool.
    pub async fn set_usage(&self, key: &str, percent: f64) -> bool {
        let mut state = self.state.write().await;
        match state.credentials.iter_mut().find(|c| c.key == key) {
            Some(cred) => {
                cred.quota_used_percent = percent.clamp(0.0, 100.0);
                true
            }
            None => false,
        }
    }

    /// Refresh every credential's usage through the probe
    ///
    /// A probe that reports nothing records 0 % (preferred); a probe error
    /// keeps the stale value and is only logged.
    pub async fn refresh_usage(&self, probe: &dyn QuotaProbe) {
        let credentials = self.credentials().await;
        for cred in credentials {
            match probe.fetch_used_percent(&cred).await {
                Ok(Some(percent)) => {
                    self.set_usage(&cred.key, percent).await;
                }
                Ok(None) => {
                    self.set_usage(&cred.key, 0.0).await;
                }
                Err(err) => {
                    log::warn!(
                        "[credentials] usage probe failed for {}: {}",
                        cred.masked_key(),
                        err
                    );
                }
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
