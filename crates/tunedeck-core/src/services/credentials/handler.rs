//! Quota error handler
//!
//! Watches the request queue's failures; when the metered video API reports
//! quota exhaustion, rotates the credential pool so the queue's next retry
//! runs with a fresh key. The handler never retries anything itself —
//! retries stay the queue's responsibility, this only repairs the credential
//! the next attempt will use.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::pool::CredentialPool;
use super::types::RotationEvent;
use crate::error::{PoolError, UpstreamError};
use crate::services::queue::FailureObserver;

/// Rotates credentials in response to quota-exhaustion failures
pub struct QuotaErrorHandler {
    pool: Arc<CredentialPool>,
    /// Only failures from this service trigger rotation
    metered_service: String,
    /// Set when rotation found nothing to rotate to
    exhausted: AtomicBool,
    last_event: Mutex<Option<RotationEvent>>,
}

impl QuotaErrorHandler {
    /// Create a handler rotating `pool` on quota failures from
    /// `metered_service`
    pub fn new(pool: Arc<CredentialPool>, metered_service: impl Into<String>) -> Self {
        Self {
            pool,
            metered_service: metered_service.into(),
            exhausted: AtomicBool::new(false),
            last_event: Mutex::new(None),
        }
    }

    /// Whether the pool ran dry and the operator must supply a new key
    ///
    /// Distinguishes "retry later" from "stop and ask the user"; cleared by
    /// the next successful rotation.
    pub fn needs_configuration(&self) -> bool {
        self.exhausted.load(Ordering::SeqCst)
    }

    /// The most recent rotation this handler performed
    pub fn last_event(&self) -> Option<RotationEvent> {
        match self.last_event.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn record_event(&self, event: Option<RotationEvent>) {
        let mut guard = match self.last_event.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = event;
    }
}

#[async_trait]
impl FailureObserver for QuotaErrorHandler {
    async fn on_failure(&self, service: &str, error: &UpstreamError) {
        if service != self.metered_service || !error.is_quota() {
            return;
        }

        match self.pool.rotate("quota exhausted").await {
            Ok(event) => {
                self.exhausted.store(false, Ordering::SeqCst);
                if event.changed() {
                    log::info!(
                        "[credentials] quota failure on {} triggered rotation to {}",
                        service,
                        super::types::Credential::new(event.to_key.clone()).masked_key()
                    );
                    self.record_event(Some(event));
                }
            }
            Err(PoolError::NoCredentialAvailable) => {
                self.exhausted.store(true, Ordering::SeqCst);
                log::error!(
                    "[credentials] quota failure on {} but no credential left to rotate to",
                    service
                );
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::credentials::pool::PoolConfig;
    use crate::services::credentials::types::Credential;

    fn cred(key: &str, usage: f64) -> Credential {
        Credential::new(format!("{:0<20}", key)).with_usage(usage)
    }

    fn key(prefix: &str) -> String {
        format!("{:0<20}", prefix)
    }

    fn seeded_pool() -> Arc<CredentialPool> {
        Arc::new(CredentialPool::from_saved(
            vec![cred("a", 95.0), cred("b", 40.0), cred("c", 10.0)],
            Some(key("a")),
            vec![],
            PoolConfig::default(),
        ))
    }

    #[tokio::test]
    async fn test_quota_failure_on_metered_service_rotates() {
        let pool = seeded_pool();
        let handler = QuotaErrorHandler::new(Arc::clone(&pool), "video-api");

        handler
            .on_failure("video-api", &UpstreamError::QuotaExceeded("spent".to_string()))
            .await;

        assert_eq!(pool.active().await.unwrap().key, key("c"));
        let event = handler.last_event().unwrap();
        assert_eq!(event.from_key, Some(key("a")));
        assert_eq!(event.to_key, key("c"));
        assert_eq!(event.reason, "quota exhausted");
        assert!(!handler.needs_configuration());
    }

    #[tokio::test]
    async fn test_other_services_and_errors_are_ignored() {
        let pool = seeded_pool();
        let handler = QuotaErrorHandler::new(Arc::clone(&pool), "video-api");

        // Wrong service
        handler
            .on_failure("scraper", &UpstreamError::QuotaExceeded("spent".to_string()))
            .await;
        // Right service, non-quota error
        handler
            .on_failure("video-api", &UpstreamError::Network("down".to_string()))
            .await;

        assert_eq!(pool.active().await.unwrap().key, key("a"));
        assert!(pool.history().await.is_empty());
        assert!(handler.last_event().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_pool_flags_configuration_needed() {
        let pool = Arc::new(CredentialPool::from_saved(
            vec![cred("a", 95.0)],
            Some(key("a")),
            vec![],
            PoolConfig::default(),
        ));
        let handler = QuotaErrorHandler::new(Arc::clone(&pool), "video-api");

        handler
            .on_failure("video-api", &UpstreamError::QuotaExceeded("spent".to_string()))
            .await;

        assert!(handler.needs_configuration());
        assert!(pool.active().await.is_none());
    }

    #[tokio::test]
    async fn test_flag_clears_after_successful_rotation() {
        let pool = Arc::new(CredentialPool::from_saved(
            vec![cred("a", 95.0)],
            Some(key("a")),
            vec![],
            PoolConfig::default(),
        ));
        let handler = QuotaErrorHandler::new(Arc::clone(&pool), "video-api");

        handler
            .on_failure("video-api", &UpstreamError::QuotaExceeded("spent".to_string()))
            .await;
        assert!(handler.needs_configuration());

        // Operator adds a fresh key; the next quota failure rotates to it.
        pool.upsert(cred("fresh", 0.0)).await;
        handler
            .on_failure("video-api", &UpstreamError::QuotaExceeded("spent".to_string()))
            .await;
        assert!(!handler.needs_configuration());
        assert_eq!(pool.active().await.unwrap().key, key("fresh"));
    }
}
