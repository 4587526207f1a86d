//! Integration tests for the queue / limiter / credential-pool interplay

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use tunedeck_core::{
    Credential, CredentialPool, FailureObserver, PoolConfig, Priority, QueueConfig, QueueError,
    QuotaErrorHandler,
    RateLimitConfig, RateLimiter, RequestQueue, UpstreamError, WindowConfig, SERVICE_VIDEO_API,
};

/// A limiter generous enough to never interfere
fn open_limiter() -> Arc<RateLimiter> {
    Arc::new(RateLimiter::new(RateLimitConfig::uniform(
        WindowConfig::new(1000, Duration::from_secs(60)),
    )))
}

/// Pad a short test key out to something `looks_valid` accepts
fn key(prefix: &str) -> String {
    format!("{:0<20}", prefix)
}

fn cred(prefix: &str, usage: f64) -> Credential {
    Credential::new(key(prefix)).with_usage(usage)
}

// ============================================================================
// Quota Rotation End-to-End
// ============================================================================

/// Three credentials at 95/40/10 percent, active on the exhausted one. A
/// search against the metered API fails with a quota error; the handler must
/// rotate to the lowest-usage key and the queue's second attempt must run
/// with it.
#[tokio::test(start_paused = true)]
async fn test_quota_failure_rotates_and_retry_uses_new_credential() {
    let pool = Arc::new(CredentialPool::from_saved(
        vec![cred("a", 95.0), cred("b", 40.0), cred("c", 10.0)],
        Some(key("a")),
        vec![],
        PoolConfig::default(),
    ));
    let handler = Arc::new(QuotaErrorHandler::new(Arc::clone(&pool), SERVICE_VIDEO_API));
    let queue = RequestQueue::new(open_limiter(), QueueConfig::default())
        .with_observer(Arc::clone(&handler) as Arc<dyn FailureObserver>);

    let attempts = Arc::new(AtomicU32::new(0));
    let keys_used = Arc::new(Mutex::new(Vec::new()));

    let pool_in = Arc::clone(&pool);
    let attempts_in = Arc::clone(&attempts);
    let keys_in = Arc::clone(&keys_used);
    let result: Result<String, QueueError> = queue
        .enqueue(
            "search",
            SERVICE_VIDEO_API,
            &json!({"q": "abba"}),
            Priority::Normal,
            move || {
                let pool = Arc::clone(&pool_in);
                let attempts = Arc::clone(&attempts_in);
                let keys_used = Arc::clone(&keys_in);
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    let active = pool
                        .active()
                        .await
                        .map(|c| c.key)
                        .unwrap_or_else(|| "none".to_string());
                    keys_used.lock().unwrap().push(active.clone());
                    if active == key("a") {
                        // The metered API rejects the exhausted key.
                        Err(UpstreamError::classify("403: quotaExceeded for this key"))
                    } else {
                        Ok(format!("results via {}", active))
                    }
                }
            },
        )
        .await;

    // Attempt 1 failed on A, attempt 2 succeeded on the rotated key.
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
    let used = keys_used.lock().unwrap().clone();
    assert_eq!(used, vec![key("a"), key("c")]);
    assert_eq!(result.unwrap(), format!("results via {}", key("c")));

    // Exactly one rotation event, A -> C, with the quota reason.
    let history = pool.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_key, Some(key("a")));
    assert_eq!(history[0].to_key, key("c"));
    assert_eq!(history[0].reason, "quota exhausted");
    assert!(!handler.needs_configuration());
}

/// When every key is exhausted the handler flags that the operator must act,
/// and the caller still receives the original quota error.
#[tokio::test(start_paused = true)]
async fn test_quota_failure_with_dry_pool_surfaces_distinctly() {
    let pool = Arc::new(CredentialPool::from_saved(
        vec![cred("a", 95.0), cred("b", 99.0)],
        Some(key("a")),
        vec![],
        PoolConfig::default(),
    ));
    let handler = Arc::new(QuotaErrorHandler::new(Arc::clone(&pool), SERVICE_VIDEO_API));
    let queue = RequestQueue::new(open_limiter(), QueueConfig::default())
        .with_observer(Arc::clone(&handler) as Arc<dyn FailureObserver>);

    let result: Result<(), QueueError> = queue
        .enqueue(
            "search",
            SERVICE_VIDEO_API,
            &json!({"q": "abba"}),
            Priority::Normal,
            || async { Err(UpstreamError::classify("daily quota exceeded")) },
        )
        .await;

    assert!(matches!(
        result,
        Err(QueueError::Upstream(UpstreamError::QuotaExceeded(_)))
    ));
    // Distinct signal: stop and ask the user, rather than retry forever.
    assert!(handler.needs_configuration());
    assert!(pool.active().await.is_none());
}

// ============================================================================
// Queue + Limiter Interplay
// ============================================================================

/// A tight per-service window defers dispatch but loses nothing: all items
/// complete, in priority order, spread across window rollovers.
#[tokio::test(start_paused = true)]
async fn test_tight_window_defers_but_completes_everything() {
    let limiter = Arc::new(RateLimiter::new(RateLimitConfig::uniform(
        WindowConfig::new(2, Duration::from_millis(500)),
    )));
    let queue = RequestQueue::new(Arc::clone(&limiter), QueueConfig::default());
    let completed = Arc::new(AtomicU32::new(0));

    let mut futures = Vec::new();
    for n in 0..5u32 {
        let completed = Arc::clone(&completed);
        futures.push(queue.enqueue(
            "load",
            "playlist",
            &json!({"n": n}),
            Priority::Normal,
            move || {
                let completed = Arc::clone(&completed);
                async move {
                    completed.fetch_add(1, Ordering::SeqCst);
                    Ok(n)
                }
            },
        ));
    }

    let started = tokio::time::Instant::now();
    for fut in futures {
        assert!(fut.await.is_ok());
    }
    assert_eq!(completed.load(Ordering::SeqCst), 5);
    // Five dispatches at two per 500ms window need at least two rollovers.
    assert!(started.elapsed() >= Duration::from_millis(1000));
}

/// Deduplication spans the retry/backoff gap: while a failing item waits out
/// its backoff it still holds its dedup key.
#[tokio::test(start_paused = true)]
async fn test_dedup_key_held_across_backoff() {
    let queue = RequestQueue::new(open_limiter(), QueueConfig::default());

    let first = queue.enqueue(
        "search",
        "scraper",
        &json!({"q": "abba"}),
        Priority::Normal,
        || async { Err::<(), _>(UpstreamError::Network("down".to_string())) },
    );
    let handle = tokio::spawn(first);

    // Give the first attempt time to fail and enter backoff.
    tokio::time::sleep(Duration::from_millis(200)).await;

    let second: Result<(), QueueError> = queue
        .enqueue(
            "search",
            "scraper",
            &json!({"q": "abba"}),
            Priority::Normal,
            || async { Ok(()) },
        )
        .await;
    assert!(matches!(second, Err(QueueError::DuplicateInProgress(_))));

    // The original eventually exhausts its retries with the original error.
    let first = handle.await.expect("queue task panicked");
    assert!(matches!(
        first,
        Err(QueueError::Upstream(UpstreamError::Network(_)))
    ));
}
