//! Request queue dispatcher
//!
//! Accepts typed, prioritized work, deduplicates it, clears every dispatch
//! through the rate limiter, and retries failures with exponential backoff.
//!
//! # Architecture
//!
//! ```text
//! enqueue() ──► pending list ──► drain loop (single, non-reentrant)
//!                   ▲                 │
//!                   │            rate limiter check ── refused: front + wait
//!              backoff timer          │
//!                   ▲            executor attempt
//!                   │                 │
//!                   └── retry ◄── failure ──► FailureObserver
//!                                     │
//!                              retries exhausted ──► caller gets the
//!                                                    original error
//! ```
//!
//! Dispatch is deliberately serialized: the single drain loop is what keeps
//! the limiter's per-service admission globally consistent without any
//! cross-component coordination. Suspension points are the limiter wait, the
//! executor itself, and (on a detached timer, so healthy traffic keeps
//! flowing) the retry backoff.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::oneshot;

use super::types::{dedup_key, FailureObserver, Priority, QueueConfig, QueueStatus};
use crate::error::{QueueError, UpstreamError};
use crate::services::ratelimit::RateLimiter;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Result of one executor attempt
enum AttemptOutcome {
    /// Succeeded; the caller's result has been delivered
    Delivered,
    /// Failed; the queue decides between retry and terminal rejection
    Failed(UpstreamError),
}

/// Re-invocable executor attempt, erased over the caller's result type
type AttemptFn = Box<dyn FnMut() -> BoxFuture<AttemptOutcome> + Send>;

/// Terminal rejection path back to the caller
type RejectFn = Box<dyn FnOnce(QueueError) + Send>;

/// One pending or in-flight unit of work
///
/// Lifecycle: Pending -> Dispatching -> {Succeeded | Retrying -> Pending |
/// Failed}. The dedup key is held from enqueue until a terminal outcome.
struct WorkItem {
    key: String,
    service: String,
    priority: Priority,
    retry_count: u32,
    max_retries: u32,
    attempt: AttemptFn,
    reject: Option<RejectFn>,
}

#[derive(Default)]
struct Inner {
    pending: Vec<WorkItem>,
    /// Keys of every queued or in-flight item (dedup invariant)
    keys: HashSet<String>,
    /// Non-reentrancy guard for the drain loop
    draining: bool,
}

/// Prioritized, deduplicated, rate-limited request queue
///
/// Cheap to clone; clones share the same queue. Construct one instance per
/// process and pass it by reference (or clone) to callers — test suites
/// should build a fresh queue per test instead of sharing one.
#[derive(Clone)]
pub struct RequestQueue {
    inner: Arc<Mutex<Inner>>,
    limiter: Arc<RateLimiter>,
    observer: Option<Arc<dyn FailureObserver>>,
    config: QueueConfig,
}

impl RequestQueue {
    /// Create a queue dispatching through `limiter`
    pub fn new(limiter: Arc<RateLimiter>, config: QueueConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            limiter,
            observer: None,
            config: config.validate(),
        }
    }

    /// Attach a failure observer (e.g. the quota error handler)
    pub fn with_observer(mut self, observer: Arc<dyn FailureObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Enqueue one logical request
    ///
    /// `kind` plus the canonicalized `params` form the dedup key; while an
    /// item with that key is queued or in flight, a second call fails
    /// immediately with [`QueueError::DuplicateInProgress`] and the queue is
    /// left untouched. Registration happens synchronously at call time; the
    /// returned future resolves with the executor's result, or with the
    /// original upstream error once retries are exhausted.
    ///
    /// The executor is invoked once per attempt and must be re-invocable;
    /// timeouts are its own responsibility.
    pub fn enqueue<T, F, Fut>(
        &self,
        kind: &str,
        service: &str,
        params: &Value,
        priority: Priority,
        executor: F,
    ) -> impl Future<Output = Result<T, QueueError>> + 'static
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let registered = self.register(kind, service, params, priority, executor);
        async move {
            match registered {
                Ok(rx) => match rx.await {
                    Ok(result) => result,
                    Err(_) => Err(QueueError::Dropped),
                },
                Err(err) => Err(err),
            }
        }
    }

    /// Synchronous part of `enqueue`: dedup check, item construction, drain
    /// trigger
    fn register<T, F, Fut>(
        &self,
        kind: &str,
        service: &str,
        params: &Value,
        priority: Priority,
        executor: F,
    ) -> Result<oneshot::Receiver<Result<T, QueueError>>, QueueError>
    where
        T: Send + 'static,
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, UpstreamError>> + Send + 'static,
    {
        let key = dedup_key(kind, params);
        let (tx, rx) = oneshot::channel::<Result<T, QueueError>>();

        let mut inner = lock(&self.inner);
        if inner.keys.contains(&key) {
            log::debug!("[queue] duplicate rejected: {}", key);
            return Err(QueueError::DuplicateInProgress(key));
        }
        inner.keys.insert(key.clone());

        // The completion handle is shared between the per-attempt delivery
        // path and the terminal rejection path; whichever fires first takes
        // the sender.
        let slot: Arc<Mutex<Option<oneshot::Sender<Result<T, QueueError>>>>> =
            Arc::new(Mutex::new(Some(tx)));
        let executor = Arc::new(executor);

        let deliver = Arc::clone(&slot);
        let attempt: AttemptFn = Box::new(move || {
            let executor = Arc::clone(&executor);
            let deliver = Arc::clone(&deliver);
            Box::pin(async move {
                match executor().await {
                    Ok(value) => {
                        if let Some(tx) = lock(&deliver).take() {
                            let _ = tx.send(Ok(value));
                        }
                        AttemptOutcome::Delivered
                    }
                    Err(err) => AttemptOutcome::Failed(err),
                }
            })
        });

        let reject_slot = Arc::clone(&slot);
        let reject: RejectFn = Box::new(move |err| {
            if let Some(tx) = lock(&reject_slot).take() {
                let _ = tx.send(Err(err));
            }
        });

        inner.pending.push(WorkItem {
            key: key.clone(),
            service: service.to_string(),
            priority,
            retry_count: 0,
            max_retries: self.config.max_retries,
            attempt,
            reject: Some(reject),
        });
        log::debug!(
            "[queue] enqueued {} ({}, {} pending)",
            key,
            priority,
            inner.pending.len()
        );
        self.trigger_drain(&mut inner);
        Ok(rx)
    }

    /// Spawn the drain loop unless one is already running
    fn trigger_drain(&self, inner: &mut Inner) {
        if !inner.draining {
            inner.draining = true;
            tokio::spawn(self.clone().drain());
        }
    }

    /// The single dispatch loop
    ///
    /// Pending is stably re-sorted by priority on every iteration, so a
    /// deferred item stays first within its own priority class while freshly
    /// arrived higher-priority work still overtakes it.
    async fn drain(self) {
        loop {
            let mut item = {
                let mut inner = lock(&self.inner);
                inner.pending.sort_by_key(|item| item.priority.rank());
                if inner.pending.is_empty() {
                    inner.draining = false;
                    return;
                }
                inner.pending.remove(0)
            };

            if !self.limiter.check_and_reserve(&item.service) {
                // Keep the item at the front (it keeps its priority slot) and
                // suspend the whole loop for the limiter-reported wait.
                let wait = self
                    .limiter
                    .wait_time(&item.service)
                    .max(std::time::Duration::from_millis(50));
                log::debug!(
                    "[queue] {} rate limited, draining pauses {}ms",
                    item.service,
                    wait.as_millis()
                );
                lock(&self.inner).pending.insert(0, item);
                tokio::time::sleep(wait).await;
                continue;
            }

            match (item.attempt)().await {
                AttemptOutcome::Delivered => {
                    log::debug!("[queue] completed {}", item.key);
                    lock(&self.inner).keys.remove(&item.key);
                }
                AttemptOutcome::Failed(err) => {
                    if let Some(observer) = &self.observer {
                        observer.on_failure(&item.service, &err).await;
                    }
                    self.handle_failure(item, err);
                }
            }
        }
    }

    /// Retry with backoff, or reject the caller once retries are exhausted
    fn handle_failure(&self, mut item: WorkItem, err: UpstreamError) {
        if item.retry_count < item.max_retries {
            item.retry_count += 1;
            // Downgrade so the failing request queues behind healthy traffic.
            item.priority = Priority::Low;
            let delay = self.config.base_delay * 2u32.pow(item.retry_count - 1);
            log::info!(
                "[queue] {} failed ({}), retry {}/{} in {}ms",
                item.key,
                err,
                item.retry_count,
                item.max_retries,
                delay.as_millis()
            );
            let queue = self.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                queue.reinsert(item);
            });
        } else {
            log::warn!(
                "[queue] {} failed after {} retries: {}",
                item.key,
                item.max_retries,
                err
            );
            lock(&self.inner).keys.remove(&item.key);
            if let Some(reject) = item.reject.take() {
                reject(QueueError::Upstream(err));
            }
        }
    }

    /// Put a retried item back into pending and restart draining if idle
    fn reinsert(&self, item: WorkItem) {
        let mut inner = lock(&self.inner);
        inner.pending.push(item);
        self.trigger_drain(&mut inner);
    }

    /// Read-only queue introspection
    pub fn status(&self) -> QueueStatus {
        let inner = lock(&self.inner);
        QueueStatus {
            queue_length: inner.pending.len(),
            // Keys not in pending are in flight or waiting out a backoff.
            active_requests: inner.keys.len().saturating_sub(inner.pending.len()),
            processing: inner.draining,
        }
    }
}

/// Lock helper that survives poisoning (a panicked attempt must not wedge
/// the whole queue)
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ============================================================================
// Tests
// ============================================================================
