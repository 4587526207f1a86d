//! # tunedeck-core
//!
//! Request orchestration and API-resilience core for Tunedeck — shared
//! between the kiosk shell and the CLI.
//!
//! The kiosk talks to quota-limited external video-search services; this
//! crate is the layer that protects them from overload and the kiosk from
//! their failures:
//! - Sliding-window rate limiting per service (`services::ratelimit`)
//! - A deduplicated, prioritized request queue with exponential-backoff
//!   retries (`services::queue`)
//! - A TTL cache of prior responses (`services::cache`)
//! - A credential pool that rotates API keys as quota runs out
//!   (`services::credentials`)
//!
//! Construct one instance of each component per process and pass them by
//! reference; there is no hidden global state.

pub mod error;
pub mod services;

// Re-exports for convenience
pub use error::{PoolError, QueueError, UpstreamError};
pub use services::cache::{search_cache_key, CacheConfig, ResponseCache};
pub use services::credentials::{
    Credential, CredentialPool, PoolConfig, ProbeError, QuotaErrorHandler, QuotaProbe,
    RotationEvent,
};
pub use services::queue::{FailureObserver, Priority, QueueConfig, QueueStatus, RequestQueue};
pub use services::ratelimit::{
    RateLimitConfig, RateLimiter, ServiceWindowStatus, WindowConfig, SERVICE_PLAYLIST,
    SERVICE_SCRAPER, SERVICE_VIDEO_API,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
