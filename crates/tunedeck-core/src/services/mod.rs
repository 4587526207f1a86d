//! Core services
//!
//! - `ratelimit` — per-service sliding-window admission control
//! - `queue` — deduplicated, prioritized dispatch with retry/backoff
//! - `cache` — TTL-keyed cache of upstream responses
//! - `credentials` — credential pool and quota-driven rotation

pub mod cache;
pub mod credentials;
pub mod queue;
pub mod ratelimit;
