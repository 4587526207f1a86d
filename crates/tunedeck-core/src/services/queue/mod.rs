//! Request queue
//!
//! The single entry point callers use to run any rate-limited, retryable,
//! deduplicated operation against an upstream service. See
//! [`dispatch::RequestQueue::enqueue`] for the contract.

pub mod dispatch;
pub mod types;

// Re-export main types
pub use dispatch::RequestQueue;
pub use types::{dedup_key, FailureObserver, Priority, QueueConfig, QueueStatus};
