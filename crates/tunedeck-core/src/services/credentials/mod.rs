//! Credential management
//!
//! The metered video API enforces a per-key quota; surviving a busy evening
//! means holding several keys and rotating between them as quota runs out.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────┐
//! │ CredentialPool                                     │
//! │   - select_active() / rotate(reason)               │
//! │   - bounded rotation history (newest first)        │
//! │   - refresh_usage() via trait QuotaProbe           │
//! └────────────────────────────────────────────────────┘
//!          ▲
//!          │ rotate("quota exhausted")
//! ┌────────────────────────────────────────────────────┐
//! │ QuotaErrorHandler (impl queue::FailureObserver)    │
//! │   - watches queue failures for the metered service │
//! │   - flags needs_configuration() when the pool is   │
//! │     dry so the UI can prompt for a new key         │
//! └────────────────────────────────────────────────────┘
//! ```

pub mod handler;
pub mod pool;
pub mod probe;
pub mod types;

// Re-export main types
pub use handler::QuotaErrorHandler;
pub use pool::{CredentialPool, PoolConfig, DEFAULT_HISTORY_LIMIT, DEFAULT_ROTATE_THRESHOLD};
pub use probe::{ProbeError, QuotaProbe};
pub use types::{Credential, RotationEvent};
