//! Domain types for the Radio Gateway.
//!
//! Core value types, configuration, errors and the synchronous building
//! blocks of the request lifecycle: guards, compatibility caps and the
//! pending request table.

pub mod compat;
pub mod config;
pub mod correlation;
pub mod error;
pub mod guard;
pub mod pending;
pub mod serial;
pub mod types;

// Re-exports for convenience
pub use compat::CompatibilityTable;
pub use config::{ConfigError, GatewayConfig, ResetScope};
pub use correlation::CorrelationId;
pub use error::{codes, GatewayError, GatewayResult, GuardError, RetireReason};
pub use guard::{GuardHandle, GuardKind, GuardSnapshot, HolderId, ResourceGuard};
pub use pending::{Admission, PendingRequestTable, PendingStats, Submission, TimeoutPolicy};
pub use types::*;
