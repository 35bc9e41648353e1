//! Root of the `permit-log-core` library.
//!
//! Work-permit records for construction projects, kept in two places:
//! durable local storage and an optional remote spreadsheet reached over
//! HTTP. [`sync::SyncCoordinator`] owns the in-memory set for the active
//! project and keeps both stores in step.

// User-visible output goes through the CLI or the tracing stack.
#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod config;
pub mod export;
pub mod local_store;
pub mod permit;
pub mod remote;
pub mod sync;

pub use config::{ConfigError, ConfigLoader, PermitLogConfig};
pub use local_store::{LocalStore, LocalStoreError};
pub use permit::{Permit, PermitDraft, PermitStatus, PermitType, PermitTypeTag, ValidationError};
pub use remote::{HttpGateway, PublishReceipt, RemoteError, RemoteGateway, RemoteRow};
pub use sync::{
    CreateError, CreateOutcome, LoadOutcome, LoadSource, RemoteOutcome, SetupError, SwitchError,
    SyncCoordinator, SyncState,
};
