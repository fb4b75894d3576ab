//! # forecourt-sync
//!
//! The transfer pipeline: classify, gate, validate, hash, upload, record.
//!
//! Call [`process_path`] to run one observed file through the whole
//! pipeline. The watcher, backlog scanner, and manual rescans all funnel
//! into this single entrypoint.

pub mod api;
pub mod classify;
pub mod digest;
pub mod error;
pub mod pipeline;
pub mod ready;
pub mod store;
pub mod validate;

pub use api::ApiClient;
pub use classify::ExportKind;
pub use error::SyncError;
pub use pipeline::{process_path, ProcessOutcome};
pub use ready::Readiness;
pub use store::{StatusCounts, TransferLog};
pub use validate::StationCheck;
