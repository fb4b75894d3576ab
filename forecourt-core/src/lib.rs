//! Forecourt core library — domain types, agent configuration, errors.
//!
//! Public API surface:
//! - [`types`] — transfer statuses/records and the agent configuration model
//! - [`error`] — [`ConfigError`]
//! - [`config`] — load / save for `agent.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use error::ConfigError;
pub use types::{
    AgentConfig, ApiConfig, ExportFilter, StationConfig, TransferRecord, TransferStatus,
};
