//! Core types, configuration, and error handling for Cadence.
//!
//! This crate provides the shared foundation used by all other Cadence crates:
//! - [`CadenceError`]: unified error type using `thiserror`
//! - [`CadenceConfig`]: configuration loaded from `.cadence.toml`
//! - Shared types: [`CommitRecord`], [`RepoScope`], [`OrderingRule`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    validate_boundaries, CadenceConfig, ChangeFailureConfig, CycleTimeConfig, HistoryConfig,
    ReportConfig,
};
pub use error::CadenceError;
pub use types::{
    check_records, CommitRecord, OrderingRule, OutputFormat, RepoScope, MAX_COMMITTED_DATE,
    MIN_COMMITTED_DATE,
};

/// A convenience `Result` type for Cadence operations.
pub type Result<T> = std::result::Result<T, CadenceError>;
