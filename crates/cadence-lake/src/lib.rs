//! SQLite commit store and relational metrics engine.
//!
//! [`CommitLake`] persists commit records per repository scope and
//! implements [`cadence_metrics::engine::MetricsEngine`] with window and
//! aggregate queries, giving a second, independently computed answer for
//! every metric.

mod queries;
pub mod store;

pub use store::CommitLake;
