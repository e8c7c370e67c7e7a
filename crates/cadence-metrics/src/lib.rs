//! Cycle-time and change-failure metrics over commit records.
//!
//! The procedural in-memory implementation of every metric, plus the seams
//! shared with other implementations:
//! - [`delta`]: consecutive commit pairs per author under an ordering rule
//! - [`stats`], [`buckets`], [`windows`], [`monthly`], [`authors`]: aggregates
//! - [`failure`]: keyword-based change-failure classification
//! - [`engine`]: the [`engine::MetricsEngine`] trait and [`engine::InMemoryEngine`]
//! - [`report`]: rounding and rendering at the output boundary
//! - [`parity`]: value-for-value comparison of two engines

pub mod authors;
pub mod buckets;
pub mod delta;
pub mod engine;
pub mod failure;
pub mod monthly;
pub mod parity;
pub mod report;
pub mod stats;
pub mod windows;
