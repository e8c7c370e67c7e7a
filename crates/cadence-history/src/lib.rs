//! Commit record suppliers for Cadence.
//!
//! Mines git history using git2 into [`cadence_core::CommitRecord`]s in
//! history-traversal order, derives the default repository scope of a local
//! checkout, and reads records exported as JSON.

pub mod json;
pub mod mining;
pub mod scope;
