use std::path::PathBuf;

/// Errors that can occur across the Cadence crates.
///
/// Each variant wraps a specific error domain. Library crates use this type
/// directly; the binary crate converts to `miette` diagnostics at the boundary.
///
/// Conditions such as "no commits in scope" or "fewer than two deltas" are not
/// errors: they show up as empty results or undefined aggregate fields.
///
/// # Examples
///
/// ```
/// use cadence_core::CadenceError;
///
/// let err = CadenceError::Config("window_size must be positive".into());
/// assert!(err.to_string().contains("window_size"));
/// ```
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum CadenceError {
    /// Filesystem I/O failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or missing configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Git operation failure.
    #[error("git error: {0}")]
    Git(String),

    /// SQLite store or query failure.
    #[error("database error: {0}")]
    Database(String),

    /// Input that violates the commit-record contract (wrong type, bad scope, ...).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// JSON serialization / deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML deserialization failure.
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// A required file was not found.
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
}
