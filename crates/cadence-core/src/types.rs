use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CadenceError;

/// One commit as delivered by a commit-record supplier.
///
/// Records are created once per commit and never mutated. A record belongs to
/// exactly one [`RepoScope`]; the scope travels alongside the records rather
/// than inside them.
///
/// `committed_date` is optional because persisted rows and exported JSON can
/// lack it. Such records cannot be placed in the delta ordering and are
/// reported as skipped by the delta engine.
///
/// # Examples
///
/// ```
/// use cadence_core::CommitRecord;
///
/// let record = CommitRecord::new("a1b2c3", "alice@example.com", 1_700_000_000, "fix: auth bug");
/// assert_eq!(record.committed_date, Some(1_700_000_000));
/// assert_eq!(record.message.as_deref(), Some("fix: auth bug"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitRecord {
    /// Full commit identifier.
    pub sha: String,
    /// Author email, the grouping key for cycle time.
    pub author_email: String,
    /// Commit timestamp in whole seconds since the Unix epoch.
    #[serde(default)]
    pub committed_date: Option<i64>,
    /// Full commit message.
    #[serde(default)]
    pub message: Option<String>,
}

impl CommitRecord {
    /// Build a record with a timestamp and a message.
    pub fn new(
        sha: impl Into<String>,
        author_email: impl Into<String>,
        committed_date: i64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sha: sha.into(),
            author_email: author_email.into(),
            committed_date: Some(committed_date),
            message: Some(message.into()),
        }
    }
}

/// Earliest accepted `committed_date`: 0001-01-02T00:00:00Z.
pub const MIN_COMMITTED_DATE: i64 = -62_135_510_400;

/// Latest accepted `committed_date`: 9999-12-30T23:59:59Z.
///
/// Together with [`MIN_COMMITTED_DATE`] this keeps every local calendar date
/// inside the four-digit years SQLite's date functions understand.
pub const MAX_COMMITTED_DATE: i64 = 253_402_214_399;

/// Check a batch of records against the supplier contract.
///
/// Every record needs a non-empty `sha` and `author_email`, a `sha` may
/// appear only once per batch, and a present `committed_date` must lie
/// between [`MIN_COMMITTED_DATE`] and [`MAX_COMMITTED_DATE`].
///
/// # Errors
///
/// Returns [`CadenceError::InvalidInput`] naming the first offending record.
///
/// # Examples
///
/// ```
/// use cadence_core::{check_records, CommitRecord};
///
/// let ok = vec![CommitRecord::new("a", "x@y.z", 1, "init")];
/// assert!(check_records(&ok).is_ok());
///
/// let dup = vec![ok[0].clone(), ok[0].clone()];
/// assert!(check_records(&dup).is_err());
/// ```
pub fn check_records(records: &[CommitRecord]) -> Result<(), CadenceError> {
    let mut seen = HashSet::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        if record.sha.trim().is_empty() {
            return Err(CadenceError::InvalidInput(format!(
                "record {index} has an empty sha"
            )));
        }
        if record.author_email.trim().is_empty() {
            return Err(CadenceError::InvalidInput(format!(
                "record {index} ({}) has an empty author_email",
                record.sha
            )));
        }
        if let Some(ts) = record.committed_date {
            if !(MIN_COMMITTED_DATE..=MAX_COMMITTED_DATE).contains(&ts) {
                return Err(CadenceError::InvalidInput(format!(
                    "record {index} ({}) has committed_date {ts} outside the supported range \
                     {MIN_COMMITTED_DATE}..={MAX_COMMITTED_DATE}",
                    record.sha
                )));
            }
        }
        if !seen.insert(record.sha.as_str()) {
            return Err(CadenceError::InvalidInput(format!(
                "duplicate sha {} at record {index}",
                record.sha
            )));
        }
    }
    Ok(())
}

/// Opaque repository scope identifier of the form `<source>:<name>`.
///
/// The engines only ever compare scopes for equality. Parsing checks the
/// shape once at the boundary so that a typo fails fast instead of silently
/// matching nothing.
///
/// # Examples
///
/// ```
/// use cadence_core::RepoScope;
///
/// let scope: RepoScope = "local:cadence".parse().unwrap();
/// assert_eq!(scope.as_str(), "local:cadence");
/// assert!("cadence".parse::<RepoScope>().is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoScope(String);

impl RepoScope {
    /// Build a scope from its two halves.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInput`] if either half is empty or the
    /// source contains a `:`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadence_core::RepoScope;
    ///
    /// let scope = RepoScope::new("github", "acme/widgets").unwrap();
    /// assert_eq!(scope.to_string(), "github:acme/widgets");
    /// ```
    pub fn new(source: &str, name: &str) -> Result<Self, CadenceError> {
        if source.contains(':') {
            return Err(CadenceError::InvalidInput(format!(
                "scope source must not contain ':', got '{source}'"
            )));
        }
        format!("{source}:{name}").parse()
    }

    /// The identifier as stored and compared.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RepoScope {
    type Err = CadenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((source, name)) if !source.trim().is_empty() && !name.trim().is_empty() => {
                Ok(Self(s.to_string()))
            }
            _ => Err(CadenceError::InvalidInput(format!(
                "repository scope must look like '<source>:<name>', got '{s}'"
            ))),
        }
    }
}

impl TryFrom<String> for RepoScope {
    type Error = CadenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RepoScope> for String {
    fn from(scope: RepoScope) -> Self {
        scope.0
    }
}

impl fmt::Display for RepoScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How commits of one author are ordered before consecutive pairs are taken.
///
/// # Examples
///
/// ```
/// use cadence_core::OrderingRule;
///
/// let rule: OrderingRule = "traversal".parse().unwrap();
/// assert_eq!(rule, OrderingRule::Traversal);
/// assert_eq!(OrderingRule::default(), OrderingRule::CommitDateSha);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderingRule {
    /// Ascending `(committed_date, sha)`. Computable from stored fields alone,
    /// so every engine can reproduce it.
    #[default]
    CommitDateSha,
    /// The supplier's history-traversal order (newest first), reversed.
    /// Only meaningful for suppliers that deliver traversal order.
    Traversal,
}

impl fmt::Display for OrderingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingRule::CommitDateSha => write!(f, "commit-date-sha"),
            OrderingRule::Traversal => write!(f, "traversal"),
        }
    }
}

impl FromStr for OrderingRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "commit-date-sha" | "date-sha" => Ok(OrderingRule::CommitDateSha),
            "traversal" | "history" => Ok(OrderingRule::Traversal),
            other => Err(format!("unknown ordering rule: {other}")),
        }
    }
}

/// Output format for CLI subcommands.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument parsing.
///
/// # Examples
///
/// ```
/// use cadence_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
