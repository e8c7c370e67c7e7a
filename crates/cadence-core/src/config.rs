use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CadenceError;
use crate::types::{OrderingRule, RepoScope};

/// Top-level configuration loaded from `.cadence.toml`.
///
/// Supports layered resolution: CLI flags > local config > defaults.
///
/// # Examples
///
/// ```
/// use cadence_core::CadenceConfig;
///
/// let config = CadenceConfig::default();
/// assert_eq!(config.cycle_time.bucket_boundaries, vec![0.0, 60.0, 1440.0, 10080.0]);
/// assert_eq!(config.report.minute_decimals, 2);
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CadenceConfig {
    /// Repository scope override. Derived from the repository when absent.
    #[serde(default)]
    pub scope: Option<RepoScope>,
    /// Cycle-time settings.
    #[serde(default)]
    pub cycle_time: CycleTimeConfig,
    /// Change-failure settings.
    #[serde(default)]
    pub change_failure: ChangeFailureConfig,
    /// Git history mining settings.
    #[serde(default)]
    pub history: HistoryConfig,
    /// Rounding applied at the reporting boundary.
    #[serde(default)]
    pub report: ReportConfig,
}

impl CadenceConfig {
    /// Load and validate configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Io`] if the file cannot be read,
    /// [`CadenceError::Toml`] if the content is not valid TOML, or
    /// [`CadenceError::Config`] if a value is out of range.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use cadence_core::CadenceConfig;
    /// use std::path::Path;
    ///
    /// let config = CadenceConfig::from_file(Path::new(".cadence.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> Result<Self, CadenceError> {
        if !path.exists() {
            return Err(CadenceError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Toml`] if parsing fails, or
    /// [`CadenceError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use cadence_core::CadenceConfig;
    ///
    /// let toml = r#"
    /// [cycle_time]
    /// window_size = 50
    /// "#;
    /// let config = CadenceConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.cycle_time.window_size, 50);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, CadenceError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that TOML types alone cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::Config`] describing the first invalid value.
    pub fn validate(&self) -> Result<(), CadenceError> {
        validate_boundaries(&self.cycle_time.bucket_boundaries)
            .map_err(|e| CadenceError::Config(format!("cycle_time.bucket_boundaries: {e}")))?;

        if self.cycle_time.window_size == 0 {
            return Err(CadenceError::Config(
                "cycle_time.window_size must be at least 1".into(),
            ));
        }

        if self.change_failure.keywords.is_empty() {
            return Err(CadenceError::Config(
                "change_failure.keywords must not be empty".into(),
            ));
        }
        if self
            .change_failure
            .keywords
            .iter()
            .any(|k| k.trim().is_empty())
        {
            return Err(CadenceError::Config(
                "change_failure.keywords must not contain blank entries".into(),
            ));
        }

        for (name, value) in [
            ("report.minute_decimals", self.report.minute_decimals),
            ("report.spread_decimals", self.report.spread_decimals),
        ] {
            if value > MAX_DECIMALS {
                return Err(CadenceError::Config(format!(
                    "{name} must be at most {MAX_DECIMALS}, got {value}"
                )));
            }
        }

        Ok(())
    }
}

const MAX_DECIMALS: u32 = 6;

/// Validate magnitude bucket lower bounds (in minutes).
///
/// Boundaries must be non-empty, finite, and strictly increasing. Each
/// boundary opens a half-open range that ends at the next one; the last
/// range is unbounded above.
///
/// # Errors
///
/// Returns [`CadenceError::InvalidInput`] naming the offending boundary.
///
/// # Examples
///
/// ```
/// use cadence_core::validate_boundaries;
///
/// assert!(validate_boundaries(&[0.0, 60.0, 1440.0]).is_ok());
/// assert!(validate_boundaries(&[0.0, 60.0, 60.0]).is_err());
/// assert!(validate_boundaries(&[]).is_err());
/// ```
pub fn validate_boundaries(boundaries: &[f64]) -> Result<(), CadenceError> {
    if boundaries.is_empty() {
        return Err(CadenceError::InvalidInput(
            "at least one bucket boundary is required".into(),
        ));
    }
    if let Some(bad) = boundaries.iter().find(|b| !b.is_finite()) {
        return Err(CadenceError::InvalidInput(format!(
            "bucket boundary {bad} is not a finite number"
        )));
    }
    if let Some(pair) = boundaries.windows(2).find(|w| w[0] >= w[1]) {
        return Err(CadenceError::InvalidInput(format!(
            "bucket boundaries must be strictly increasing, found {} then {}",
            pair[0], pair[1]
        )));
    }
    Ok(())
}

/// Cycle-time configuration.
///
/// # Examples
///
/// ```
/// use cadence_core::{CycleTimeConfig, OrderingRule};
///
/// let config = CycleTimeConfig::default();
/// assert_eq!(config.ordering, OrderingRule::CommitDateSha);
/// assert_eq!(config.window_size, 1000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleTimeConfig {
    /// Ordering rule for commits of one author (default: `commit-date-sha`).
    #[serde(default)]
    pub ordering: OrderingRule,
    /// Lower bounds of the magnitude buckets, in minutes
    /// (default: hour, day, week).
    #[serde(default = "default_bucket_boundaries")]
    pub bucket_boundaries: Vec<f64>,
    /// Number of consecutive deltas per fixed window (default: 1000).
    #[serde(default = "default_window_size")]
    pub window_size: usize,
}

fn default_bucket_boundaries() -> Vec<f64> {
    vec![0.0, 60.0, 1440.0, 10080.0]
}

fn default_window_size() -> usize {
    1000
}

impl Default for CycleTimeConfig {
    fn default() -> Self {
        Self {
            ordering: OrderingRule::default(),
            bucket_boundaries: default_bucket_boundaries(),
            window_size: default_window_size(),
        }
    }
}

/// Change-failure classification settings.
///
/// # Examples
///
/// ```
/// use cadence_core::ChangeFailureConfig;
///
/// let config = ChangeFailureConfig::default();
/// assert!(config.keywords.iter().any(|k| k == "revert"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeFailureConfig {
    /// Case-insensitive substrings marking a failure-inducing commit message.
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
}

fn default_keywords() -> Vec<String> {
    [
        "revert", "hotfix", "bugfix", "bug", "fix", "problem", "issue",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for ChangeFailureConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
        }
    }
}

/// Git history mining settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Only include commits from the last N days (default: 0, the whole history).
    #[serde(default)]
    pub since_days: u64,
    /// Branch to walk (default: HEAD).
    pub branch: Option<String>,
}

/// Rounding applied to aggregates at the reporting boundary.
///
/// # Examples
///
/// ```
/// use cadence_core::ReportConfig;
///
/// let config = ReportConfig::default();
/// assert_eq!(config.minute_decimals, 2);
/// assert_eq!(config.spread_decimals, 0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Decimal places for `sum` and `mean` (default: 2).
    #[serde(default = "default_minute_decimals")]
    pub minute_decimals: u32,
    /// Decimal places for `p75` and `stdev` (default: 0).
    #[serde(default)]
    pub spread_decimals: u32,
}

fn default_minute_decimals() -> u32 {
    2
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            minute_decimals: default_minute_decimals(),
            spread_decimals: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = CadenceConfig::default();
        assert!(config.scope.is_none());
        assert_eq!(config.cycle_time.ordering, OrderingRule::CommitDateSha);
        assert_eq!(
            config.cycle_time.bucket_boundaries,
            vec![0.0, 60.0, 1440.0, 10080.0]
        );
        assert_eq!(config.cycle_time.window_size, 1000);
        assert_eq!(config.change_failure.keywords.len(), 7);
        assert_eq!(config.history.since_days, 0);
        assert!(config.history.branch.is_none());
        assert_eq!(config.report.minute_decimals, 2);
        assert_eq!(config.report.spread_decimals, 0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = CadenceConfig::from_toml("").unwrap();
        assert_eq!(config.cycle_time.window_size, 1000);
        assert_eq!(config.report.minute_decimals, 2);
    }

    #[test]
    fn parse_full_toml() {
        let toml = r#"
scope = "github:acme/widgets"

[cycle_time]
ordering = "traversal"
bucket_boundaries = [0, 120]
window_size = 4

[change_failure]
keywords = ["revert", "rollback"]

[history]
since_days = 90
branch = "main"

[report]
minute_decimals = 1
spread_decimals = 2
"#;
        let config = CadenceConfig::from_toml(toml).unwrap();
        assert_eq!(
            config.scope.as_ref().map(RepoScope::as_str),
            Some("github:acme/widgets")
        );
        assert_eq!(config.cycle_time.ordering, OrderingRule::Traversal);
        assert_eq!(config.cycle_time.bucket_boundaries, vec![0.0, 120.0]);
        assert_eq!(config.cycle_time.window_size, 4);
        assert_eq!(config.change_failure.keywords, vec!["revert", "rollback"]);
        assert_eq!(config.history.since_days, 90);
        assert_eq!(config.history.branch.as_deref(), Some("main"));
        assert_eq!(config.report.minute_decimals, 1);
        assert_eq!(config.report.spread_decimals, 2);
    }

    #[test]
    fn invalid_toml_returns_error() {
        let result = CadenceConfig::from_toml("{{invalid}}");
        assert!(matches!(result, Err(CadenceError::Toml(_))));
    }

    #[test]
    fn malformed_scope_is_rejected() {
        let result = CadenceConfig::from_toml("scope = \"no-colon\"");
        assert!(result.is_err());
    }

    #[test]
    fn non_monotonic_boundaries_fail_fast() {
        let toml = r#"
[cycle_time]
bucket_boundaries = [0, 1440, 60]
"#;
        let err = CadenceConfig::from_toml(toml).unwrap_err();
        assert!(matches!(err, CadenceError::Config(_)));
        assert!(err.to_string().contains("strictly increasing"));
    }

    #[test]
    fn zero_window_fails_fast() {
        let toml = r#"
[cycle_time]
window_size = 0
"#;
        assert!(matches!(
            CadenceConfig::from_toml(toml),
            Err(CadenceError::Config(_))
        ));
    }

    #[test]
    fn empty_keywords_fail_fast() {
        let toml = r#"
[change_failure]
keywords = []
"#;
        assert!(CadenceConfig::from_toml(toml).is_err());

        let blank = r#"
[change_failure]
keywords = ["fix", "  "]
"#;
        assert!(CadenceConfig::from_toml(blank).is_err());
    }

    #[test]
    fn excessive_decimals_fail_fast() {
        let toml = r#"
[report]
spread_decimals = 12
"#;
        assert!(CadenceConfig::from_toml(toml).is_err());
    }

    #[test]
    fn boundaries_reject_nan() {
        assert!(validate_boundaries(&[0.0, f64::NAN]).is_err());
        assert!(validate_boundaries(&[f64::NEG_INFINITY, 0.0]).is_err());
        assert!(validate_boundaries(&[-5.0, 0.0, 5.0]).is_ok());
    }
}
