//! Change-Failure Classifier.
//!
//! A commit is failure-inducing when its message contains one of the
//! configured keywords, compared case-insensitively (ASCII). Commits without
//! a message never count as failures.

use std::collections::BTreeMap;
use std::fmt::Display;

use cadence_core::{CadenceError, ChangeFailureConfig, CommitRecord};
use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::monthly::month_key_in;

/// Keyword matcher for commit messages.
///
/// # Examples
///
/// ```
/// use cadence_metrics::failure::FailureClassifier;
///
/// let classifier = FailureClassifier::new(["revert", "hotfix"]).unwrap();
/// assert!(classifier.is_failure(Some("Revert \"add cache\"")));
/// assert!(!classifier.is_failure(Some("add cache")));
/// assert!(!classifier.is_failure(None));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureClassifier {
    keywords: Vec<String>,
}

impl FailureClassifier {
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInput`] if there are no keywords or a
    /// keyword is blank.
    pub fn new<I, S>(keywords: I) -> Result<Self, CadenceError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: Vec<String> = keywords
            .into_iter()
            .map(|k| k.as_ref().trim().to_ascii_lowercase())
            .collect();
        if keywords.is_empty() {
            return Err(CadenceError::InvalidInput(
                "at least one failure keyword is required".into(),
            ));
        }
        if keywords.iter().any(String::is_empty) {
            return Err(CadenceError::InvalidInput(
                "failure keywords must not be blank".into(),
            ));
        }
        Ok(Self { keywords })
    }

    /// Build from `[change_failure]` configuration.
    pub fn from_config(config: &ChangeFailureConfig) -> Result<Self, CadenceError> {
        Self::new(&config.keywords)
    }

    /// Lower-cased keywords, in configuration order.
    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn is_failure(&self, message: Option<&str>) -> bool {
        message.is_some_and(|m| {
            let lower = m.to_ascii_lowercase();
            self.keywords.iter().any(|k| lower.contains(k.as_str()))
        })
    }

    /// Classify one record.
    pub fn classify(&self, record: &CommitRecord) -> FailureRecord {
        FailureRecord {
            sha: record.sha.clone(),
            is_failure: self.is_failure(record.message.as_deref()),
        }
    }
}

impl Default for FailureClassifier {
    fn default() -> Self {
        Self {
            keywords: ChangeFailureConfig::default().keywords,
        }
    }
}

/// Classification of one commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub sha: String,
    pub is_failure: bool,
}

/// Failure rate over a set of commits.
///
/// `rate` is a fraction in `[0, 1]` and `None` when there are no commits.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureSummary {
    pub total: usize,
    pub failures: usize,
    pub rate: Option<f64>,
}

impl FailureSummary {
    pub fn new(total: usize, failures: usize) -> Self {
        let rate = (total > 0).then(|| failures as f64 / total as f64);
        Self {
            total,
            failures,
            rate,
        }
    }
}

/// Failure rate over every record of a scope.
///
/// # Examples
///
/// ```
/// use cadence_core::CommitRecord;
/// use cadence_metrics::failure::{failure_rate, FailureClassifier};
///
/// let records = vec![
///     CommitRecord::new("a", "a@x.com", 0, "add feature"),
///     CommitRecord::new("b", "a@x.com", 1, "hotfix: broken login"),
/// ];
/// let summary = failure_rate(&records, &FailureClassifier::default());
/// assert_eq!(summary.failures, 1);
/// assert_eq!(summary.rate, Some(0.5));
///
/// assert!(failure_rate(&[], &FailureClassifier::default()).rate.is_none());
/// ```
pub fn failure_rate(records: &[CommitRecord], classifier: &FailureClassifier) -> FailureSummary {
    let failures = records
        .iter()
        .filter(|r| classifier.is_failure(r.message.as_deref()))
        .count();
    FailureSummary::new(records.len(), failures)
}

/// Failure rate of one local calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFailure {
    pub month: String,
    #[serde(flatten)]
    pub summary: FailureSummary,
}

/// Per-month failure rates plus the number of records that had no month.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyFailureRates {
    pub months: Vec<MonthlyFailure>,
    pub undated: usize,
}

/// Failure rates per local calendar month of `committed_date`.
pub fn monthly_failure_rates(
    records: &[CommitRecord],
    classifier: &FailureClassifier,
) -> MonthlyFailureRates {
    monthly_failure_rates_in(records, classifier, &Local)
}

/// [`monthly_failure_rates`] with months taken in `tz`.
pub fn monthly_failure_rates_in<Tz>(
    records: &[CommitRecord],
    classifier: &FailureClassifier,
    tz: &Tz,
) -> MonthlyFailureRates
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut undated = 0;
    let mut by_month: BTreeMap<String, (usize, usize)> = BTreeMap::new();

    for record in records {
        let Some(month) = record.committed_date.and_then(|ts| month_key_in(ts, tz)) else {
            undated += 1;
            continue;
        };
        let entry = by_month.entry(month).or_default();
        entry.0 += 1;
        if classifier.is_failure(record.message.as_deref()) {
            entry.1 += 1;
        }
    }

    MonthlyFailureRates {
        months: by_month
            .into_iter()
            .map(|(month, (total, failures))| MonthlyFailure {
                month,
                summary: FailureSummary::new(total, failures),
            })
            .collect(),
        undated,
    }
}
