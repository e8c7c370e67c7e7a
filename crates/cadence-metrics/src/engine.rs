//! The engine seam shared by the procedural and relational implementations.

use std::collections::HashMap;

use cadence_core::{
    check_records, CadenceConfig, CadenceError, CommitRecord, OrderingRule, ReportConfig,
    RepoScope,
};

use crate::authors::{active_authors, author_stats, ActiveAuthorsByMonth, AuthorStat};
use crate::buckets::{bucket_stats, BucketedStats, MagnitudeBuckets};
use crate::delta::{extract_deltas, DeltaSet};
use crate::failure::{
    failure_rate, monthly_failure_rates, FailureClassifier, FailureSummary, MonthlyFailureRates,
};
use crate::monthly::{monthly_stats, MonthlyStat};
use crate::stats::Aggregate;
use crate::windows::{fixed_windows, WindowStat};

/// Parameters for every metric operation, resolved from configuration.
///
/// # Examples
///
/// ```
/// use cadence_core::CadenceConfig;
/// use cadence_metrics::engine::MetricSettings;
///
/// let settings = MetricSettings::from_config(&CadenceConfig::default()).unwrap();
/// assert_eq!(settings.window_size, 1000);
/// assert_eq!(settings.buckets.boundaries(), &[0.0, 60.0, 1440.0, 10080.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSettings {
    pub ordering: OrderingRule,
    pub buckets: MagnitudeBuckets,
    pub window_size: usize,
    pub classifier: FailureClassifier,
    pub report: ReportConfig,
}

impl MetricSettings {
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInput`] for invalid bucket boundaries
    /// or keywords, and [`CadenceError::Config`] for a zero window size.
    pub fn from_config(config: &CadenceConfig) -> Result<Self, CadenceError> {
        if config.cycle_time.window_size == 0 {
            return Err(CadenceError::Config(
                "cycle_time.window_size must be at least 1".into(),
            ));
        }
        Ok(Self {
            ordering: config.cycle_time.ordering,
            buckets: MagnitudeBuckets::new(config.cycle_time.bucket_boundaries.clone())?,
            window_size: config.cycle_time.window_size,
            classifier: FailureClassifier::from_config(&config.change_failure)?,
            report: config.report,
        })
    }
}

impl Default for MetricSettings {
    fn default() -> Self {
        Self {
            ordering: OrderingRule::default(),
            buckets: MagnitudeBuckets::default(),
            window_size: 1000,
            classifier: FailureClassifier::default(),
            report: ReportConfig::default(),
        }
    }
}

/// One way of computing every metric for a repository scope.
///
/// Implementations must agree value for value after the reporting boundary
/// for [`OrderingRule::CommitDateSha`]. The scope is always an explicit
/// argument; a scope without records yields empty results, never an error.
pub trait MetricsEngine {
    /// Short label used in reports.
    fn name(&self) -> &str;

    fn deltas(&self, scope: &RepoScope, ordering: OrderingRule) -> Result<DeltaSet, CadenceError>;

    /// Whole-population aggregate over every delta of the scope.
    fn overall(&self, scope: &RepoScope, settings: &MetricSettings)
        -> Result<Aggregate, CadenceError>;

    fn bucket_stats(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<BucketedStats, CadenceError>;

    fn windows(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<WindowStat>, CadenceError>;

    fn monthly(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<MonthlyStat>, CadenceError>;

    fn author_stats(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<AuthorStat>, CadenceError>;

    fn failure_rate(
        &self,
        scope: &RepoScope,
        classifier: &FailureClassifier,
    ) -> Result<FailureSummary, CadenceError>;

    fn monthly_failure_rates(
        &self,
        scope: &RepoScope,
        classifier: &FailureClassifier,
    ) -> Result<MonthlyFailureRates, CadenceError>;

    fn active_authors(&self, scope: &RepoScope) -> Result<ActiveAuthorsByMonth, CadenceError>;
}

/// Procedural engine over records held in memory, grouped by scope.
///
/// Record order within a scope is kept as inserted, so history-traversal
/// order from a git walk survives for [`OrderingRule::Traversal`].
///
/// # Examples
///
/// ```
/// use cadence_core::{CommitRecord, RepoScope};
/// use cadence_metrics::engine::{InMemoryEngine, MetricSettings, MetricsEngine};
///
/// let scope: RepoScope = "local:demo".parse().unwrap();
/// let engine = InMemoryEngine::with_records(
///     scope.clone(),
///     vec![
///         CommitRecord::new("a", "a@x.com", 0, "init"),
///         CommitRecord::new("b", "a@x.com", 120, "fix typo"),
///     ],
/// )
/// .unwrap();
///
/// let overall = engine.overall(&scope, &MetricSettings::default()).unwrap();
/// assert_eq!(overall.count, 1);
/// assert_eq!(overall.sum, Some(2.0));
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryEngine {
    scopes: HashMap<RepoScope, Vec<CommitRecord>>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine holding one scope.
    ///
    /// # Errors
    ///
    /// See [`InMemoryEngine::insert`].
    pub fn with_records(scope: RepoScope, records: Vec<CommitRecord>) -> Result<Self, CadenceError> {
        let mut engine = Self::new();
        engine.insert(scope, records)?;
        Ok(engine)
    }

    /// Replace the records of `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`CadenceError::InvalidInput`] for empty or duplicate shas and
    /// empty author emails.
    pub fn insert(&mut self, scope: RepoScope, records: Vec<CommitRecord>) -> Result<(), CadenceError> {
        check_records(&records)?;
        self.scopes.insert(scope, records);
        Ok(())
    }

    /// Records of `scope`, empty when the scope is unknown.
    pub fn records(&self, scope: &RepoScope) -> &[CommitRecord] {
        self.scopes.get(scope).map(Vec::as_slice).unwrap_or(&[])
    }

    fn sorted_deltas(&self, scope: &RepoScope, settings: &MetricSettings) -> DeltaSet {
        extract_deltas(scope, self.records(scope), settings.ordering)
    }
}

impl MetricsEngine for InMemoryEngine {
    fn name(&self) -> &str {
        "memory"
    }

    fn deltas(&self, scope: &RepoScope, ordering: OrderingRule) -> Result<DeltaSet, CadenceError> {
        Ok(extract_deltas(scope, self.records(scope), ordering))
    }

    fn overall(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Aggregate, CadenceError> {
        let set = self.sorted_deltas(scope, settings);
        let values: Vec<i64> = set.iter().map(|d| d.centiminutes()).collect();
        Ok(Aggregate::from_centiminutes(&values))
    }

    fn bucket_stats(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<BucketedStats, CadenceError> {
        Ok(bucket_stats(&self.sorted_deltas(scope, settings), &settings.buckets))
    }

    fn windows(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<WindowStat>, CadenceError> {
        fixed_windows(&self.sorted_deltas(scope, settings), settings.window_size)
    }

    fn monthly(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<MonthlyStat>, CadenceError> {
        Ok(monthly_stats(&self.sorted_deltas(scope, settings)))
    }

    fn author_stats(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<AuthorStat>, CadenceError> {
        Ok(author_stats(&self.sorted_deltas(scope, settings)))
    }

    fn failure_rate(
        &self,
        scope: &RepoScope,
        classifier: &FailureClassifier,
    ) -> Result<FailureSummary, CadenceError> {
        Ok(failure_rate(self.records(scope), classifier))
    }

    fn monthly_failure_rates(
        &self,
        scope: &RepoScope,
        classifier: &FailureClassifier,
    ) -> Result<MonthlyFailureRates, CadenceError> {
        Ok(monthly_failure_rates(self.records(scope), classifier))
    }

    fn active_authors(&self, scope: &RepoScope) -> Result<ActiveAuthorsByMonth, CadenceError> {
        Ok(active_authors(self.records(scope)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scope(name: &str) -> RepoScope {
        RepoScope::new("local", name).unwrap()
    }

    #[test]
    fn settings_compare_by_report_precision() {
        let base = CadenceConfig::default();
        let mut finer = CadenceConfig::default();
        finer.report.spread_decimals = 2;

        let a = MetricSettings::from_config(&base).unwrap();
        let b = MetricSettings::from_config(&finer).unwrap();
        assert_eq!(a, MetricSettings::from_config(&base).unwrap());
        assert_ne!(a, b);
        assert_eq!(b.report, finer.report);
    }

    #[test]
    fn scopes_are_isolated() {
        let mut engine = InMemoryEngine::new();
        engine
            .insert(
                scope("one"),
                vec![
                    CommitRecord::new("a", "a@x.com", 0, "m"),
                    CommitRecord::new("b", "a@x.com", 60, "m"),
                ],
            )
            .unwrap();
        engine
            .insert(scope("two"), vec![CommitRecord::new("c", "a@x.com", 0, "m")])
            .unwrap();

        let settings = MetricSettings::default();
        assert_eq!(engine.overall(&scope("one"), &settings).unwrap().count, 1);
        assert_eq!(engine.overall(&scope("two"), &settings).unwrap().count, 0);
        assert!(engine
            .deltas(&scope("three"), OrderingRule::CommitDateSha)
            .unwrap()
            .is_empty_scope());
    }

    #[test]
    fn duplicate_shas_are_rejected() {
        let records = vec![
            CommitRecord::new("a", "a@x.com", 0, "m"),
            CommitRecord::new("a", "b@x.com", 60, "m"),
        ];
        assert!(matches!(
            InMemoryEngine::with_records(scope("dup"), records),
            Err(CadenceError::InvalidInput(_))
        ));
    }

    #[test]
    fn settings_follow_config() {
        let mut config = CadenceConfig::default();
        config.cycle_time.bucket_boundaries = vec![0.0, 120.0];
        config.cycle_time.window_size = 7;
        config.change_failure.keywords = vec!["Rollback".into()];
        let settings = MetricSettings::from_config(&config).unwrap();
        assert_eq!(settings.buckets.boundaries(), &[0.0, 120.0]);
        assert_eq!(settings.window_size, 7);
        assert_eq!(settings.classifier.keywords(), ["rollback"]);
    }

    #[test]
    fn settings_reject_bad_boundaries() {
        let mut config = CadenceConfig::default();
        config.cycle_time.bucket_boundaries = vec![10.0, 5.0];
        assert!(MetricSettings::from_config(&config).is_err());
    }

    #[test]
    fn empty_scope_yields_empty_aggregates() {
        let engine = InMemoryEngine::new();
        let s = scope("none");
        let settings = MetricSettings::default();
        let buckets = engine.bucket_stats(&s, &settings).unwrap();
        assert_eq!(buckets.buckets.len(), 4);
        assert!(buckets.buckets.iter().all(|b| b.stats.count == 0));
        assert!(engine.windows(&s, &settings).unwrap().is_empty());
        assert!(engine.monthly(&s, &settings).unwrap().is_empty());
        assert!(engine.author_stats(&s, &settings).unwrap().is_empty());
        assert!(engine
            .failure_rate(&s, &settings.classifier)
            .unwrap()
            .rate
            .is_none());
    }
}
