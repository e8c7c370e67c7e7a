//! Reporting boundary: rounding and rendering of engine results.
//!
//! Engines hand out full-precision aggregates. Everything that leaves the
//! process goes through [`ReportedStat`], which applies the configured
//! rounding once. Undefined fields stay `None`, serialize as `null`, and
//! render as `-`.

use std::fmt;
use std::str::FromStr;

use cadence_core::{CadenceError, OrderingRule, ReportConfig, RepoScope};
use serde::Serialize;

use crate::engine::{MetricSettings, MetricsEngine};
use crate::stats::Aggregate;

/// Round half away from zero to `decimals` places.
///
/// # Examples
///
/// ```
/// use cadence_metrics::report::round_to;
///
/// assert_eq!(round_to(33.335, 2), 33.34);
/// assert_eq!(round_to(47.1428, 0), 47.0);
/// assert_eq!(round_to(50.0025, 2), 50.0);
/// ```
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// An [`Aggregate`] rounded for output.
///
/// # Examples
///
/// ```
/// use cadence_core::ReportConfig;
/// use cadence_metrics::report::ReportedStat;
/// use cadence_metrics::stats::Aggregate;
///
/// let agg = Aggregate::from_centiminutes(&[0, 6667]);
/// let reported = ReportedStat::new(&agg, &ReportConfig::default());
/// assert_eq!(reported.sum, Some(66.67));
/// assert_eq!(reported.mean, Some(33.34));
/// assert_eq!(reported.p75, Some(50.0));
/// assert_eq!(reported.stdev, Some(47.0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportedStat {
    pub count: usize,
    pub sum: Option<f64>,
    pub mean: Option<f64>,
    pub p75: Option<f64>,
    pub stdev: Option<f64>,
}

impl ReportedStat {
    pub fn new(aggregate: &Aggregate, config: &ReportConfig) -> Self {
        let minutes = |v: Option<f64>| v.map(|x| round_to(x, config.minute_decimals));
        let spread = |v: Option<f64>| v.map(|x| round_to(x, config.spread_decimals));
        Self {
            count: aggregate.count,
            sum: minutes(aggregate.sum),
            mean: minutes(aggregate.mean),
            p75: spread(aggregate.p75),
            stdev: spread(aggregate.stdev),
        }
    }

    /// Named numeric fields, in output order.
    pub fn fields(&self) -> [(&'static str, Option<f64>); 5] {
        [
            ("count", Some(self.count as f64)),
            ("sum", self.sum),
            ("mean", self.mean),
            ("p75", self.p75),
            ("stdev", self.stdev),
        ]
    }
}

/// Failure rate as a percentage with one decimal.
pub fn rate_percent(rate: Option<f64>) -> Option<f64> {
    rate.map(|r| round_to(r * 100.0, 1))
}

/// Which cycle-time views to include in a report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTimeView {
    Deltas,
    #[default]
    Buckets,
    Windows,
    Months,
    Authors,
    /// Monthly p75 and stdev in days, for plotting.
    Chart,
    All,
}

impl CycleTimeView {
    fn shows(self, view: CycleTimeView) -> bool {
        self == CycleTimeView::All || self == view
    }
}

impl fmt::Display for CycleTimeView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CycleTimeView::Deltas => "deltas",
            CycleTimeView::Buckets => "buckets",
            CycleTimeView::Windows => "windows",
            CycleTimeView::Months => "months",
            CycleTimeView::Authors => "authors",
            CycleTimeView::Chart => "chart",
            CycleTimeView::All => "all",
        };
        f.write_str(name)
    }
}

impl FromStr for CycleTimeView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "deltas" => Ok(CycleTimeView::Deltas),
            "buckets" => Ok(CycleTimeView::Buckets),
            "windows" => Ok(CycleTimeView::Windows),
            "months" | "monthly" => Ok(CycleTimeView::Months),
            "authors" => Ok(CycleTimeView::Authors),
            "chart" => Ok(CycleTimeView::Chart),
            "all" => Ok(CycleTimeView::All),
            other => Err(format!("unknown cycle-time view: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRow {
    pub author_email: String,
    pub older_sha: String,
    pub newer_sha: String,
    pub minutes: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketRow {
    pub bucket: String,
    #[serde(flatten)]
    pub stats: ReportedStat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRow {
    pub index: usize,
    pub month: Option<String>,
    #[serde(flatten)]
    pub stats: ReportedStat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthRow {
    pub month: String,
    #[serde(flatten)]
    pub stats: ReportedStat,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorRow {
    pub author_email: String,
    #[serde(flatten)]
    pub stats: ReportedStat,
}

/// One plotted month: reported p75 and stdev converted from minutes to days.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPoint {
    pub month: String,
    pub p75_days: f64,
    pub stdev_days: f64,
}

const MINUTES_PER_DAY: f64 = 1440.0;

/// Chart series from monthly rows.
///
/// Months with fewer than two deltas have no deviation and are left out.
/// The day values derive from the already rounded minute values.
///
/// # Examples
///
/// ```
/// use cadence_core::ReportConfig;
/// use cadence_metrics::report::{chart_points, MonthRow, ReportedStat};
/// use cadence_metrics::stats::Aggregate;
///
/// let cfg = ReportConfig::default();
/// let rows = vec![
///     MonthRow {
///         month: "2024-01".into(),
///         stats: ReportedStat::new(&Aggregate::from_centiminutes(&[0, 288_000]), &cfg),
///     },
///     MonthRow {
///         month: "2024-02".into(),
///         stats: ReportedStat::new(&Aggregate::from_centiminutes(&[6_000]), &cfg),
///     },
/// ];
/// let points = chart_points(&rows);
/// assert_eq!(points.len(), 1);
/// assert_eq!(points[0].p75_days, 1.5);
/// ```
pub fn chart_points(months: &[MonthRow]) -> Vec<ChartPoint> {
    months
        .iter()
        .filter_map(|m| match (m.stats.p75, m.stats.stdev) {
            (Some(p75), Some(stdev)) => Some(ChartPoint {
                month: m.month.clone(),
                p75_days: p75 / MINUTES_PER_DAY,
                stdev_days: stdev / MINUTES_PER_DAY,
            }),
            _ => None,
        })
        .collect()
}

/// Cycle-time results for one scope, ready for output.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleTimeReport {
    pub engine: String,
    pub scope: RepoScope,
    pub ordering: OrderingRule,
    pub records_seen: usize,
    pub skipped: usize,
    pub negative_deltas: usize,
    pub overall: ReportedStat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deltas: Option<Vec<DeltaRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub buckets: Option<Vec<BucketRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below_range: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub windows: Option<Vec<WindowRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<MonthRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<AuthorRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<Vec<ChartPoint>>,
}

/// Run the cycle-time operations selected by `view` on `engine`.
///
/// # Errors
///
/// Propagates engine errors.
pub fn cycle_time_report(
    engine: &dyn MetricsEngine,
    scope: &RepoScope,
    settings: &MetricSettings,
    view: CycleTimeView,
) -> Result<CycleTimeReport, CadenceError> {
    let cfg = &settings.report;
    let set = engine.deltas(scope, settings.ordering)?;
    let overall = ReportedStat::new(&engine.overall(scope, settings)?, cfg);

    let deltas = view.shows(CycleTimeView::Deltas).then(|| {
        set.iter()
            .map(|d| DeltaRow {
                author_email: d.author_email.clone(),
                older_sha: d.older_sha.clone(),
                newer_sha: d.newer_sha.clone(),
                minutes: d.reported_minutes(),
            })
            .collect()
    });

    let (buckets, below_range) = if view.shows(CycleTimeView::Buckets) {
        let stats = engine.bucket_stats(scope, settings)?;
        let rows = stats
            .buckets
            .iter()
            .map(|b| BucketRow {
                bucket: b.range.to_string(),
                stats: ReportedStat::new(&b.stats, cfg),
            })
            .collect();
        (Some(rows), Some(stats.below_range))
    } else {
        (None, None)
    };

    let windows = if view.shows(CycleTimeView::Windows) {
        Some(
            engine
                .windows(scope, settings)?
                .into_iter()
                .map(|w| WindowRow {
                    index: w.index,
                    month: w.month,
                    stats: ReportedStat::new(&w.stats, cfg),
                })
                .collect(),
        )
    } else {
        None
    };

    let month_rows = if view.shows(CycleTimeView::Months) || view.shows(CycleTimeView::Chart) {
        let rows: Vec<MonthRow> = engine
            .monthly(scope, settings)?
            .into_iter()
            .map(|m| MonthRow {
                month: m.month,
                stats: ReportedStat::new(&m.stats, cfg),
            })
            .collect();
        Some(rows)
    } else {
        None
    };
    let chart = month_rows
        .as_deref()
        .filter(|_| view.shows(CycleTimeView::Chart))
        .map(chart_points);
    let months = month_rows.filter(|_| view.shows(CycleTimeView::Months));

    let authors = if view.shows(CycleTimeView::Authors) {
        Some(
            engine
                .author_stats(scope, settings)?
                .into_iter()
                .map(|a| AuthorRow {
                    author_email: a.author_email,
                    stats: ReportedStat::new(&a.stats, cfg),
                })
                .collect(),
        )
    } else {
        None
    };

    Ok(CycleTimeReport {
        engine: engine.name().to_string(),
        scope: scope.clone(),
        ordering: set.ordering,
        records_seen: set.records_seen,
        skipped: set.skipped.len(),
        negative_deltas: set.negative_deltas,
        overall,
        deltas,
        buckets,
        below_range,
        windows,
        months,
        authors,
        chart,
    })
}

fn cell(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) => format!("{v:.decimals$}"),
        None => "-".to_string(),
    }
}

/// Text and markdown cells for one stat, in `fields()` order.
fn stat_cells(stat: &ReportedStat, cfg: &ReportConfig) -> [String; 5] {
    let m = cfg.minute_decimals as usize;
    let s = cfg.spread_decimals as usize;
    [
        stat.count.to_string(),
        cell(stat.sum, m),
        cell(stat.mean, m),
        cell(stat.p75, s),
        cell(stat.stdev, s),
    ]
}

impl CycleTimeReport {
    fn status_line(&self) -> String {
        if self.records_seen == 0 {
            return "no commits in scope".to_string();
        }
        let mut line = format!(
            "{} commits, {} skipped (no date)",
            self.records_seen, self.skipped
        );
        if self.negative_deltas > 0 {
            line.push_str(&format!(", {} negative deltas", self.negative_deltas));
        }
        line
    }

    /// Labelled stat tables in output order.
    fn tables(&self) -> Vec<(&'static str, &'static str, Vec<(String, ReportedStat)>)> {
        let mut tables = vec![(
            "Overall",
            "Scope",
            vec![(self.scope.to_string(), self.overall)],
        )];
        if let Some(rows) = &self.buckets {
            tables.push((
                "Magnitude buckets (minutes)",
                "Bucket",
                rows.iter().map(|r| (r.bucket.clone(), r.stats)).collect(),
            ));
        }
        if let Some(rows) = &self.windows {
            tables.push((
                "Windows",
                "Window",
                rows.iter()
                    .map(|r| {
                        let month = r.month.as_deref().unwrap_or("-");
                        (format!("#{} {month}", r.index), r.stats)
                    })
                    .collect(),
            ));
        }
        if let Some(rows) = &self.months {
            tables.push((
                "Months",
                "Month",
                rows.iter().map(|r| (r.month.clone(), r.stats)).collect(),
            ));
        }
        if let Some(rows) = &self.authors {
            tables.push((
                "Authors",
                "Author",
                rows.iter().map(|r| (r.author_email.clone(), r.stats)).collect(),
            ));
        }
        tables
    }

    /// Render with explicit rounding for the text cells.
    pub fn to_text(&self, cfg: &ReportConfig) -> String {
        let mut out = format!(
            "Cycle time for {} ({}, {} engine)\n{}\n",
            self.scope,
            self.ordering,
            self.engine,
            self.status_line()
        );

        for (title, label, rows) in self.tables() {
            out.push_str(&format!("\n{title}\n"));
            out.push_str(&format!(
                "  {label:<28} {:>7} {:>12} {:>10} {:>8} {:>8}\n",
                "count", "sum", "mean", "p75", "stdev"
            ));
            for (key, stat) in rows {
                let [count, sum, mean, p75, stdev] = stat_cells(&stat, cfg);
                out.push_str(&format!(
                    "  {key:<28} {count:>7} {sum:>12} {mean:>10} {p75:>8} {stdev:>8}\n"
                ));
            }
        }

        if let Some(below) = self.below_range.filter(|&n| n > 0) {
            out.push_str(&format!("\n{below} deltas below the first bucket\n"));
        }

        if let Some(points) = &self.chart {
            out.push_str("\nChart (days)\n");
            out.push_str(&format!("  {:<10} {:>10} {:>10}\n", "month", "p75", "stdev"));
            for p in points {
                out.push_str(&format!(
                    "  {:<10} {:>10.4} {:>10.4}\n",
                    p.month, p.p75_days, p.stdev_days
                ));
            }
        }

        if let Some(deltas) = &self.deltas {
            out.push_str(&format!("\nDeltas ({})\n", deltas.len()));
            for d in deltas {
                out.push_str(&format!(
                    "  {:<28} {} -> {} {:>10.2}\n",
                    d.author_email,
                    short_sha(&d.older_sha),
                    short_sha(&d.newer_sha),
                    d.minutes
                ));
            }
        }
        out
    }

    /// Render the report as a markdown string.
    pub fn to_markdown(&self, cfg: &ReportConfig) -> String {
        let mut out = format!("# Cycle Time: `{}`\n\n", self.scope);
        out.push_str(&format!(
            "**Ordering:** {} | **Engine:** {} | {}\n\n",
            self.ordering,
            self.engine,
            self.status_line()
        ));

        for (title, label, rows) in self.tables() {
            out.push_str(&format!("## {title}\n\n"));
            out.push_str(&format!("| {label} | Count | Sum | Mean | P75 | Stdev |\n"));
            out.push_str("|---|---:|---:|---:|---:|---:|\n");
            for (key, stat) in rows {
                let [count, sum, mean, p75, stdev] = stat_cells(&stat, cfg);
                out.push_str(&format!(
                    "| {key} | {count} | {sum} | {mean} | {p75} | {stdev} |\n"
                ));
            }
            out.push('\n');
        }

        if let Some(points) = &self.chart {
            out.push_str("## Chart (days)\n\n| Month | P75 | Stdev |\n|---|---:|---:|\n");
            for p in points {
                out.push_str(&format!(
                    "| {} | {:.4} | {:.4} |\n",
                    p.month, p.p75_days, p.stdev_days
                ));
            }
            out.push('\n');
        }

        if let Some(deltas) = &self.deltas {
            out.push_str("## Deltas\n\n| Author | Older | Newer | Minutes |\n|---|---|---|---:|\n");
            for d in deltas {
                out.push_str(&format!(
                    "| {} | `{}` | `{}` | {:.2} |\n",
                    d.author_email,
                    short_sha(&d.older_sha),
                    short_sha(&d.newer_sha),
                    d.minutes
                ));
            }
        }
        out
    }
}

fn short_sha(sha: &str) -> &str {
    sha.get(..7).unwrap_or(sha)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureMonthRow {
    pub month: String,
    pub total: usize,
    pub failures: usize,
    pub rate_percent: Option<f64>,
}

/// Change-failure results for one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureReport {
    pub engine: String,
    pub scope: RepoScope,
    pub total: usize,
    pub failures: usize,
    /// `None` when the scope has no commits.
    pub rate_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub months: Option<Vec<FailureMonthRow>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub undated: Option<usize>,
}

/// Compute the change-failure report, optionally broken down by month.
///
/// # Errors
///
/// Propagates engine errors.
pub fn failure_report(
    engine: &dyn MetricsEngine,
    scope: &RepoScope,
    settings: &MetricSettings,
    monthly: bool,
) -> Result<FailureReport, CadenceError> {
    let summary = engine.failure_rate(scope, &settings.classifier)?;
    let (months, undated) = if monthly {
        let rates = engine.monthly_failure_rates(scope, &settings.classifier)?;
        let rows = rates
            .months
            .into_iter()
            .map(|m| FailureMonthRow {
                month: m.month,
                total: m.summary.total,
                failures: m.summary.failures,
                rate_percent: rate_percent(m.summary.rate),
            })
            .collect();
        (Some(rows), Some(rates.undated))
    } else {
        (None, None)
    };

    Ok(FailureReport {
        engine: engine.name().to_string(),
        scope: scope.clone(),
        total: summary.total,
        failures: summary.failures,
        rate_percent: rate_percent(summary.rate),
        months,
        undated,
    })
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Change-failure rate for {} ({} engine)", self.scope, self.engine)?;
        match self.rate_percent {
            Some(rate) => writeln!(
                f,
                "  {} of {} commits failure-inducing: {rate:.1}%",
                self.failures, self.total
            )?,
            None => writeln!(f, "  no commits in scope")?,
        }
        if let Some(months) = &self.months {
            writeln!(f, "\n  {:<10} {:>7} {:>9} {:>7}", "month", "commits", "failures", "rate")?;
            for m in months {
                let rate = m
                    .rate_percent
                    .map_or_else(|| "-".to_string(), |r| format!("{r:.1}%"));
                writeln!(f, "  {:<10} {:>7} {:>9} {:>7}", m.month, m.total, m.failures, rate)?;
            }
        }
        if let Some(undated) = self.undated.filter(|&n| n > 0) {
            writeln!(f, "\n  {undated} commits without a date left out of the monthly view")?;
        }
        Ok(())
    }
}

impl FailureReport {
    /// Render the report as a markdown string.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Change-Failure Rate: `{}`\n\n", self.scope);
        match self.rate_percent {
            Some(rate) => out.push_str(&format!(
                "**Rate:** {rate:.1}% ({} of {} commits)\n\n",
                self.failures, self.total
            )),
            None => out.push_str("**Rate:** no data (no commits in scope)\n\n"),
        }
        if let Some(months) = &self.months {
            out.push_str("| Month | Commits | Failures | Rate |\n|---|---:|---:|---:|\n");
            for m in months {
                out.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    m.month,
                    m.total,
                    m.failures,
                    cell(m.rate_percent, 1)
                ));
            }
        }
        out
    }
}

/// Active-author counts for one scope.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAuthorsReport {
    pub engine: String,
    pub scope: RepoScope,
    pub months: Vec<crate::authors::ActiveAuthors>,
    pub undated: usize,
}

/// # Errors
///
/// Propagates engine errors.
pub fn active_authors_report(
    engine: &dyn MetricsEngine,
    scope: &RepoScope,
) -> Result<ActiveAuthorsReport, CadenceError> {
    let active = engine.active_authors(scope)?;
    Ok(ActiveAuthorsReport {
        engine: engine.name().to_string(),
        scope: scope.clone(),
        months: active.months,
        undated: active.undated,
    })
}

impl fmt::Display for ActiveAuthorsReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Active authors for {} ({} engine)", self.scope, self.engine)?;
        if self.months.is_empty() {
            writeln!(f, "  no dated commits in scope")?;
        }
        for m in &self.months {
            writeln!(f, "  {:<10} {:>5}", m.month, m.authors)?;
        }
        if self.undated > 0 {
            writeln!(f, "\n  {} commits without a date", self.undated)?;
        }
        Ok(())
    }
}

impl ActiveAuthorsReport {
    /// Render the report as a markdown string.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# Active Authors: `{}`\n\n", self.scope);
        out.push_str("| Month | Authors |\n|---|---:|\n");
        for m in &self.months {
            out.push_str(&format!("| {} | {} |\n", m.month, m.authors));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::InMemoryEngine;
    use cadence_core::CommitRecord;

    fn worked_example() -> (InMemoryEngine, RepoScope) {
        let scope: RepoScope = "local:test".parse().unwrap();
        let mut engine = InMemoryEngine::new();
        engine
            .insert(
                scope.clone(),
                vec![
                    CommitRecord::new("b", "a@x.com", 1000, "feature"),
                    CommitRecord::new("a", "a@x.com", 1000, "revert: oops"),
                    CommitRecord::new("c", "a@x.com", 5000, "docs"),
                ],
            )
            .unwrap();
        (engine, scope)
    }

    fn settings() -> MetricSettings {
        MetricSettings {
            buckets: crate::buckets::MagnitudeBuckets::new(vec![0.0, 120.0]).unwrap(),
            ..MetricSettings::default()
        }
    }

    #[test]
    fn round_to_is_half_away_from_zero() {
        assert_eq!(round_to(0.125, 2), 0.13);
        assert_eq!(round_to(-2.5, 0), -3.0);
        assert_eq!(round_to(66.6666, 2), 66.67);
    }

    #[test]
    fn reported_stat_keeps_undefined_fields() {
        let reported = ReportedStat::new(&Aggregate::from_centiminutes(&[]), &ReportConfig::default());
        assert_eq!(reported.count, 0);
        assert!(reported.sum.is_none());
        let json = serde_json::to_value(reported).unwrap();
        assert!(json["mean"].is_null());
    }

    #[test]
    fn worked_example_through_the_reporting_boundary() {
        let (engine, scope) = worked_example();
        let report =
            cycle_time_report(&engine, &scope, &settings(), CycleTimeView::All).unwrap();

        let buckets = report.buckets.as_ref().unwrap();
        assert_eq!(buckets[0].bucket, "[0, 120)");
        let b = buckets[0].stats;
        assert_eq!(b.count, 2);
        assert_eq!(b.sum, Some(66.67));
        assert_eq!(b.mean, Some(33.34));
        assert_eq!(b.p75, Some(50.0));
        assert_eq!(b.stdev, Some(47.0));

        let precise = ReportConfig {
            minute_decimals: 2,
            spread_decimals: 2,
        };
        let agg = engine.bucket_stats(&scope, &settings()).unwrap().buckets[0].stats;
        let b = ReportedStat::new(&agg, &precise);
        assert_eq!(b.p75, Some(50.0));
        assert_eq!(b.stdev, Some(47.14));

        let deltas = report.deltas.as_ref().unwrap();
        assert_eq!(deltas.len(), 2);
        assert_eq!(deltas[0].minutes, 0.0);
        assert_eq!(deltas[1].minutes, 66.67);
    }

    #[test]
    fn chart_view_converts_monthly_spread_to_days() {
        // 2024-01-15 12:00 UTC, far from any month edge in every zone.
        let base = 1_705_320_000;
        let scope: RepoScope = "local:chart".parse().unwrap();
        let mut engine = InMemoryEngine::new();
        engine
            .insert(
                scope.clone(),
                vec![
                    CommitRecord::new("a", "a@x.com", base, "m"),
                    CommitRecord::new("b", "a@x.com", base + 3_600, "m"),
                    CommitRecord::new("c", "a@x.com", base + 5 * 3_600, "m"),
                    CommitRecord::new("d", "b@x.com", base, "m"),
                ],
            )
            .unwrap();

        let report =
            cycle_time_report(&engine, &scope, &MetricSettings::default(), CycleTimeView::Chart)
                .unwrap();
        assert!(report.months.is_none());
        let chart = report.chart.as_ref().unwrap();
        assert_eq!(chart.len(), 1);
        // Deltas of 60 and 240 minutes: p75 = 195, stdev = 127.28 -> 127.
        assert_eq!(chart[0].p75_days, 195.0 / 1440.0);
        assert_eq!(chart[0].stdev_days, 127.0 / 1440.0);
        assert!(report.to_markdown(&ReportConfig::default()).contains("## Chart (days)"));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["chart"][0]["p75Days"].is_number());
    }

    #[test]
    fn chart_skips_months_without_a_deviation() {
        let cfg = ReportConfig::default();
        let rows = vec![MonthRow {
            month: "2024-03".into(),
            stats: ReportedStat::new(&Aggregate::from_centiminutes(&[6_000]), &cfg),
        }];
        assert!(chart_points(&rows).is_empty());
    }

    #[test]
    fn json_uses_camel_case_and_null() {
        let (engine, scope) = worked_example();
        let report =
            cycle_time_report(&engine, &scope, &settings(), CycleTimeView::Buckets).unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["recordsSeen"], 3);
        assert_eq!(json["belowRange"], 0);
        assert!(json["buckets"][1]["mean"].is_null());
        assert_eq!(json["buckets"][1]["count"], 0);
        assert!(json.get("deltas").is_none());
    }

    #[test]
    fn text_renders_undefined_as_dash() {
        let (engine, scope) = worked_example();
        let cfg = ReportConfig::default();
        let report =
            cycle_time_report(&engine, &scope, &settings(), CycleTimeView::Buckets).unwrap();
        let text = report.to_text(&cfg);
        assert!(text.contains("[0, 120)"));
        assert!(text.contains("33.34"));
        assert!(text.contains("[120, +inf)"));
        assert!(text.contains(" -"));

        let md = report.to_markdown(&cfg);
        assert!(md.contains("# Cycle Time: `local:test`"));
        assert!(md.contains("| [0, 120) | 2 | 66.67 | 33.34 | 50 | 47 |"));
    }

    #[test]
    fn empty_scope_report_says_so() {
        let engine = InMemoryEngine::new();
        let scope: RepoScope = "local:nothing".parse().unwrap();
        let report =
            cycle_time_report(&engine, &scope, &settings(), CycleTimeView::Buckets).unwrap();
        assert_eq!(report.records_seen, 0);
        assert!(report.to_text(&ReportConfig::default()).contains("no commits in scope"));
    }

    #[test]
    fn failure_report_renders_percentages() {
        let (engine, scope) = worked_example();
        let report = failure_report(&engine, &scope, &settings(), true).unwrap();
        assert_eq!(report.failures, 1);
        assert_eq!(report.rate_percent, Some(33.3));
        assert_eq!(report.undated, Some(0));
        assert!(report.to_string().contains("33.3%"));
        assert!(report.to_markdown().contains("**Rate:** 33.3%"));
    }

    #[test]
    fn failure_report_without_commits_is_no_data() {
        let engine = InMemoryEngine::new();
        let scope: RepoScope = "local:nothing".parse().unwrap();
        let report = failure_report(&engine, &scope, &settings(), false).unwrap();
        assert!(report.rate_percent.is_none());
        let json = serde_json::to_value(&report).unwrap();
        assert!(json["ratePercent"].is_null());
        assert!(report.to_string().contains("no commits in scope"));
    }

    #[test]
    fn view_parses() {
        assert_eq!("all".parse::<CycleTimeView>().unwrap(), CycleTimeView::All);
        assert_eq!("Monthly".parse::<CycleTimeView>().unwrap(), CycleTimeView::Months);
        assert!("weekly".parse::<CycleTimeView>().is_err());
        assert_eq!(CycleTimeView::default(), CycleTimeView::Buckets);
    }
}
