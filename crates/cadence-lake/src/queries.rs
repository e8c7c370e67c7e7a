//! Relational engine: every metric as a declarative query over `commits`.
//!
//! Deltas come from a `LAG()` window partitioned by author and ordered by
//! `(committed_date, sha)`. Aggregates are computed on integer centiminutes
//! and scaled to minutes last, the same operation order as the in-memory
//! engine, so the two agree after reporting.

use cadence_core::{CadenceError, OrderingRule, RepoScope};
use cadence_metrics::authors::{ActiveAuthors, ActiveAuthorsByMonth, AuthorStat};
use cadence_metrics::buckets::{BucketStat, BucketedStats};
use cadence_metrics::delta::{AuthorDeltas, Delta, DeltaSet};
use cadence_metrics::engine::{MetricSettings, MetricsEngine};
use cadence_metrics::failure::{
    FailureClassifier, FailureSummary, MonthlyFailure, MonthlyFailureRates,
};
use cadence_metrics::monthly::MonthlyStat;
use cadence_metrics::stats::Aggregate;
use cadence_metrics::windows::WindowStat;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};

use crate::store::CommitLake;

/// Consecutive pairs per author. Binds `?1` to the scope.
const DELTAS_CTE: &str = "
    ordered AS (
        SELECT author_email, sha, committed_date,
               LAG(sha) OVER author_order AS older_sha,
               LAG(committed_date) OVER author_order AS older_date
        FROM commits
        WHERE scope = ?1 AND committed_date IS NOT NULL
        WINDOW author_order AS (PARTITION BY author_email ORDER BY committed_date, sha)
    ),
    deltas AS (
        SELECT author_email, older_sha, sha AS newer_sha, committed_date,
               committed_date - older_date AS elapsed_seconds,
               (10 * (committed_date - older_date) + 3) / 6 AS centi
        FROM ordered
        WHERE older_sha IS NOT NULL
    )";

/// Aggregates `vals(grp, c)` into `agg(grp, n, sum, mean, p75, stdev)`.
///
/// `c` is in centiminutes. p75 interpolates between the order statistics at
/// `floor(pos) + 1` and `floor(pos) + 2` (1-based), `pos = 0.75 * (n - 1)`.
const AGGREGATE_CTE: &str = "
    summary AS (
        SELECT grp, COUNT(*) AS n, SUM(c) AS total,
               CAST(SUM(c) AS REAL) / COUNT(*) AS mean_c,
               0.75 * (COUNT(*) - 1) AS pos
        FROM vals
        GROUP BY grp
    ),
    ranked AS (
        SELECT grp, c, ROW_NUMBER() OVER (PARTITION BY grp ORDER BY c) AS rn
        FROM vals
    ),
    agg AS (
        SELECT s.grp, s.n,
               s.total / 100.0 AS sum,
               s.mean_c / 100.0 AS mean,
               (lo.c + (COALESCE(hi.c, lo.c) - lo.c) * (s.pos - CAST(s.pos AS INTEGER))) / 100.0
                   AS p75,
               CASE WHEN s.n > 1 THEN
                   cadence_sqrt(
                       (SELECT SUM((v.c - s.mean_c) * (v.c - s.mean_c)) FROM vals v WHERE v.grp = s.grp)
                       / (s.n - 1)
                   ) / 100.0
               END AS stdev
        FROM summary s
        JOIN ranked lo ON lo.grp = s.grp AND lo.rn = CAST(s.pos AS INTEGER) + 1
        LEFT JOIN ranked hi ON hi.grp = s.grp AND hi.rn = CAST(s.pos AS INTEGER) + 2
    )";

/// Classifies each commit of scope `?1`; keywords are bound from `?2` on.
fn classified_cte(keywords: usize) -> String {
    let values = (0..keywords)
        .map(|i| format!("(?{})", i + 2))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "keywords(k) AS (VALUES {values}),
        classified AS (
            SELECT c.author_email,
                   strftime('%Y-%m', c.committed_date, 'unixepoch', 'localtime') AS month,
                   CASE WHEN c.message IS NOT NULL
                         AND EXISTS (SELECT 1 FROM keywords WHERE instr(lower(c.message), k) > 0)
                        THEN 1 ELSE 0 END AS is_failure
            FROM commits c
            WHERE c.scope = ?1
        )"
    )
}

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> CadenceError + '_ {
    move |e| CadenceError::Database(format!("{context}: {e}"))
}

/// Reads `n, sum, mean, p75, stdev` starting at column `first`.
fn aggregate_at(row: &Row<'_>, first: usize) -> rusqlite::Result<Aggregate> {
    let n: i64 = row.get(first)?;
    Ok(Aggregate {
        count: n as usize,
        sum: row.get(first + 1)?,
        mean: row.get(first + 2)?,
        p75: row.get(first + 3)?,
        stdev: row.get(first + 4)?,
    })
}

fn require_date_sha(ordering: OrderingRule) -> Result<(), CadenceError> {
    match ordering {
        OrderingRule::CommitDateSha => Ok(()),
        OrderingRule::Traversal => Err(CadenceError::InvalidInput(
            "the sqlite engine only supports the commit-date-sha ordering; \
             traversal order is not stored"
                .into(),
        )),
    }
}

impl CommitLake {
    fn query_rows<T>(
        &self,
        sql: &str,
        params: impl rusqlite::Params,
        context: &str,
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>, CadenceError> {
        let mut stmt = self.conn.prepare(sql).map_err(db_err(context))?;
        let rows = stmt.query_map(params, map).map_err(db_err(context))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err(context))
    }

    fn count_where(&self, sql: &str, scope: &RepoScope, context: &str) -> Result<usize, CadenceError> {
        self.conn
            .query_row(sql, params![scope.as_str()], |row| row.get::<_, i64>(0))
            .map(|n| n as usize)
            .map_err(db_err(context))
    }

    fn keyword_params(scope: &RepoScope, classifier: &FailureClassifier) -> Vec<Value> {
        std::iter::once(Value::Text(scope.to_string()))
            .chain(classifier.keywords().iter().cloned().map(Value::Text))
            .collect()
    }
}

impl MetricsEngine for CommitLake {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn deltas(&self, scope: &RepoScope, ordering: OrderingRule) -> Result<DeltaSet, CadenceError> {
        require_date_sha(ordering)?;

        let records_seen = self.count_where(
            "SELECT COUNT(*) FROM commits WHERE scope = ?1",
            scope,
            "failed to count records",
        )?;
        let skipped = self.query_rows(
            "SELECT sha FROM commits WHERE scope = ?1 AND committed_date IS NULL ORDER BY sha",
            params![scope.as_str()],
            "failed to list undated records",
            |row| row.get::<_, String>(0),
        )?;
        if !skipped.is_empty() {
            tracing::warn!(
                scope = %scope,
                skipped = skipped.len(),
                "excluded commits without a committed date"
            );
        }

        let mut authors: Vec<AuthorDeltas> = self
            .query_rows(
                "SELECT DISTINCT author_email FROM commits
                 WHERE scope = ?1 AND committed_date IS NOT NULL
                 ORDER BY author_email",
                params![scope.as_str()],
                "failed to list authors",
                |row| {
                    Ok(AuthorDeltas {
                        author_email: row.get(0)?,
                        deltas: Vec::new(),
                    })
                },
            )?;

        let deltas = self.query_rows(
            &format!(
                "WITH {DELTAS_CTE}
                 SELECT author_email, older_sha, newer_sha, committed_date, elapsed_seconds
                 FROM deltas
                 ORDER BY author_email, committed_date, newer_sha"
            ),
            params![scope.as_str()],
            "failed to compute deltas",
            |row| {
                Ok(Delta {
                    author_email: row.get(0)?,
                    older_sha: row.get(1)?,
                    newer_sha: row.get(2)?,
                    committed_date: row.get(3)?,
                    elapsed_seconds: row.get(4)?,
                })
            },
        )?;

        for delta in deltas {
            let slot = authors
                .binary_search_by(|a| a.author_email.as_str().cmp(&delta.author_email))
                .map_err(|_| {
                    CadenceError::Database(format!(
                        "delta {}..{} has no dated author row",
                        delta.older_sha, delta.newer_sha
                    ))
                })?;
            authors[slot].deltas.push(delta);
        }

        let set = DeltaSet {
            scope: scope.clone(),
            ordering,
            records_seen,
            skipped,
            negative_deltas: 0,
            authors,
        };
        tracing::debug!(
            scope = %scope,
            records = set.records_seen,
            deltas = set.delta_count(),
            "queried deltas"
        );
        Ok(set)
    }

    fn overall(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Aggregate, CadenceError> {
        require_date_sha(settings.ordering)?;
        let sql = format!(
            "WITH {DELTAS_CTE},
             vals AS (SELECT 0 AS grp, centi AS c FROM deltas),
             {AGGREGATE_CTE}
             SELECT n, sum, mean, p75, stdev FROM agg"
        );
        let context = "failed to aggregate deltas";
        let row = self
            .conn
            .query_row(&sql, params![scope.as_str()], |row| aggregate_at(row, 0))
            .optional()
            .map_err(db_err(context))?;
        Ok(row.unwrap_or_default())
    }

    fn bucket_stats(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<BucketedStats, CadenceError> {
        require_date_sha(settings.ordering)?;

        let ranges: Vec<_> = settings.buckets.ranges().collect();
        let mut bind = vec![Value::Text(scope.to_string())];
        let mut rows_sql = Vec::with_capacity(ranges.len());
        for (idx, range) in ranges.iter().enumerate() {
            let at = bind.len() + 1;
            rows_sql.push(format!("(?{}, ?{}, ?{})", at, at + 1, at + 2));
            bind.push(Value::Integer(idx as i64));
            bind.push(Value::Real(range.lower));
            bind.push(range.upper.map_or(Value::Null, Value::Real));
        }

        let sql = format!(
            "WITH {DELTAS_CTE},
             bounds(idx, lower, upper) AS (VALUES {}),
             vals AS (
                 SELECT b.idx AS grp, d.centi AS c
                 FROM deltas d
                 JOIN bounds b
                   ON d.centi / 100.0 >= b.lower
                  AND (b.upper IS NULL OR d.centi / 100.0 < b.upper)
             ),
             {AGGREGATE_CTE}
             SELECT b.idx, COALESCE(a.n, 0), a.sum, a.mean, a.p75, a.stdev
             FROM bounds b
             LEFT JOIN agg a ON a.grp = b.idx
             ORDER BY b.idx",
            rows_sql.join(", ")
        );

        let stats = self.query_rows(
            &sql,
            params_from_iter(bind),
            "failed to aggregate buckets",
            |row| aggregate_at(row, 1),
        )?;

        let below_range = self.conn
            .query_row(
                &format!("WITH {DELTAS_CTE} SELECT COUNT(*) FROM deltas WHERE centi / 100.0 < ?2"),
                params![scope.as_str(), settings.buckets.boundaries()[0]],
                |row| row.get::<_, i64>(0),
            )
            .map_err(db_err("failed to count deltas below range"))? as usize;

        Ok(BucketedStats {
            buckets: ranges
                .into_iter()
                .zip(stats)
                .map(|(range, stats)| BucketStat { range, stats })
                .collect(),
            below_range,
        })
    }

    fn windows(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<WindowStat>, CadenceError> {
        require_date_sha(settings.ordering)?;
        if settings.window_size == 0 {
            return Err(CadenceError::InvalidInput(
                "window size must be at least 1".into(),
            ));
        }

        let sql = format!(
            "WITH {DELTAS_CTE},
             numbered AS (
                 SELECT committed_date, centi,
                        (ROW_NUMBER() OVER (ORDER BY committed_date, newer_sha) - 1) / ?2
                            AS window_idx
                 FROM deltas
             ),
             vals AS (SELECT window_idx AS grp, centi AS c FROM numbered),
             {AGGREGATE_CTE}
             SELECT a.grp,
                    strftime('%Y-%m',
                             (SELECT MIN(nb.committed_date) FROM numbered nb
                              WHERE nb.window_idx = a.grp),
                             'unixepoch', 'localtime'),
                    a.n, a.sum, a.mean, a.p75, a.stdev
             FROM agg a
             ORDER BY a.grp"
        );

        self.query_rows(
            &sql,
            params![scope.as_str(), settings.window_size as i64],
            "failed to aggregate windows",
            |row| {
                Ok(WindowStat {
                    index: row.get::<_, i64>(0)? as usize,
                    month: row.get(1)?,
                    stats: aggregate_at(row, 2)?,
                })
            },
        )
    }

    fn monthly(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<MonthlyStat>, CadenceError> {
        require_date_sha(settings.ordering)?;
        let sql = format!(
            "WITH {DELTAS_CTE},
             keyed AS (
                 SELECT strftime('%Y-%m', committed_date, 'unixepoch', 'localtime') AS month, centi
                 FROM deltas
             ),
             vals AS (SELECT month AS grp, centi AS c FROM keyed WHERE month IS NOT NULL),
             {AGGREGATE_CTE}
             SELECT grp, n, sum, mean, p75, stdev FROM agg ORDER BY grp"
        );

        self.query_rows(
            &sql,
            params![scope.as_str()],
            "failed to aggregate months",
            |row| {
                Ok(MonthlyStat {
                    month: row.get(0)?,
                    stats: aggregate_at(row, 1)?,
                })
            },
        )
    }

    fn author_stats(
        &self,
        scope: &RepoScope,
        settings: &MetricSettings,
    ) -> Result<Vec<AuthorStat>, CadenceError> {
        require_date_sha(settings.ordering)?;
        let sql = format!(
            "WITH {DELTAS_CTE},
             dated_authors AS (
                 SELECT DISTINCT author_email FROM commits
                 WHERE scope = ?1 AND committed_date IS NOT NULL
             ),
             vals AS (SELECT author_email AS grp, centi AS c FROM deltas),
             {AGGREGATE_CTE}
             SELECT au.author_email, COALESCE(a.n, 0), a.sum, a.mean, a.p75, a.stdev
             FROM dated_authors au
             LEFT JOIN agg a ON a.grp = au.author_email
             ORDER BY au.author_email"
        );

        self.query_rows(
            &sql,
            params![scope.as_str()],
            "failed to aggregate authors",
            |row| {
                Ok(AuthorStat {
                    author_email: row.get(0)?,
                    stats: aggregate_at(row, 1)?,
                })
            },
        )
    }

    fn failure_rate(
        &self,
        scope: &RepoScope,
        classifier: &FailureClassifier,
    ) -> Result<FailureSummary, CadenceError> {
        let sql = format!(
            "WITH {}
             SELECT COUNT(*),
                    COALESCE(SUM(is_failure), 0),
                    CASE WHEN COUNT(*) > 0
                         THEN CAST(SUM(is_failure) AS REAL) / COUNT(*) END
             FROM classified",
            classified_cte(classifier.keywords().len())
        );

        self.conn
            .query_row(
                &sql,
                params_from_iter(Self::keyword_params(scope, classifier)),
                |row| {
                    Ok(FailureSummary {
                        total: row.get::<_, i64>(0)? as usize,
                        failures: row.get::<_, i64>(1)? as usize,
                        rate: row.get(2)?,
                    })
                },
            )
            .map_err(db_err("failed to compute failure rate"))
    }

    fn monthly_failure_rates(
        &self,
        scope: &RepoScope,
        classifier: &FailureClassifier,
    ) -> Result<MonthlyFailureRates, CadenceError> {
        let cte = classified_cte(classifier.keywords().len());
        let months = self.query_rows(
            &format!(
                "WITH {cte}
                 SELECT month, COUNT(*), SUM(is_failure),
                        CAST(SUM(is_failure) AS REAL) / COUNT(*)
                 FROM classified
                 WHERE month IS NOT NULL
                 GROUP BY month
                 ORDER BY month"
            ),
            params_from_iter(Self::keyword_params(scope, classifier)),
            "failed to compute monthly failure rates",
            |row| {
                Ok(MonthlyFailure {
                    month: row.get(0)?,
                    summary: FailureSummary {
                        total: row.get::<_, i64>(1)? as usize,
                        failures: row.get::<_, i64>(2)? as usize,
                        rate: row.get(3)?,
                    },
                })
            },
        )?;

        let undated = self.count_where(
            "SELECT COUNT(*) FROM commits
             WHERE scope = ?1
               AND strftime('%Y-%m', committed_date, 'unixepoch', 'localtime') IS NULL",
            scope,
            "failed to count undated records",
        )?;

        Ok(MonthlyFailureRates { months, undated })
    }

    fn active_authors(&self, scope: &RepoScope) -> Result<ActiveAuthorsByMonth, CadenceError> {
        let months = self.query_rows(
            "WITH keyed AS (
                 SELECT author_email,
                        strftime('%Y-%m', committed_date, 'unixepoch', 'localtime') AS month
                 FROM commits
                 WHERE scope = ?1
             )
             SELECT month, COUNT(DISTINCT author_email)
             FROM keyed
             WHERE month IS NOT NULL
             GROUP BY month
             ORDER BY month",
            params![scope.as_str()],
            "failed to count active authors",
            |row| {
                Ok(ActiveAuthors {
                    month: row.get(0)?,
                    authors: row.get::<_, i64>(1)? as usize,
                })
            },
        )?;

        let undated = self.count_where(
            "SELECT COUNT(*) FROM commits
             WHERE scope = ?1
               AND strftime('%Y-%m', committed_date, 'unixepoch', 'localtime') IS NULL",
            scope,
            "failed to count undated records",
        )?;

        Ok(ActiveAuthorsByMonth { months, undated })
    }
}
