//! The SQLite engine must agree with the in-memory engine on every reported
//! value.

use cadence_core::{CadenceError, CommitRecord, RepoScope, MAX_COMMITTED_DATE, MIN_COMMITTED_DATE};
use cadence_lake::CommitLake;
use cadence_metrics::buckets::MagnitudeBuckets;
use cadence_metrics::engine::{InMemoryEngine, MetricSettings, MetricsEngine};
use cadence_metrics::parity::compare;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

fn scope() -> RepoScope {
    "local:parity".parse().unwrap()
}

fn engines(records: &[CommitRecord]) -> (InMemoryEngine, CommitLake) {
    let memory = InMemoryEngine::with_records(scope(), records.to_vec()).unwrap();
    let mut lake = CommitLake::in_memory().unwrap();
    lake.replace_scope(&scope(), records).unwrap();
    (memory, lake)
}

fn assert_parity(records: &[CommitRecord], settings: &MetricSettings) {
    let (memory, lake) = engines(records);
    let report = compare(&memory, &lake, &scope(), settings).unwrap();
    assert!(report.is_match(), "{report}");
    assert!(report.checked > 0);
}

fn ts(y: i32, m: u32, d: u32, h: u32, min: u32) -> i64 {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap().timestamp()
}

#[test]
fn worked_example_agrees() {
    let records = vec![
        CommitRecord::new("b", "a@x.com", 1000, "feature"),
        CommitRecord::new("a", "a@x.com", 1000, "revert: oops"),
        CommitRecord::new("c", "a@x.com", 5000, "docs"),
    ];
    let settings = MetricSettings {
        buckets: MagnitudeBuckets::new(vec![0.0, 120.0]).unwrap(),
        ..MetricSettings::default()
    };
    assert_parity(&records, &settings);
}

#[test]
fn ties_undated_records_and_many_months_agree() {
    let mut records = vec![
        CommitRecord::new("f00d", "amy@x.com", ts(2024, 1, 31, 23, 59), "init"),
        CommitRecord::new("beef", "amy@x.com", ts(2024, 1, 31, 23, 59), "fix: typo"),
        CommitRecord::new("cafe", "amy@x.com", ts(2024, 2, 1, 0, 1), "Revert \"typo\""),
        CommitRecord::new("0001", "bob@x.com", ts(2024, 2, 14, 9, 0), "feature"),
        CommitRecord::new("0002", "bob@x.com", ts(2024, 3, 2, 17, 30), "HOTFIX login"),
        CommitRecord::new("0003", "bob@x.com", ts(2024, 3, 2, 17, 31), "docs"),
        CommitRecord::new("0004", "cat@x.com", ts(2024, 5, 5, 5, 5), "solo"),
    ];
    records.push(CommitRecord {
        sha: "dead".into(),
        author_email: "amy@x.com".into(),
        committed_date: None,
        message: Some("bugfix".into()),
    });
    records.push(CommitRecord {
        sha: "0005".into(),
        author_email: "bob@x.com".into(),
        committed_date: Some(ts(2024, 6, 1, 12, 0)),
        message: None,
    });

    let settings = MetricSettings {
        window_size: 3,
        ..MetricSettings::default()
    };
    assert_parity(&records, &settings);
}

#[test]
fn empty_scope_agrees() {
    let memory = InMemoryEngine::new();
    let lake = CommitLake::in_memory().unwrap();
    let report = compare(&memory, &lake, &scope(), &MetricSettings::default()).unwrap();
    assert!(report.is_match(), "{report}");
}

#[test]
fn stored_records_feed_the_in_memory_engine() {
    let records = vec![
        CommitRecord::new("a", "a@x.com", 0, "m"),
        CommitRecord::new("b", "a@x.com", 90, "m"),
        CommitRecord::new("c", "b@x.com", 30, "m"),
    ];
    let mut lake = CommitLake::in_memory().unwrap();
    lake.replace_scope(&scope(), &records).unwrap();

    let loaded = lake.load_scope(&scope()).unwrap();
    let memory = InMemoryEngine::with_records(scope(), loaded).unwrap();
    let report = compare(&memory, &lake, &scope(), &MetricSettings::default()).unwrap();
    assert!(report.is_match(), "{report}");
}

#[test]
fn different_scopes_do_not_leak() {
    let mut lake = CommitLake::in_memory().unwrap();
    let other: RepoScope = "github:acme/other".parse().unwrap();
    lake.replace_scope(
        &other,
        &[
            CommitRecord::new("x", "a@x.com", 0, "fix"),
            CommitRecord::new("y", "a@x.com", 60, "fix"),
        ],
    )
    .unwrap();
    lake.replace_scope(&scope(), &[CommitRecord::new("z", "a@x.com", 0, "m")])
        .unwrap();

    let overall = lake.overall(&scope(), &MetricSettings::default()).unwrap();
    assert_eq!(overall.count, 0);
    let failure = lake
        .failure_rate(&scope(), &MetricSettings::default().classifier)
        .unwrap();
    assert_eq!((failure.total, failure.failures), (1, 0));
}

#[test]
fn dates_past_year_9999_are_rejected_by_both_engines() {
    let records = vec![
        CommitRecord::new("a", "a@x.com", 568_000_000_000, "m"),
        CommitRecord::new("b", "a@x.com", 568_000_003_600, "fix"),
    ];
    assert!(matches!(
        InMemoryEngine::with_records(scope(), records.clone()),
        Err(CadenceError::InvalidInput(_))
    ));

    let mut lake = CommitLake::in_memory().unwrap();
    assert!(matches!(
        lake.replace_scope(&scope(), &records),
        Err(CadenceError::InvalidInput(_))
    ));
    assert_eq!(lake.count(&scope()).unwrap(), 0);
}

#[test]
fn extremes_of_the_accepted_range_agree() {
    let records = vec![
        CommitRecord::new("a", "a@x.com", MIN_COMMITTED_DATE, "init"),
        CommitRecord::new("b", "a@x.com", MIN_COMMITTED_DATE + 3_600, "fix"),
        CommitRecord::new("c", "a@x.com", MAX_COMMITTED_DATE - 3_600, "docs"),
        CommitRecord::new("d", "a@x.com", MAX_COMMITTED_DATE, "revert"),
    ];
    assert_parity(&records, &MetricSettings::default());
}

const MESSAGES: [&str; 6] = [
    "add feature",
    "Fix crash",
    "revert previous",
    "docs",
    "refactor",
    "known issue",
];

fn arb_records() -> impl Strategy<Value = Vec<CommitRecord>> {
    prop::collection::vec(
        (
            0usize..4,
            prop::option::weighted(0.9, 0i64..400),
            0usize..MESSAGES.len(),
        ),
        0..60,
    )
    .prop_map(|raw| {
        raw.into_iter()
            .enumerate()
            .map(|(i, (author, step, message))| CommitRecord {
                sha: format!("{:08x}", i.wrapping_mul(2_654_435_761) % 0xffff_ffff),
                author_email: format!("dev{author}@x.com"),
                // Coarse steps make equal timestamps common; the span covers
                // several months.
                committed_date: step.map(|s| 1_700_000_000 + s * 37_013),
                message: Some(MESSAGES[message].to_string()),
            })
            .collect()
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn engines_agree_on_random_histories(records in arb_records(), window in 1usize..8) {
        let settings = MetricSettings {
            window_size: window,
            buckets: MagnitudeBuckets::new(vec![0.0, 600.0, 6000.0]).unwrap(),
            ..MetricSettings::default()
        };
        let (memory, lake) = engines(&records);
        let report = compare(&memory, &lake, &scope(), &settings).unwrap();
        prop_assert!(report.is_match(), "{}", report);
    }
}
