use std::collections::HashSet;

use chrono::{Duration, NaiveDateTime};
use flightprep::{
    check_temporal_order, parse_cutoff, stratified_sample, stratified_split,
    stratified_train_val_test, temporal_split_by_cutoff, temporal_split_by_fraction,
    DatasetSplits, SplitError, SplitRow, StratifiedSplitConfig, TemporalCutoffSplitConfig,
    TemporalFractionSplitConfig,
};

#[derive(Debug, Clone, PartialEq)]
struct Row {
    id: usize,
    at: NaiveDateTime,
    label: i64,
}

impl SplitRow for Row {
    fn has_class_column(column: &str) -> bool {
        column == "label"
    }

    fn has_time_column(column: &str) -> bool {
        column == "at"
    }

    fn class_value(&self, column: &str) -> Option<i64> {
        (column == "label").then_some(self.label)
    }

    fn time_value(&self, column: &str) -> Option<NaiveDateTime> {
        (column == "at").then_some(self.at)
    }
}

fn base() -> NaiveDateTime {
    NaiveDateTime::parse_from_str("2023-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").expect("valid")
}

/// Row `i` sits `i` hours after the base time.
fn row(id: usize, label: i64) -> Row {
    Row {
        id,
        at: base() + Duration::hours(id as i64),
        label,
    }
}

fn ids(rows: &[Row]) -> Vec<usize> {
    rows.iter().map(|r| r.id).collect()
}

fn fraction_cfg(train_size: f64, val_size: f64) -> TemporalFractionSplitConfig {
    TemporalFractionSplitConfig {
        time_column: "at".to_string(),
        train_size,
        val_size,
    }
}

fn stratified_cfg(test_size: f64, val_size: f64) -> StratifiedSplitConfig {
    StratifiedSplitConfig {
        target_column: "label".to_string(),
        test_size,
        val_size,
        random_seed: 42,
    }
}

/// 1000 rows, the first 800 in class 0 and the last 200 in class 1.
fn imbalanced_rows() -> Vec<Row> {
    (0..1000).map(|i| row(i, i64::from(i >= 800))).collect()
}

fn positive_share(rows: &[Row]) -> f64 {
    rows.iter().filter(|r| r.label == 1).count() as f64 / rows.len() as f64
}

#[test]
fn fraction_split_sorts_and_cuts_at_cumulative_fractions() {
    // Shuffled input; times 1..=10.
    let rows: Vec<Row> = [7, 3, 10, 1, 9, 5, 2, 8, 6, 4]
        .iter()
        .map(|i| row(*i, 0))
        .collect();

    let splits = temporal_split_by_fraction(rows, &fraction_cfg(0.7, 0.1)).expect("split ok");

    assert_eq!(ids(&splits.train), vec![1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(ids(&splits.validation), vec![8]);
    assert_eq!(ids(&splits.test), vec![9, 10]);

    let train_max = splits.train.iter().map(|r| r.at).max().expect("train");
    let val_min = splits.validation.iter().map(|r| r.at).min().expect("val");
    let val_max = splits.validation.iter().map(|r| r.at).max().expect("val");
    let test_min = splits.test.iter().map(|r| r.at).min().expect("test");
    assert!(train_max <= val_min && val_min <= val_max && val_max <= test_min);
    check_temporal_order(&splits, "at").expect("ordered");
}

#[test]
fn fraction_split_allows_duplicate_boundary_timestamps() {
    let mut rows: Vec<Row> = (0..4).map(|i| row(i, 0)).collect();
    // Two rows share the train/validation boundary time.
    rows[2].at = rows[1].at;

    let splits = temporal_split_by_fraction(rows, &fraction_cfg(0.5, 0.25)).expect("split ok");
    assert_eq!(splits.train.len(), 2);
    assert_eq!(splits.validation.len(), 1);
    assert_eq!(splits.test.len(), 1);
}

#[test]
fn fraction_split_rejects_bad_config_and_missing_column() {
    let err = temporal_split_by_fraction(vec![row(0, 0)], &fraction_cfg(0.9, 0.2))
        .expect_err("fractions exceed one");
    assert!(matches!(err, SplitError::InvalidConfig(_)));

    let mut cfg = fraction_cfg(0.7, 0.1);
    cfg.time_column = "departure".to_string();
    let err = temporal_split_by_fraction(vec![row(0, 0)], &cfg).expect_err("unknown column");
    assert_eq!(
        err,
        SplitError::MissingColumn {
            column: "departure".to_string()
        }
    );
}

#[test]
fn ordering_check_reports_overlapping_partitions() {
    let splits = DatasetSplits {
        train: vec![row(0, 0), row(5, 0)],
        validation: Vec::new(),
        test: vec![row(3, 0)],
    };

    match check_temporal_order(&splits, "at").expect_err("train overlaps test") {
        SplitError::OrderingViolation {
            earlier,
            later,
            earlier_max,
            later_min,
            ..
        } => {
            assert_eq!(earlier, "train");
            assert_eq!(later, "test");
            assert_eq!(earlier_max, row(5, 0).at);
            assert_eq!(later_min, row(3, 0).at);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn cutoff_split_uses_inclusive_upper_bounds() {
    let rows: Vec<Row> = (0..10).map(|i| row(i, 0)).collect();
    let cfg = TemporalCutoffSplitConfig {
        time_column: "at".to_string(),
        cutoff_train: row(3, 0).at,
        cutoff_val: row(6, 0).at,
    };

    let splits = temporal_split_by_cutoff(rows, &cfg).expect("split ok");
    assert_eq!(ids(&splits.train), vec![0, 1, 2, 3]);
    assert_eq!(ids(&splits.validation), vec![4, 5, 6]);
    assert_eq!(ids(&splits.test), vec![7, 8, 9]);
}

#[test]
fn equal_cutoffs_leave_validation_empty_without_error() {
    let rows: Vec<Row> = [4, 0, 9, 2, 7].iter().map(|i| row(*i, 0)).collect();
    let cutoff = row(4, 0).at;
    let cfg = TemporalCutoffSplitConfig {
        time_column: "at".to_string(),
        cutoff_train: cutoff,
        cutoff_val: cutoff,
    };

    let splits = temporal_split_by_cutoff(rows, &cfg).expect("degenerate split is fine");

    assert!(splits.validation.is_empty());
    assert_eq!(ids(&splits.train), vec![4, 0, 2]);
    assert_eq!(ids(&splits.test), vec![9, 7]);

    let mut seen: Vec<usize> = ids(&splits.train);
    seen.extend(ids(&splits.test));
    seen.sort_unstable();
    assert_eq!(seen, vec![0, 2, 4, 7, 9]);
}

#[test]
fn inverted_cutoffs_are_rejected() {
    let cfg = TemporalCutoffSplitConfig {
        time_column: "at".to_string(),
        cutoff_train: row(6, 0).at,
        cutoff_val: row(3, 0).at,
    };
    let err = temporal_split_by_cutoff(vec![row(0, 0)], &cfg).expect_err("inverted");
    assert!(matches!(err, SplitError::InvalidConfig(_)));
}

#[test]
fn cutoff_dates_parse_to_midnight() {
    let cutoff = parse_cutoff("2023-01-01").expect("date");
    assert_eq!(cutoff, base());

    let rows = vec![row(0, 0), row(1, 0)];
    let cfg = TemporalCutoffSplitConfig {
        time_column: "at".to_string(),
        cutoff_train: cutoff,
        cutoff_val: cutoff,
    };
    let splits = temporal_split_by_cutoff(rows, &cfg).expect("split ok");
    // Midnight belongs to train; anything later that day does not.
    assert_eq!(ids(&splits.train), vec![0]);
    assert_eq!(ids(&splits.test), vec![1]);
}

#[test]
fn stratified_split_preserves_class_balance() {
    let (train, test) =
        stratified_split(imbalanced_rows(), &stratified_cfg(0.2, 0.0)).expect("split ok");

    assert_eq!(test.len(), 200);
    assert_eq!(train.len(), 800);
    assert!((positive_share(&test) - 0.2).abs() <= 0.02);
    assert!((positive_share(&train) - 0.2).abs() <= 0.02);

    let train_ids: HashSet<usize> = train.iter().map(|r| r.id).collect();
    assert!(test.iter().all(|r| !train_ids.contains(&r.id)));
}

#[test]
fn stratified_split_is_reproducible_for_a_seed() {
    let (_, a) = stratified_split(imbalanced_rows(), &stratified_cfg(0.2, 0.0)).expect("a");
    let (_, b) = stratified_split(imbalanced_rows(), &stratified_cfg(0.2, 0.0)).expect("b");
    let mut other = stratified_cfg(0.2, 0.0);
    other.random_seed = 7;
    let (_, c) = stratified_split(imbalanced_rows(), &other).expect("c");

    assert_eq!(ids(&a), ids(&b));
    assert_ne!(ids(&a), ids(&c));
}

#[test]
fn stratified_three_way_split_balances_every_partition() {
    let splits =
        stratified_train_val_test(imbalanced_rows(), &stratified_cfg(0.2, 0.1)).expect("split ok");

    assert_eq!(splits.total_rows(), 1000);
    assert_eq!(splits.test.len(), 200);
    assert_eq!(splits.validation.len(), 100);
    assert_eq!(splits.train.len(), 700);
    for part in [&splits.train, &splits.validation, &splits.test] {
        assert!((positive_share(part) - 0.2).abs() <= 0.02);
    }
}

#[test]
fn stratified_sample_keeps_fraction_and_balance() {
    let sample = stratified_sample(imbalanced_rows(), "label", 0.1, 42).expect("sample ok");
    assert_eq!(sample.len(), 100);
    assert!((positive_share(&sample) - 0.2).abs() <= 0.02);
}

#[test]
fn stratified_split_requires_target_column() {
    let err = stratified_split(imbalanced_rows(), &StratifiedSplitConfig::default())
        .expect_err("rows have no 'delayed' column");
    assert_eq!(
        err,
        SplitError::MissingColumn {
            column: "delayed".to_string()
        }
    );

    let err = stratified_split(imbalanced_rows(), &stratified_cfg(1.0, 0.0))
        .expect_err("test_size must be below one");
    assert!(matches!(err, SplitError::InvalidConfig(_)));
}

#[test]
fn unknown_columns_fail_even_without_rows() {
    let missing = |column: &str| SplitError::MissingColumn {
        column: column.to_string(),
    };
    let mut strat = stratified_cfg(0.2, 0.0);
    strat.target_column = "nope".to_string();
    assert_eq!(
        stratified_split(Vec::<Row>::new(), &strat).expect_err("unknown target"),
        missing("nope")
    );
    assert_eq!(
        stratified_sample(Vec::<Row>::new(), "nope", 0.5, 1).expect_err("unknown target"),
        missing("nope")
    );

    let mut fraction = fraction_cfg(0.7, 0.1);
    fraction.time_column = "nope".to_string();
    assert_eq!(
        temporal_split_by_fraction(Vec::<Row>::new(), &fraction).expect_err("unknown time"),
        missing("nope")
    );

    let cutoff = TemporalCutoffSplitConfig {
        time_column: "nope".to_string(),
        cutoff_train: base(),
        cutoff_val: base(),
    };
    assert_eq!(
        temporal_split_by_cutoff(Vec::<Row>::new(), &cutoff).expect_err("unknown time"),
        missing("nope")
    );
    let empty: DatasetSplits<Row> = DatasetSplits {
        train: Vec::new(),
        validation: Vec::new(),
        test: Vec::new(),
    };
    assert_eq!(
        check_temporal_order(&empty, "nope").expect_err("unknown time"),
        missing("nope")
    );
}

#[test]
fn empty_input_with_known_columns_gives_empty_partitions() {
    let splits =
        temporal_split_by_fraction(Vec::<Row>::new(), &fraction_cfg(0.7, 0.1)).expect("ok");
    assert_eq!(splits.total_rows(), 0);

    let (train, test) =
        stratified_split(Vec::<Row>::new(), &stratified_cfg(0.2, 0.0)).expect("ok");
    assert!(train.is_empty() && test.is_empty());
}

#[test]
fn single_class_input_still_splits_to_requested_sizes() {
    let rows: Vec<Row> = (0..10).map(|i| row(i, 0)).collect();

    let (train, test) = stratified_split(rows.clone(), &stratified_cfg(0.2, 0.0)).expect("ok");
    assert_eq!(test.len(), 2);
    assert_eq!(train.len(), 8);

    let splits = stratified_train_val_test(rows, &stratified_cfg(0.2, 0.1)).expect("ok");
    assert_eq!(splits.test.len(), 2);
    assert_eq!(splits.validation.len(), 1);
    assert_eq!(splits.train.len(), 7);
    assert!(splits.validation.iter().all(|r| r.label == 0));
}

#[test]
fn fraction_split_of_tiny_inputs_collapses_cut_points() {
    let two = temporal_split_by_fraction(vec![row(2, 0), row(1, 0)], &fraction_cfg(0.7, 0.1))
        .expect("two rows");
    assert_eq!(ids(&two.train), vec![1]);
    assert!(two.validation.is_empty());
    assert_eq!(ids(&two.test), vec![2]);

    let one = temporal_split_by_fraction(vec![row(0, 0)], &fraction_cfg(0.7, 0.1))
        .expect("one row");
    assert!(one.train.is_empty());
    assert!(one.validation.is_empty());
    assert_eq!(ids(&one.test), vec![0]);
}
