//! Train/validation/test partitioning.
//!
//! Two disciplines: stratified random splits that preserve the class balance
//! of a label column, and time-ordered splits (by fraction or by cutoff
//! dates) whose partitions must not overlap in time. Time-ordered results
//! are checked before they are returned.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::quality::{parse_timestamp, TIMESTAMP_FORMAT};
use crate::table::COL_SCHEDULED_DEPARTURE;
use crate::target::COL_DELAYED;

const ISO_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Absorbs float error in `n * fraction` before rounding to a row count.
const FRACTION_EPSILON: f64 = 1e-9;

/// Row access the partitioner needs. `None` means the row has no such column.
///
/// The `has_*` checks answer for the row type as a whole, so an unknown
/// column is reported even when there are no rows.
pub trait SplitRow {
    fn has_class_column(column: &str) -> bool
    where
        Self: Sized;
    fn has_time_column(column: &str) -> bool
    where
        Self: Sized;
    fn class_value(&self, column: &str) -> Option<i64>;
    fn time_value(&self, column: &str) -> Option<NaiveDateTime>;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SplitError {
    #[error("required column '{column}' is missing")]
    MissingColumn { column: String },
    #[error(
        "temporal ordering violated: max {column} in {earlier} ({earlier_max}) is after min in {later} ({later_min})"
    )]
    OrderingViolation {
        column: String,
        earlier: &'static str,
        later: &'static str,
        earlier_max: NaiveDateTime,
        later_min: NaiveDateTime,
    },
    #[error("invalid split config: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DatasetSplits<T> {
    pub train: Vec<T>,
    pub validation: Vec<T>,
    pub test: Vec<T>,
}

impl<T> DatasetSplits<T> {
    pub fn total_rows(&self) -> usize {
        self.train.len() + self.validation.len() + self.test.len()
    }

    pub fn map<U>(self, mut f: impl FnMut(Vec<T>) -> Vec<U>) -> DatasetSplits<U> {
        DatasetSplits {
            train: f(self.train),
            validation: f(self.validation),
            test: f(self.test),
        }
    }

    fn named(&self) -> [(&'static str, &[T]); 3] {
        [
            ("train", self.train.as_slice()),
            ("validation", self.validation.as_slice()),
            ("test", self.test.as_slice()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StratifiedSplitConfig {
    pub target_column: String,
    pub test_size: f64,
    /// Share of all rows for validation; 0 leaves validation empty.
    pub val_size: f64,
    pub random_seed: u64,
}

impl Default for StratifiedSplitConfig {
    fn default() -> Self {
        Self {
            target_column: COL_DELAYED.to_string(),
            test_size: 0.2,
            val_size: 0.0,
            random_seed: 42,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalFractionSplitConfig {
    pub time_column: String,
    pub train_size: f64,
    pub val_size: f64,
}

impl Default for TemporalFractionSplitConfig {
    fn default() -> Self {
        Self {
            time_column: COL_SCHEDULED_DEPARTURE.to_string(),
            train_size: 0.7,
            val_size: 0.1,
        }
    }
}

/// train = t <= cutoff_train; validation = cutoff_train < t <= cutoff_val;
/// test = t > cutoff_val.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalCutoffSplitConfig {
    pub time_column: String,
    #[serde(with = "cutoff_format")]
    pub cutoff_train: NaiveDateTime,
    #[serde(with = "cutoff_format")]
    pub cutoff_val: NaiveDateTime,
}

impl Default for TemporalCutoffSplitConfig {
    fn default() -> Self {
        Self {
            time_column: COL_SCHEDULED_DEPARTURE.to_string(),
            cutoff_train: date_midnight(2022, 12, 31),
            cutoff_val: date_midnight(2023, 12, 31),
        }
    }
}

/// Accepts `YYYY-MM-DD` (midnight), `YYYY-MM-DD HH:MM:SS` or the ISO
/// `YYYY-MM-DDTHH:MM:SS` form.
pub fn parse_cutoff(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    parse_timestamp(trimmed)
        .or_else(|| NaiveDateTime::parse_from_str(trimmed, ISO_TIMESTAMP_FORMAT).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Cutoffs in config files go through [`parse_cutoff`] and are written back
/// as `YYYY-MM-DD HH:MM:SS`.
mod cutoff_format {
    use chrono::NaiveDateTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    use super::parse_cutoff;
    use crate::quality::TIMESTAMP_FORMAT;

    pub fn serialize<S: Serializer>(
        value: &NaiveDateTime,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&value.format(TIMESTAMP_FORMAT))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_cutoff(&raw).ok_or_else(|| {
            de::Error::custom(format!(
                "invalid cutoff '{raw}', expected YYYY-MM-DD or YYYY-MM-DD HH:MM:SS"
            ))
        })
    }
}

/// Class-preserving subset holding `fraction` of the rows, in input order.
pub fn stratified_sample<T: SplitRow>(
    rows: Vec<T>,
    target_column: &str,
    fraction: f64,
    random_seed: u64,
) -> Result<Vec<T>, SplitError> {
    validate_open_fraction("fraction", fraction)?;
    let labels = class_labels(&rows, target_column)?;
    let mut rng = ChaCha8Rng::seed_from_u64(random_seed);
    let keep = stratified_holdout(&labels, fraction, &mut rng);

    let sample: Vec<T> = rows
        .into_iter()
        .zip(keep)
        .filter_map(|(row, kept)| kept.then_some(row))
        .collect();

    info!(
        component = "split",
        event = "split.stratified_sample.finish",
        target_column,
        input_rows = labels.len(),
        sample_rows = sample.len()
    );

    Ok(sample)
}

/// Two-way stratified split into (train, test), each in input order.
pub fn stratified_split<T: SplitRow>(
    rows: Vec<T>,
    cfg: &StratifiedSplitConfig,
) -> Result<(Vec<T>, Vec<T>), SplitError> {
    validate_open_fraction("test_size", cfg.test_size)?;
    let labels = class_labels(&rows, &cfg.target_column)?;
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.random_seed);
    let holdout = stratified_holdout(&labels, cfg.test_size, &mut rng);
    let (train, test) = partition_by_mask(rows, &holdout);

    info!(
        component = "split",
        event = "split.stratified.finish",
        target_column = %cfg.target_column,
        train_rows = train.len(),
        test_rows = test.len()
    );

    Ok((train, test))
}

/// Stratified train/validation/test. Test is carved out first, then
/// validation from the remainder, so both keep the class balance.
pub fn stratified_train_val_test<T: SplitRow>(
    rows: Vec<T>,
    cfg: &StratifiedSplitConfig,
) -> Result<DatasetSplits<T>, SplitError> {
    validate_open_fraction("test_size", cfg.test_size)?;
    if !(0.0..1.0).contains(&cfg.val_size) {
        return Err(SplitError::InvalidConfig(format!(
            "val_size must be in [0, 1), got {}",
            cfg.val_size
        )));
    }
    if cfg.test_size + cfg.val_size >= 1.0 {
        return Err(SplitError::InvalidConfig(format!(
            "test_size + val_size must be < 1, got {}",
            cfg.test_size + cfg.val_size
        )));
    }

    let labels = class_labels(&rows, &cfg.target_column)?;
    let mut rng = ChaCha8Rng::seed_from_u64(cfg.random_seed);
    let test_mask = stratified_holdout(&labels, cfg.test_size, &mut rng);
    let (rest, test) = partition_by_mask(rows, &test_mask);

    let (train, validation) = if cfg.val_size > 0.0 {
        let rest_labels: Vec<i64> = labels
            .iter()
            .zip(&test_mask)
            .filter(|(_, in_test)| !**in_test)
            .map(|(label, _)| *label)
            .collect();
        let relative_val = cfg.val_size / (1.0 - cfg.test_size);
        let val_mask = stratified_holdout(&rest_labels, relative_val, &mut rng);
        partition_by_mask(rest, &val_mask)
    } else {
        (rest, Vec::new())
    };

    let splits = DatasetSplits {
        train,
        validation,
        test,
    };
    log_split_finish("split.stratified.finish", &splits);
    Ok(splits)
}

/// Sorts by `time_column` and cuts at cumulative fractions.
pub fn temporal_split_by_fraction<T: SplitRow>(
    rows: Vec<T>,
    cfg: &TemporalFractionSplitConfig,
) -> Result<DatasetSplits<T>, SplitError> {
    if !(cfg.train_size > 0.0 && cfg.train_size <= 1.0) {
        return Err(SplitError::InvalidConfig(format!(
            "train_size must be in (0, 1], got {}",
            cfg.train_size
        )));
    }
    if cfg.val_size < 0.0 || cfg.train_size + cfg.val_size > 1.0 + FRACTION_EPSILON {
        return Err(SplitError::InvalidConfig(format!(
            "val_size must be >= 0 and train_size + val_size <= 1, got {} + {}",
            cfg.train_size, cfg.val_size
        )));
    }

    let times = time_values(&rows, &cfg.time_column)?;
    let mut keyed: Vec<(NaiveDateTime, T)> = times.into_iter().zip(rows).collect();
    keyed.sort_by_key(|(ts, _)| *ts);

    let n = keyed.len();
    let train_end = cut_index(n, cfg.train_size);
    let val_end = cut_index(n, cfg.train_size + cfg.val_size).max(train_end);

    let mut sorted: Vec<T> = keyed.into_iter().map(|(_, row)| row).collect();
    let test = sorted.split_off(val_end);
    let validation = sorted.split_off(train_end);
    let splits = DatasetSplits {
        train: sorted,
        validation,
        test,
    };

    check_temporal_order(&splits, &cfg.time_column)?;
    log_split_finish("split.temporal_fraction.finish", &splits);
    Ok(splits)
}

/// Splits by cutoff timestamps, keeping input order within each partition.
/// Equal cutoffs leave validation empty.
pub fn temporal_split_by_cutoff<T: SplitRow>(
    rows: Vec<T>,
    cfg: &TemporalCutoffSplitConfig,
) -> Result<DatasetSplits<T>, SplitError> {
    if cfg.cutoff_val < cfg.cutoff_train {
        return Err(SplitError::InvalidConfig(format!(
            "cutoff_val ({}) is before cutoff_train ({})",
            cfg.cutoff_val.format(TIMESTAMP_FORMAT),
            cfg.cutoff_train.format(TIMESTAMP_FORMAT)
        )));
    }

    let times = time_values(&rows, &cfg.time_column)?;
    let mut splits = DatasetSplits {
        train: Vec::new(),
        validation: Vec::new(),
        test: Vec::new(),
    };
    for (ts, row) in times.into_iter().zip(rows) {
        if ts <= cfg.cutoff_train {
            splits.train.push(row);
        } else if ts <= cfg.cutoff_val {
            splits.validation.push(row);
        } else {
            splits.test.push(row);
        }
    }

    check_temporal_order(&splits, &cfg.time_column)?;
    log_split_finish("split.temporal_cutoff.finish", &splits);
    Ok(splits)
}

/// Asserts max(train) <= min(validation) <= max(validation) <= min(test),
/// skipping empty partitions.
pub fn check_temporal_order<T: SplitRow>(
    splits: &DatasetSplits<T>,
    time_column: &str,
) -> Result<(), SplitError> {
    let mut previous: Option<(&'static str, NaiveDateTime)> = None;
    for (name, rows) in splits.named() {
        let Some((min, max)) = time_range(rows, time_column)? else {
            continue;
        };
        if let Some((earlier, earlier_max)) = previous {
            if earlier_max > min {
                return Err(SplitError::OrderingViolation {
                    column: time_column.to_string(),
                    earlier,
                    later: name,
                    earlier_max,
                    later_min: min,
                });
            }
        }
        previous = Some((name, max));
    }
    Ok(())
}

/// (min, max) of `time_column`, `None` for an empty partition.
pub fn time_range<T: SplitRow>(
    rows: &[T],
    time_column: &str,
) -> Result<Option<(NaiveDateTime, NaiveDateTime)>, SplitError> {
    let times = time_values(rows, time_column)?;
    let min = times.iter().min().copied();
    let max = times.iter().max().copied();
    Ok(min.zip(max))
}

fn class_labels<T: SplitRow>(rows: &[T], column: &str) -> Result<Vec<i64>, SplitError> {
    if !T::has_class_column(column) {
        return Err(SplitError::MissingColumn {
            column: column.to_string(),
        });
    }
    rows.iter()
        .map(|row| row.class_value(column))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SplitError::MissingColumn {
            column: column.to_string(),
        })
}

fn time_values<T: SplitRow>(rows: &[T], column: &str) -> Result<Vec<NaiveDateTime>, SplitError> {
    if !T::has_time_column(column) {
        return Err(SplitError::MissingColumn {
            column: column.to_string(),
        });
    }
    rows.iter()
        .map(|row| row.time_value(column))
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| SplitError::MissingColumn {
            column: column.to_string(),
        })
}

fn validate_open_fraction(name: &str, value: f64) -> Result<(), SplitError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(SplitError::InvalidConfig(format!(
            "{name} must be in (0, 1), got {value}"
        )))
    }
}

fn cut_index(n: usize, fraction: f64) -> usize {
    let raw = (n as f64 * fraction + FRACTION_EPSILON).floor();
    (raw.max(0.0) as usize).min(n)
}

/// Marks `ceil(n * fraction)` rows as held out, allocated across classes in
/// proportion to their size (largest remainder), chosen uniformly within each
/// class.
fn stratified_holdout(labels: &[i64], fraction: f64, rng: &mut ChaCha8Rng) -> Vec<bool> {
    let n = labels.len();
    let mut mask = vec![false; n];
    if n == 0 {
        return mask;
    }

    let mut by_class: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
        by_class.entry(*label).or_default().push(idx);
    }

    let target = ((n as f64 * fraction - FRACTION_EPSILON).ceil().max(0.0) as usize).min(n);

    let mut quotas: Vec<(i64, usize, f64)> = by_class
        .iter()
        .map(|(label, indices)| {
            let exact = indices.len() as f64 * target as f64 / n as f64;
            let floor = exact.floor();
            (*label, floor as usize, exact - floor)
        })
        .collect();

    let allocated: usize = quotas.iter().map(|(_, q, _)| *q).sum();
    let mut order: Vec<usize> = (0..quotas.len()).collect();
    order.sort_by(|a, b| quotas[*b].2.total_cmp(&quotas[*a].2));
    for slot in order.into_iter().take(target.saturating_sub(allocated)) {
        quotas[slot].1 += 1;
    }

    for (label, quota, _) in quotas {
        if let Some(indices) = by_class.get_mut(&label) {
            indices.shuffle(rng);
            for idx in indices.iter().take(quota) {
                mask[*idx] = true;
            }
        }
    }

    mask
}

/// Splits rows into (not held out, held out), preserving order.
fn partition_by_mask<T>(rows: Vec<T>, holdout: &[bool]) -> (Vec<T>, Vec<T>) {
    let mut kept = Vec::new();
    let mut held = Vec::new();
    for (row, is_held) in rows.into_iter().zip(holdout) {
        if *is_held {
            held.push(row);
        } else {
            kept.push(row);
        }
    }
    (kept, held)
}

fn log_split_finish<T>(event: &'static str, splits: &DatasetSplits<T>) {
    for (name, rows) in splits.named() {
        if rows.is_empty() {
            warn!(
                component = "split",
                event = "split.partition.empty",
                partition = name
            );
        }
    }
    info!(
        component = "split",
        event,
        train_rows = splits.train.len(),
        validation_rows = splits.validation.len(),
        test_rows = splits.test.len()
    );
}

fn date_midnight(year: i32, month: u32, day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}
