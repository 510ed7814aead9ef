//! Per-category historical averages learned from training rows.
//!
//! Fitting and applying are separate steps: [`HistoricalAverageEncoder::fit`]
//! returns an immutable [`FittedAverages`], and only that value is used to
//! encode rows afterwards. Fit must only ever see training rows. The encoder
//! cannot tell which split it was handed, so keeping validation and test
//! rows away from `fit` is the caller's job.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::table::{CategoryColumn, FlightRecord};
use crate::target::LabeledFlight;

/// Rows that expose category values.
pub trait CategorySource {
    fn category(&self, column: CategoryColumn) -> Option<&str>;
}

/// Rows that carry realized delay outcomes.
pub trait DelayOutcome {
    fn delay_minutes(&self) -> f64;
    fn delayed(&self) -> u8;
}

impl CategorySource for FlightRecord {
    fn category(&self, column: CategoryColumn) -> Option<&str> {
        FlightRecord::category(self, column)
    }
}

impl CategorySource for LabeledFlight {
    fn category(&self, column: CategoryColumn) -> Option<&str> {
        self.record.category(column)
    }
}

impl DelayOutcome for LabeledFlight {
    fn delay_minutes(&self) -> f64 {
        self.delay_minutes
    }

    fn delayed(&self) -> u8 {
        self.delayed
    }
}

/// Which outcome gets averaged per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AveragedValue {
    /// The binary delay label; the mean is a delay rate.
    Target,
    /// Realized departure delay in minutes.
    DelayMinutes,
}

impl AveragedValue {
    pub fn column_prefix(self) -> &'static str {
        match self {
            Self::Target => "mean_target_by",
            Self::DelayMinutes => "mean_delay_by",
        }
    }

    pub fn extract<R: DelayOutcome>(self, row: &R) -> f64 {
        match self {
            Self::Target => row.delayed() as f64,
            Self::DelayMinutes => row.delay_minutes(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalAverageConfig {
    pub columns: Vec<CategoryColumn>,
    pub value: AveragedValue,
}

impl HistoricalAverageConfig {
    pub fn target() -> Self {
        Self {
            value: AveragedValue::Target,
            ..Self::default()
        }
    }

    pub fn delay_minutes() -> Self {
        Self::default()
    }

    pub fn feature_names(&self) -> Vec<String> {
        feature_names(self.value, &self.columns)
    }
}

impl Default for HistoricalAverageConfig {
    fn default() -> Self {
        Self {
            columns: vec![
                CategoryColumn::Airline,
                CategoryColumn::OriginAirport,
                CategoryColumn::DestinationAirport,
            ],
            value: AveragedValue::DelayMinutes,
        }
    }
}

#[derive(Debug, Error)]
pub enum HistoricalError {
    #[error("cannot fit historical averages on an empty training set")]
    EmptyTrainingSet,
    #[error("training rows ({rows}) and values ({values}) are not aligned")]
    LengthMismatch { rows: usize, values: usize },
    #[error("non-finite training value at row {row}")]
    NonFiniteValue { row: usize },
    #[error("fitted averages (de)serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Learned means for one category column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnAverages {
    pub column: CategoryColumn,
    pub means: BTreeMap<String, f64>,
}

/// Fitted statistics. Immutable once produced by `fit`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedAverages {
    pub value: AveragedValue,
    pub global_mean: f64,
    pub training_rows: u64,
    pub columns: Vec<ColumnAverages>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoricalAverageEncoder {
    config: HistoricalAverageConfig,
}

impl HistoricalAverageEncoder {
    pub fn new(config: HistoricalAverageConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &HistoricalAverageConfig {
        &self.config
    }

    /// Learns per-category means of `train_values` aligned with `train_rows`.
    /// Rows without a category value count toward the global mean only.
    pub fn fit<R: CategorySource>(
        &self,
        train_rows: &[R],
        train_values: &[f64],
    ) -> Result<FittedAverages, HistoricalError> {
        if train_rows.len() != train_values.len() {
            return Err(HistoricalError::LengthMismatch {
                rows: train_rows.len(),
                values: train_values.len(),
            });
        }
        if train_rows.is_empty() {
            return Err(HistoricalError::EmptyTrainingSet);
        }
        if let Some(row) = train_values.iter().position(|v| !v.is_finite()) {
            return Err(HistoricalError::NonFiniteValue { row });
        }

        let global_mean = train_values.iter().sum::<f64>() / train_values.len() as f64;

        let mut columns = Vec::with_capacity(self.config.columns.len());
        for column in &self.config.columns {
            let mut sums: BTreeMap<&str, (f64, u64)> = BTreeMap::new();
            for (row, value) in train_rows.iter().zip(train_values) {
                if let Some(category) = row.category(*column) {
                    let entry = sums.entry(category).or_insert((0.0, 0));
                    entry.0 += *value;
                    entry.1 += 1;
                }
            }
            let means: BTreeMap<String, f64> = sums
                .into_iter()
                .map(|(category, (sum, count))| (category.to_string(), sum / count as f64))
                .collect();
            debug!(
                component = "historical",
                event = "historical.fit.column",
                column = column.as_str(),
                category_count = means.len()
            );
            columns.push(ColumnAverages {
                column: *column,
                means,
            });
        }

        info!(
            component = "historical",
            event = "historical.fit.finish",
            value = ?self.config.value,
            training_rows = train_rows.len(),
            global_mean = global_mean,
            column_count = columns.len()
        );

        Ok(FittedAverages {
            value: self.config.value,
            global_mean,
            training_rows: train_rows.len() as u64,
            columns,
        })
    }

    /// Fits on rows that carry their own outcome, averaging the configured value.
    pub fn fit_rows<R: CategorySource + DelayOutcome>(
        &self,
        train_rows: &[R],
    ) -> Result<FittedAverages, HistoricalError> {
        let values: Vec<f64> = train_rows
            .iter()
            .map(|row| self.config.value.extract(row))
            .collect();
        self.fit(train_rows, &values)
    }
}

impl FittedAverages {
    pub fn feature_names(&self) -> Vec<String> {
        let columns: Vec<CategoryColumn> = self.columns.iter().map(|c| c.column).collect();
        feature_names(self.value, &columns)
    }

    /// Learned mean for a category, `None` when it was not seen during fit.
    pub fn mean_for(&self, column: CategoryColumn, category: &str) -> Option<f64> {
        self.columns
            .iter()
            .find(|c| c.column == column)
            .and_then(|c| c.means.get(category).copied())
    }

    /// Learned mean, or the global mean for unseen and missing categories.
    pub fn lookup(&self, column: CategoryColumn, category: Option<&str>) -> f64 {
        category
            .and_then(|value| self.mean_for(column, value))
            .unwrap_or(self.global_mean)
    }

    /// Encoded values for one row, aligned with [`Self::feature_names`].
    pub fn encode<R: CategorySource>(&self, row: &R) -> Vec<f64> {
        self.columns
            .iter()
            .map(|c| {
                row.category(c.column)
                    .and_then(|value| c.means.get(value).copied())
                    .unwrap_or(self.global_mean)
            })
            .collect()
    }

    pub fn transform<R: CategorySource>(&self, rows: &[R]) -> Vec<Vec<f64>> {
        rows.iter().map(|row| self.encode(row)).collect()
    }

    pub fn to_json(&self) -> Result<String, HistoricalError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, HistoricalError> {
        Ok(serde_json::from_str(raw)?)
    }
}

fn feature_names(value: AveragedValue, columns: &[CategoryColumn]) -> Vec<String> {
    columns
        .iter()
        .map(|column| format!("{}_{}", value.column_prefix(), column.as_str()))
        .collect()
}
