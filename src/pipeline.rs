//! End-to-end preparation: raw table to leakage-safe partitions.
//!
//! Order of operations matters for leakage: stateless features are derived
//! on the whole table, the table is split, and only then are the historical
//! averages fitted, on the training partition alone, and applied to all
//! three partitions.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::calendar::CalendarConfig;
use crate::features::{
    apply_historical_averages, assert_schema_compatible, build_feature_schema, derive_features,
    FeatureError, FeatureSchema, FeaturedFlight,
};
use crate::historical::{
    FittedAverages, HistoricalAverageConfig, HistoricalAverageEncoder, HistoricalError,
};
use crate::quality::{flag_flights, QualityConfig, QualityReport, TIMESTAMP_FORMAT};
use crate::split::{
    stratified_train_val_test, temporal_split_by_cutoff, temporal_split_by_fraction,
    DatasetSplits, SplitError, StratifiedSplitConfig, TemporalCutoffSplitConfig,
    TemporalFractionSplitConfig,
};
use crate::table::{FlightRecord, RawTable, TableError};
use crate::target::{build_targets, LabeledFlight, TargetConfig, TargetReport};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum SplitStrategy {
    Stratified(StratifiedSplitConfig),
    TemporalFraction(TemporalFractionSplitConfig),
    TemporalCutoff(TemporalCutoffSplitConfig),
}

impl Default for SplitStrategy {
    fn default() -> Self {
        Self::TemporalFraction(TemporalFractionSplitConfig::default())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub quality: QualityConfig,
    pub target: TargetConfig,
    pub calendar: CalendarConfig,
    pub historical: Vec<HistoricalAverageConfig>,
    pub split: SplitStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            quality: QualityConfig::default(),
            target: TargetConfig::default(),
            calendar: CalendarConfig::default(),
            historical: vec![
                HistoricalAverageConfig::target(),
                HistoricalAverageConfig::delay_minutes(),
            ],
            split: SplitStrategy::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pipeline config: {0}")]
    Config(#[from] serde_json::Error),
    #[error(transparent)]
    Table(#[from] TableError),
    #[error(transparent)]
    Split(#[from] SplitError),
    #[error(transparent)]
    Historical(#[from] HistoricalError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
}

/// Everything inference needs to rebuild features for new rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedArtifacts {
    pub schema: FeatureSchema,
    pub calendar: CalendarConfig,
    pub averages: Vec<FittedAverages>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    pub quality: QualityReport,
    pub target: TargetReport,
    pub train_rows: u64,
    pub validation_rows: u64,
    pub test_rows: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedDataset {
    pub splits: DatasetSplits<FeaturedFlight>,
    pub artifacts: FittedArtifacts,
    pub report: PipelineReport,
}

pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig, PipelineError> {
    let raw = fs::read_to_string(path)?;
    let cfg = serde_json::from_str(&raw)?;
    info!(
        component = "pipeline",
        event = "pipeline.config.loaded",
        path = %path.display()
    );
    Ok(cfg)
}

/// Runs every stage on a table whose headers are already canonical, as
/// returned by `load_raw_dir`.
pub fn prepare_dataset(
    table: RawTable,
    cfg: &PipelineConfig,
) -> Result<PreparedDataset, PipelineError> {
    info!(
        component = "pipeline",
        event = "pipeline.prepare.start",
        input_rows = table.len(),
        split = ?cfg.split
    );

    let records = FlightRecord::from_table(&table)?;
    let (flagged, quality_report) = flag_flights(records, &cfg.quality);
    let (labeled, target_report) = build_targets(flagged, &cfg.target);
    let featured = derive_features(labeled, &cfg.calendar);

    let splits = split_rows(featured, &cfg.split)?;

    let mut averages = Vec::with_capacity(cfg.historical.len());
    for historical_cfg in &cfg.historical {
        let encoder = HistoricalAverageEncoder::new(historical_cfg.clone());
        averages.push(encoder.fit_rows(&splits.train)?);
    }
    let splits = splits.map(|rows| {
        averages
            .iter()
            .fold(rows, |rows, fitted| apply_historical_averages(rows, fitted))
    });

    let schema = build_feature_schema(&cfg.historical);
    let report = PipelineReport {
        quality: quality_report,
        target: target_report,
        train_rows: splits.train.len() as u64,
        validation_rows: splits.validation.len() as u64,
        test_rows: splits.test.len() as u64,
    };

    info!(
        component = "pipeline",
        event = "pipeline.prepare.finish",
        train_rows = report.train_rows,
        validation_rows = report.validation_rows,
        test_rows = report.test_rows,
        schema_fingerprint = %schema.fingerprint
    );

    Ok(PreparedDataset {
        splits,
        artifacts: FittedArtifacts {
            schema,
            calendar: cfg.calendar.clone(),
            averages,
        },
        report,
    })
}

/// Builds features for rows outside the training run using previously
/// fitted artifacts. Nothing is refitted.
pub fn featurize_with_artifacts(
    rows: Vec<LabeledFlight>,
    artifacts: &FittedArtifacts,
) -> Result<Vec<FeaturedFlight>, PipelineError> {
    let historical: Vec<HistoricalAverageConfig> = artifacts
        .averages
        .iter()
        .map(|fitted| HistoricalAverageConfig {
            columns: fitted.columns.iter().map(|c| c.column).collect(),
            value: fitted.value,
        })
        .collect();
    let rebuilt = build_feature_schema(&historical);
    assert_schema_compatible(
        artifacts.schema.version,
        &artifacts.schema.fingerprint,
        &rebuilt,
    )?;

    let featured = derive_features(rows, &artifacts.calendar);
    Ok(artifacts
        .averages
        .iter()
        .fold(featured, |rows, fitted| apply_historical_averages(rows, fitted)))
}

fn split_rows(
    rows: Vec<FeaturedFlight>,
    strategy: &SplitStrategy,
) -> Result<DatasetSplits<FeaturedFlight>, SplitError> {
    match strategy {
        SplitStrategy::Stratified(cfg) => stratified_train_val_test(rows, cfg),
        SplitStrategy::TemporalFraction(cfg) => temporal_split_by_fraction(rows, cfg),
        SplitStrategy::TemporalCutoff(cfg) => {
            let splits = temporal_split_by_cutoff(rows, cfg)?;
            let has_later_rows = !splits.validation.is_empty() || !splits.test.is_empty();
            if splits.train.is_empty() && has_later_rows {
                return Err(SplitError::InvalidConfig(format!(
                    "no rows with {} on or before cutoff_train {}",
                    cfg.time_column,
                    cfg.cutoff_train.format(TIMESTAMP_FORMAT)
                )));
            }
            Ok(splits)
        }
    }
}
