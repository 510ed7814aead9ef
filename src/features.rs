//! Feature-augmented flight rows and the output column contract.

use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::info;

use crate::calendar::{
    derive_calendar_features, CalendarConfig, CalendarFeatures, COL_DAY_OF_WEEK,
    COL_DELAY_CAPPED, COL_DELAY_LOG, COL_HIGH_SEASON, COL_HOUR_OF_DAY, COL_MONTH,
    COL_PERIOD_OF_DAY, COL_WEEKEND,
};
use crate::cyclical::{
    encode_cyclical, CyclicalFeatures, COL_DOW_COS, COL_DOW_SIN, COL_HOUR_COS, COL_HOUR_SIN,
    COL_MONTH_COS, COL_MONTH_SIN,
};
use crate::historical::{CategorySource, DelayOutcome, FittedAverages, HistoricalAverageConfig};
use crate::quality::{FLAG_COLUMNS, TIMESTAMP_FORMAT};
use crate::split::SplitRow;
use crate::table::{
    CategoryColumn, COL_ACTUAL_DEPARTURE, COL_AIRLINE, COL_DESTINATION_AIRPORT, COL_LINE_TYPE,
    COL_ORIGIN_AIRPORT, COL_SCHEDULED_DEPARTURE, RECORD_COLUMNS,
};
use crate::target::{LabeledFlight, COL_DELAYED, COL_DELAY_MINUTES};

pub const FEATURE_SCHEMA_VERSION: u32 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureDType {
    F64,
    Bool,
    Text,
}

/// How a consumer should treat a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    /// Carried through from the source record, not a model input.
    Passthrough,
    Numeric,
    Categorical,
    /// Computed from the realized delay; never a model input.
    TargetDerived,
    Target,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumn {
    pub name: String,
    pub dtype: FeatureDType,
    pub role: ColumnRole,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSchema {
    pub version: u32,
    pub fingerprint: String,
    pub columns: Vec<FeatureColumn>,
}

impl FeatureSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn numeric_columns(&self) -> Vec<&str> {
        self.names_with_role(ColumnRole::Numeric)
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.names_with_role(ColumnRole::Categorical)
    }

    pub fn target_derived_columns(&self) -> Vec<&str> {
        self.names_with_role(ColumnRole::TargetDerived)
    }

    pub fn target_column(&self) -> Option<&str> {
        self.names_with_role(ColumnRole::Target).into_iter().next()
    }

    fn names_with_role(&self, role: ColumnRole) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.role == role)
            .map(|c| c.name.as_str())
            .collect()
    }
}

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch { expected: u32, actual: u32 },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    SchemaFingerprintMismatch { expected: String, actual: String },
}

/// A labeled flight with every derived feature attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeaturedFlight {
    pub flight: LabeledFlight,
    pub calendar: CalendarFeatures,
    pub cyclical: CyclicalFeatures,
    /// Historical averages by feature name; empty until fitted averages are applied.
    pub historical: BTreeMap<String, f64>,
}

impl FeaturedFlight {
    pub fn new(flight: LabeledFlight, cfg: &CalendarConfig) -> Self {
        let calendar =
            derive_calendar_features(flight.scheduled_departure, flight.delay_minutes, cfg);
        let cyclical = encode_cyclical(Some(flight.scheduled_departure));
        Self {
            flight,
            calendar,
            cyclical,
            historical: BTreeMap::new(),
        }
    }

    /// Numeric value of a derived or target column.
    pub fn numeric_value(&self, name: &str) -> Option<f64> {
        let value = match name {
            COL_DELAY_MINUTES => self.flight.delay_minutes,
            COL_DELAYED => self.flight.delayed as f64,
            COL_HOUR_OF_DAY => self.calendar.hour_of_day as f64,
            COL_DAY_OF_WEEK => self.calendar.day_of_week as f64,
            COL_MONTH => self.calendar.month as f64,
            COL_WEEKEND => self.calendar.weekend as f64,
            COL_HIGH_SEASON => self.calendar.high_season as f64,
            COL_DELAY_LOG => self.calendar.delay_log,
            COL_DELAY_CAPPED => self.calendar.delay_capped,
            COL_HOUR_SIN => self.cyclical.hour_sin,
            COL_HOUR_COS => self.cyclical.hour_cos,
            COL_DOW_SIN => self.cyclical.dow_sin,
            COL_DOW_COS => self.cyclical.dow_cos,
            COL_MONTH_SIN => self.cyclical.month_sin,
            COL_MONTH_COS => self.cyclical.month_cos,
            other => return self.historical.get(other).copied(),
        };
        Some(value)
    }

    /// Text rendering of any schema column. Outer `None` means an unknown
    /// column; inner `None` an empty cell.
    pub fn cell(&self, name: &str) -> Option<Option<String>> {
        match name {
            COL_SCHEDULED_DEPARTURE => {
                return Some(Some(
                    self.flight
                        .scheduled_departure
                        .format(TIMESTAMP_FORMAT)
                        .to_string(),
                ))
            }
            COL_ACTUAL_DEPARTURE => {
                return Some(Some(
                    self.flight
                        .actual_departure
                        .format(TIMESTAMP_FORMAT)
                        .to_string(),
                ))
            }
            COL_PERIOD_OF_DAY => {
                return Some(Some(self.calendar.period_of_day.as_str().to_string()))
            }
            _ => {}
        }
        if let Some(value) = self.flight.record.field(name) {
            return Some(value.map(str::to_string));
        }
        if let Some(flag) = self.flight.flags.get(name) {
            return Some(Some(flag.to_string()));
        }
        self.numeric_value(name).map(|v| Some(v.to_string()))
    }
}

impl CategorySource for FeaturedFlight {
    fn category(&self, column: CategoryColumn) -> Option<&str> {
        self.flight.record.category(column)
    }
}

impl DelayOutcome for FeaturedFlight {
    fn delay_minutes(&self) -> f64 {
        self.flight.delay_minutes
    }

    fn delayed(&self) -> u8 {
        self.flight.delayed
    }
}

impl SplitRow for FeaturedFlight {
    fn has_class_column(column: &str) -> bool {
        matches!(column, COL_DELAYED | COL_WEEKEND | COL_HIGH_SEASON)
    }

    fn has_time_column(column: &str) -> bool {
        matches!(column, COL_SCHEDULED_DEPARTURE | COL_ACTUAL_DEPARTURE)
    }

    fn class_value(&self, column: &str) -> Option<i64> {
        match column {
            COL_DELAYED => Some(self.flight.delayed as i64),
            COL_WEEKEND => Some(self.calendar.weekend as i64),
            COL_HIGH_SEASON => Some(self.calendar.high_season as i64),
            _ => None,
        }
    }

    fn time_value(&self, column: &str) -> Option<NaiveDateTime> {
        match column {
            COL_SCHEDULED_DEPARTURE => Some(self.flight.scheduled_departure),
            COL_ACTUAL_DEPARTURE => Some(self.flight.actual_departure),
            _ => None,
        }
    }
}

/// Applies the stateless derivers. Safe on any split.
pub fn derive_features(rows: Vec<LabeledFlight>, cfg: &CalendarConfig) -> Vec<FeaturedFlight> {
    let featured: Vec<FeaturedFlight> = rows
        .into_iter()
        .map(|row| FeaturedFlight::new(row, cfg))
        .collect();
    info!(
        component = "features",
        event = "features.derive.finish",
        rows = featured.len()
    );
    featured
}

/// Attaches fitted historical averages to each row. `fitted` is only read.
pub fn apply_historical_averages(
    mut rows: Vec<FeaturedFlight>,
    fitted: &FittedAverages,
) -> Vec<FeaturedFlight> {
    let names = fitted.feature_names();
    for row in &mut rows {
        let values = fitted.encode(&*row);
        for (name, value) in names.iter().zip(values) {
            row.historical.insert(name.clone(), value);
        }
    }
    rows
}

pub fn build_feature_schema(historical: &[HistoricalAverageConfig]) -> FeatureSchema {
    let mut columns = Vec::new();

    for name in RECORD_COLUMNS {
        let role = match name {
            COL_AIRLINE | COL_ORIGIN_AIRPORT | COL_DESTINATION_AIRPORT | COL_LINE_TYPE => {
                ColumnRole::Categorical
            }
            _ => ColumnRole::Passthrough,
        };
        columns.push(column(name, FeatureDType::Text, role));
    }
    for name in FLAG_COLUMNS {
        columns.push(column(name, FeatureDType::Bool, ColumnRole::Passthrough));
    }

    columns.push(column(
        COL_DELAY_MINUTES,
        FeatureDType::F64,
        ColumnRole::TargetDerived,
    ));
    for name in [COL_HOUR_OF_DAY, COL_DAY_OF_WEEK, COL_MONTH] {
        columns.push(column(name, FeatureDType::F64, ColumnRole::Numeric));
    }
    columns.push(column(
        COL_PERIOD_OF_DAY,
        FeatureDType::Text,
        ColumnRole::Categorical,
    ));
    for name in [COL_WEEKEND, COL_HIGH_SEASON] {
        columns.push(column(name, FeatureDType::F64, ColumnRole::Numeric));
    }
    for name in [COL_DELAY_LOG, COL_DELAY_CAPPED] {
        columns.push(column(name, FeatureDType::F64, ColumnRole::TargetDerived));
    }
    for name in [
        COL_HOUR_SIN,
        COL_HOUR_COS,
        COL_DOW_SIN,
        COL_DOW_COS,
        COL_MONTH_SIN,
        COL_MONTH_COS,
    ] {
        columns.push(column(name, FeatureDType::F64, ColumnRole::Numeric));
    }
    for cfg in historical {
        for name in cfg.feature_names() {
            columns.push(FeatureColumn {
                name,
                dtype: FeatureDType::F64,
                role: ColumnRole::Numeric,
            });
        }
    }
    columns.push(column(COL_DELAYED, FeatureDType::F64, ColumnRole::Target));

    let fingerprint = schema_fingerprint(FEATURE_SCHEMA_VERSION, &columns);

    info!(
        component = "features",
        event = "features.schema.built",
        version = FEATURE_SCHEMA_VERSION,
        column_count = columns.len(),
        fingerprint = %fingerprint
    );

    FeatureSchema {
        version: FEATURE_SCHEMA_VERSION,
        fingerprint,
        columns,
    }
}

pub fn assert_schema_compatible(
    expected_version: u32,
    expected_fingerprint: &str,
    actual: &FeatureSchema,
) -> Result<(), FeatureError> {
    if expected_version != actual.version {
        return Err(FeatureError::SchemaVersionMismatch {
            expected: expected_version,
            actual: actual.version,
        });
    }

    if expected_fingerprint != actual.fingerprint {
        return Err(FeatureError::SchemaFingerprintMismatch {
            expected: expected_fingerprint.to_string(),
            actual: actual.fingerprint.clone(),
        });
    }

    Ok(())
}

fn column(name: &str, dtype: FeatureDType, role: ColumnRole) -> FeatureColumn {
    FeatureColumn {
        name: name.to_string(),
        dtype,
        role,
    }
}

fn schema_fingerprint(version: u32, columns: &[FeatureColumn]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("version:{version};"));
    hasher.update("columns:");
    for column in columns {
        hasher.update(column.name.as_bytes());
        hasher.update(format!(":{:?}:{:?};", column.dtype, column.role));
    }
    hex::encode(hasher.finalize())
}
