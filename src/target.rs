//! Delay target construction.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::quality::{FlaggedFlight, QualityFlags};
use crate::table::FlightRecord;

pub const COL_DELAY_MINUTES: &str = "delay_minutes";
pub const COL_DELAYED: &str = "delayed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetConfig {
    /// A flight is delayed when its departure delay is strictly above this.
    pub delay_threshold_minutes: f64,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            delay_threshold_minutes: 15.0,
        }
    }
}

/// A flight that passed quality filtering, with its delay and label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledFlight {
    pub record: FlightRecord,
    pub scheduled_departure: NaiveDateTime,
    pub actual_departure: NaiveDateTime,
    pub delay_minutes: f64,
    pub delayed: u8,
    /// Quality flags raised on the source row. Only non-excluding flags can
    /// be set on a kept flight.
    #[serde(default)]
    pub flags: QualityFlags,
}

impl LabeledFlight {
    pub fn new(
        record: FlightRecord,
        scheduled_departure: NaiveDateTime,
        actual_departure: NaiveDateTime,
        cfg: &TargetConfig,
    ) -> Self {
        let delay = delay_minutes(scheduled_departure, actual_departure);
        Self {
            record,
            scheduled_departure,
            actual_departure,
            delay_minutes: delay,
            delayed: delay_label(delay, cfg.delay_threshold_minutes),
            flags: QualityFlags::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetReport {
    pub input_rows: u64,
    pub kept_rows: u64,
    pub dropped_rows: u64,
    pub delayed_rows: u64,
}

impl TargetReport {
    pub fn drop_rate(&self) -> f64 {
        if self.input_rows == 0 {
            0.0
        } else {
            self.dropped_rows as f64 / self.input_rows as f64
        }
    }

    pub fn delayed_share(&self) -> f64 {
        if self.kept_rows == 0 {
            0.0
        } else {
            self.delayed_rows as f64 / self.kept_rows as f64
        }
    }
}

pub fn delay_minutes(scheduled: NaiveDateTime, actual: NaiveDateTime) -> f64 {
    (actual - scheduled).num_milliseconds() as f64 / 60_000.0
}

pub fn delay_label(delay_minutes: f64, threshold_minutes: f64) -> u8 {
    u8::from(delay_minutes > threshold_minutes)
}

/// Drops flagged rows and labels the rest. Rows are never imputed.
pub fn build_targets(
    flagged: Vec<FlaggedFlight>,
    cfg: &TargetConfig,
) -> (Vec<LabeledFlight>, TargetReport) {
    let mut report = TargetReport {
        input_rows: flagged.len() as u64,
        ..TargetReport::default()
    };

    let mut labeled = Vec::with_capacity(flagged.len());
    for row in flagged {
        if row.flags.excludes_row() {
            report.dropped_rows += 1;
            continue;
        }
        let (Some(scheduled), Some(actual)) = (row.scheduled_departure, row.actual_departure)
        else {
            report.dropped_rows += 1;
            continue;
        };
        let mut flight = LabeledFlight::new(row.record, scheduled, actual, cfg);
        flight.flags = row.flags;
        report.delayed_rows += flight.delayed as u64;
        labeled.push(flight);
    }
    report.kept_rows = labeled.len() as u64;

    if report.dropped_rows > 0 {
        warn!(
            component = "target",
            event = "target.build.rows_dropped",
            dropped_rows = report.dropped_rows,
            input_rows = report.input_rows,
            drop_rate = report.drop_rate()
        );
    }

    info!(
        component = "target",
        event = "target.build.finish",
        input_rows = report.input_rows,
        kept_rows = report.kept_rows,
        delayed_rows = report.delayed_rows,
        delayed_share = report.delayed_share(),
        threshold_minutes = cfg.delay_threshold_minutes
    );

    (labeled, report)
}
