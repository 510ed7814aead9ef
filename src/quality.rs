//! Timestamp parsing and row-level data-quality flags.
//!
//! Every flag is an independent predicate. Period and delta checks only
//! fire when their inputs parsed; missingness is reported by its own flags.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::table::FlightRecord;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub const FLAG_MISSING_SCHEDULED_DEPARTURE: &str = "flag_missing_scheduled_departure";
pub const FLAG_MISSING_ACTUAL_DEPARTURE: &str = "flag_missing_actual_departure";
pub const FLAG_MISSING_ORIGIN_AIRPORT: &str = "flag_missing_origin_airport";
pub const FLAG_SCHEDULED_OUT_OF_PERIOD: &str = "flag_scheduled_out_of_period";
pub const FLAG_DEPARTURE_DELTA_IMPLAUSIBLE: &str = "flag_departure_delta_implausible";

/// Flag columns in output order.
pub const FLAG_COLUMNS: [&str; 5] = [
    FLAG_MISSING_SCHEDULED_DEPARTURE,
    FLAG_MISSING_ACTUAL_DEPARTURE,
    FLAG_MISSING_ORIGIN_AIRPORT,
    FLAG_SCHEDULED_OUT_OF_PERIOD,
    FLAG_DEPARTURE_DELTA_IMPLAUSIBLE,
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub period_start_year: i32,
    pub period_end_year: i32,
    pub max_departure_delta_hours: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            period_start_year: 2021,
            period_end_year: 2025,
            max_departure_delta_hours: 24.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityFlags {
    pub missing_scheduled_departure: bool,
    pub missing_actual_departure: bool,
    pub missing_origin_airport: bool,
    pub scheduled_out_of_period: bool,
    pub departure_delta_implausible: bool,
}

impl QualityFlags {
    /// True when any flag that removes the row from the modeling set is raised.
    /// A missing origin airport is tracked but does not exclude the row.
    pub fn excludes_row(&self) -> bool {
        self.missing_scheduled_departure
            || self.missing_actual_departure
            || self.scheduled_out_of_period
            || self.departure_delta_implausible
    }

    /// Flag values in `FLAG_COLUMNS` order.
    pub fn values(&self) -> [bool; 5] {
        [
            self.missing_scheduled_departure,
            self.missing_actual_departure,
            self.missing_origin_airport,
            self.scheduled_out_of_period,
            self.departure_delta_implausible,
        ]
    }

    pub fn named(&self) -> [(&'static str, bool); 5] {
        let values = self.values();
        std::array::from_fn(|slot| (FLAG_COLUMNS[slot], values[slot]))
    }

    /// Value of one flag column, `None` for other names.
    pub fn get(&self, name: &str) -> Option<bool> {
        let slot = FLAG_COLUMNS.iter().position(|column| *column == name)?;
        Some(self.values()[slot])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedFlight {
    pub record: FlightRecord,
    pub scheduled_departure: Option<NaiveDateTime>,
    pub actual_departure: Option<NaiveDateTime>,
    pub flags: QualityFlags,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityReport {
    pub rows: u64,
    pub missing_scheduled_departure: u64,
    pub missing_actual_departure: u64,
    pub missing_origin_airport: u64,
    pub scheduled_out_of_period: u64,
    pub departure_delta_implausible: u64,
    pub excluded_rows: u64,
}

/// Parses a `YYYY-MM-DD HH:MM:SS` timestamp; anything else is `None`.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw.trim(), TIMESTAMP_FORMAT).ok()
}

pub fn flag_flight(record: FlightRecord, cfg: &QualityConfig) -> FlaggedFlight {
    let scheduled = record.scheduled_departure.as_deref().and_then(parse_timestamp);
    let actual = record.actual_departure.as_deref().and_then(parse_timestamp);

    let scheduled_out_of_period = scheduled
        .map(|ts| ts.year() < cfg.period_start_year || ts.year() > cfg.period_end_year)
        .unwrap_or(false);

    let departure_delta_implausible = match (scheduled, actual) {
        (Some(s), Some(a)) => {
            let delta_hours = (a - s).num_milliseconds() as f64 / 3_600_000.0;
            delta_hours.abs() > cfg.max_departure_delta_hours
        }
        _ => false,
    };

    let flags = QualityFlags {
        missing_scheduled_departure: scheduled.is_none(),
        missing_actual_departure: actual.is_none(),
        missing_origin_airport: record.origin_airport.is_none(),
        scheduled_out_of_period,
        departure_delta_implausible,
    };

    FlaggedFlight {
        record,
        scheduled_departure: scheduled,
        actual_departure: actual,
        flags,
    }
}

pub fn flag_flights(
    records: Vec<FlightRecord>,
    cfg: &QualityConfig,
) -> (Vec<FlaggedFlight>, QualityReport) {
    let mut report = QualityReport::default();
    let flagged: Vec<FlaggedFlight> = records
        .into_iter()
        .map(|record| {
            let row = flag_flight(record, cfg);
            report.rows += 1;
            report.missing_scheduled_departure += row.flags.missing_scheduled_departure as u64;
            report.missing_actual_departure += row.flags.missing_actual_departure as u64;
            report.missing_origin_airport += row.flags.missing_origin_airport as u64;
            report.scheduled_out_of_period += row.flags.scheduled_out_of_period as u64;
            report.departure_delta_implausible += row.flags.departure_delta_implausible as u64;
            report.excluded_rows += row.flags.excludes_row() as u64;
            row
        })
        .collect();

    info!(
        component = "quality",
        event = "quality.flag.finish",
        rows = report.rows,
        missing_scheduled_departure = report.missing_scheduled_departure,
        missing_actual_departure = report.missing_actual_departure,
        missing_origin_airport = report.missing_origin_airport,
        scheduled_out_of_period = report.scheduled_out_of_period,
        departure_delta_implausible = report.departure_delta_implausible,
        excluded_rows = report.excluded_rows
    );

    (flagged, report)
}
