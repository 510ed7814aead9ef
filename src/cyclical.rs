//! Sine/cosine encodings of hour, day of week and month.

use std::f64::consts::PI;

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub const COL_HOUR_SIN: &str = "hour_sin";
pub const COL_HOUR_COS: &str = "hour_cos";
pub const COL_DOW_SIN: &str = "dow_sin";
pub const COL_DOW_COS: &str = "dow_cos";
pub const COL_MONTH_SIN: &str = "month_sin";
pub const COL_MONTH_COS: &str = "month_cos";

pub const CYCLICAL_COLUMNS: [&str; 6] = [
    COL_HOUR_SIN,
    COL_HOUR_COS,
    COL_DOW_SIN,
    COL_DOW_COS,
    COL_MONTH_SIN,
    COL_MONTH_COS,
];

const HOURS_PER_DAY: f64 = 24.0;
const DAYS_PER_WEEK: f64 = 7.0;
const MONTHS_PER_YEAR: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CyclicalFeatures {
    pub hour_sin: f64,
    pub hour_cos: f64,
    pub dow_sin: f64,
    pub dow_cos: f64,
    pub month_sin: f64,
    pub month_cos: f64,
}

impl CyclicalFeatures {
    pub fn values(&self) -> [f64; 6] {
        [
            self.hour_sin,
            self.hour_cos,
            self.dow_sin,
            self.dow_cos,
            self.month_sin,
            self.month_cos,
        ]
    }
}

pub fn cyclical_pair(value: f64, period: f64) -> (f64, f64) {
    let angle = 2.0 * PI * (value / period);
    (angle.sin(), angle.cos())
}

/// Encodes a timestamp. A missing timestamp encodes hour 0, Monday and
/// January, which are also real values; callers that need to tell them
/// apart must track missingness themselves.
pub fn encode_cyclical(ts: Option<NaiveDateTime>) -> CyclicalFeatures {
    let hour = ts.map(|t| t.hour()).unwrap_or(0) as f64;
    let dow = ts
        .map(|t| t.weekday().num_days_from_monday())
        .unwrap_or(0) as f64;
    let month_zero_based = ts.map(|t| t.month0()).unwrap_or(0) as f64;

    let (hour_sin, hour_cos) = cyclical_pair(hour, HOURS_PER_DAY);
    let (dow_sin, dow_cos) = cyclical_pair(dow, DAYS_PER_WEEK);
    let (month_sin, month_cos) = cyclical_pair(month_zero_based, MONTHS_PER_YEAR);

    CyclicalFeatures {
        hour_sin,
        hour_cos,
        dow_sin,
        dow_cos,
        month_sin,
        month_cos,
    }
}
