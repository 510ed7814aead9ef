//! Calendar features and delay transforms derived from the scheduled departure.

use chrono::{Datelike, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

pub const COL_HOUR_OF_DAY: &str = "hour_of_day";
pub const COL_DAY_OF_WEEK: &str = "day_of_week";
pub const COL_MONTH: &str = "month";
pub const COL_PERIOD_OF_DAY: &str = "period_of_day";
pub const COL_WEEKEND: &str = "weekend";
pub const COL_HIGH_SEASON: &str = "high_season";
pub const COL_DELAY_LOG: &str = "delay_log";
pub const COL_DELAY_CAPPED: &str = "delay_capped";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodOfDay {
    Morning,
    Afternoon,
    Evening,
    LateNight,
}

impl PeriodOfDay {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Morning => "morning",
            Self::Afternoon => "afternoon",
            Self::Evening => "evening",
            Self::LateNight => "late_night",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Days counted as weekend, Monday = 0. The default includes Friday.
    pub weekend_days: Vec<u32>,
    pub high_season_months: Vec<u32>,
    pub delay_cap_minutes: f64,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            weekend_days: vec![4, 5, 6],
            high_season_months: vec![7, 12],
            delay_cap_minutes: 120.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalendarFeatures {
    pub hour_of_day: u32,
    pub day_of_week: u32,
    pub month: u32,
    pub period_of_day: PeriodOfDay,
    pub weekend: u8,
    pub high_season: u8,
    pub delay_log: f64,
    pub delay_capped: f64,
}

pub fn period_of_day(hour: u32) -> PeriodOfDay {
    match hour {
        5..=11 => PeriodOfDay::Morning,
        12..=17 => PeriodOfDay::Afternoon,
        18..=21 => PeriodOfDay::Evening,
        _ => PeriodOfDay::LateNight,
    }
}

pub fn derive_calendar_features(
    scheduled_departure: NaiveDateTime,
    delay_minutes: f64,
    cfg: &CalendarConfig,
) -> CalendarFeatures {
    let hour_of_day = scheduled_departure.hour();
    let day_of_week = scheduled_departure.weekday().num_days_from_monday();
    let month = scheduled_departure.month();

    CalendarFeatures {
        hour_of_day,
        day_of_week,
        month,
        period_of_day: period_of_day(hour_of_day),
        weekend: u8::from(cfg.weekend_days.contains(&day_of_week)),
        high_season: u8::from(cfg.high_season_months.contains(&month)),
        delay_log: delay_minutes.max(0.0).ln_1p(),
        delay_capped: delay_minutes.max(0.0).min(cfg.delay_cap_minutes),
    }
}
