use super::holiday::HolidayCalendar;
use super::weather::WeatherCategory;
use super::{FeatureFrame, FeatureRecord};
use crate::config::FeatureThresholds;
use crate::errors::{Result, StoreError};
use crate::models::RawDailyRecord;
use chrono::{Datelike, NaiveDate};
use std::f64::consts::PI;
use std::sync::Arc;

/// Derives model features from raw daily records. Pure apart from the holiday
/// lookup.
#[derive(Clone)]
pub struct FeatureEngine {
    thresholds: FeatureThresholds,
    calendar: Arc<dyn HolidayCalendar>,
}

impl FeatureEngine {
    pub fn new(thresholds: FeatureThresholds, calendar: Arc<dyn HolidayCalendar>) -> Self {
        Self {
            thresholds,
            calendar,
        }
    }

    pub fn thresholds(&self) -> &FeatureThresholds {
        &self.thresholds
    }

    pub fn derive(&self, record: &RawDailyRecord) -> Result<FeatureRecord> {
        let max_temp = require(record.date, "max_temp", record.max_temp)?;
        let min_temp = require(record.date, "min_temp", record.min_temp)?;

        let weather_category = WeatherCategory::classify(record.weather.as_deref());
        let t = &self.thresholds;
        let avg = (max_temp + min_temp) / 2.0;

        let date = record.date;
        let dow = date.weekday().num_days_from_monday();
        let month = date.month();
        let dow_angle = 2.0 * PI * f64::from(dow) / 7.0;
        let mon_angle = 2.0 * PI * f64::from(month) / 12.0;

        Ok(FeatureRecord {
            date,
            target: record.max_power,
            max_temp,
            min_temp,
            weather_category,
            avg,
            rng: max_temp - min_temp,
            cdd: (avg - t.cdd_base).max(0.0),
            hdd: (t.hdd_base - avg).max(0.0),
            hot: max_temp >= t.hot_day,
            cold: min_temp <= t.cold_day,
            year: date.year(),
            month,
            day: date.day(),
            dow,
            dow_sin: dow_angle.sin(),
            dow_cos: dow_angle.cos(),
            mon_sin: mon_angle.sin(),
            mon_cos: mon_angle.cos(),
            weekend: dow >= 5,
            holiday: self.calendar.is_holiday(date),
        })
    }

    /// Derives every record; the first failing record aborts the whole table.
    pub fn frame(&self, records: &[RawDailyRecord]) -> Result<FeatureFrame> {
        let derived = records
            .iter()
            .map(|r| self.derive(r))
            .collect::<Result<Vec<_>>>()?;
        Ok(FeatureFrame::from_records(&derived))
    }
}

fn require(date: NaiveDate, column: &str, value: Option<f64>) -> Result<f64> {
    match value {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(StoreError::MissingColumn {
            date,
            column: column.to_string(),
        }),
    }
}
