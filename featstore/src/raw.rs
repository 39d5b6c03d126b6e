//! Raw per-date record fetch.

use crate::config::LakeLayout;
use crate::errors::{Result, StoreError};
use crate::lake::Lake;
use crate::models::RawDailyRecord;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

pub const POWER_SOURCE: &str = "power usage";
pub const WEATHER_SOURCE: &str = "weather";

// Weather exports carry Japanese headers; both spellings are accepted.
const DATE_HEADERS: &[&str] = &["date", "年月日"];
const MAX_TEMP_HEADERS: &[&str] = &["max_temp", "最高気温(℃)"];
const MIN_TEMP_HEADERS: &[&str] = &["min_temp", "最低気温(℃)"];
const WEATHER_HEADERS: &[&str] = &["weather", "天気概況(昼：06時〜18時)"];

#[async_trait]
pub trait RawRecordSource: Send + Sync {
    /// The merged power and weather observations for one date. A missing
    /// source file is a data-completeness error.
    async fn fetch(&self, date: NaiveDate) -> Result<RawDailyRecord>;
}

/// Reads the per-date CSV objects that upstream ingestion drops in the lake.
pub struct LakeRawSource {
    lake: Arc<Lake>,
    layout: LakeLayout,
}

impl LakeRawSource {
    pub fn new(lake: Arc<Lake>, layout: LakeLayout) -> Self {
        Self { lake, layout }
    }

    async fn read(&self, key: &str, date: NaiveDate, source_name: &'static str) -> Result<Vec<u8>> {
        match self.lake.read_object(key).await {
            Ok(bytes) => Ok(bytes),
            Err(StoreError::NotFound(_)) => Err(StoreError::MissingRawData { date, source_name }),
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl RawRecordSource for LakeRawSource {
    async fn fetch(&self, date: NaiveDate) -> Result<RawDailyRecord> {
        let power_key = self.layout.power_key(date);
        let weather_key = self.layout.weather_key(date);
        let (power, weather) = tokio::try_join!(
            self.read(&power_key, date, POWER_SOURCE),
            self.read(&weather_key, date, WEATHER_SOURCE),
        )?;
        let max_power = parse_max_power(
            &power,
            date,
            &self.layout.power_column,
            self.layout.power_skip_rows,
        )?;
        let mut record = parse_weather(&weather, date)?;
        record.max_power = Some(max_power);
        Ok(record)
    }
}

fn skip_lines(bytes: &[u8], lines: usize) -> &[u8] {
    let mut rest = bytes;
    for _ in 0..lines {
        match rest.iter().position(|b| *b == b'\n') {
            Some(pos) => rest = &rest[pos + 1..],
            None => return &[],
        }
    }
    rest
}

fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| names.contains(&h.trim().trim_start_matches('\u{feff}')))
}

fn parse_number(raw: &str, date: NaiveDate, column: &str) -> Result<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse::<f64>().map(Some).map_err(|_| {
        StoreError::InvalidRawData(format!("{date}: '{raw}' in column '{column}' is not a number"))
    })
}

/// Peak of the power column after skipping the file's preamble.
pub fn parse_max_power(bytes: &[u8], date: NaiveDate, column: &str, skip_rows: usize) -> Result<f64> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(skip_lines(bytes, skip_rows));
    let headers = reader.headers()?.clone();
    let idx = find_column(&headers, &[column]).ok_or_else(|| StoreError::MissingColumn {
        date,
        column: column.to_string(),
    })?;

    let mut peak: Option<f64> = None;
    for record in reader.records() {
        let record = record?;
        let Some(cell) = record.get(idx) else {
            continue;
        };
        if let Some(value) = parse_number(cell, date, column)? {
            peak = Some(peak.map_or(value, |p| p.max(value)));
        }
    }
    peak.ok_or_else(|| StoreError::InvalidRawData(format!("{date}: no values in power column '{column}'")))
}

fn parse_date_cell(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
}

/// The weather row for `date`. Empty cells become absent values.
pub fn parse_weather(bytes: &[u8], date: NaiveDate) -> Result<RawDailyRecord> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);
    let headers = reader.headers()?.clone();
    let column = |names: &[&str]| {
        find_column(&headers, names).ok_or_else(|| StoreError::MissingColumn {
            date,
            column: names[0].to_string(),
        })
    };
    let date_idx = column(DATE_HEADERS)?;
    let max_idx = column(MAX_TEMP_HEADERS)?;
    let min_idx = column(MIN_TEMP_HEADERS)?;
    let weather_idx = column(WEATHER_HEADERS)?;

    for record in reader.records() {
        let record = record?;
        if record.get(date_idx).and_then(parse_date_cell) != Some(date) {
            continue;
        }
        let cell = |idx: usize| record.get(idx).unwrap_or("");
        let weather = cell(weather_idx).trim();
        return Ok(RawDailyRecord {
            date,
            max_power: None,
            max_temp: parse_number(cell(max_idx), date, MAX_TEMP_HEADERS[0])?,
            min_temp: parse_number(cell(min_idx), date, MIN_TEMP_HEADERS[0])?,
            weather: (!weather.is_empty()).then(|| weather.to_string()),
        });
    }
    Err(StoreError::InvalidRawData(format!("{date}: no weather row for this date")))
}

/// Fixed records keyed by date.
#[derive(Default)]
pub struct MemoryRawSource {
    records: HashMap<NaiveDate, RawDailyRecord>,
}

impl MemoryRawSource {
    pub fn new(records: impl IntoIterator<Item = RawDailyRecord>) -> Self {
        Self {
            records: records.into_iter().map(|r| (r.date, r)).collect(),
        }
    }
}

#[async_trait]
impl RawRecordSource for MemoryRawSource {
    async fn fetch(&self, date: NaiveDate) -> Result<RawDailyRecord> {
        self.records
            .get(&date)
            .cloned()
            .ok_or(StoreError::MissingRawData {
                date,
                source_name: POWER_SOURCE,
            })
    }
}
