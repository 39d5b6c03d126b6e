use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// --- Metadata Catalog (SQLite) Models ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Watermark {
    pub job_name: String,
    pub last_processed: NaiveDate,
    pub updated_at: i64, // Unix timestamp
}

/// Result of a conditional watermark write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Accepted,
    /// Another writer already holds a watermark at or beyond the candidate.
    Rejected { current: NaiveDate },
}

impl AdvanceOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdvanceOutcome::Accepted)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRun {
    pub run_id: i64,
    pub job_name: String,
    pub start_time: i64, // Unix timestamp
    pub end_time: Option<i64>,
    pub status: String,
    pub details: String,
}

// --- Raw input ---

/// One merged day of power usage and weather observations.
///
/// `max_power` is the training target and is absent at inference time. Missing
/// temperatures are carried as `None` so that the feature engine can reject
/// them explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDailyRecord {
    pub date: NaiveDate,
    #[serde(default)]
    pub max_power: Option<f64>,
    #[serde(default)]
    pub max_temp: Option<f64>,
    #[serde(default)]
    pub min_temp: Option<f64>,
    #[serde(default)]
    pub weather: Option<String>,
}

impl RawDailyRecord {
    pub fn observed(date: NaiveDate, max_temp: f64, min_temp: f64, weather: &str) -> Self {
        Self {
            date,
            max_power: None,
            max_temp: Some(max_temp),
            min_temp: Some(min_temp),
            weather: Some(weather.to_string()),
        }
    }

    pub fn with_target(mut self, max_power: f64) -> Self {
        self.max_power = Some(max_power);
        self
    }
}

/// What a daily batch did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    NothingNew,
    Processed {
        dates: Vec<NaiveDate>,
    },
    /// Dates were processed but a concurrent run had already moved the watermark.
    AlreadyAdvanced {
        dates: Vec<NaiveDate>,
        current: NaiveDate,
    },
}
