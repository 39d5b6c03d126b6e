pub mod engine;
pub mod holiday;
pub mod weather;

pub use engine::FeatureEngine;
pub use holiday::{FixedHolidays, HolidayCalendar, JapaneseHolidays};
pub use weather::WeatherCategory;

use crate::errors::{Result, StoreError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Columns produced by [`FeatureEngine`], in output order.
pub const FEATURE_COLUMNS: [&str; 19] = [
    "max_temp",
    "min_temp",
    "weather_category",
    "avg",
    "rng",
    "cdd",
    "hdd",
    "hot",
    "cold",
    "year",
    "month",
    "day",
    "dow",
    "dow_sin",
    "dow_cos",
    "mon_sin",
    "mon_cos",
    "weekend",
    "holiday",
];

/// A single typed cell of a feature table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeatureValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl FeatureValue {
    /// The string an encoder matches against.
    pub fn category_key(&self) -> String {
        match self {
            FeatureValue::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FeatureValue::Int(v) => write!(f, "{v}"),
            FeatureValue::Float(v) => write!(f, "{v}"),
            FeatureValue::Text(v) => f.write_str(v),
        }
    }
}

/// Fully derived features for one date, before categorical encoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureRecord {
    pub date: NaiveDate,
    pub target: Option<f64>,
    pub max_temp: f64,
    pub min_temp: f64,
    pub weather_category: WeatherCategory,
    pub avg: f64,
    pub rng: f64,
    pub cdd: f64,
    pub hdd: f64,
    pub hot: bool,
    pub cold: bool,
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub dow: u32,
    pub dow_sin: f64,
    pub dow_cos: f64,
    pub mon_sin: f64,
    pub mon_cos: f64,
    pub weekend: bool,
    pub holiday: bool,
}

impl FeatureRecord {
    /// Cell values in [`FEATURE_COLUMNS`] order.
    pub fn cells(&self) -> Vec<FeatureValue> {
        use FeatureValue::{Float, Int, Text};
        vec![
            Float(self.max_temp),
            Float(self.min_temp),
            Text(self.weather_category.as_str().to_string()),
            Float(self.avg),
            Float(self.rng),
            Float(self.cdd),
            Float(self.hdd),
            Int(i64::from(self.hot)),
            Int(i64::from(self.cold)),
            Int(i64::from(self.year)),
            Int(i64::from(self.month)),
            Int(i64::from(self.day)),
            Int(i64::from(self.dow)),
            Float(self.dow_sin),
            Float(self.dow_cos),
            Float(self.mon_sin),
            Float(self.mon_cos),
            Int(i64::from(self.weekend)),
            Int(i64::from(self.holiday)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FrameRow {
    pub date: NaiveDate,
    pub target: Option<f64>,
    pub cells: Vec<FeatureValue>,
}

/// Ordered feature table. `date` and `target` ride along as row metadata and
/// are never part of `columns`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureFrame {
    pub columns: Vec<String>,
    pub rows: Vec<FrameRow>,
}

impl FeatureFrame {
    pub fn from_records(records: &[FeatureRecord]) -> Self {
        Self {
            columns: FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect(),
            rows: records
                .iter()
                .map(|r| FrameRow {
                    date: r.date,
                    target: r.target,
                    cells: r.cells(),
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Reorders (and narrows) the frame to exactly `columns`.
    pub fn select(&self, columns: &[String]) -> Result<FeatureFrame> {
        let index: HashMap<&str, usize> = self
            .columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let positions = columns
            .iter()
            .map(|c| {
                index.get(c.as_str()).copied().ok_or_else(|| {
                    StoreError::ManifestMismatch(format!("column '{c}' is missing from the table"))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(FeatureFrame {
            columns: columns.to_vec(),
            rows: self
                .rows
                .iter()
                .map(|row| FrameRow {
                    date: row.date,
                    target: row.target,
                    cells: positions.iter().map(|&i| row.cells[i].clone()).collect(),
                })
                .collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> FeatureFrame {
        FeatureFrame {
            columns: vec!["a".into(), "b".into(), "c".into()],
            rows: vec![FrameRow {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                target: Some(1.5),
                cells: vec![
                    FeatureValue::Int(1),
                    FeatureValue::Float(2.5),
                    FeatureValue::Text("x".into()),
                ],
            }],
        }
    }

    #[test]
    fn test_select_reorders_and_narrows() {
        let selected = frame().select(&["c".to_string(), "a".to_string()]).unwrap();
        assert_eq!(selected.columns, vec!["c", "a"]);
        assert_eq!(
            selected.rows[0].cells,
            vec![FeatureValue::Text("x".into()), FeatureValue::Int(1)]
        );
        assert_eq!(selected.rows[0].target, Some(1.5));
    }

    #[test]
    fn test_select_missing_column() {
        let err = frame().select(&["z".to_string()]).unwrap_err();
        assert!(matches!(err, StoreError::ManifestMismatch(_)));
    }

    #[test]
    fn test_value_rendering() {
        assert_eq!(FeatureValue::Float(21.0).to_string(), "21");
        assert_eq!(FeatureValue::Float(0.5).to_string(), "0.5");
        assert_eq!(FeatureValue::Int(-1).category_key(), "-1");
        assert_eq!(FeatureValue::Text("snow".into()).category_key(), "snow");
        assert_eq!(
            serde_json::to_string(&vec![FeatureValue::Int(1), FeatureValue::Text("a".into())])
                .unwrap(),
            r#"[1,"a"]"#
        );
    }
}
