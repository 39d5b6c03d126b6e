//! Incremental partition resolution.
//!
//! A calendar date is ready once both raw sources have at least one object for
//! it. The resolver intersects the two date sets and keeps only dates strictly
//! after the job's watermark.

use crate::errors::Result;
use crate::listing::{key_stream, ObjectLister};
use crate::watermark::WatermarkStore;
use chrono::NaiveDate;
use futures_util::TryStreamExt;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::sync::Arc;

static DATE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}-\d{2}-\d{2}").expect("date token pattern is valid"));

/// First `YYYY-MM-DD` token in an object key, if any.
pub fn extract_date_token(key: &str) -> Option<&str> {
    DATE_TOKEN.find(key).map(|m| m.as_str())
}

/// Collects the distinct partition dates found under a prefix.
pub struct DateExtractor {
    lister: Arc<dyn ObjectLister>,
}

impl DateExtractor {
    pub fn new(lister: Arc<dyn ObjectLister>) -> Self {
        Self { lister }
    }

    /// Streams the listing page by page. Keys without a date token are skipped;
    /// tokens that are not real calendar dates are skipped with a warning.
    pub async fn dates_under(&self, prefix: &str) -> Result<HashSet<NaiveDate>> {
        let mut keys = Box::pin(key_stream(Arc::clone(&self.lister), prefix.to_string()));
        let mut dates = HashSet::new();
        let mut scanned = 0usize;

        while let Some(key) = keys.try_next().await? {
            scanned += 1;
            let Some(token) = extract_date_token(&key) else {
                continue;
            };
            match NaiveDate::parse_from_str(token, "%Y-%m-%d") {
                Ok(date) => {
                    dates.insert(date);
                }
                Err(_) => log::warn!("Skipping key '{}': '{}' is not a calendar date", key, token),
            }
        }

        log::debug!(
            "Scanned {} key(s) under '{}', found {} distinct date(s)",
            scanned,
            prefix,
            dates.len()
        );
        Ok(dates)
    }
}

/// `sort(A ∩ B ∩ {d : d > last})`.
pub fn unprocessed_dates(
    first: &HashSet<NaiveDate>,
    second: &HashSet<NaiveDate>,
    last: NaiveDate,
) -> Vec<NaiveDate> {
    let mut dates: Vec<NaiveDate> = first
        .intersection(second)
        .copied()
        .filter(|date| *date > last)
        .collect();
    dates.sort_unstable();
    dates
}

pub struct PartitionResolver {
    extractor: DateExtractor,
    watermarks: Arc<dyn WatermarkStore>,
    power_prefix: String,
    weather_prefix: String,
}

impl PartitionResolver {
    pub fn new(
        lister: Arc<dyn ObjectLister>,
        watermarks: Arc<dyn WatermarkStore>,
        power_prefix: impl Into<String>,
        weather_prefix: impl Into<String>,
    ) -> Self {
        Self {
            extractor: DateExtractor::new(lister),
            watermarks,
            power_prefix: power_prefix.into(),
            weather_prefix: weather_prefix.into(),
        }
    }

    /// Dates present under both prefixes and newer than the job's watermark,
    /// ascending. An empty list means there is nothing new to process.
    pub async fn resolve(&self, job_name: &str) -> Result<Vec<NaiveDate>> {
        let last = self.watermarks.get(job_name)?;

        // The two listings are independent; run them side by side.
        let (power_dates, weather_dates) = tokio::try_join!(
            self.extractor.dates_under(&self.power_prefix),
            self.extractor.dates_under(&self.weather_prefix),
        )?;

        let dates = unprocessed_dates(&power_dates, &weather_dates, last);
        log::info!(
            "Job '{}': watermark {}, {} power date(s), {} weather date(s), {} unprocessed",
            job_name,
            last,
            power_dates.len(),
            weather_dates.len(),
            dates.len()
        );
        Ok(dates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::MemoryObjectLister;
    use crate::watermark::MemoryWatermarkStore;
    use chrono::Datelike;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn set(dates: &[&str]) -> HashSet<NaiveDate> {
        dates.iter().map(|s| d(s)).collect()
    }

    #[test]
    fn test_extract_date_token() {
        assert_eq!(
            extract_date_token("raw_power_usage/2024-01/2024-01-05/power_usage.csv"),
            Some("2024-01-05")
        );
        assert_eq!(extract_date_token("raw_power_usage/_SUCCESS"), None);
        assert_eq!(extract_date_token("a/2024-01-05_2024-02-01.csv"), Some("2024-01-05"));
    }

    #[test]
    fn test_unprocessed_dates_after_watermark() {
        let a = set(&["2024-01-01", "2024-01-02", "2024-01-03"]);
        let b = set(&["2024-01-02", "2024-01-03", "2024-01-04"]);
        assert_eq!(
            unprocessed_dates(&a, &b, d("2024-01-01")),
            vec![d("2024-01-02"), d("2024-01-03")]
        );
        // The watermark is an exclusive bound.
        assert_eq!(unprocessed_dates(&a, &b, d("2024-01-03")), Vec::<NaiveDate>::new());
    }

    #[test]
    fn test_unprocessed_dates_matches_definition() {
        let days: Vec<NaiveDate> = (1..=28)
            .map(|day| NaiveDate::from_ymd_opt(2024, 2, day).unwrap())
            .collect();
        let a: HashSet<_> = days.iter().copied().filter(|x| x.day() % 3 != 1).collect();
        let b: HashSet<_> = days.iter().copied().step_by(2).collect();
        for w in &days {
            let mut expected: Vec<_> = days
                .iter()
                .copied()
                .filter(|x| a.contains(x) && b.contains(x) && x > w)
                .collect();
            expected.sort();
            assert_eq!(unprocessed_dates(&a, &b, *w), expected);
        }
    }

    #[tokio::test]
    async fn test_date_extractor_dedups_and_skips() {
        let lister = Arc::new(MemoryObjectLister::new(
            [
                "raw_power_usage/2024-01/2024-01-01/power_usage.csv",
                "raw_power_usage/2024-01/2024-01-01/power_usage_v2.csv",
                "raw_power_usage/2024-01/2024-01-02/power_usage.csv",
                "raw_power_usage/2024-02/2024-02-30/power_usage.csv",
                "raw_power_usage/manifest.json",
            ],
            2,
        ));
        let extractor = DateExtractor::new(lister.clone());
        let dates = extractor.dates_under("raw_power_usage/").await.unwrap();
        assert_eq!(dates, set(&["2024-01-01", "2024-01-02"]));
        assert_eq!(lister.pages_served(), 3);
    }

    #[tokio::test]
    async fn test_resolver_intersects_and_respects_watermark() {
        let lister = Arc::new(MemoryObjectLister::new(
            [
                "power/2024-01-01.csv",
                "power/2024-01-02.csv",
                "power/2024-01-03.csv",
                "weather/2024-01-02.csv",
                "weather/2024-01-03.csv",
                "weather/2024-01-04.csv",
            ],
            100,
        ));
        let watermarks = Arc::new(MemoryWatermarkStore::new());
        watermarks.advance("daily", d("2024-01-01")).unwrap();

        let resolver = PartitionResolver::new(lister, watermarks.clone(), "power/", "weather/");
        let first = resolver.resolve("daily").await.unwrap();
        assert_eq!(first, vec![d("2024-01-02"), d("2024-01-03")]);

        // Resolving has no side effects.
        let second = resolver.resolve("daily").await.unwrap();
        assert_eq!(first, second);

        watermarks.advance("daily", d("2024-01-03")).unwrap();
        assert!(resolver.resolve("daily").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_resolver_without_watermark_takes_everything_complete() {
        let lister = Arc::new(MemoryObjectLister::new(
            ["power/2023-12-31.csv", "weather/2023-12-31.csv", "weather/2024-01-01.csv"],
            1,
        ));
        let resolver = PartitionResolver::new(
            lister,
            Arc::new(MemoryWatermarkStore::new()),
            "power/",
            "weather/",
        );
        assert_eq!(resolver.resolve("fresh").await.unwrap(), vec![d("2023-12-31")]);
    }
}
