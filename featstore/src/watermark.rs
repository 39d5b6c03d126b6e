use crate::errors::{Result, StoreError};
use crate::models::{AdvanceOutcome, Watermark};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Mutex;

/// Date reported for jobs that have never completed a batch.
pub const BEGINNING_OF_TIME: NaiveDate = match NaiveDate::from_ymd_opt(1970, 1, 1) {
    Some(date) => date,
    None => panic!("invalid sentinel date"),
};

/// Per-job record of the last fully processed date.
///
/// `advance` is a compare-and-swap: it only writes when the job has no record
/// yet or the stored date is strictly older than the candidate. A rejected
/// advance is a normal outcome, not an error.
pub trait WatermarkStore: Send + Sync {
    fn record(&self, job_name: &str) -> Result<Option<Watermark>>;

    fn advance(&self, job_name: &str, candidate: NaiveDate) -> Result<AdvanceOutcome>;

    fn get(&self, job_name: &str) -> Result<NaiveDate> {
        Ok(self
            .record(job_name)?
            .map(|w| w.last_processed)
            .unwrap_or(BEGINNING_OF_TIME))
    }
}

#[derive(Default)]
pub struct MemoryWatermarkStore {
    records: Mutex<HashMap<String, Watermark>>,
}

impl MemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl WatermarkStore for MemoryWatermarkStore {
    fn record(&self, job_name: &str) -> Result<Option<Watermark>> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Other(anyhow::anyhow!("watermark mutex poisoned")))?;
        Ok(records.get(job_name).cloned())
    }

    fn advance(&self, job_name: &str, candidate: NaiveDate) -> Result<AdvanceOutcome> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StoreError::Other(anyhow::anyhow!("watermark mutex poisoned")))?;
        if let Some(existing) = records.get(job_name) {
            if existing.last_processed >= candidate {
                return Ok(AdvanceOutcome::Rejected {
                    current: existing.last_processed,
                });
            }
        }
        records.insert(
            job_name.to_string(),
            Watermark {
                job_name: job_name.to_string(),
                last_processed: candidate,
                updated_at: chrono::Utc::now().timestamp(),
            },
        );
        Ok(AdvanceOutcome::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn d(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_absent_job_reads_sentinel() {
        let store = MemoryWatermarkStore::new();
        assert_eq!(store.get("job").unwrap(), BEGINNING_OF_TIME);
        assert!(store.record("job").unwrap().is_none());
    }

    #[test]
    fn test_advance_is_monotonic() {
        let store = MemoryWatermarkStore::new();
        assert!(store.advance("job", d("2024-01-02")).unwrap().is_accepted());
        assert_eq!(
            store.advance("job", d("2024-01-02")).unwrap(),
            AdvanceOutcome::Rejected {
                current: d("2024-01-02")
            }
        );
        assert!(!store.advance("job", d("2024-01-01")).unwrap().is_accepted());
        assert!(store.advance("job", d("2024-01-03")).unwrap().is_accepted());
        assert_eq!(store.get("job").unwrap(), d("2024-01-03"));
        // Jobs are independent.
        assert_eq!(store.get("other").unwrap(), BEGINNING_OF_TIME);
    }

    #[test]
    fn test_concurrent_advances_keep_maximum() {
        let store = Arc::new(MemoryWatermarkStore::new());
        let handles: Vec<_> = (1..=20)
            .map(|day| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .advance("job", NaiveDate::from_ymd_opt(2024, 1, day).unwrap())
                        .unwrap()
                })
            })
            .collect();
        let accepted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|o| o.is_accepted())
            .count();
        assert!(accepted >= 1);
        assert_eq!(store.get("job").unwrap(), d("2024-01-20"));
    }
}
