use crate::config::StorageConfig;
use crate::errors::{Result, StoreError};
use crate::models::{AdvanceOutcome, BatchRun, Watermark};
use crate::watermark::WatermarkStore;
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Catalog {
    conn: Arc<Mutex<Connection>>,
}

impl Catalog {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let conn = Connection::open(&config.catalog_path)?;
        // Overlapping pipeline runs share the database file; wait for the lock
        // instead of failing with SQLITE_BUSY.
        conn.busy_timeout(Duration::from_secs(10))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Other(anyhow::anyhow!("catalog connection mutex poisoned")))
    }

    pub fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS watermarks (
                job_name TEXT PRIMARY KEY,
                last_processed TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS batch_runs (
                run_id INTEGER PRIMARY KEY AUTOINCREMENT,
                job_name TEXT NOT NULL,
                start_time INTEGER NOT NULL,
                end_time INTEGER,
                status TEXT,
                details TEXT
            );
            COMMIT;",
        )?;
        Ok(())
    }

    pub fn list_watermarks(&self) -> Result<Vec<Watermark>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT job_name, last_processed, updated_at FROM watermarks ORDER BY job_name",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut watermarks = Vec::new();
        for row in rows {
            let (job_name, last_processed, updated_at) = row?;
            watermarks.push(Watermark {
                last_processed: parse_stored_date(&job_name, &last_processed)?,
                job_name,
                updated_at,
            });
        }
        Ok(watermarks)
    }

    pub fn create_batch_run(&self, job_name: &str) -> Result<i64> {
        let conn = self.conn()?;
        let start_time = chrono::Utc::now().timestamp();
        conn.execute(
            "INSERT INTO batch_runs (job_name, start_time, status) VALUES (?1, ?2, 'RUNNING')",
            params![job_name, start_time],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn finish_batch_run(&self, run_id: i64, status: &str, details: &str) -> Result<()> {
        let conn = self.conn()?;
        let end_time = chrono::Utc::now().timestamp();
        conn.execute(
            "UPDATE batch_runs SET status = ?1, details = ?2, end_time = ?3 WHERE run_id = ?4",
            params![status, details, end_time, run_id],
        )?;
        Ok(())
    }

    pub fn list_batch_runs(&self, job_name: &str, limit: usize) -> Result<Vec<BatchRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, job_name, start_time, end_time, status, details
             FROM batch_runs WHERE job_name = ?1 ORDER BY run_id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![job_name, limit as i64], |row| {
            Ok(BatchRun {
                run_id: row.get(0)?,
                job_name: row.get(1)?,
                start_time: row.get(2)?,
                end_time: row.get(3)?,
                status: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                details: row.get::<_, Option<String>>(5)?.unwrap_or_default(),
            })
        })?;
        Ok(rows.collect::<std::result::Result<Vec<_>, _>>()?)
    }
}

fn parse_stored_date(job_name: &str, raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        StoreError::InvalidArg(format!(
            "stored watermark '{raw}' for job '{job_name}' is not a date: {e}"
        ))
    })
}

impl WatermarkStore for Catalog {
    fn record(&self, job_name: &str) -> Result<Option<Watermark>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT last_processed, updated_at FROM watermarks WHERE job_name = ?1",
                params![job_name],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?;

        match row {
            Some((last_processed, updated_at)) => Ok(Some(Watermark {
                job_name: job_name.to_string(),
                last_processed: parse_stored_date(job_name, &last_processed)?,
                updated_at,
            })),
            None => Ok(None),
        }
    }

    fn advance(&self, job_name: &str, candidate: NaiveDate) -> Result<AdvanceOutcome> {
        let conn = self.conn()?;
        let now = chrono::Utc::now().timestamp();
        // ISO dates order lexicographically, so the text comparison is a date comparison.
        let changed = conn.execute(
            "INSERT INTO watermarks (job_name, last_processed, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(job_name) DO UPDATE SET
                last_processed = excluded.last_processed,
                updated_at = excluded.updated_at
             WHERE excluded.last_processed > watermarks.last_processed",
            params![job_name, candidate.format(DATE_FORMAT).to_string(), now],
        )?;

        if changed > 0 {
            log::info!("Watermark for '{}' advanced to {}", job_name, candidate);
            return Ok(AdvanceOutcome::Accepted);
        }

        let current: String = conn.query_row(
            "SELECT last_processed FROM watermarks WHERE job_name = ?1",
            params![job_name],
            |row| row.get(0),
        )?;
        let current = parse_stored_date(job_name, &current)?;
        log::info!(
            "Watermark for '{}' already at {} (candidate {}); leaving it in place",
            job_name,
            current,
            candidate
        );
        Ok(AdvanceOutcome::Rejected { current })
    }
}
