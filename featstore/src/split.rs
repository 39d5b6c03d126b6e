use crate::config::SplitConfig;
use crate::errors::{Result, StoreError};
use crate::features::{FeatureFrame, FeatureValue};
use chrono::NaiveDate;
use std::path::Path;

/// One training row: the target followed by the feature cells.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledRow {
    pub date: NaiveDate,
    pub values: Vec<FeatureValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    /// Target name, then the feature columns.
    pub columns: Vec<String>,
    pub train: Vec<LabeledRow>,
    pub test: Vec<LabeledRow>,
}

/// Date-ordered train/test partitioning. Rows are never shuffled.
#[derive(Debug, Clone)]
pub struct TrainServeSplitter {
    target: String,
    cutoff: Option<NaiveDate>,
    test_size: f64,
}

impl TrainServeSplitter {
    pub fn new(target: impl Into<String>, config: &SplitConfig) -> Result<Self> {
        if !(config.test_size > 0.0 && config.test_size < 1.0) {
            return Err(StoreError::Config(format!(
                "test_size must be in (0, 1), got {}",
                config.test_size
            )));
        }
        Ok(Self {
            target: target.into(),
            cutoff: config.test_date,
            test_size: config.test_size,
        })
    }

    /// Every row must carry a target. With a cutoff, `date < cutoff` trains and
    /// the rest tests; otherwise the first `floor(n * (1 - test_size))` rows by
    /// date train.
    pub fn split(&self, frame: &FeatureFrame) -> Result<TrainTestSplit> {
        let mut rows = frame
            .rows
            .iter()
            .map(|row| {
                let target = row.target.ok_or_else(|| StoreError::MissingColumn {
                    date: row.date,
                    column: self.target.clone(),
                })?;
                let mut values = Vec::with_capacity(row.cells.len() + 1);
                values.push(FeatureValue::Float(target));
                values.extend(row.cells.iter().cloned());
                Ok(LabeledRow {
                    date: row.date,
                    values,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        // Stable, so rows sharing a date keep their input order.
        rows.sort_by_key(|row| row.date);

        let n_train = match self.cutoff {
            Some(cutoff) => rows.partition_point(|row| row.date < cutoff),
            None => (rows.len() as f64 * (1.0 - self.test_size)).floor() as usize,
        };
        let test = rows.split_off(n_train);

        let mut columns = Vec::with_capacity(frame.columns.len() + 1);
        columns.push(self.target.clone());
        columns.extend(frame.columns.iter().cloned());

        log::info!(
            "Split {} row(s) into {} train / {} test",
            rows.len() + test.len(),
            rows.len(),
            test.len()
        );
        Ok(TrainTestSplit {
            columns,
            train: rows,
            test,
        })
    }
}

/// Renders rows as header-less CSV.
pub fn to_csv(rows: &[LabeledRow]) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    for row in rows {
        writer.write_record(row.values.iter().map(|v| v.to_string()))?;
    }
    writer
        .into_inner()
        .map_err(|e| StoreError::Other(anyhow::anyhow!("failed to flush CSV buffer: {e}")))
}

pub async fn write_csv(path: &Path, rows: &[LabeledRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, to_csv(rows)?).await?;
    log::debug!("Wrote {} row(s) to {}", rows.len(), path.display());
    Ok(())
}
