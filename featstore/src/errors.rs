use chrono::NaiveDate;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite operation failed: {0}")]
    SQLite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML configuration error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Raw {source_name} data missing for {date}")]
    MissingRawData {
        date: NaiveDate,
        source_name: &'static str,
    },

    #[error("Required column '{column}' missing for {date}")]
    MissingColumn { date: NaiveDate, column: String },

    #[error("Invalid raw data: {0}")]
    InvalidRawData(String),

    #[error("Encoder '{encoder}' targets column '{column}' which is not in the feature table")]
    UnknownEncoderColumn { encoder: String, column: String },

    #[error("Unseen category '{value}' in column '{column}' for encoder '{encoder}'")]
    UnseenCategory {
        encoder: String,
        column: String,
        value: String,
    },

    #[error("Feature manifest mismatch: {0}")]
    ManifestMismatch(String),

    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArg(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl StoreError {
    /// Errors that mean a batch saw incomplete input and must not advance the watermark.
    pub fn is_data_completeness(&self) -> bool {
        matches!(
            self,
            StoreError::MissingRawData { .. }
                | StoreError::MissingColumn { .. }
                | StoreError::InvalidRawData(_)
        )
    }

    pub fn is_config(&self) -> bool {
        matches!(self, StoreError::Config(_) | StoreError::Yaml(_))
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
