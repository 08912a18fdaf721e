use crate::domain::{ExperimentId, SchemeKey};
use thiserror::Error;

/// Scheme report error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Formatting error: {0}")]
    Format(#[from] std::fmt::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("InfluxDB error: {0}")]
    Influx(String),

    #[error("Application error: {0}")]
    Application(String),

    /// Metadata lookup failed or returned a config without the required keys
    #[error("Cannot resolve config of experiment {experiment_id}: {reason}")]
    ConfigResolution {
        experiment_id: ExperimentId,
        reason: String,
    },

    /// A preloaded experiment file was supplied but lacks this experiment
    #[error("Experiment {0} is missing from the preloaded experiment file")]
    MissingPreloadedConfig(ExperimentId),

    #[error("Malformed sample: {0}")]
    MalformedSample(String),

    #[error("{scheme} does not exist in {missing_from}")]
    MissingCounterpart {
        scheme: SchemeKey,
        missing_from: &'static str,
    },

    #[error("no data found in the queried range")]
    NoData,

    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),
}

impl Error {
    pub fn config_resolution(experiment_id: ExperimentId, reason: impl Into<String>) -> Self {
        Self::ConfigResolution {
            experiment_id,
            reason: reason.into(),
        }
    }

    pub fn malformed_sample(reason: impl Into<String>) -> Self {
        Self::MalformedSample(reason.into())
    }

    /// Per-record errors that a run recovers from by skipping the record
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::ConfigResolution { .. } | Self::MalformedSample(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
