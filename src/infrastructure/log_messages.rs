//! Log message constants for scheme reports
//!
//! This module centralizes the log messages used across the collectors and
//! infrastructure so wording stays consistent between commands. Values are
//! attached as structured fields rather than interpolated.

/// Application startup and lifecycle messages
pub mod application {
    pub const STARTING: &str = "Starting scheme report";
    pub const CONNECTING_TO_DATABASE: &str = "Connecting to Postgres";
    pub const USING_PRELOADED_EXPERIMENTS: &str = "Using preloaded experiment configs";
    pub const QUERYING_INFLUXDB: &str = "Querying InfluxDB";
    pub const SAVED_PLOT: &str = "Saved plot";
}

/// Time-series collection messages
pub mod collection {
    pub const PROCESSING_WINDOW: &str = "Processing measurement window";
    pub const SKIPPING_VIDEO_ACKED: &str = "Skipping video_acked point";
    pub const SAMPLES_SKIPPED: &str = "Some client_buffer samples were skipped";
    pub const SESSIONS_RECONSTRUCTED: &str = "Buffer sessions reconstructed";
}

/// Error message prefixes for infrastructure components
pub mod errors {
    pub const CONNECTION_ERROR: &str = "Connection error";
    pub const UNEXPECTED_STATUS: &str = "Unexpected HTTP status";
    pub const STATEMENT_ERROR: &str = "Query statement failed";
    pub const EXPERIMENT_NOT_FOUND: &str = "no experiment row with this id";
}
