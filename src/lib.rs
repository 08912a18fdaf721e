//! Scheme report - SSIM and rebuffering per congestion-control/ABR scheme
//!
//! Reads `video_acked` and `client_buffer` telemetry from InfluxDB, resolves
//! each session's experiment to a scheme through Postgres, and reports the
//! average SSIM against the rebuffer rate of every scheme.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;

pub use application::Application;
pub use error::{Error, Result};
