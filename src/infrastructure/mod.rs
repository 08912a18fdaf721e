//! Infrastructure layer for scheme reports
//!
//! This module contains the implementations for external concerns: the
//! Postgres experiment table, the InfluxDB query API and plot output.

pub mod database;
pub mod influx;
pub mod log_messages;
pub mod plot;

pub use database::Database;
pub use influx::InfluxClient;
pub use plot::{CdfPlot, PlotRenderer, SvgPlotter};
