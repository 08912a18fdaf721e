//! Application services and orchestration
//!
//! This module coordinates the domain reconstruction with the experiment
//! resolver and the time-series source for one reporting run.

pub mod app;
pub mod collect;
pub mod resolver;
pub mod window;

pub use app::Application;
pub use collect::{CollectOptions, TimeSeriesSource};
pub use resolver::{ExperimentLookup, ExperimentResolver};
pub use window::TimeWindow;
