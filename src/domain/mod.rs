//! Domain types and reconstruction logic for scheme reports
//!
//! Everything here is pure: no I/O, no clocks. The application layer feeds
//! samples in and resolves experiment configs.

pub mod buffer_stream;
pub mod distribution;
pub mod experiment;
pub mod rebuffer;
pub mod report;
pub mod sample;
pub mod ssim;
pub mod types;
pub mod validation;

pub use buffer_stream::{BufferStream, OrderingPolicy, PlaybackState, SessionSummary};
pub use distribution::{cdf_curve, ChunkSsimTable, SchemeDistributions};
pub use experiment::{ExperimentConfig, SchemeGrouping, SchemeKey};
pub use rebuffer::{RebufferAggregate, RebufferRecord};
pub use report::{build_report, ReportRow};
pub use sample::{BufferEvent, BufferSample, Point, SessionKey, VideoAckedSample};
pub use ssim::{ssim_index_to_db, SsimAggregator};
pub use types::{ExperimentId, SchemeName, SsimIndex};
