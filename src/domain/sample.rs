//! Raw time-series points and the typed samples parsed from them

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde_json::{Map, Value};
use std::str::FromStr;

use crate::domain::types::{ExperimentId, SsimIndex};
use crate::error::{Error, Result};

/// One row returned by the time-series store, keyed by column name
pub type Point = Map<String, Value>;

/// Identity of one playback session: stream endpoint, start and experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{user}/{init_id}/{experiment_id}")]
pub struct SessionKey {
    pub user: String,
    pub init_id: i64,
    pub experiment_id: ExperimentId,
}

impl SessionKey {
    fn from_point(point: &Point) -> Result<Self> {
        Ok(Self {
            user: field_string(point, "user")?,
            init_id: field_i64(point, "init_id")?,
            experiment_id: ExperimentId::new(field_i64(point, "expt_id")?),
        })
    }
}

/// Client buffer event reported with every `client_buffer` point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BufferEvent {
    #[display("init")]
    Init,
    #[display("startup")]
    Startup,
    #[display("play")]
    Play,
    #[display("rebuffer")]
    Rebuffer,
    #[display("timer")]
    Timer,
}

impl FromStr for BufferEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "init" => Ok(Self::Init),
            "startup" => Ok(Self::Startup),
            "play" => Ok(Self::Play),
            "rebuffer" => Ok(Self::Rebuffer),
            "timer" => Ok(Self::Timer),
            other => Err(Error::malformed_sample(format!(
                "unknown buffer event '{other}'"
            ))),
        }
    }
}

/// A `client_buffer` observation
#[derive(Debug, Clone, PartialEq)]
pub struct BufferSample {
    pub session: SessionKey,
    pub timestamp: DateTime<Utc>,
    pub event: BufferEvent,
}

impl BufferSample {
    pub fn from_point(point: &Point) -> Result<Self> {
        let event = field_string(point, "event")?.parse()?;
        Ok(Self {
            session: SessionKey::from_point(point)?,
            timestamp: field_time(point)?,
            event,
        })
    }
}

/// A `video_acked` observation: one acknowledged video chunk
#[derive(Debug, Clone, PartialEq)]
pub struct VideoAckedSample {
    pub session: SessionKey,
    pub timestamp: DateTime<Utc>,
    /// Presentation timestamp of the chunk, in video clock ticks
    pub video_ts: Option<i64>,
    pub ssim_index: Option<SsimIndex>,
}

impl VideoAckedSample {
    pub fn from_point(point: &Point) -> Result<Self> {
        let video_ts = match point.get("video_ts") {
            None | Some(Value::Null) => None,
            Some(_) => Some(field_i64(point, "video_ts")?),
        };
        Ok(Self {
            session: SessionKey::from_point(point)?,
            timestamp: field_time(point)?,
            video_ts,
            ssim_index: ssim_index(point)?,
        })
    }
}

/// SSIM index of a chunk, read from `ssim_index` or converted from `ssim` (dB)
fn ssim_index(point: &Point) -> Result<Option<SsimIndex>> {
    let raw = if let Some(index) = optional_f64(point, "ssim_index")? {
        index
    } else if let Some(db) = optional_f64(point, "ssim")? {
        crate::domain::ssim::ssim_db_to_index(db)
    } else {
        return Ok(None);
    };

    SsimIndex::try_new(raw)
        .map(Some)
        .map_err(|e| Error::malformed_sample(format!("invalid SSIM index {raw}: {e}")))
}

fn field<'a>(point: &'a Point, name: &str) -> Result<&'a Value> {
    match point.get(name) {
        None | Some(Value::Null) => Err(Error::malformed_sample(format!(
            "missing field '{name}'"
        ))),
        Some(value) => Ok(value),
    }
}

fn field_string(point: &Point, name: &str) -> Result<String> {
    match field(point, name)? {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(Error::malformed_sample(format!(
            "field '{name}' has unexpected value {other}"
        ))),
    }
}

// Tags come back as strings and fields as numbers; accept both.
fn field_i64(point: &Point, name: &str) -> Result<i64> {
    let value = field(point, name)?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| {
            Error::malformed_sample(format!("field '{name}' is not an integer: {value}"))
        })
}

fn optional_f64(point: &Point, name: &str) -> Result<Option<f64>> {
    match point.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_f64()
            .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
            .map(Some)
            .ok_or_else(|| {
                Error::malformed_sample(format!("field '{name}' is not a number: {value}"))
            }),
    }
}

/// `time` as epoch milliseconds or an RFC3339 string
fn field_time(point: &Point) -> Result<DateTime<Utc>> {
    match field(point, "time")? {
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| Error::malformed_sample(format!("invalid epoch time {n}"))),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| Error::malformed_sample(format!("invalid time '{s}': {e}"))),
        other => Err(Error::malformed_sample(format!(
            "field 'time' has unexpected value {other}"
        ))),
    }
}
