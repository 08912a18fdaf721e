//! Per-scheme value distributions and their empirical CDFs

use std::collections::{BTreeMap, HashMap};

use crate::domain::experiment::SchemeKey;
use crate::domain::sample::{SessionKey, VideoAckedSample};
use crate::domain::ssim::ssim_index_to_db;
use crate::domain::types::SsimIndex;
use crate::domain::validation::validate_ssim;

/// Length of one video chunk in 90 kHz clock ticks
pub const VIDEO_DURATION: i64 = 180_180;

/// SSIM of every acknowledged chunk of one session, keyed by `video_ts`
#[derive(Debug, Default, Clone)]
pub struct SessionChunks {
    chunks: BTreeMap<i64, SsimIndex>,
}

impl SessionChunks {
    /// SSIM in dB of every chunk, perfect chunks excluded
    pub fn ssim_db(&self) -> Vec<f64> {
        self.chunks
            .values()
            .filter_map(|index| validate_ssim(*index).ok())
            .map(|index| ssim_index_to_db(index.into_inner()))
            .collect()
    }

    /// Absolute dB change from the chunk exactly one duration earlier
    pub fn ssim_variation(&self) -> Vec<f64> {
        self.chunks
            .iter()
            .filter_map(|(video_ts, index)| {
                let current = validate_ssim(*index).ok()?;
                let previous = validate_ssim(*self.chunks.get(&(video_ts - VIDEO_DURATION))?).ok()?;
                let diff = ssim_index_to_db(current.into_inner())
                    - ssim_index_to_db(previous.into_inner());
                Some(diff.abs())
            })
            .collect()
    }
}

/// Chunk SSIM of every session seen in `video_acked`
#[derive(Debug, Default)]
pub struct ChunkSsimTable {
    sessions: HashMap<SessionKey, SessionChunks>,
}

impl ChunkSsimTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chunk; samples without `video_ts` or SSIM are ignored
    pub fn add(&mut self, sample: &VideoAckedSample) -> bool {
        let (Some(video_ts), Some(index)) = (sample.video_ts, sample.ssim_index) else {
            return false;
        };
        self.sessions
            .entry(sample.session.clone())
            .or_default()
            .chunks
            .insert(video_ts, index);
        true
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn into_sessions(self) -> Vec<(SessionKey, SessionChunks)> {
        let mut sessions: Vec<_> = self.sessions.into_iter().collect();
        sessions.sort_by(|a, b| a.0.cmp(&b.0));
        sessions
    }
}

/// Series per scheme, fed to one CDF plot each
#[derive(Debug, Default)]
pub struct SchemeDistributions {
    pub ssim_db: BTreeMap<SchemeKey, Vec<f64>>,
    pub ssim_variation: BTreeMap<SchemeKey, Vec<f64>>,
    pub rebuf_rate_percent: BTreeMap<SchemeKey, Vec<f64>>,
}

impl SchemeDistributions {
    pub fn add_chunks(&mut self, scheme: &SchemeKey, chunks: &SessionChunks) {
        self.ssim_db
            .entry(scheme.clone())
            .or_default()
            .extend(chunks.ssim_db());
        self.ssim_variation
            .entry(scheme.clone())
            .or_default()
            .extend(chunks.ssim_variation());
    }

    pub fn add_rebuf_rate(&mut self, scheme: &SchemeKey, ratio: f64) {
        self.rebuf_rate_percent
            .entry(scheme.clone())
            .or_default()
            .push(100.0 * ratio);
    }
}

/// Empirical CDF sampled at histogram bin edges
#[derive(Debug, Clone, PartialEq)]
pub struct CdfCurve {
    /// `bins + 1` bin edges
    pub x: Vec<f64>,
    /// Cumulative fraction at each edge, starting at 0
    pub y: Vec<f64>,
}

/// Cumulative histogram of `values` over `[min, max]` in `bins` equal bins
///
/// Values outside the range are not binned but still count toward the
/// denominator. A degenerate range is widened by 0.5 on each side.
pub fn cdf_curve(values: &[f64], min: f64, max: f64, bins: usize) -> CdfCurve {
    let (min, max) = if max > min { (min, max) } else { (min - 0.5, max + 0.5) };
    let bins = bins.max(1);
    #[allow(clippy::cast_precision_loss)]
    let width = (max - min) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &value in values {
        if !(min..=max).contains(&value) {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let bin = (((value - min) / width) as usize).min(bins - 1);
        counts[bin] += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    let x = (0..=bins).map(|i| min + width * i as f64).collect();

    #[allow(clippy::cast_precision_loss)]
    let total = values.len().max(1) as f64;
    let mut y = Vec::with_capacity(bins + 1);
    y.push(0.0);
    let mut running = 0usize;
    for count in counts {
        running += count;
        #[allow(clippy::cast_precision_loss)]
        y.push(running as f64 / total);
    }

    CdfCurve { x, y }
}

/// Smallest and largest value across all series
pub fn value_range<'a>(series: impl IntoIterator<Item = &'a Vec<f64>>) -> Option<(f64, f64)> {
    series
        .into_iter()
        .flatten()
        .fold(None, |range, &v| match range {
            None => Some((v, v)),
            Some((lo, hi)) => Some((f64::min(lo, v), f64::max(hi, v))),
        })
}
