//! Window-by-window collection of SSIM and rebuffer data
//!
//! Every collector issues one time-series query per window and awaits it
//! before requesting the next, so state is only ever touched sequentially.

use async_trait::async_trait;
use chrono::Duration;
use std::collections::BTreeMap;
use tracing::{debug, info, instrument, warn};

use crate::application::resolver::ExperimentResolver;
use crate::application::window::TimeWindow;
use crate::domain::{
    BufferStream, ChunkSsimTable, OrderingPolicy, Point, RebufferAggregate, RebufferRecord,
    SchemeDistributions, SchemeGrouping, SchemeKey, SessionSummary, SsimAggregator,
    VideoAckedSample,
};
use crate::error::Result;
use crate::infrastructure::log_messages::collection;

pub const VIDEO_ACKED: &str = "video_acked";
pub const CLIENT_BUFFER: &str = "client_buffer";

/// Time-series store returning the raw points of one measurement
#[async_trait]
pub trait TimeSeriesSource: Send + Sync {
    async fn query(&self, measurement: &str, window: &TimeWindow) -> Result<Vec<Point>>;
}

/// What to query and how to group it
#[derive(Debug, Clone, Copy)]
pub struct CollectOptions {
    pub range: TimeWindow,
    pub window: Duration,
    pub grouping: SchemeGrouping,
    pub ordering: OrderingPolicy,
}

async fn query_window(
    source: &dyn TimeSeriesSource,
    measurement: &str,
    window: &TimeWindow,
) -> Result<Vec<Point>> {
    info!(
        measurement,
        start = %window.start_str(),
        end = %window.end_str(),
        "{}",
        collection::PROCESSING_WINDOW
    );
    let points = source.query(measurement, window).await?;
    debug!(measurement, points = points.len(), "Window fetched");
    Ok(points)
}

/// Average SSIM (dB) per scheme over the whole range
#[instrument(skip_all, fields(range = %options.range))]
pub async fn collect_ssim(
    source: &dyn TimeSeriesSource,
    resolver: &mut ExperimentResolver,
    options: &CollectOptions,
) -> Result<BTreeMap<SchemeKey, f64>> {
    let mut aggregator = SsimAggregator::new();

    for window in options.range.split(options.window) {
        for point in query_window(source, VIDEO_ACKED, &window).await? {
            let sample = match VideoAckedSample::from_point(&point) {
                Ok(sample) => sample,
                Err(e) => {
                    warn!(error = %e, "{}", collection::SKIPPING_VIDEO_ACKED);
                    continue;
                }
            };
            let Some(key) = resolver
                .scheme_key(sample.session.experiment_id, options.grouping)
                .await?
            else {
                continue;
            };

            match sample.ssim_index {
                Some(index) => {
                    aggregator.accumulate(&key, index);
                }
                None => aggregator.register(&key),
            }
        }
    }

    Ok(aggregator.finalize())
}

/// Reconstruct every session in the range; finalizes only after the last window
#[instrument(skip_all, fields(range = %options.range))]
pub async fn collect_sessions(
    source: &dyn TimeSeriesSource,
    options: &CollectOptions,
) -> Result<Vec<SessionSummary>> {
    let mut stream = BufferStream::new(options.ordering);

    for window in options.range.split(options.window) {
        for point in query_window(source, CLIENT_BUFFER, &window).await? {
            stream.add_point(&point);
        }
    }

    if stream.malformed_count() > 0 || stream.discarded_count() > 0 {
        warn!(
            malformed = stream.malformed_count(),
            discarded = stream.discarded_count(),
            "{}",
            collection::SAMPLES_SKIPPED
        );
    }

    let sessions = stream.done();
    info!(sessions = sessions.len(), "{}", collection::SESSIONS_RECONSTRUCTED);
    Ok(sessions)
}

/// Fold finalized sessions into per-scheme records, dropping unresolvable ones
pub async fn fold_sessions(
    sessions: &[SessionSummary],
    resolver: &mut ExperimentResolver,
    grouping: SchemeGrouping,
) -> Result<RebufferAggregate> {
    let mut aggregate = RebufferAggregate::new();
    for session in sessions {
        if let Some(key) = resolver
            .scheme_key(session.key.experiment_id, grouping)
            .await?
        {
            aggregate.fold(&key, session);
        }
    }
    Ok(aggregate)
}

/// Rebuffer totals per scheme over the whole range
pub async fn collect_rebuffer(
    source: &dyn TimeSeriesSource,
    resolver: &mut ExperimentResolver,
    options: &CollectOptions,
) -> Result<BTreeMap<SchemeKey, RebufferRecord>> {
    let sessions = collect_sessions(source, options).await?;
    let aggregate = fold_sessions(&sessions, resolver, options.grouping).await?;
    Ok(aggregate.into_inner())
}

/// Per-chunk SSIM, SSIM variation and per-session rebuffer rate by scheme
#[instrument(skip_all, fields(range = %options.range))]
pub async fn collect_distributions(
    source: &dyn TimeSeriesSource,
    resolver: &mut ExperimentResolver,
    options: &CollectOptions,
) -> Result<SchemeDistributions> {
    let mut table = ChunkSsimTable::new();
    for window in options.range.split(options.window) {
        for point in query_window(source, VIDEO_ACKED, &window).await? {
            match VideoAckedSample::from_point(&point) {
                Ok(sample) => {
                    table.add(&sample);
                }
                Err(e) => warn!(error = %e, "{}", collection::SKIPPING_VIDEO_ACKED),
            }
        }
    }

    let mut distributions = SchemeDistributions::default();
    for (session, chunks) in table.into_sessions() {
        if let Some(key) = resolver
            .scheme_key(session.experiment_id, options.grouping)
            .await?
        {
            distributions.add_chunks(&key, &chunks);
        }
    }

    for session in collect_sessions(source, options).await? {
        let Ok(ratio) = session.rebuf_ratio() else {
            debug!(session = %session.key, "Session without playback left out of rate CDF");
            continue;
        };
        if let Some(key) = resolver
            .scheme_key(session.key.experiment_id, options.grouping)
            .await?
        {
            distributions.add_rebuf_rate(&key, ratio);
        }
    }

    Ok(distributions)
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned points per measurement, filtered to the queried window
    #[derive(Default)]
    pub struct StaticSource {
        points: HashMap<String, Vec<Point>>,
        pub queries: Mutex<Vec<(String, TimeWindow)>>,
    }

    impl StaticSource {
        pub fn with(mut self, measurement: &str, points: Vec<serde_json::Value>) -> Self {
            self.points.insert(
                measurement.to_string(),
                points
                    .into_iter()
                    .filter_map(|p| p.as_object().cloned())
                    .collect(),
            );
            self
        }
    }

    #[async_trait]
    impl TimeSeriesSource for StaticSource {
        async fn query(&self, measurement: &str, window: &TimeWindow) -> Result<Vec<Point>> {
            if let Ok(mut queries) = self.queries.lock() {
                queries.push((measurement.to_string(), *window));
            }
            let start = window.start.timestamp_millis();
            let end = window.end.timestamp_millis();
            Ok(self
                .points
                .get(measurement)
                .map(|points| {
                    points
                        .iter()
                        .filter(|p| {
                            p.get("time")
                                .and_then(serde_json::Value::as_i64)
                                .is_none_or(|t| t >= start && t < end)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::StaticSource;
    use super::*;
    use crate::application::resolver::test_support::CountingLookup;
    use crate::domain::SchemeName;
    use serde_json::json;

    const DAY_MS: i64 = 86_400_000;
    // 2019-01-01T00:00:00Z
    const T0: i64 = 1_546_300_800_000;

    fn options(ordering: OrderingPolicy) -> CollectOptions {
        CollectOptions {
            range: TimeWindow::parse("2019-01-01T00:00:00Z", "2019-01-03T00:00:00Z").unwrap(),
            window: Duration::hours(24),
            grouping: SchemeGrouping::CongestionControl,
            ordering,
        }
    }

    fn resolver() -> ExperimentResolver {
        let (lookup, _) = CountingLookup::new([
            (1, json!({"cc": "bbr", "abr": "mpc"})),
            (2, json!({"cc": "cubic", "abr": "mpc"})),
        ]);
        ExperimentResolver::new(Box::new(lookup))
    }

    fn cc(name: &str) -> SchemeKey {
        SchemeKey::cc_only(SchemeName::try_new(name).unwrap())
    }

    fn buffer(user: &str, expt: i64, offset_ms: i64, event: &str) -> serde_json::Value {
        json!({
            "time": T0 + offset_ms,
            "user": user,
            "init_id": 1,
            "expt_id": expt,
            "event": event,
        })
    }

    #[tokio::test]
    async fn session_spanning_windows_is_counted_once() {
        // Playback crosses the day boundary between the two windows
        let source = StaticSource::default().with(
            CLIENT_BUFFER,
            vec![
                buffer("a", 1, DAY_MS - 60_000, "play"),
                buffer("a", 1, DAY_MS + 60_000, "rebuffer"),
                buffer("a", 1, DAY_MS + 90_000, "play"),
            ],
        );

        let mut resolver = resolver();
        let rebuffer = collect_rebuffer(&source, &mut resolver, &options(OrderingPolicy::Reorder))
            .await
            .unwrap();

        let record = &rebuffer[&cc("bbr")];
        assert_eq!(record.total_play_seconds, 120.0);
        assert_eq!(record.total_rebuf_seconds, 30.0);
        assert_eq!(record.sessions, 1);
        assert_eq!(source.queries.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unresolvable_sessions_are_dropped() {
        let source = StaticSource::default().with(
            CLIENT_BUFFER,
            vec![
                buffer("a", 1, 0, "play"),
                buffer("a", 1, 10_000, "play"),
                buffer("b", 77, 0, "play"),
                buffer("b", 77, 10_000, "play"),
            ],
        );

        let mut resolver = resolver();
        let rebuffer = collect_rebuffer(&source, &mut resolver, &options(OrderingPolicy::Discard))
            .await
            .unwrap();

        assert_eq!(rebuffer.len(), 1);
        assert!(rebuffer.contains_key(&cc("bbr")));
    }

    #[tokio::test]
    async fn ssim_is_averaged_per_scheme() {
        let source = StaticSource::default().with(
            VIDEO_ACKED,
            vec![
                json!({"time": T0, "user": "a", "init_id": 1, "expt_id": 1, "ssim_index": 0.99}),
                json!({"time": T0 + DAY_MS, "user": "a", "init_id": 1, "expt_id": 1, "ssim_index": 0.99}),
                json!({"time": T0, "user": "b", "init_id": 1, "expt_id": 2, "ssim_index": 1.0}),
                json!({"time": T0, "user": "b", "init_id": 1, "expt_id": 2, "ssim_index": 0.9}),
                json!({"user": "c", "init_id": 1, "expt_id": 2, "ssim_index": 0.5}),
            ],
        );

        let mut resolver = resolver();
        let ssim = collect_ssim(&source, &mut resolver, &options(OrderingPolicy::Reorder))
            .await
            .unwrap();

        assert!((ssim[&cc("bbr")] - 20.0).abs() < 1e-9);
        assert!((ssim[&cc("cubic")] - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn distributions_cover_chunks_and_sessions() {
        let source = StaticSource::default()
            .with(
                VIDEO_ACKED,
                vec![
                    json!({"time": T0, "user": "a", "init_id": 1, "expt_id": 1, "ssim_index": 0.9, "video_ts": 0}),
                    json!({"time": T0 + 2_000, "user": "a", "init_id": 1, "expt_id": 1, "ssim_index": 0.99, "video_ts": 180_180}),
                ],
            )
            .with(
                CLIENT_BUFFER,
                vec![
                    buffer("a", 1, 0, "play"),
                    buffer("a", 1, 90_000, "rebuffer"),
                    buffer("a", 1, 100_000, "play"),
                    buffer("z", 2, 0, "rebuffer"),
                    buffer("z", 2, 5_000, "timer"),
                ],
            );

        let mut resolver = resolver();
        let dists = collect_distributions(&source, &mut resolver, &options(OrderingPolicy::Reorder))
            .await
            .unwrap();

        assert_eq!(dists.ssim_db[&cc("bbr")].len(), 2);
        assert_eq!(dists.ssim_variation[&cc("bbr")].len(), 1);
        let rates = &dists.rebuf_rate_percent[&cc("bbr")];
        assert_eq!(rates.len(), 1);
        assert!((rates[0] - 100.0 * 10.0 / 90.0).abs() < 1e-9);
        // cubic session never played
        assert!(!dists.rebuf_rate_percent.contains_key(&cc("cubic")));
    }
}
