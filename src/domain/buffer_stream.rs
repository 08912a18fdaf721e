//! Reconstruction of per-session play and rebuffer time from buffer samples
//!
//! `client_buffer` points arrive window by window, interleaved across
//! sessions and not necessarily in time order. [`BufferStream`] owns every
//! in-progress session until [`BufferStream::done`] is called once all
//! windows have been fed, so a session spanning several windows is never
//! closed out early.

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use crate::domain::sample::{BufferEvent, BufferSample, Point, SessionKey};
use crate::domain::validation::{validate_play_seconds, Exclusion};

const MILLIS_PER_MINUTE: i64 = 60_000;

/// What to do with a sample older than its session's latest sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum OrderingPolicy {
    /// Hold samples per session and replay them in timestamp order at `done()`
    #[default]
    #[display("reorder")]
    Reorder,
    /// Apply samples as they arrive; drop ones that go back in time
    #[display("discard")]
    Discard,
}

/// Playback state of a session between two consecutive samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PlaybackState {
    #[display("no data")]
    NoData,
    #[display("playing")]
    Playing,
    #[display("rebuffering")]
    Rebuffering,
}

impl PlaybackState {
    /// State entered after observing `event`; timer heartbeats keep the current state
    pub fn after(self, event: BufferEvent) -> Self {
        match event {
            BufferEvent::Init => Self::NoData,
            BufferEvent::Startup | BufferEvent::Play => Self::Playing,
            BufferEvent::Rebuffer => Self::Rebuffering,
            BufferEvent::Timer => self,
        }
    }
}

/// Finalized totals of one session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub key: SessionKey,
    pub total_play_seconds: f64,
    pub total_rebuf_seconds: f64,
    /// Distinct session-relative minutes during which the client was stalled
    pub rebuf_minutes: u64,
    pub sample_count: usize,
}

impl SessionSummary {
    /// Rebuffer time over play time; undefined for sessions that never played
    pub fn rebuf_ratio(&self) -> Result<f64, Exclusion> {
        validate_play_seconds(self.total_play_seconds).map(|play| self.total_rebuf_seconds / play)
    }

    pub fn has_playback(&self) -> bool {
        self.rebuf_ratio().is_ok()
    }
}

#[derive(Debug)]
struct PendingSample {
    timestamp: DateTime<Utc>,
    arrival: u64,
    event: BufferEvent,
}

#[derive(Debug)]
struct SessionAccumulator {
    state: PlaybackState,
    start: Option<DateTime<Utc>>,
    last_seen: Option<DateTime<Utc>>,
    play_seconds: f64,
    rebuf_seconds: f64,
    rebuf_minutes: BTreeSet<i64>,
    pending: Vec<PendingSample>,
    applied: usize,
}

impl SessionAccumulator {
    fn new() -> Self {
        Self {
            state: PlaybackState::NoData,
            start: None,
            last_seen: None,
            play_seconds: 0.0,
            rebuf_seconds: 0.0,
            rebuf_minutes: BTreeSet::new(),
            pending: Vec::new(),
            applied: 0,
        }
    }

    /// Advance the state machine; returns `false` if `timestamp` precedes the last sample
    fn apply(&mut self, timestamp: DateTime<Utc>, event: BufferEvent) -> bool {
        let start = *self.start.get_or_insert(timestamp);

        if let Some(last) = self.last_seen {
            if timestamp < last {
                return false;
            }

            let elapsed_ms = (timestamp - last).num_milliseconds();
            #[allow(clippy::cast_precision_loss)]
            let elapsed = elapsed_ms as f64 / 1000.0;
            match self.state {
                PlaybackState::Playing => self.play_seconds += elapsed,
                PlaybackState::Rebuffering => {
                    self.rebuf_seconds += elapsed;
                    self.mark_rebuffered(start, last, timestamp);
                }
                PlaybackState::NoData => {}
            }
        }

        self.last_seen = Some(timestamp);
        self.state = self.state.after(event);
        self.applied += 1;
        true
    }

    // Marks every minute bucket overlapped by the half-open interval [from, to).
    fn mark_rebuffered(&mut self, start: DateTime<Utc>, from: DateTime<Utc>, to: DateTime<Utc>) {
        let from_ms = (from - start).num_milliseconds();
        let to_ms = (to - start).num_milliseconds();
        if to_ms <= from_ms {
            return;
        }
        let first = from_ms / MILLIS_PER_MINUTE;
        let last = (to_ms - 1) / MILLIS_PER_MINUTE;
        self.rebuf_minutes.extend(first..=last);
    }

    fn replay_pending(&mut self, key: &SessionKey) {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|s| (s.timestamp, s.arrival));
        for sample in pending {
            if !self.apply(sample.timestamp, sample.event) {
                warn!(session = %key, "Sorted replay went back in time; sample dropped");
            }
        }
    }

    fn finish(mut self, key: SessionKey) -> SessionSummary {
        self.replay_pending(&key);
        SessionSummary {
            key,
            total_play_seconds: self.play_seconds,
            total_rebuf_seconds: self.rebuf_seconds,
            rebuf_minutes: self.rebuf_minutes.len() as u64,
            sample_count: self.applied,
        }
    }
}

/// Accumulates buffer samples of all sessions across every queried window
#[derive(Debug)]
pub struct BufferStream {
    policy: OrderingPolicy,
    sessions: HashMap<SessionKey, SessionAccumulator>,
    arrivals: u64,
    malformed: usize,
    discarded: usize,
}

impl BufferStream {
    pub fn new(policy: OrderingPolicy) -> Self {
        Self {
            policy,
            sessions: HashMap::new(),
            arrivals: 0,
            malformed: 0,
            discarded: 0,
        }
    }

    /// Parse and add one raw point; malformed points are skipped with a warning
    pub fn add_point(&mut self, point: &Point) {
        match BufferSample::from_point(point) {
            Ok(sample) => self.add_sample(sample),
            Err(e) => {
                self.malformed += 1;
                warn!(error = %e, "Skipping client_buffer point");
            }
        }
    }

    pub fn add_sample(&mut self, sample: BufferSample) {
        let arrival = self.arrivals;
        self.arrivals += 1;

        let session = self
            .sessions
            .entry(sample.session.clone())
            .or_insert_with(SessionAccumulator::new);

        match self.policy {
            OrderingPolicy::Reorder => session.pending.push(PendingSample {
                timestamp: sample.timestamp,
                arrival,
                event: sample.event,
            }),
            OrderingPolicy::Discard => {
                if !session.apply(sample.timestamp, sample.event) {
                    self.discarded += 1;
                    warn!(
                        session = %sample.session,
                        timestamp = %sample.timestamp,
                        "Discarding sample older than the session's last sample"
                    );
                }
            }
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn malformed_count(&self) -> usize {
        self.malformed
    }

    pub fn discarded_count(&self) -> usize {
        self.discarded
    }

    /// Finalize every session once the whole input has been consumed
    pub fn done(self) -> Vec<SessionSummary> {
        debug!(
            sessions = self.sessions.len(),
            malformed = self.malformed,
            discarded = self.discarded,
            policy = %self.policy,
            "Finalizing buffer stream"
        );

        let mut summaries: Vec<SessionSummary> = self
            .sessions
            .into_iter()
            .map(|(key, session)| session.finish(key))
            .collect();
        summaries.sort_by(|a, b| a.key.cmp(&b.key));
        summaries
    }
}
