//! Per-scheme rebuffer totals folded from finalized sessions

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::buffer_stream::SessionSummary;
use crate::domain::experiment::SchemeKey;

/// Rebuffer and play totals of every session in one scheme
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RebufferRecord {
    pub total_play_seconds: f64,
    pub total_rebuf_seconds: f64,
    pub rebuf_minutes: u64,
    pub sessions: usize,
    /// Sessions folded in with zero play time
    pub sessions_without_playback: usize,
}

impl RebufferRecord {
    pub fn fold(&mut self, session: &SessionSummary) {
        self.total_play_seconds += session.total_play_seconds;
        self.total_rebuf_seconds += session.total_rebuf_seconds;
        self.rebuf_minutes += session.rebuf_minutes;
        self.sessions += 1;
        if !session.has_playback() {
            self.sessions_without_playback += 1;
        }
    }
}

/// Rebuffer records keyed by scheme
#[derive(Debug, Default)]
pub struct RebufferAggregate {
    schemes: BTreeMap<SchemeKey, RebufferRecord>,
}

impl RebufferAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fold(&mut self, key: &SchemeKey, session: &SessionSummary) {
        self.schemes.entry(key.clone()).or_default().fold(session);
    }

    pub fn get(&self, key: &SchemeKey) -> Option<&RebufferRecord> {
        self.schemes.get(key)
    }

    pub fn into_inner(self) -> BTreeMap<SchemeKey, RebufferRecord> {
        self.schemes
    }
}
