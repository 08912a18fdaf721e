//! Joins SSIM and rebuffer aggregates into one row per scheme

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::experiment::SchemeKey;
use crate::domain::rebuffer::RebufferRecord;
use crate::domain::validation::validate_play_seconds;
use crate::error::{Error, Result};

/// One plotted point of the SSIM-vs-rebuffer comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub scheme: SchemeKey,
    pub label: String,
    /// Rebuffered minutes over started minutes of play, as a fraction
    pub rebuf_rate: f64,
    pub avg_ssim_db: f64,
    pub total_rebuf_seconds: f64,
    pub total_play_seconds: f64,
}

impl ReportRow {
    pub fn rebuf_rate_percent(&self) -> f64 {
        self.rebuf_rate * 100.0
    }
}

/// Rebuffered minutes over `ceil(play / 60)`; `None` when nothing was played
pub fn rebuf_rate(record: &RebufferRecord) -> Option<f64> {
    let play = validate_play_seconds(record.total_play_seconds).ok()?;
    let total_minutes = (play / 60.0).ceil();
    #[allow(clippy::cast_precision_loss)]
    let rebuf_minutes = record.rebuf_minutes as f64;
    Some(rebuf_minutes / total_minutes)
}

fn label(scheme: &SchemeKey, record: &RebufferRecord) -> String {
    format!(
        "{scheme}\n({:.1}m/{:.1}h)",
        record.total_rebuf_seconds / 60.0,
        record.total_play_seconds / 3600.0
    )
}

/// Build the report rows, failing if either side lacks a scheme the other has
///
/// A one-sided comparison would be misleading, so this never returns a
/// partial report.
pub fn build_report(
    ssim: &BTreeMap<SchemeKey, f64>,
    rebuffer: &BTreeMap<SchemeKey, RebufferRecord>,
) -> Result<Vec<ReportRow>> {
    if ssim.is_empty() || rebuffer.is_empty() {
        return Err(Error::NoData);
    }

    if let Some(scheme) = ssim.keys().find(|k| !rebuffer.contains_key(*k)) {
        return Err(Error::MissingCounterpart {
            scheme: scheme.clone(),
            missing_from: "rebuffer",
        });
    }
    if let Some(scheme) = rebuffer.keys().find(|k| !ssim.contains_key(*k)) {
        return Err(Error::MissingCounterpart {
            scheme: scheme.clone(),
            missing_from: "ssim",
        });
    }

    let mut rows = Vec::with_capacity(ssim.len());
    for (scheme, record) in rebuffer {
        let Some(rate) = rebuf_rate(record) else {
            warn!(scheme = %scheme, "Skipping scheme without playback time");
            continue;
        };
        rows.push(ReportRow {
            scheme: scheme.clone(),
            label: label(scheme, record),
            rebuf_rate: rate,
            avg_ssim_db: ssim[scheme],
            total_rebuf_seconds: record.total_rebuf_seconds,
            total_play_seconds: record.total_play_seconds,
        });
    }

    if rows.is_empty() {
        return Err(Error::NoData);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SchemeName;

    fn key(abr: &str, cc: &str) -> SchemeKey {
        SchemeKey::new(
            SchemeName::try_new(abr).unwrap(),
            SchemeName::try_new(cc).unwrap(),
        )
    }

    fn record(play: f64, rebuf: f64, minutes: u64) -> RebufferRecord {
        RebufferRecord {
            total_play_seconds: play,
            total_rebuf_seconds: rebuf,
            rebuf_minutes: minutes,
            sessions: 1,
            sessions_without_playback: usize::from(play == 0.0),
        }
    }

    #[test]
    fn rate_is_rebuffered_minutes_over_started_minutes() {
        let rate = rebuf_rate(&record(5400.0, 60.0, 1)).unwrap();
        assert!((rate - 1.0 / 90.0).abs() < 1e-12);

        // 61 seconds of play starts a second minute
        let rate = rebuf_rate(&record(61.0, 5.0, 1)).unwrap();
        assert!((rate - 0.5).abs() < 1e-12);
    }

    #[test]
    fn rate_is_undefined_without_play() {
        assert_eq!(rebuf_rate(&record(0.0, 30.0, 1)), None);
    }

    #[test]
    fn joins_matching_schemes() {
        let ssim = BTreeMap::from([(key("mpc", "bbr"), 16.5)]);
        let rebuffer = BTreeMap::from([(key("mpc", "bbr"), record(5400.0, 60.0, 1))]);

        let rows = build_report(&ssim, &rebuffer).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].avg_ssim_db, 16.5);
        assert!((rows[0].rebuf_rate_percent() - 100.0 / 90.0).abs() < 1e-9);
        assert_eq!(rows[0].label, "mpc+bbr\n(1.0m/1.5h)");
    }

    #[test]
    fn scheme_missing_from_rebuffer_is_fatal() {
        let ssim = BTreeMap::from([(key("mpc", "bbr"), 16.5), (key("bola", "cubic"), 15.0)]);
        let rebuffer = BTreeMap::from([(key("mpc", "bbr"), record(5400.0, 60.0, 1))]);

        let err = build_report(&ssim, &rebuffer).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCounterpart { missing_from: "rebuffer", .. }
        ));
        assert_eq!(err.to_string(), "bola+cubic does not exist in rebuffer");
    }

    #[test]
    fn scheme_missing_from_ssim_is_fatal() {
        let ssim = BTreeMap::from([(key("mpc", "bbr"), 16.5)]);
        let rebuffer = BTreeMap::from([
            (key("mpc", "bbr"), record(5400.0, 60.0, 1)),
            (key("mpc", "cubic"), record(100.0, 0.0, 0)),
        ]);

        let err = build_report(&ssim, &rebuffer).unwrap_err();
        assert!(matches!(
            err,
            Error::MissingCounterpart { missing_from: "ssim", .. }
        ));
    }

    #[test]
    fn empty_side_is_no_data() {
        let ssim = BTreeMap::new();
        let rebuffer = BTreeMap::from([(key("mpc", "bbr"), record(5400.0, 60.0, 1))]);
        assert!(matches!(build_report(&ssim, &rebuffer), Err(Error::NoData)));
    }

    #[test]
    fn scheme_without_play_is_skipped() {
        let ssim = BTreeMap::from([(key("mpc", "bbr"), 16.5), (key("mpc", "cubic"), 14.0)]);
        let rebuffer = BTreeMap::from([
            (key("mpc", "bbr"), record(5400.0, 60.0, 1)),
            (key("mpc", "cubic"), record(0.0, 10.0, 1)),
        ]);

        let rows = build_report(&ssim, &rebuffer).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].scheme, key("mpc", "bbr"));
    }
}
