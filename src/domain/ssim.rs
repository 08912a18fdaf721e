//! SSIM scale conversion and per-scheme SSIM aggregation

use std::collections::BTreeMap;
use tracing::warn;

use crate::domain::experiment::SchemeKey;
use crate::domain::types::SsimIndex;
use crate::domain::validation::validate_ssim;

/// Convert a linear SSIM index in `[0, 1)` to decibels
pub fn ssim_index_to_db(index: f64) -> f64 {
    -10.0 * (1.0 - index).log10()
}

/// Inverse of [`ssim_index_to_db`]
pub fn ssim_db_to_index(db: f64) -> f64 {
    1.0 - 10f64.powf(-db / 10.0)
}

/// Running `(sum, count)` of SSIM indices for one scheme
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SsimAccumulator {
    pub sum: f64,
    pub count: u64,
}

impl SsimAccumulator {
    /// Mean index converted to dB; `None` when nothing was counted
    pub fn average_db(&self) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let mean = self.sum / self.count as f64;
        Some(ssim_index_to_db(mean))
    }
}

/// Per-scheme SSIM aggregate
#[derive(Debug, Default)]
pub struct SsimAggregator {
    schemes: BTreeMap<SchemeKey, SsimAccumulator>,
}

impl SsimAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a scheme known even if none of its chunks carry usable SSIM
    pub fn register(&mut self, key: &SchemeKey) {
        self.schemes.entry(key.clone()).or_default();
    }

    /// Add one chunk's SSIM index; returns `false` if the index was excluded
    pub fn accumulate(&mut self, key: &SchemeKey, index: SsimIndex) -> bool {
        self.register(key);
        let Ok(index) = validate_ssim(index) else {
            return false;
        };
        if let Some(acc) = self.schemes.get_mut(key) {
            acc.sum += index.into_inner();
            acc.count += 1;
        }
        true
    }

    pub fn get(&self, key: &SchemeKey) -> Option<&SsimAccumulator> {
        self.schemes.get(key)
    }

    /// Average SSIM in dB per scheme; schemes without data are dropped with a warning
    pub fn finalize(self) -> BTreeMap<SchemeKey, f64> {
        self.schemes
            .into_iter()
            .filter_map(|(key, acc)| match acc.average_db() {
                Some(db) => Some((key, db)),
                None => {
                    warn!(scheme = %key, "{} does not have SSIM data", key);
                    None
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::SchemeName;
    use rstest::rstest;

    fn key(cc: &str) -> SchemeKey {
        SchemeKey::cc_only(SchemeName::try_new(cc).unwrap())
    }

    fn index(value: f64) -> SsimIndex {
        SsimIndex::try_new(value).unwrap()
    }

    #[rstest]
    #[case(0.0, 0.0)]
    #[case(0.9, 10.0)]
    #[case(0.99, 20.0)]
    #[case(0.999, 30.0)]
    fn converts_index_to_db(#[case] index: f64, #[case] expected_db: f64) {
        assert!((ssim_index_to_db(index) - expected_db).abs() < 1e-9);
    }

    #[test]
    fn db_round_trips_to_index() {
        assert!((ssim_db_to_index(ssim_index_to_db(0.97)) - 0.97).abs() < 1e-12);
    }

    #[test]
    fn averages_index_before_converting() {
        let mut agg = SsimAggregator::new();
        agg.accumulate(&key("bbr"), index(0.99));
        agg.accumulate(&key("bbr"), index(0.999));

        let result = agg.finalize();
        let expected = ssim_index_to_db((0.99 + 0.999) / 2.0);
        assert!((result[&key("bbr")] - expected).abs() < 1e-9);
    }

    #[test]
    fn perfect_index_is_not_counted() {
        let mut agg = SsimAggregator::new();
        assert!(!agg.accumulate(&key("cubic"), index(1.0)));
        assert!(agg.accumulate(&key("cubic"), index(0.9)));

        let acc = agg.get(&key("cubic")).unwrap();
        assert_eq!(acc.count, 1);
        assert!((acc.sum - 0.9).abs() < 1e-12);
    }

    #[test]
    fn scheme_without_data_is_dropped() {
        let mut agg = SsimAggregator::new();
        agg.accumulate(&key("cubic"), index(1.0));
        agg.accumulate(&key("bbr"), index(0.9));

        let result = agg.finalize();
        assert!(!result.contains_key(&key("cubic")));
        assert!(result.contains_key(&key("bbr")));
    }
}
