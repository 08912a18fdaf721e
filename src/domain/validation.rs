//! Exclusion rules applied to every entity before it is aggregated
//!
//! Both the SSIM path and the rebuffer path go through these checks so the
//! degenerate cases are handled the same way everywhere.

use derive_more::Display;

use crate::domain::types::SsimIndex;

/// Why a value was kept out of an aggregate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Exclusion {
    /// SSIM index of exactly 1, a measurement artifact
    #[display("perfect SSIM index")]
    PerfectSsim,
    /// Session never played, so its rebuffer rate is undefined
    #[display("no playback time")]
    NoPlayback,
}

/// Admit an SSIM index into aggregation
pub fn validate_ssim(index: SsimIndex) -> Result<SsimIndex, Exclusion> {
    if index.is_perfect() {
        Err(Exclusion::PerfectSsim)
    } else {
        Ok(index)
    }
}

/// Admit a play total as the denominator of a rebuffer rate
pub fn validate_play_seconds(play_seconds: f64) -> Result<f64, Exclusion> {
    if play_seconds > 0.0 {
        Ok(play_seconds)
    } else {
        Err(Exclusion::NoPlayback)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_ssim_is_excluded() {
        let perfect = SsimIndex::try_new(1.0).unwrap();
        assert_eq!(validate_ssim(perfect), Err(Exclusion::PerfectSsim));

        let normal = SsimIndex::try_new(0.95).unwrap();
        assert_eq!(validate_ssim(normal), Ok(normal));
    }

    #[test]
    fn zero_play_is_excluded() {
        assert_eq!(validate_play_seconds(0.0), Err(Exclusion::NoPlayback));
        assert_eq!(validate_play_seconds(12.5), Ok(12.5));
    }
}
