//! Domain newtypes for experiment telemetry
//!
//! These wrap the primitive values read from the metadata and time-series
//! stores so that validation happens once, at the boundary.

use nutype::nutype;
#[allow(unused_imports)] // These are used by nutype derive macros
use serde::{Deserialize, Serialize};

/// Identifier of an experiment row in the metadata store
#[nutype(derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    AsRef
))]
pub struct ExperimentId(i64);

impl ExperimentId {
    /// Parse an id as it appears in JSON keys and time-series fields
    pub fn parse(raw: &str) -> Option<Self> {
        raw.trim().parse::<i64>().ok().map(Self::new)
    }
}

/// Name of a congestion-control or ABR algorithm, e.g. `bbr` or `puffer_ttp`
///
/// Limited to 100 characters; names are used as plot labels.
#[nutype(
    sanitize(trim),
    validate(not_empty, len_char_max = 100),
    derive(
        Debug,
        Clone,
        PartialEq,
        Eq,
        Hash,
        PartialOrd,
        Ord,
        Serialize,
        Deserialize,
        AsRef,
        Display
    )
)]
pub struct SchemeName(String);

/// Linear SSIM index in `[0, 1]`
#[nutype(
    validate(finite, greater_or_equal = 0.0, less_or_equal = 1.0),
    derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)
)]
pub struct SsimIndex(f64);

impl SsimIndex {
    /// Index of exactly 1.0 marks a degenerate (lossless) frame
    pub fn is_perfect(&self) -> bool {
        self.into_inner() >= 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_id_parses_json_keys() {
        assert_eq!(ExperimentId::parse("42"), Some(ExperimentId::new(42)));
        assert_eq!(ExperimentId::parse(" 7 "), Some(ExperimentId::new(7)));
        assert_eq!(ExperimentId::parse("bbr"), None);
    }

    #[test]
    fn scheme_name_is_trimmed_and_non_empty() {
        let name = SchemeName::try_new("  bbr ").unwrap();
        assert_eq!(name.as_ref(), "bbr");
        assert!(SchemeName::try_new("   ").is_err());
    }

    #[test]
    fn ssim_index_bounds() {
        assert!(SsimIndex::try_new(0.0).is_ok());
        assert!(SsimIndex::try_new(1.0).unwrap().is_perfect());
        assert!(!SsimIndex::try_new(0.999).unwrap().is_perfect());
        assert!(SsimIndex::try_new(1.01).is_err());
        assert!(SsimIndex::try_new(-0.1).is_err());
        assert!(SsimIndex::try_new(f64::NAN).is_err());
    }
}
