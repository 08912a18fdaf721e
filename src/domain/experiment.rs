//! Experiment configuration and the scheme keys derived from it

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::domain::types::{ExperimentId, SchemeName};
use crate::error::{Error, Result};

/// Congestion-control / ABR configuration of one experiment arm
///
/// Immutable once fetched; historical experiment rows never change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    pub experiment_id: ExperimentId,
    pub congestion_control: SchemeName,
    pub abr_algorithm: Option<SchemeName>,
}

impl ExperimentConfig {
    /// Parse the JSON config payload stored with an experiment
    ///
    /// `cc` is required. The ABR algorithm is read from `abr_name` when
    /// present and from `abr` otherwise.
    pub fn from_payload(experiment_id: ExperimentId, payload: &Value) -> Result<Self> {
        let object = payload.as_object().ok_or_else(|| {
            Error::config_resolution(experiment_id, "config payload is not an object")
        })?;

        let congestion_control = match object.get("cc") {
            Some(value) => scheme_name(experiment_id, "cc", value)?,
            None => return Err(Error::config_resolution(experiment_id, "missing key 'cc'")),
        };

        let abr_algorithm = match object.get("abr_name").or_else(|| object.get("abr")) {
            Some(Value::Null) | None => None,
            Some(value) => Some(scheme_name(experiment_id, "abr", value)?),
        };

        Ok(Self {
            experiment_id,
            congestion_control,
            abr_algorithm,
        })
    }

    /// Grouping key of this experiment under the given report grouping
    pub fn scheme_key(&self, grouping: SchemeGrouping) -> Result<SchemeKey> {
        match grouping {
            SchemeGrouping::CongestionControl => Ok(SchemeKey::cc_only(
                self.congestion_control.clone(),
            )),
            SchemeGrouping::AbrAndCongestionControl => {
                let abr = self.abr_algorithm.clone().ok_or_else(|| {
                    Error::config_resolution(self.experiment_id, "missing key 'abr'")
                })?;
                Ok(SchemeKey::new(abr, self.congestion_control.clone()))
            }
        }
    }
}

fn scheme_name(experiment_id: ExperimentId, key: &str, value: &Value) -> Result<SchemeName> {
    let raw = value.as_str().ok_or_else(|| {
        Error::config_resolution(experiment_id, format!("key '{key}' is not a string"))
    })?;
    SchemeName::try_new(raw.to_string()).map_err(|e| {
        Error::config_resolution(experiment_id, format!("invalid '{key}' value: {e}"))
    })
}

/// How sessions are bucketed into experimental arms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeGrouping {
    /// `(abr, cc)` pairs
    AbrAndCongestionControl,
    /// congestion control alone
    CongestionControl,
}

/// One experimental arm; the key every aggregate is grouped by
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SchemeKey {
    pub abr: Option<SchemeName>,
    pub cc: SchemeName,
}

impl SchemeKey {
    pub fn new(abr: SchemeName, cc: SchemeName) -> Self {
        Self { abr: Some(abr), cc }
    }

    pub fn cc_only(cc: SchemeName) -> Self {
        Self { abr: None, cc }
    }
}

impl fmt::Display for SchemeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.abr {
            Some(abr) => write!(f, "{abr}+{}", self.cc),
            None => write!(f, "{}", self.cc),
        }
    }
}
