//! Experiment config resolution with a per-run cache
//!
//! The resolver is an explicit object owned by the run and passed by
//! reference to every collector; its cache lives exactly as long as one
//! invocation.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::domain::{ExperimentConfig, ExperimentId, SchemeGrouping, SchemeKey};
use crate::error::{Error, Result};

/// Metadata store holding the config payload of every experiment
#[async_trait]
pub trait ExperimentLookup: Send + Sync {
    /// Raw JSON config of one experiment
    async fn lookup(&self, experiment_id: ExperimentId) -> Result<Value>;
}

/// Resolves experiment ids to configs, looking each id up at most once
pub struct ExperimentResolver {
    lookup: Option<Box<dyn ExperimentLookup>>,
    cache: HashMap<ExperimentId, Arc<ExperimentConfig>>,
    unresolvable: HashSet<ExperimentId>,
}

impl ExperimentResolver {
    /// Resolver backed by a metadata store
    pub fn new(lookup: Box<dyn ExperimentLookup>) -> Self {
        Self {
            lookup: Some(lookup),
            cache: HashMap::new(),
            unresolvable: HashSet::new(),
        }
    }

    /// Resolver seeded from a JSON file of `{"<id>": {<config>}}`; no store is consulted
    pub fn from_preloaded_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let payload: Value = serde_json::from_str(&contents)?;
        Self::from_preloaded(&payload)
    }

    pub fn from_preloaded(payload: &Value) -> Result<Self> {
        let entries = payload.as_object().ok_or_else(|| {
            Error::Application("preloaded experiment file must be a JSON object".to_string())
        })?;

        let mut cache = HashMap::with_capacity(entries.len());
        for (raw_id, config) in entries {
            let experiment_id = ExperimentId::parse(raw_id).ok_or_else(|| {
                Error::Application(format!("invalid experiment id '{raw_id}' in preloaded file"))
            })?;
            let config = ExperimentConfig::from_payload(experiment_id, config)?;
            cache.insert(experiment_id, Arc::new(config));
        }

        Ok(Self {
            lookup: None,
            cache,
            unresolvable: HashSet::new(),
        })
    }

    /// True when every config comes from a preloaded file
    pub fn is_preloaded(&self) -> bool {
        self.lookup.is_none()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }

    #[instrument(skip(self))]
    pub async fn resolve(&mut self, experiment_id: ExperimentId) -> Result<Arc<ExperimentConfig>> {
        if let Some(config) = self.cache.get(&experiment_id) {
            return Ok(Arc::clone(config));
        }

        let Some(lookup) = &self.lookup else {
            return Err(Error::MissingPreloadedConfig(experiment_id));
        };

        debug!("Looking up experiment config");
        let payload = lookup.lookup(experiment_id).await.map_err(|e| match e {
            Error::ConfigResolution { .. } => e,
            other => Error::config_resolution(experiment_id, other.to_string()),
        })?;
        let config = Arc::new(ExperimentConfig::from_payload(experiment_id, &payload)?);
        self.cache.insert(experiment_id, Arc::clone(&config));
        Ok(config)
    }

    /// Scheme key of an experiment; `None` when the experiment cannot be
    /// resolved and its data should be dropped
    ///
    /// Each unresolvable experiment is warned about and looked up only once.
    pub async fn scheme_key(
        &mut self,
        experiment_id: ExperimentId,
        grouping: SchemeGrouping,
    ) -> Result<Option<SchemeKey>> {
        if self.unresolvable.contains(&experiment_id) {
            return Ok(None);
        }

        let resolved = match self.resolve(experiment_id).await {
            Ok(config) => config.scheme_key(grouping),
            Err(e) => Err(e),
        };

        match resolved {
            Ok(key) => Ok(Some(key)),
            Err(e) if e.is_recoverable() => {
                warn!(error = %e, "Dropping data of unresolvable experiment");
                self.unresolvable.insert(experiment_id);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
pub mod test_support {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory metadata store counting how often it is consulted
    pub struct CountingLookup {
        configs: HashMap<ExperimentId, Value>,
        calls: Arc<AtomicUsize>,
    }

    impl CountingLookup {
        pub fn new(configs: impl IntoIterator<Item = (i64, Value)>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let lookup = Self {
                configs: configs
                    .into_iter()
                    .map(|(id, v)| (ExperimentId::new(id), v))
                    .collect(),
                calls: Arc::clone(&calls),
            };
            (lookup, calls)
        }
    }

    #[async_trait]
    impl ExperimentLookup for CountingLookup {
        async fn lookup(&self, experiment_id: ExperimentId) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.configs
                .get(&experiment_id)
                .cloned()
                .ok_or_else(|| Error::config_resolution(experiment_id, "no such experiment"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::CountingLookup;
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn second_resolve_is_a_cache_hit() {
        let (lookup, calls) = CountingLookup::new([(1, json!({"cc": "bbr", "abr": "mpc"}))]);
        let mut resolver = ExperimentResolver::new(Box::new(lookup));

        let first = resolver.resolve(ExperimentId::new(1)).await.unwrap();
        let second = resolver.resolve(ExperimentId::new(1)).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(resolver.cached_count(), 1);
    }

    #[tokio::test]
    async fn unknown_experiment_is_a_resolution_error() {
        let (lookup, _) = CountingLookup::new([]);
        let mut resolver = ExperimentResolver::new(Box::new(lookup));

        let err = resolver.resolve(ExperimentId::new(5)).await.unwrap_err();
        assert!(matches!(err, Error::ConfigResolution { .. }));
        assert_eq!(resolver.cached_count(), 0);
    }

    #[tokio::test]
    async fn malformed_config_is_not_cached() {
        let (lookup, calls) = CountingLookup::new([(2, json!({"abr": "bola"}))]);
        let mut resolver = ExperimentResolver::new(Box::new(lookup));

        assert!(resolver.resolve(ExperimentId::new(2)).await.is_err());
        assert!(resolver.resolve(ExperimentId::new(2)).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unresolvable_scheme_is_dropped_not_fatal() {
        let (lookup, calls) = CountingLookup::new([(1, json!({"cc": "cubic"}))]);
        let mut resolver = ExperimentResolver::new(Box::new(lookup));

        let missing = resolver
            .scheme_key(ExperimentId::new(9), SchemeGrouping::CongestionControl)
            .await
            .unwrap();
        assert!(missing.is_none());

        let again = resolver
            .scheme_key(ExperimentId::new(9), SchemeGrouping::CongestionControl)
            .await
            .unwrap();
        assert!(again.is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        // cc-only config cannot form an (abr, cc) key
        let no_abr = resolver
            .scheme_key(ExperimentId::new(1), SchemeGrouping::AbrAndCongestionControl)
            .await
            .unwrap();
        assert!(no_abr.is_none());
    }

    #[tokio::test]
    async fn preloaded_resolver_never_looks_up() {
        let mut resolver =
            ExperimentResolver::from_preloaded(&json!({"3": {"cc": "bbr", "abr_name": "fugu"}}))
                .unwrap();
        assert!(resolver.is_preloaded());

        let key = resolver
            .scheme_key(ExperimentId::new(3), SchemeGrouping::AbrAndCongestionControl)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(key.to_string(), "fugu+bbr");

        let err = resolver
            .scheme_key(ExperimentId::new(4), SchemeGrouping::CongestionControl)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingPreloadedConfig(_)));
    }

    #[test]
    fn preloaded_file_is_parsed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"1": {{"cc": "bbr"}}, "2": {{"cc": "cubic"}}}}"#).unwrap();

        let resolver = ExperimentResolver::from_preloaded_file(file.path()).unwrap();
        assert_eq!(resolver.cached_count(), 2);
    }

    #[test]
    fn preloaded_file_with_bad_key_is_rejected() {
        let err = ExperimentResolver::from_preloaded(&json!({"abc": {"cc": "bbr"}}))
            .err()
            .unwrap();
        assert!(matches!(err, Error::Application(_)));
    }
}
