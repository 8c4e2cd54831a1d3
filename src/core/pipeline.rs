use crate::core::filter::{FilterConfig, Tier, TierClassifier, TierSet};
use crate::core::multilook::{GroupingBudget, GroupingOutcome, GroupingParams, MultilookGrouper};
use crate::core::pair_metrics::{compute_candidates, CandidatePair};
use crate::core::selection::{GroupSelectionPolicy, SelectionPolicy};
use crate::core::spatial_join::{AdmitAll, JoinOptions, SpatialJoin};
use crate::core::store::StoreSnapshot;
use crate::types::PairResult;
use geo::Polygon;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Complete engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub join: JoinOptions,
    pub broad_stereo: FilterConfig,
    pub tight_stereo: FilterConfig,
    pub multilook: FilterConfig,
    pub grouping: GroupingParams,
    pub selection: SelectionPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            join: JoinOptions::default(),
            broad_stereo: FilterConfig::broad_stereo(),
            tight_stereo: FilterConfig::tight_stereo(),
            multilook: FilterConfig::multilook(),
            grouping: GroupingParams::default(),
            selection: SelectionPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> PairResult<()> {
        self.broad_stereo.validate()?;
        self.tight_stereo.validate()?;
        self.multilook.validate()?;
        self.grouping.validate()
    }

    /// SHA-256 of the serialized configuration
    pub fn config_hash(&self) -> PairResult<String> {
        let bytes = serde_json::to_vec(self)?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

/// Result of one pipeline run over a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutput {
    pub fingerprint: String,
    pub config_hash: String,
    /// Every intersecting pair with metrics, sorted by (id1, id2)
    pub candidates: Vec<CandidatePair>,
    /// Tier membership, parallel to `candidates`
    pub tiers: Vec<TierSet>,
    pub grouping: GroupingOutcome,
}

impl PipelineOutput {
    /// Candidates accepted by one tier, in candidate order
    pub fn pairs_in(&self, tier: Tier) -> Vec<&CandidatePair> {
        self.candidates
            .iter()
            .zip(&self.tiers)
            .filter(|(_, tiers)| tiers.contains(tier))
            .map(|(pair, _)| pair)
            .collect()
    }

    pub fn broad_stereo(&self) -> Vec<&CandidatePair> {
        self.pairs_in(Tier::BroadStereo)
    }

    pub fn tight_stereo(&self) -> Vec<&CandidatePair> {
        self.pairs_in(Tier::TightStereo)
    }

    pub fn multilook_pairs(&self) -> Vec<&CandidatePair> {
        self.pairs_in(Tier::Multilook)
    }
}

/// Staged run: join, metrics, tier filters, grouping, selection
pub struct CandidatePipeline {
    config: EngineConfig,
    config_hash: String,
    classifier: TierClassifier,
    grouper: MultilookGrouper,
}

impl CandidatePipeline {
    /// Validate the configuration and prepare every stage
    pub fn new(config: EngineConfig) -> PairResult<Self> {
        config.validate()?;
        let classifier = TierClassifier::new(
            config.broad_stereo.clone(),
            config.tight_stereo.clone(),
            config.multilook.clone(),
        )?;
        let grouper = MultilookGrouper::new(config.grouping.clone())?;
        let config_hash = config.config_hash()?;
        Ok(Self {
            config,
            config_hash,
            classifier,
            grouper,
        })
    }

    /// Pipeline over the default configuration
    pub fn standard() -> PairResult<Self> {
        Self::new(EngineConfig::default())
    }

    /// Restrict tier filters and grouping to an area of interest
    pub fn with_aoi(self, aoi: Polygon<f64>) -> PairResult<Self> {
        let mut hasher = Sha256::new();
        hasher.update(self.config_hash.as_bytes());
        hasher.update(serde_json::to_vec(&aoi_coordinates(&aoi))?);
        Ok(Self {
            config_hash: format!("{:x}", hasher.finalize()),
            classifier: self.classifier.with_aoi(aoi.clone()),
            grouper: self.grouper.with_aoi(aoi),
            config: self.config,
        })
    }

    pub fn with_budget(mut self, budget: GroupingBudget) -> Self {
        self.grouper = self.grouper.with_budget(budget);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hash identifying this pipeline's configuration, AOI included
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn run(&self, snapshot: &StoreSnapshot) -> PairResult<PipelineOutput> {
        let start = Instant::now();
        log::info!(
            "🚀 Running candidate pipeline over {} footprints (revision {})",
            snapshot.len(),
            snapshot.revision()
        );

        let joined = if self.config.join.require_ground_control {
            SpatialJoin::new().join_self(snapshot)?
        } else {
            SpatialJoin::with_predicate(AdmitAll).join_self(snapshot)?
        };

        let candidates = compute_candidates(&joined);
        let tiers: Vec<TierSet> = candidates.iter().map(|pair| self.classifier.classify(pair)).collect();

        let eligible: Vec<CandidatePair> = candidates
            .iter()
            .zip(&tiers)
            .filter(|(_, t)| t.multilook)
            .map(|(pair, _)| pair.clone())
            .collect();
        log::info!(
            "Tier counts: broad={}, tight={}, multilook={}",
            tiers.iter().filter(|t| t.broad_stereo).count(),
            tiers.iter().filter(|t| t.tight_stereo).count(),
            eligible.len()
        );

        let mut grouping = self.grouper.group(&eligible, snapshot)?;
        let before = grouping.groups.len();
        grouping.groups = self.config.selection.select(grouping.groups);
        log::debug!(
            "Selection {:?} kept {} of {} groups",
            self.config.selection,
            grouping.groups.len(),
            before
        );

        log::info!(
            "✅ Pipeline completed in {:.3}s: {} candidates, {} groups",
            start.elapsed().as_secs_f64(),
            candidates.len(),
            grouping.groups.len()
        );

        Ok(PipelineOutput {
            fingerprint: snapshot.fingerprint().to_string(),
            config_hash: self.config_hash.clone(),
            candidates,
            tiers,
            grouping,
        })
    }
}

fn aoi_coordinates(aoi: &Polygon<f64>) -> Vec<Vec<[f64; 2]>> {
    std::iter::once(aoi.exterior())
        .chain(aoi.interiors())
        .map(|ring| ring.coords().map(|c| [c.x, c.y]).collect())
        .collect()
}

/// Caller-managed cache of pipeline outputs keyed by
/// (snapshot fingerprint, config hash)
///
/// Partial outputs are never cached.
#[derive(Debug, Default)]
pub struct PipelineCache {
    entries: HashMap<(String, String), Arc<PipelineOutput>>,
    hits: u64,
    misses: u64,
}

impl PipelineCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_compute(
        &mut self,
        pipeline: &CandidatePipeline,
        snapshot: &StoreSnapshot,
    ) -> PairResult<Arc<PipelineOutput>> {
        let key = (snapshot.fingerprint().to_string(), pipeline.config_hash().to_string());
        if let Some(output) = self.entries.get(&key) {
            self.hits += 1;
            log::debug!("Pipeline cache hit for snapshot {}", &key.0[..12.min(key.0.len())]);
            return Ok(Arc::clone(output));
        }

        self.misses += 1;
        let output = Arc::new(pipeline.run(snapshot)?);
        if output.grouping.is_complete() {
            self.entries.insert(key, Arc::clone(&output));
        }
        Ok(output)
    }

    /// Drop every entry computed from the given snapshot
    pub fn invalidate(&mut self, fingerprint: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(fp, _), _| fp != fingerprint);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::filter::FilterConfig;

    #[test]
    fn test_default_config_valid_and_hash_stable() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.config_hash().unwrap(), EngineConfig::default().config_hash().unwrap());

        let mut changed = config.clone();
        changed.multilook.max_date_diff = Some(5);
        assert_ne!(changed.config_hash().unwrap(), config.config_hash().unwrap());
    }

    #[test]
    fn test_invalid_config_fails_before_run() {
        let config = EngineConfig {
            tight_stereo: FilterConfig {
                min_overlap: Some(0.9),
                max_overlap: Some(0.1),
                ..FilterConfig::default()
            },
            ..EngineConfig::default()
        };
        assert!(CandidatePipeline::new(config).is_err());
    }

    #[test]
    fn test_config_round_trips_through_json() {
        let json = r#"{"grouping": {"min_pairs": 3}, "selection": "GreedyLargestArea"}"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.grouping.min_pairs, 3);
        assert_eq!(config.grouping.min_area, GroupingParams::default().min_area);
        assert_eq!(config.selection, SelectionPolicy::GreedyLargestArea);
        assert_eq!(config.tight_stereo, FilterConfig::tight_stereo());
    }
}
