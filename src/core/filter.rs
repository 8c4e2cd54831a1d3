use crate::core::pair_metrics::CandidatePair;
use crate::types::{PairError, PairResult};
use chrono::{DateTime, Utc};
use geo::{Intersects, Polygon};
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Acceptance thresholds for candidate pairs
///
/// Bounds are strict except where noted: cloud cover and overlap must fall
/// strictly inside their limits, `max_date_diff` and `max_angle_diff` are
/// inclusive ceilings, `min_angle_diff` is a strict floor. `None` disables a
/// criterion. The default accepts every pair.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Per-scene cloud cover ceiling, fraction [0, 1]
    pub max_cloud_cover: Option<f64>,
    pub min_overlap: Option<f64>,
    pub max_overlap: Option<f64>,
    /// Inclusive ceiling on whole days between acquisitions
    pub max_date_diff: Option<i64>,
    /// Minimum view angle divergence in degrees; stereo needs angular diversity
    pub min_angle_diff: Option<f64>,
    pub max_angle_diff: Option<f64>,
    pub require_same_orbit_direction: bool,
    pub require_same_instrument: bool,
    pub require_same_strip: bool,
    /// Both scenes must come from this instrument
    pub instrument: Option<String>,
    /// Both scenes acquired at or after this time
    pub acquired_after: Option<DateTime<Utc>>,
    /// Both scenes acquired at or before this time
    pub acquired_before: Option<DateTime<Utc>>,
}

impl FilterConfig {
    /// Wide date window, loose overlap band, cloud cover below 20%
    pub fn broad_stereo() -> Self {
        Self {
            max_cloud_cover: Some(0.20),
            min_overlap: Some(0.10),
            max_overlap: Some(0.90),
            max_date_diff: Some(30),
            ..Self::default()
        }
    }

    /// Overlap 30-70%, more than 5 degrees of view angle divergence, cloud
    /// cover below 10%, same orbit direction
    pub fn tight_stereo() -> Self {
        Self {
            max_cloud_cover: Some(0.10),
            min_overlap: Some(0.30),
            max_overlap: Some(0.70),
            max_date_diff: Some(30),
            min_angle_diff: Some(5.0),
            require_same_orbit_direction: true,
            ..Self::default()
        }
    }

    /// Pair-level multilook eligibility: overlap 30-70%, more than 5 degrees of
    /// view angle divergence, fewer than 10 days apart, cloud cover below 20%
    pub fn multilook() -> Self {
        Self {
            max_cloud_cover: Some(0.20),
            min_overlap: Some(0.30),
            max_overlap: Some(0.70),
            max_date_diff: Some(9),
            min_angle_diff: Some(5.0),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> PairResult<()> {
        check_fraction("max_cloud_cover", self.max_cloud_cover)?;
        check_fraction("min_overlap", self.min_overlap)?;
        check_fraction("max_overlap", self.max_overlap)?;
        if let (Some(min), Some(max)) = (self.min_overlap, self.max_overlap) {
            if min > max {
                return Err(PairError::config(format!(
                    "min_overlap ({}) is greater than max_overlap ({})",
                    min, max
                )));
            }
        }

        if let Some(days) = self.max_date_diff {
            if days < 0 {
                return Err(PairError::config(format!("max_date_diff ({}) is negative", days)));
            }
        }

        check_angle("min_angle_diff", self.min_angle_diff)?;
        check_angle("max_angle_diff", self.max_angle_diff)?;
        if let (Some(min), Some(max)) = (self.min_angle_diff, self.max_angle_diff) {
            if min > max {
                return Err(PairError::config(format!(
                    "min_angle_diff ({}) is greater than max_angle_diff ({})",
                    min, max
                )));
            }
        }

        if let (Some(after), Some(before)) = (self.acquired_after, self.acquired_before) {
            if after > before {
                return Err(PairError::config(format!(
                    "acquired_after ({}) is later than acquired_before ({})",
                    after, before
                )));
            }
        }

        if let Some(instrument) = &self.instrument {
            if instrument.trim().is_empty() {
                return Err(PairError::config("instrument filter is empty"));
            }
        }
        Ok(())
    }
}

fn check_fraction(name: &str, value: Option<f64>) -> PairResult<()> {
    match value {
        Some(v) if !v.is_finite() || !(0.0..=1.0).contains(&v) => Err(PairError::config(format!(
            "{} ({}) must be a fraction in [0, 1]",
            name, v
        ))),
        _ => Ok(()),
    }
}

fn check_angle(name: &str, value: Option<f64>) -> PairResult<()> {
    match value {
        Some(v) if !v.is_finite() || v < 0.0 => Err(PairError::config(format!(
            "{} ({}) must be a non-negative number of degrees",
            name, v
        ))),
        _ => Ok(()),
    }
}

/// One acceptance predicate of the filter chain
#[derive(Debug, Clone, PartialEq)]
pub enum Criterion {
    MaxCloudCover(f64),
    MinOverlap(f64),
    MaxOverlap(f64),
    MaxDateDiff(i64),
    MinAngleDiff(f64),
    MaxAngleDiff(f64),
    SameOrbitDirection,
    SameInstrument,
    SameStrip,
    Instrument(String),
    AcquiredAfter(DateTime<Utc>),
    AcquiredBefore(DateTime<Utc>),
    IntersectsAoi,
}

impl Criterion {
    fn check(&self, pair: &CandidatePair, aoi: Option<&Polygon<f64>>) -> bool {
        let (s1, s2) = (&pair.scene1, &pair.scene2);
        match self {
            Criterion::MaxCloudCover(max) => s1.cloud_cover < *max && s2.cloud_cover < *max,
            Criterion::MinOverlap(min) => pair.overlap_ratio > *min,
            Criterion::MaxOverlap(max) => pair.overlap_ratio < *max,
            Criterion::MaxDateDiff(max) => pair.date_diff_days <= *max,
            Criterion::MinAngleDiff(min) => pair.angle_diff > *min,
            Criterion::MaxAngleDiff(max) => pair.angle_diff <= *max,
            Criterion::SameOrbitDirection => s1.orbit_direction == s2.orbit_direction,
            Criterion::SameInstrument => s1.instrument == s2.instrument,
            Criterion::SameStrip => s1.strip_id.is_some() && s1.strip_id == s2.strip_id,
            Criterion::Instrument(code) => s1.instrument == *code && s2.instrument == *code,
            Criterion::AcquiredAfter(t) => s1.acquired >= *t && s2.acquired >= *t,
            Criterion::AcquiredBefore(t) => s1.acquired <= *t && s2.acquired <= *t,
            Criterion::IntersectsAoi => aoi.map_or(true, |aoi| pair.intersection.intersects(aoi)),
        }
    }
}

impl std::fmt::Display for Criterion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Criterion::MaxCloudCover(v) => write!(f, "cloud cover < {}", v),
            Criterion::MinOverlap(v) => write!(f, "overlap ratio > {}", v),
            Criterion::MaxOverlap(v) => write!(f, "overlap ratio < {}", v),
            Criterion::MaxDateDiff(v) => write!(f, "date diff <= {} days", v),
            Criterion::MinAngleDiff(v) => write!(f, "angle diff > {}", v),
            Criterion::MaxAngleDiff(v) => write!(f, "angle diff <= {}", v),
            Criterion::SameOrbitDirection => write!(f, "same orbit direction"),
            Criterion::SameInstrument => write!(f, "same instrument"),
            Criterion::SameStrip => write!(f, "same strip"),
            Criterion::Instrument(code) => write!(f, "instrument = {}", code),
            Criterion::AcquiredAfter(t) => write!(f, "acquired >= {}", t),
            Criterion::AcquiredBefore(t) => write!(f, "acquired <= {}", t),
            Criterion::IntersectsAoi => write!(f, "intersects AOI"),
        }
    }
}

/// Conjunctive predicate chain over candidate pairs
///
/// Criteria are evaluated cheapest first and short-circuit; the result does
/// not depend on their order.
#[derive(Debug, Clone)]
pub struct CandidateFilter {
    config: FilterConfig,
    criteria: Vec<Criterion>,
    aoi: Option<Polygon<f64>>,
}

impl CandidateFilter {
    /// Validate the configuration and build the predicate chain
    pub fn new(config: FilterConfig) -> PairResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    pub(crate) fn build(config: FilterConfig) -> Self {
        let mut criteria = Vec::new();
        if let Some(code) = &config.instrument {
            criteria.push(Criterion::Instrument(code.clone()));
        }
        if config.require_same_instrument {
            criteria.push(Criterion::SameInstrument);
        }
        if config.require_same_orbit_direction {
            criteria.push(Criterion::SameOrbitDirection);
        }
        if config.require_same_strip {
            criteria.push(Criterion::SameStrip);
        }
        if let Some(t) = config.acquired_after {
            criteria.push(Criterion::AcquiredAfter(t));
        }
        if let Some(t) = config.acquired_before {
            criteria.push(Criterion::AcquiredBefore(t));
        }
        if let Some(v) = config.max_cloud_cover {
            criteria.push(Criterion::MaxCloudCover(v));
        }
        if let Some(v) = config.max_date_diff {
            criteria.push(Criterion::MaxDateDiff(v));
        }
        if let Some(v) = config.min_angle_diff {
            criteria.push(Criterion::MinAngleDiff(v));
        }
        if let Some(v) = config.max_angle_diff {
            criteria.push(Criterion::MaxAngleDiff(v));
        }
        if let Some(v) = config.min_overlap {
            criteria.push(Criterion::MinOverlap(v));
        }
        if let Some(v) = config.max_overlap {
            criteria.push(Criterion::MaxOverlap(v));
        }

        Self {
            config,
            criteria,
            aoi: None,
        }
    }

    /// Additionally require the pair's intersection to touch the AOI
    pub fn with_aoi(mut self, aoi: Polygon<f64>) -> Self {
        if self.aoi.is_none() {
            self.criteria.push(Criterion::IntersectsAoi);
        }
        self.aoi = Some(aoi);
        self
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn accepts(&self, pair: &CandidatePair) -> bool {
        self.rejection(pair).is_none()
    }

    /// First criterion the pair fails, if any
    pub fn rejection(&self, pair: &CandidatePair) -> Option<&Criterion> {
        self.criteria
            .iter()
            .find(|criterion| !criterion.check(pair, self.aoi.as_ref()))
    }

    /// References to the accepted pairs, in input order
    pub fn select<'a>(&self, pairs: &'a [CandidatePair]) -> Vec<&'a CandidatePair> {
        #[cfg(feature = "parallel")]
        let accepted: Vec<&CandidatePair> = pairs.par_iter().filter(|p| self.accepts(p)).collect();
        #[cfg(not(feature = "parallel"))]
        let accepted: Vec<&CandidatePair> = pairs.iter().filter(|p| self.accepts(p)).collect();

        log::debug!(
            "Filter with {} criteria accepted {} of {} pairs",
            self.criteria.len(),
            accepted.len(),
            pairs.len()
        );
        accepted
    }

    /// Owned copies of the accepted pairs, in input order
    pub fn apply(&self, pairs: &[CandidatePair]) -> Vec<CandidatePair> {
        self.select(pairs).into_iter().cloned().collect()
    }
}

/// Named acceptance tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Tier {
    BroadStereo,
    TightStereo,
    Multilook,
}

/// Tiers a single pair belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierSet {
    pub broad_stereo: bool,
    pub tight_stereo: bool,
    pub multilook: bool,
}

impl TierSet {
    pub fn contains(&self, tier: Tier) -> bool {
        match tier {
            Tier::BroadStereo => self.broad_stereo,
            Tier::TightStereo => self.tight_stereo,
            Tier::Multilook => self.multilook,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.broad_stereo || self.tight_stereo || self.multilook)
    }
}

/// Evaluates every tier's filter against a pair
#[derive(Debug, Clone)]
pub struct TierClassifier {
    broad_stereo: CandidateFilter,
    tight_stereo: CandidateFilter,
    multilook: CandidateFilter,
}

impl TierClassifier {
    pub fn new(
        broad_stereo: FilterConfig,
        tight_stereo: FilterConfig,
        multilook: FilterConfig,
    ) -> PairResult<Self> {
        Ok(Self {
            broad_stereo: CandidateFilter::new(broad_stereo)?,
            tight_stereo: CandidateFilter::new(tight_stereo)?,
            multilook: CandidateFilter::new(multilook)?,
        })
    }

    /// Classifier over the built-in presets
    pub fn standard() -> Self {
        Self {
            broad_stereo: CandidateFilter::build(FilterConfig::broad_stereo()),
            tight_stereo: CandidateFilter::build(FilterConfig::tight_stereo()),
            multilook: CandidateFilter::build(FilterConfig::multilook()),
        }
    }

    /// Apply the same AOI restriction to every tier
    pub fn with_aoi(self, aoi: Polygon<f64>) -> Self {
        Self {
            broad_stereo: self.broad_stereo.with_aoi(aoi.clone()),
            tight_stereo: self.tight_stereo.with_aoi(aoi.clone()),
            multilook: self.multilook.with_aoi(aoi),
        }
    }

    pub fn filter(&self, tier: Tier) -> &CandidateFilter {
        match tier {
            Tier::BroadStereo => &self.broad_stereo,
            Tier::TightStereo => &self.tight_stereo,
            Tier::Multilook => &self.multilook,
        }
    }

    pub fn classify(&self, pair: &CandidatePair) -> TierSet {
        TierSet {
            broad_stereo: self.broad_stereo.accepts(pair),
            tight_stereo: self.tight_stereo.accepts(pair),
            multilook: self.multilook.accepts(pair),
        }
    }
}
