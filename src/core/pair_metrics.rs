use crate::core::geometry::{self, ZERO_AREA_EPSILON};
use crate::core::spatial_join::IntersectingPair;
use crate::types::{Footprint, PairError, PairResult, SceneAttributes};
use chrono::{DateTime, Utc};
use geo::{Area, MultiPolygon};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Intersecting footprint pair with its derived similarity metrics
///
/// Keyed by `(id1, id2)` with `id1 > id2`.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePair {
    pub id1: String,
    pub id2: String,
    pub scene1: SceneAttributes,
    pub scene2: SceneAttributes,
    /// area(intersection) / area(union), in (0, 1]
    pub overlap_ratio: f64,
    pub intersection_area: f64,
    pub union_area: f64,
    /// Whole days between acquisitions, fractional part truncated
    pub date_diff_days: i64,
    /// |view_angle1 - view_angle2| in degrees, no wraparound
    pub angle_diff: f64,
    /// |azimuth1 - azimuth2| in degrees, no wraparound
    pub azimuth_diff: f64,
    pub intersection: MultiPolygon<f64>,
}

impl CandidatePair {
    pub fn key(&self) -> (&str, &str) {
        (&self.id1, &self.id2)
    }

    /// "id1-id2"
    pub fn pairname(&self) -> String {
        format!("{}-{}", self.id1, self.id2)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.id1 == id || self.id2 == id
    }

    pub fn scenes(&self) -> [&SceneAttributes; 2] {
        [&self.scene1, &self.scene2]
    }
}

/// Whole days between two acquisitions.
///
/// Takes the day part of the elapsed interval, so 1 day 23 hours is 1 day.
pub fn date_diff_days(a: &DateTime<Utc>, b: &DateTime<Utc>) -> i64 {
    (*a - *b).num_days().abs()
}

/// Compute the metrics of an intersecting pair.
///
/// Argument order does not matter; the pair is canonicalized first. Returns
/// `Ok(None)` when the footprints only touch (zero-area intersection) and
/// `ZeroUnionArea` when the union is too small to divide by.
pub fn compute_pair(a: &Footprint, b: &Footprint) -> PairResult<Option<CandidatePair>> {
    let (first, second) = if a.id() >= b.id() { (a, b) } else { (b, a) };

    let zero_union = || PairError::ZeroUnionArea {
        id1: first.id().to_string(),
        id2: second.id().to_string(),
    };

    // union <= area1 + area2, so skip the boolean op when that is already ~0
    let area1 = first.geometry.unsigned_area();
    let area2 = second.geometry.unsigned_area();
    if area1 + area2 <= ZERO_AREA_EPSILON {
        return Err(zero_union());
    }

    let intersection = geometry::intersection(&first.geometry, &second.geometry);
    let intersection_area = intersection.unsigned_area();
    let union_area = (area1 + area2 - intersection_area).max(0.0);
    if union_area <= ZERO_AREA_EPSILON {
        return Err(zero_union());
    }
    if intersection_area <= 0.0 || intersection.0.is_empty() {
        return Ok(None);
    }

    let s1 = &first.attributes;
    let s2 = &second.attributes;
    Ok(Some(CandidatePair {
        id1: s1.id.clone(),
        id2: s2.id.clone(),
        scene1: s1.clone(),
        scene2: s2.clone(),
        overlap_ratio: (intersection_area / union_area).min(1.0),
        intersection_area,
        union_area,
        date_diff_days: date_diff_days(&s1.acquired, &s2.acquired),
        angle_diff: (s1.view_angle - s2.view_angle).abs(),
        azimuth_diff: (s1.azimuth - s2.azimuth).abs(),
        intersection,
    }))
}

/// Compute candidates for every joined pair.
///
/// Zero-union pairs are excluded and logged; touching-only pairs are dropped.
/// Output keeps the (id1, id2) order of the input.
pub fn compute_candidates(pairs: &[IntersectingPair<'_>]) -> Vec<CandidatePair> {
    let start = Instant::now();
    let compute = |pair: &IntersectingPair<'_>| match compute_pair(pair.first, pair.second) {
        Ok(candidate) => candidate,
        Err(e) => {
            log::debug!("Excluding pair: {}", e);
            None
        }
    };

    #[cfg(feature = "parallel")]
    let candidates: Vec<CandidatePair> = pairs.par_iter().filter_map(compute).collect();
    #[cfg(not(feature = "parallel"))]
    let candidates: Vec<CandidatePair> = pairs.iter().filter_map(compute).collect();

    log::info!(
        "Computed metrics for {} of {} intersecting pairs in {:.3}s",
        candidates.len(),
        pairs.len(),
        start.elapsed().as_secs_f64()
    );
    candidates
}
