use crate::core::store::StoreSnapshot;
use crate::types::{Footprint, PairError, PairResult};
use geo::{BoundingRect, Intersects};
use rstar::{RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Admission test applied to a canonical (higher id, lower id) footprint pair
pub trait PairPredicate: Send + Sync {
    fn admits(&self, first: &Footprint, second: &Footprint) -> bool;
}

/// Both scenes must carry ground control
#[derive(Debug, Clone, Copy, Default)]
pub struct GroundControlRequired;

impl PairPredicate for GroundControlRequired {
    fn admits(&self, first: &Footprint, second: &Footprint) -> bool {
        first.attributes.ground_control && second.attributes.ground_control
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl PairPredicate for AdmitAll {
    fn admits(&self, _first: &Footprint, _second: &Footprint) -> bool {
        true
    }
}

impl<F> PairPredicate for F
where
    F: Fn(&Footprint, &Footprint) -> bool + Send + Sync,
{
    fn admits(&self, first: &Footprint, second: &Footprint) -> bool {
        self(first, second)
    }
}

/// Join parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JoinOptions {
    /// Only pair scenes whose ground control flag is set
    pub require_ground_control: bool,
}

impl Default for JoinOptions {
    fn default() -> Self {
        Self {
            require_ground_control: true,
        }
    }
}

/// Two footprints whose geometries intersect; `first.id() > second.id()`
#[derive(Debug, Clone, Copy)]
pub struct IntersectingPair<'a> {
    pub first: &'a Footprint,
    pub second: &'a Footprint,
}

impl<'a> IntersectingPair<'a> {
    pub fn key(&self) -> (&'a str, &'a str) {
        (self.first.id(), self.second.id())
    }
}

struct IndexedEnvelope {
    idx: usize,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Bounding-box R-tree over a slice of footprints
pub struct FootprintIndex<'a> {
    footprints: &'a [Footprint],
    tree: RTree<IndexedEnvelope>,
}

impl<'a> FootprintIndex<'a> {
    /// Bulk-load the index. Fails on duplicate ids or geometry without a
    /// finite bounding box, naming the offending footprint.
    pub fn build(footprints: &'a [Footprint]) -> PairResult<Self> {
        check_unique_ids(footprints)?;
        let entries = footprints
            .iter()
            .enumerate()
            .map(|(idx, fp)| Ok(IndexedEnvelope { idx, envelope: footprint_envelope(fp)? }))
            .collect::<PairResult<Vec<_>>>()?;

        Ok(Self {
            footprints,
            tree: RTree::bulk_load(entries),
        })
    }

    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }

    /// Footprints whose bounding box intersects the given envelope
    pub fn bbox_candidates(&self, envelope: &AABB<[f64; 2]>) -> impl Iterator<Item = &'a Footprint> + '_ {
        let footprints = self.footprints;
        self.tree
            .locate_in_envelope_intersecting(envelope)
            .map(move |entry| &footprints[entry.idx])
    }
}

fn check_unique_ids(footprints: &[Footprint]) -> PairResult<()> {
    let mut seen: HashSet<&str> = HashSet::with_capacity(footprints.len());
    for fp in footprints {
        if !seen.insert(fp.id()) {
            return Err(PairError::integrity(fp.id(), "duplicate footprint id"));
        }
    }
    Ok(())
}

fn footprint_envelope(fp: &Footprint) -> PairResult<AABB<[f64; 2]>> {
    let rect = fp
        .geometry
        .bounding_rect()
        .ok_or_else(|| PairError::integrity(fp.id(), "geometry is empty"))?;
    let (min, max) = (rect.min(), rect.max());
    if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
        return Err(PairError::integrity(fp.id(), "geometry bounds are not finite"));
    }
    Ok(AABB::from_corners([min.x, min.y], [max.x, max.y]))
}

/// Spatial join engine: R-tree bbox prune followed by exact intersection
pub struct SpatialJoin<P = GroundControlRequired> {
    predicate: P,
}

impl SpatialJoin<GroundControlRequired> {
    pub fn new() -> Self {
        Self {
            predicate: GroundControlRequired,
        }
    }
}

impl Default for SpatialJoin<GroundControlRequired> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: PairPredicate> SpatialJoin<P> {
    pub fn with_predicate(predicate: P) -> Self {
        Self { predicate }
    }

    /// All intersecting pairs within one snapshot
    pub fn join_self<'a>(&self, snapshot: &'a StoreSnapshot) -> PairResult<Vec<IntersectingPair<'a>>> {
        let footprints = snapshot.footprints();
        let start = Instant::now();
        let index = FootprintIndex::build(footprints)?;

        let probes = map_footprints(footprints, |a| {
            let envelope = footprint_envelope(a)?;
            let mut tested = 0usize;
            let mut found = Vec::new();
            for b in index.bbox_candidates(&envelope) {
                if b.id() >= a.id() || !self.predicate.admits(a, b) {
                    continue;
                }
                tested += 1;
                if a.geometry.intersects(&b.geometry) {
                    found.push(IntersectingPair { first: a, second: b });
                }
            }
            Ok((found, tested))
        })?;

        let pairs = collect_sorted(probes, false);
        log::info!(
            "Self-join over {} footprints: {} intersecting pairs in {:.3}s",
            footprints.len(),
            pairs.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(pairs)
    }

    /// All intersecting pairs between two footprint sets.
    ///
    /// Pairs are canonicalized to (higher id, lower id); equal ids are skipped
    /// and a pair found from both sides is emitted once.
    pub fn join<'a>(
        &self,
        left: &'a [Footprint],
        right: &'a [Footprint],
    ) -> PairResult<Vec<IntersectingPair<'a>>> {
        let start = Instant::now();
        check_unique_ids(left)?;
        let index = FootprintIndex::build(right)?;

        let probes = map_footprints(left, |a| {
            let envelope = footprint_envelope(a)?;
            let mut tested = 0usize;
            let mut found = Vec::new();
            for b in index.bbox_candidates(&envelope) {
                if a.id() == b.id() {
                    continue;
                }
                let (first, second) = if a.id() > b.id() { (a, b) } else { (b, a) };
                if !self.predicate.admits(first, second) {
                    continue;
                }
                tested += 1;
                if first.geometry.intersects(&second.geometry) {
                    found.push(IntersectingPair { first, second });
                }
            }
            Ok((found, tested))
        })?;

        let pairs = collect_sorted(probes, true);
        log::info!(
            "Join of {} x {} footprints: {} intersecting pairs in {:.3}s",
            left.len(),
            right.len(),
            pairs.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(pairs)
    }
}

type Probe<'a> = (Vec<IntersectingPair<'a>>, usize);

fn map_footprints<'a, F>(footprints: &'a [Footprint], probe: F) -> PairResult<Vec<Probe<'a>>>
where
    F: Fn(&'a Footprint) -> PairResult<Probe<'a>> + Send + Sync,
{
    #[cfg(feature = "parallel")]
    {
        footprints.par_iter().map(probe).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        footprints.iter().map(probe).collect()
    }
}

fn collect_sorted(probes: Vec<Probe<'_>>, dedup: bool) -> Vec<IntersectingPair<'_>> {
    let exact_tests: usize = probes.iter().map(|(_, tested)| tested).sum();
    let mut pairs: Vec<IntersectingPair<'_>> =
        probes.into_iter().flat_map(|(found, _)| found).collect();
    log::debug!(
        "Exact intersection tests: {}, hits: {}",
        exact_tests,
        pairs.len()
    );

    pairs.sort_by(|a, b| a.key().cmp(&b.key()));
    if dedup {
        pairs.dedup_by(|a, b| a.key() == b.key());
    }
    pairs
}
