use crate::core::geometry::{self, AreaModel};
use crate::core::pair_metrics::CandidatePair;
use crate::core::store::StoreSnapshot;
use crate::types::{PairError, PairResult};
use geo::{MultiPolygon, Polygon};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Seeds evaluated per parallel chunk; budgets are checked between chunks
const SEED_CHUNK_SIZE: usize = 64;

/// How a group is formed around its seed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroupingStrategy {
    /// Seed plus every eligible neighbour; covered area is the union
    #[default]
    SeedUnion,
    /// Partners added largest-overlap first while the area common to all
    /// members stays above `min_area`; one group per qualifying prefix.
    ///
    /// The walk stops at the first partner that narrows the common area
    /// below `min_area`, so dropping that partner from the input can expose
    /// longer prefixes. Tightening pair thresholds only shrinks the groups
    /// of `SeedUnion`.
    CommonOverlap,
}

/// Multilook grouping parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GroupingParams {
    /// Minimum partners per group (member count - 1)
    pub min_pairs: usize,
    /// Minimum covered area, in the units of `area_model`
    pub min_area: f64,
    pub area_model: AreaModel,
    pub strategy: GroupingStrategy,
}

impl Default for GroupingParams {
    fn default() -> Self {
        Self {
            min_pairs: 2,
            min_area: 32_670_000.0, // m², Eckert IV
            area_model: AreaModel::EqualArea,
            strategy: GroupingStrategy::SeedUnion,
        }
    }
}

impl GroupingParams {
    pub fn validate(&self) -> PairResult<()> {
        if self.min_pairs < 1 {
            return Err(PairError::config("min_pairs must be at least 1"));
        }
        if !self.min_area.is_finite() || self.min_area <= 0.0 {
            return Err(PairError::config(format!(
                "min_area ({}) must be a positive finite area",
                self.min_area
            )));
        }
        Ok(())
    }
}

/// Early termination limits for a grouping run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GroupingBudget {
    pub max_duration: Option<Duration>,
    pub max_groups: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartialReason {
    TimeBudget,
    GroupBudget,
}

impl std::fmt::Display for PartialReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PartialReason::TimeBudget => write!(f, "time budget exhausted"),
            PartialReason::GroupBudget => write!(f, "group budget reached"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Complete,
    Partial {
        reason: PartialReason,
        seeds_processed: usize,
        seeds_total: usize,
    },
}

/// Seed scene and the scenes overlapping it
#[derive(Debug, Clone, PartialEq)]
pub struct MultilookGroup {
    pub seed: String,
    /// Seed first, then partners in discovery order
    pub members: Vec<String>,
    pub covered_area: f64,
    /// Geometry whose area is `covered_area`
    pub footprint: MultiPolygon<f64>,
}

impl MultilookGroup {
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn pair_count(&self) -> usize {
        self.members.len().saturating_sub(1)
    }

    /// Member ids joined with "-"
    pub fn pairname(&self) -> String {
        self.members.join("-")
    }

    pub fn contains(&self, id: &str) -> bool {
        self.members.iter().any(|m| m == id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GroupingOutcome {
    pub groups: Vec<MultilookGroup>,
    pub completion: Completion,
}

impl GroupingOutcome {
    pub fn is_complete(&self) -> bool {
        self.completion == Completion::Complete
    }
}

/// Overlap graph over eligible pairs; vertices in id order, neighbours in
/// order of first appearance in the sorted pair list
struct OverlapGraph<'a> {
    adjacency: BTreeMap<&'a str, Vec<&'a str>>,
}

impl<'a> OverlapGraph<'a> {
    fn build(pairs: &'a [CandidatePair]) -> Self {
        let mut sorted: Vec<&CandidatePair> = pairs.iter().collect();
        sorted.sort_by(|a, b| a.key().cmp(&b.key()));

        let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(sorted.len());
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for pair in sorted {
            if pair.id1 == pair.id2 || !seen.insert(pair.key()) {
                continue;
            }
            adjacency.entry(&pair.id1).or_default().push(&pair.id2);
            adjacency.entry(&pair.id2).or_default().push(&pair.id1);
        }
        Self { adjacency }
    }

    fn seeds(&self) -> Vec<&'a str> {
        self.adjacency.keys().copied().collect()
    }

    fn neighbours(&self, id: &str) -> &[&'a str] {
        self.adjacency.get(id).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Multilook grouping processor
pub struct MultilookGrouper {
    params: GroupingParams,
    aoi: Option<Polygon<f64>>,
    budget: GroupingBudget,
}

impl MultilookGrouper {
    /// Grouper with validated parameters
    pub fn new(params: GroupingParams) -> PairResult<Self> {
        params.validate()?;
        Ok(Self {
            params,
            aoi: None,
            budget: GroupingBudget::default(),
        })
    }

    /// Grouper with the default parameters
    pub fn standard() -> Self {
        Self {
            params: GroupingParams::default(),
            aoi: None,
            budget: GroupingBudget::default(),
        }
    }

    /// Restrict groups to an area of interest
    pub fn with_aoi(mut self, aoi: Polygon<f64>) -> Self {
        self.aoi = Some(aoi);
        self
    }

    pub fn with_budget(mut self, budget: GroupingBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn params(&self) -> &GroupingParams {
        &self.params
    }

    /// Group multilook-eligible pairs around each seed scene
    ///
    /// Every id referenced by a pair must be present in the snapshot.
    pub fn group(&self, pairs: &[CandidatePair], snapshot: &StoreSnapshot) -> PairResult<GroupingOutcome> {
        let start = Instant::now();
        log::info!(
            "Grouping {} eligible pairs ({:?}, min_pairs={}, min_area={})",
            pairs.len(),
            self.params.strategy,
            self.params.min_pairs,
            self.params.min_area
        );

        let graph = OverlapGraph::build(pairs);
        let geometries = self.member_geometries(&graph, snapshot)?;
        let seeds = graph.seeds();
        let seeds_total = seeds.len();

        let mut groups: Vec<MultilookGroup> = Vec::new();
        let mut completion = Completion::Complete;
        let mut seeds_processed = 0;

        'chunks: for chunk in seeds.chunks(SEED_CHUNK_SIZE) {
            if let Some(limit) = self.budget.max_duration {
                if start.elapsed() >= limit {
                    completion = Completion::Partial {
                        reason: PartialReason::TimeBudget,
                        seeds_processed,
                        seeds_total,
                    };
                    break;
                }
            }

            let evaluate = |seed: &&str| self.groups_for_seed(seed, &graph, &geometries);
            #[cfg(feature = "parallel")]
            let chunk_groups: Vec<Vec<MultilookGroup>> = chunk.par_iter().map(evaluate).collect();
            #[cfg(not(feature = "parallel"))]
            let chunk_groups: Vec<Vec<MultilookGroup>> = chunk.iter().map(evaluate).collect();

            for seed_groups in chunk_groups {
                seeds_processed += 1;
                groups.extend(seed_groups);

                if let Some(max_groups) = self.budget.max_groups {
                    if groups.len() >= max_groups && (groups.len() > max_groups || seeds_processed < seeds_total) {
                        groups.truncate(max_groups);
                        completion = Completion::Partial {
                            reason: PartialReason::GroupBudget,
                            seeds_processed,
                            seeds_total,
                        };
                        break 'chunks;
                    }
                }
            }
        }

        if let Completion::Partial { reason, seeds_processed, seeds_total } = completion {
            log::warn!(
                "Grouping stopped early ({}): {} of {} seeds processed",
                reason,
                seeds_processed,
                seeds_total
            );
        }
        log::info!(
            "Found {} multilook groups from {} seeds in {:.3}s",
            groups.len(),
            seeds_total,
            start.elapsed().as_secs_f64()
        );

        Ok(GroupingOutcome { groups, completion })
    }

    /// Member geometry per vertex, clipped to the AOI; `None` when outside it
    fn member_geometries<'a>(
        &self,
        graph: &OverlapGraph<'a>,
        snapshot: &StoreSnapshot,
    ) -> PairResult<HashMap<&'a str, Option<MultiPolygon<f64>>>> {
        let mut geometries = HashMap::with_capacity(graph.adjacency.len());
        for &id in graph.adjacency.keys() {
            let footprint = snapshot
                .get(id)
                .ok_or_else(|| PairError::integrity(id, "pair references a footprint missing from the snapshot"))?;
            let geometry = match &self.aoi {
                Some(aoi) => geometry::clip_to_aoi(&footprint.geometry, aoi),
                None => Some(geometry::to_multi(&footprint.geometry)),
            };
            geometries.insert(id, geometry);
        }
        Ok(geometries)
    }

    fn groups_for_seed(
        &self,
        seed: &str,
        graph: &OverlapGraph<'_>,
        geometries: &HashMap<&str, Option<MultiPolygon<f64>>>,
    ) -> Vec<MultilookGroup> {
        let Some(seed_geometry) = geometries.get(seed).and_then(Option::as_ref) else {
            return Vec::new();
        };
        let partners: Vec<(&str, &MultiPolygon<f64>)> = graph
            .neighbours(seed)
            .iter()
            .filter_map(|id| geometries.get(id).and_then(Option::as_ref).map(|g| (*id, g)))
            .collect();

        match self.params.strategy {
            GroupingStrategy::SeedUnion => self.seed_union(seed, seed_geometry, &partners).into_iter().collect(),
            GroupingStrategy::CommonOverlap => self.common_overlap(seed, seed_geometry, &partners),
        }
    }

    fn seed_union(
        &self,
        seed: &str,
        seed_geometry: &MultiPolygon<f64>,
        partners: &[(&str, &MultiPolygon<f64>)],
    ) -> Option<MultilookGroup> {
        if partners.len() < self.params.min_pairs {
            return None;
        }

        let footprint = geometry::union_all(
            std::iter::once(seed_geometry).chain(partners.iter().map(|(_, g)| *g)),
        );
        let covered_area = self.params.area_model.area(&footprint);
        if !self.meets_min_area(covered_area) {
            log::debug!("Seed {} below min area: {:.1}", seed, covered_area);
            return None;
        }

        let mut members = Vec::with_capacity(partners.len() + 1);
        members.push(seed.to_string());
        members.extend(partners.iter().map(|(id, _)| id.to_string()));
        Some(MultilookGroup {
            seed: seed.to_string(),
            members,
            covered_area,
            footprint,
        })
    }

    fn common_overlap(
        &self,
        seed: &str,
        seed_geometry: &MultiPolygon<f64>,
        partners: &[(&str, &MultiPolygon<f64>)],
    ) -> Vec<MultilookGroup> {
        let model = self.params.area_model;
        let mut ranked: Vec<(&str, &MultiPolygon<f64>, f64)> = partners
            .iter()
            .filter_map(|(id, g)| {
                let area = model.area(&geometry::intersect_multi(seed_geometry, g));
                self.meets_min_area(area).then_some((*id, *g, area))
            })
            .collect();
        if ranked.len() < self.params.min_pairs {
            return Vec::new();
        }
        ranked.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.0.cmp(b.0)));

        let mut groups = Vec::new();
        let mut members = vec![seed.to_string()];
        let mut running = seed_geometry.clone();
        for (id, g, _) in ranked {
            let narrowed = geometry::intersect_multi(&running, g);
            let area = model.area(&narrowed);
            if !self.meets_min_area(area) {
                break;
            }
            running = narrowed;
            members.push(id.to_string());
            if members.len() - 1 >= self.params.min_pairs {
                groups.push(MultilookGroup {
                    seed: seed.to_string(),
                    members: members.clone(),
                    covered_area: area,
                    footprint: running.clone(),
                });
            }
        }
        groups
    }

    fn meets_min_area(&self, area: f64) -> bool {
        area.is_finite() && area > 0.0 && area >= self.params.min_area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pair_metrics::compute_pair;
    use crate::types::{Footprint, OrbitDirection, SceneAttributes};
    use approx::assert_relative_eq;
    use chrono::{TimeZone, Utc};
    use geo::polygon;

    fn footprint(id: &str, x0: f64, y0: f64, w: f64, h: f64) -> Footprint {
        Footprint::new(
            SceneAttributes {
                id: id.to_string(),
                acquired: Utc.with_ymd_and_hms(2020, 10, 14, 0, 0, 0).unwrap(),
                instrument: "PS2".to_string(),
                view_angle: 0.0,
                azimuth: 0.0,
                cloud_cover: 0.0,
                orbit_direction: OrbitDirection::Descending,
                ground_control: true,
                strip_id: None,
            },
            polygon![
                (x: x0, y: y0),
                (x: x0 + w, y: y0),
                (x: x0 + w, y: y0 + h),
                (x: x0, y: y0 + h),
                (x: x0, y: y0),
            ],
        )
    }

    fn pairs_of(snapshot: &StoreSnapshot, keys: &[(&str, &str)]) -> Vec<CandidatePair> {
        keys.iter()
            .map(|(a, b)| {
                compute_pair(snapshot.get(a).unwrap(), snapshot.get(b).unwrap())
                    .unwrap()
                    .unwrap()
            })
            .collect()
    }

    fn planar(min_pairs: usize, min_area: f64, strategy: GroupingStrategy) -> GroupingParams {
        GroupingParams {
            min_pairs,
            min_area,
            area_model: AreaModel::Planar,
            strategy,
        }
    }

    fn star() -> (StoreSnapshot, Vec<CandidatePair>) {
        // a overlaps b and c; b and c are disjoint
        let snapshot = StoreSnapshot::from_footprints(vec![
            footprint("a", 0.0, 0.0, 2.0, 1.0),
            footprint("b", -0.5, 0.0, 1.0, 1.0),
            footprint("c", 1.5, 0.0, 1.0, 1.0),
        ])
        .unwrap();
        let pairs = pairs_of(&snapshot, &[("b", "a"), ("c", "a")]);
        (snapshot, pairs)
    }

    #[test]
    fn test_params_validation() {
        assert!(GroupingParams::default().validate().is_ok());
        assert!(MultilookGrouper::new(planar(0, 1.0, GroupingStrategy::SeedUnion)).is_err());
        assert!(MultilookGrouper::new(planar(2, 0.0, GroupingStrategy::SeedUnion)).is_err());
        assert!(MultilookGrouper::new(planar(2, f64::NAN, GroupingStrategy::SeedUnion)).is_err());
    }

    #[test]
    fn test_seed_union_star() {
        let (snapshot, pairs) = star();

        let grouper = MultilookGrouper::new(planar(2, 0.1, GroupingStrategy::SeedUnion)).unwrap();
        let outcome = grouper.group(&pairs, &snapshot).unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.groups.len(), 1);
        let group = &outcome.groups[0];
        assert_eq!(group.members, vec!["a", "b", "c"]);
        assert_eq!(group.pair_count(), 2);
        assert_relative_eq!(group.covered_area, 3.0, epsilon = 1e-9);

        let loose = MultilookGrouper::new(planar(1, 0.1, GroupingStrategy::SeedUnion)).unwrap();
        let outcome = loose.group(&pairs, &snapshot).unwrap();
        let seeds: Vec<(&str, usize)> = outcome
            .groups
            .iter()
            .map(|g| (g.seed.as_str(), g.member_count()))
            .collect();
        assert_eq!(seeds, vec![("a", 3), ("b", 2), ("c", 2)]);
    }

    #[test]
    fn test_min_area_prunes() {
        let (snapshot, pairs) = star();
        let grouper = MultilookGrouper::new(planar(2, 3.5, GroupingStrategy::SeedUnion)).unwrap();
        assert!(grouper.group(&pairs, &snapshot).unwrap().groups.is_empty());
    }

    #[test]
    fn test_missing_member_is_integrity_error() {
        let (snapshot, pairs) = star();
        let partial = StoreSnapshot::from_footprints(vec![snapshot.get("a").unwrap().clone()]).unwrap();
        let err = MultilookGrouper::standard().group(&pairs, &partial).unwrap_err();
        assert!(matches!(err, PairError::DataIntegrity { .. }));
    }

    #[test]
    fn test_aoi_drops_and_clips_members() {
        let (snapshot, pairs) = star();
        // covers a and b, misses c
        let aoi = polygon![
            (x: -1.0, y: 0.0),
            (x: 1.0, y: 0.0),
            (x: 1.0, y: 1.0),
            (x: -1.0, y: 1.0),
            (x: -1.0, y: 0.0),
        ];
        let grouper = MultilookGrouper::new(planar(1, 0.1, GroupingStrategy::SeedUnion))
            .unwrap()
            .with_aoi(aoi);
        let outcome = grouper.group(&pairs, &snapshot).unwrap();

        let seeds: Vec<&str> = outcome.groups.iter().map(|g| g.seed.as_str()).collect();
        assert_eq!(seeds, vec!["a", "b"]);
        assert_eq!(outcome.groups[0].members, vec!["a", "b"]);
        // clipped union spans x in [-0.5, 1.0]
        assert_relative_eq!(outcome.groups[0].covered_area, 1.5, epsilon = 1e-9);
    }

    #[test]
    fn test_common_overlap_prefixes() {
        let snapshot = StoreSnapshot::from_footprints(vec![
            footprint("s", 0.0, 0.0, 4.0, 4.0),
            footprint("p", 0.0, 0.0, 3.0, 4.0),
            footprint("q", 1.0, 0.0, 3.0, 4.0),
            footprint("r", 3.5, 0.0, 2.0, 4.0),
        ])
        .unwrap();
        let pairs = pairs_of(&snapshot, &[("s", "p"), ("s", "q"), ("s", "r")]);

        let grouper = MultilookGrouper::new(planar(1, 2.5, GroupingStrategy::CommonOverlap)).unwrap();
        let outcome = grouper.group(&pairs, &snapshot).unwrap();
        let seed_groups: Vec<&MultilookGroup> = outcome.groups.iter().filter(|g| g.seed == "s").collect();

        // r overlaps s by 2.0 < min_area and is skipped; p (12) and q (12) tie, id order
        assert_eq!(seed_groups.len(), 2);
        assert_eq!(seed_groups[0].members, vec!["s", "p"]);
        assert_relative_eq!(seed_groups[0].covered_area, 12.0, epsilon = 1e-9);
        assert_eq!(seed_groups[1].members, vec!["s", "p", "q"]);
        assert_relative_eq!(seed_groups[1].covered_area, 8.0, epsilon = 1e-9);
    }

    #[test]
    fn test_common_overlap_stops_at_first_narrowing_partner() {
        let snapshot = StoreSnapshot::from_footprints(vec![
            footprint("s", 0.0, 0.0, 4.0, 4.0),
            footprint("p1", 0.0, 0.0, 2.0, 4.0),
            footprint("p2", 1.8, 0.0, 2.2, 4.0),
            footprint("p3", 2.2, 0.0, 1.8, 4.0),
        ])
        .unwrap();
        let grouper = MultilookGrouper::new(planar(1, 3.0, GroupingStrategy::CommonOverlap)).unwrap();
        let seed_members = |keys: &[(&str, &str)]| -> Vec<Vec<String>> {
            let pairs = pairs_of(&snapshot, keys);
            grouper
                .group(&pairs, &snapshot)
                .unwrap()
                .groups
                .into_iter()
                .filter(|g| g.seed == "s")
                .map(|g| g.members)
                .collect()
        };

        // ranked p2 (8.8), p1 (8.0), p3 (7.2); p1 narrows the common area to 0.8
        let with_p1 = seed_members(&[("s", "p1"), ("s", "p2"), ("s", "p3")]);
        assert_eq!(with_p1, vec![vec!["s", "p2"]]);

        let without_p1 = seed_members(&[("s", "p2"), ("s", "p3")]);
        assert_eq!(without_p1, vec![vec!["s", "p2"], vec!["s", "p2", "p3"]]);

        let seed_union = MultilookGrouper::new(planar(1, 3.0, GroupingStrategy::SeedUnion)).unwrap();
        let pairs = pairs_of(&snapshot, &[("s", "p1"), ("s", "p2"), ("s", "p3")]);
        let outcome = seed_union.group(&pairs, &snapshot).unwrap();
        let s_group = outcome.groups.iter().find(|g| g.seed == "s").unwrap();
        assert_eq!(s_group.members, vec!["s", "p1", "p2", "p3"]);
    }

    #[test]
    fn test_group_budget_truncates_in_seed_order() {
        let (snapshot, pairs) = star();
        let grouper = MultilookGrouper::new(planar(1, 0.1, GroupingStrategy::SeedUnion))
            .unwrap()
            .with_budget(GroupingBudget {
                max_groups: Some(2),
                ..GroupingBudget::default()
            });
        let outcome = grouper.group(&pairs, &snapshot).unwrap();
        let seeds: Vec<&str> = outcome.groups.iter().map(|g| g.seed.as_str()).collect();
        assert_eq!(seeds, vec!["a", "b"]);
        assert_eq!(
            outcome.completion,
            Completion::Partial {
                reason: PartialReason::GroupBudget,
                seeds_processed: 2,
                seeds_total: 3,
            }
        );
    }

    #[test]
    fn test_zero_time_budget_is_partial() {
        let (snapshot, pairs) = star();
        let grouper = MultilookGrouper::standard().with_budget(GroupingBudget {
            max_duration: Some(Duration::ZERO),
            ..GroupingBudget::default()
        });
        let outcome = grouper.group(&pairs, &snapshot).unwrap();
        assert!(outcome.groups.is_empty());
        assert!(matches!(
            outcome.completion,
            Completion::Partial { reason: PartialReason::TimeBudget, seeds_processed: 0, .. }
        ));
    }
}
