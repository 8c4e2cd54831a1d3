mod common;

use dempair::core::{
    compute_candidates, AreaModel, CandidateFilter, Completion, FilterConfig, GroupingParams,
    GroupingStrategy, MultilookGroup, MultilookGrouper, SpatialJoin, StoreSnapshot,
};
use dempair::core::onhand::{ids_to_order, resolve_group, resolve_onhand, InventoryIndex};
use dempair::CandidatePair;

fn star() -> (StoreSnapshot, Vec<CandidatePair>) {
    let snapshot = StoreSnapshot::from_footprints(common::star_scenes()).unwrap();
    let candidates = compute_candidates(&SpatialJoin::new().join_self(&snapshot).unwrap());
    (snapshot, candidates)
}

#[test]
fn test_star_group_under_default_params() {
    common::init_logging();
    let (snapshot, candidates) = star();
    let keys: Vec<_> = candidates.iter().map(|p| p.key()).collect();
    assert_eq!(keys, vec![("b", "a"), ("c", "a")]);

    let outcome = MultilookGrouper::standard().group(&candidates, &snapshot).unwrap();
    assert_eq!(outcome.completion, Completion::Complete);
    assert_eq!(outcome.groups.len(), 1);

    let group = &outcome.groups[0];
    assert_eq!(group.seed, "a");
    assert_eq!(group.members, vec!["a", "b", "c"]);
    assert_eq!(group.pairname(), "a-b-c");
    // about 0.61 x 0.1 degrees at the equator
    assert!(group.covered_area > 7.0e8 && group.covered_area < 8.0e8, "{}", group.covered_area);
}

#[test]
fn test_min_pairs_one_keeps_two_member_groups() {
    let (snapshot, candidates) = star();
    let params = GroupingParams {
        min_pairs: 1,
        ..GroupingParams::default()
    };
    let outcome = MultilookGrouper::new(params).unwrap().group(&candidates, &snapshot).unwrap();
    let shape: Vec<(&str, usize)> = outcome
        .groups
        .iter()
        .map(|g| (g.seed.as_str(), g.member_count()))
        .collect();
    assert_eq!(shape, vec![("a", 3), ("b", 2), ("c", 2)]);
}

#[test]
fn test_group_invariants_and_area_bound() {
    let snapshot = StoreSnapshot::from_footprints(common::scattered_scenes(150)).unwrap();
    let candidates = compute_candidates(&SpatialJoin::new().join_self(&snapshot).unwrap());

    let coverage = snapshot.coverage_area(AreaModel::EqualArea);
    for strategy in [GroupingStrategy::SeedUnion, GroupingStrategy::CommonOverlap] {
        let params = GroupingParams {
            min_pairs: 2,
            min_area: 2_000_000.0,
            area_model: AreaModel::EqualArea,
            strategy,
        };
        let outcome = MultilookGrouper::new(params.clone()).unwrap().group(&candidates, &snapshot).unwrap();
        assert!(!outcome.groups.is_empty(), "{:?} produced no groups", strategy);

        for group in &outcome.groups {
            assert!(group.member_count() - 1 >= params.min_pairs);
            assert!(group.covered_area >= params.min_area);
            assert!(group.covered_area > 0.0);
            assert!(group.covered_area <= coverage * (1.0 + 1e-6));
            assert_eq!(group.members[0], group.seed);
        }

        let seeds: Vec<&str> = outcome.groups.iter().map(|g| g.seed.as_str()).collect();
        let mut sorted = seeds.clone();
        sorted.sort();
        assert_eq!(seeds, sorted, "groups are emitted in seed order");
    }
}

#[test]
fn test_common_overlap_area_never_exceeds_seed_union() {
    let snapshot = StoreSnapshot::from_footprints(common::scattered_scenes(100)).unwrap();
    let candidates = compute_candidates(&SpatialJoin::new().join_self(&snapshot).unwrap());

    let params = GroupingParams {
        min_pairs: 1,
        min_area: 1_000_000.0,
        ..GroupingParams::default()
    };
    let union = MultilookGrouper::new(params.clone()).unwrap().group(&candidates, &snapshot).unwrap();
    let common_overlap = MultilookGrouper::new(GroupingParams {
        strategy: GroupingStrategy::CommonOverlap,
        ..params
    })
    .unwrap()
    .group(&candidates, &snapshot)
    .unwrap();

    for group in &common_overlap.groups {
        let seed_area = AreaModel::EqualArea.polygon_area(&snapshot.get(&group.seed).unwrap().geometry);
        assert!(group.covered_area <= seed_area * (1.0 + 1e-6));
        let seed_union = union.groups.iter().find(|g| g.seed == group.seed).unwrap();
        assert!(group.covered_area <= seed_union.covered_area * (1.0 + 1e-6));
    }
}

#[test]
fn test_seed_union_groups_shrink_as_dates_tighten() {
    let snapshot = StoreSnapshot::from_footprints(common::scattered_scenes(150)).unwrap();
    let candidates = compute_candidates(&SpatialJoin::new().join_self(&snapshot).unwrap());
    let grouper = MultilookGrouper::new(GroupingParams {
        min_pairs: 2,
        min_area: 2_000_000.0,
        area_model: AreaModel::EqualArea,
        strategy: GroupingStrategy::SeedUnion,
    })
    .unwrap();

    let mut previous: Option<Vec<MultilookGroup>> = None;
    for max_days in [30, 15, 10, 5, 2, 0] {
        let eligible = CandidateFilter::new(FilterConfig {
            max_date_diff: Some(max_days),
            ..FilterConfig::default()
        })
        .unwrap()
        .apply(&candidates);
        let groups = grouper.group(&eligible, &snapshot).unwrap().groups;

        if let Some(looser) = &previous {
            assert!(groups.len() <= looser.len(), "max_date_diff={} added groups", max_days);
            for group in &groups {
                let wider = looser
                    .iter()
                    .find(|g| g.seed == group.seed)
                    .unwrap_or_else(|| panic!("seed {} appeared at max_date_diff={}", group.seed, max_days));
                assert!(group.members.iter().all(|m| wider.contains(m)));
                assert!(group.covered_area <= wider.covered_area * (1.0 + 1e-6));
            }
        } else {
            assert!(!groups.is_empty());
        }
        previous = Some(groups);
    }
}

#[test]
fn test_onhand_resolution_and_ordering() {
    let (_, candidates) = star();
    let inventory: InventoryIndex = vec![("a", "a_3B_AnalyticMS.tif"), ("b", "b_3B_AnalyticMS.tif")]
        .into_iter()
        .collect();

    let onhand = resolve_onhand(&candidates, &inventory);
    assert_eq!(onhand.len(), 1);
    assert_eq!(onhand[0].pairname_fn, "b_3B_AnalyticMS-a_3B_AnalyticMS");
    assert_eq!(ids_to_order(&candidates, &inventory), vec!["c"]);

    let (snapshot, _) = star();
    let outcome = MultilookGrouper::standard().group(&candidates, &snapshot).unwrap();
    assert_eq!(resolve_group(&outcome.groups[0], &inventory), None);
}
