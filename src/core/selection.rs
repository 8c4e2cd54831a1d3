use crate::core::multilook::MultilookGroup;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Post-grouping selection over overlapping multilook groups
pub trait GroupSelectionPolicy: Send + Sync {
    fn select(&self, groups: Vec<MultilookGroup>) -> Vec<MultilookGroup>;
}

/// Every group is kept; groups may share members
#[derive(Debug, Clone, Copy, Default)]
pub struct KeepAll;

impl GroupSelectionPolicy for KeepAll {
    fn select(&self, groups: Vec<MultilookGroup>) -> Vec<MultilookGroup> {
        groups
    }
}

/// Drops groups whose member set equals that of an earlier group
#[derive(Debug, Clone, Copy, Default)]
pub struct DistinctMembership;

impl GroupSelectionPolicy for DistinctMembership {
    fn select(&self, groups: Vec<MultilookGroup>) -> Vec<MultilookGroup> {
        let mut seen: HashSet<Vec<String>> = HashSet::with_capacity(groups.len());
        groups
            .into_iter()
            .filter(|group| {
                let mut members = group.members.clone();
                members.sort();
                seen.insert(members)
            })
            .collect()
    }
}

/// Greedy member-disjoint selection, largest covered area first
///
/// Ties break on seed id. Output is in selection order.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyLargestArea;

impl GroupSelectionPolicy for GreedyLargestArea {
    fn select(&self, mut groups: Vec<MultilookGroup>) -> Vec<MultilookGroup> {
        groups.sort_by(|a, b| {
            b.covered_area
                .total_cmp(&a.covered_area)
                .then_with(|| a.seed.cmp(&b.seed))
                .then_with(|| a.members.cmp(&b.members))
        });

        let mut used: HashSet<String> = HashSet::new();
        let mut selected = Vec::new();
        for group in groups {
            if group.members.iter().any(|m| used.contains(m)) {
                continue;
            }
            used.extend(group.members.iter().cloned());
            selected.push(group);
        }
        selected
    }
}

/// Serializable choice of selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectionPolicy {
    #[default]
    KeepAll,
    DistinctMembership,
    GreedyLargestArea,
}

impl GroupSelectionPolicy for SelectionPolicy {
    fn select(&self, groups: Vec<MultilookGroup>) -> Vec<MultilookGroup> {
        match self {
            SelectionPolicy::KeepAll => KeepAll.select(groups),
            SelectionPolicy::DistinctMembership => DistinctMembership.select(groups),
            SelectionPolicy::GreedyLargestArea => GreedyLargestArea.select(groups),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::MultiPolygon;

    fn group(seed: &str, members: &[&str], covered_area: f64) -> MultilookGroup {
        MultilookGroup {
            seed: seed.to_string(),
            members: members.iter().map(|m| m.to_string()).collect(),
            covered_area,
            footprint: MultiPolygon::new(Vec::new()),
        }
    }

    #[test]
    fn test_distinct_membership() {
        let groups = vec![
            group("a", &["a", "b", "c"], 3.0),
            group("b", &["b", "a", "c"], 3.0),
            group("c", &["c", "d"], 1.0),
        ];
        let kept = DistinctMembership.select(groups);
        let seeds: Vec<&str> = kept.iter().map(|g| g.seed.as_str()).collect();
        assert_eq!(seeds, vec!["a", "c"]);
    }

    #[test]
    fn test_greedy_largest_area_disjoint() {
        let groups = vec![
            group("a", &["a", "b"], 2.0),
            group("b", &["b", "c", "d"], 5.0),
            group("e", &["e", "a"], 2.0),
            group("f", &["f", "g"], 2.0),
        ];
        let kept = SelectionPolicy::GreedyLargestArea.select(groups);
        let seeds: Vec<&str> = kept.iter().map(|g| g.seed.as_str()).collect();
        // b wins, a shares b, e and f are disjoint from b and each other
        assert_eq!(seeds, vec!["b", "e", "f"]);
    }

    #[test]
    fn test_keep_all_is_identity() {
        let groups = vec![group("a", &["a", "b"], 1.0), group("b", &["b", "a"], 1.0)];
        assert_eq!(SelectionPolicy::default().select(groups.clone()), groups);
    }
}
