// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node-pool set reconciliation.
//!
//! An update request carries a full desired pool set; the reconciler compares
//! it by name against the persisted set and partitions the union into three
//! disjoint actions.

use crate::nodepool::NodePoolSpec;
use std::collections::BTreeSet;

/// The three disjoint action sets derived from comparing old and new pools.
///
/// `to_create` and `to_update` carry the desired (new) specs; `to_delete`
/// carries the persisted specs that no longer appear in the request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodePoolDiff {
    /// Pools present only in the desired set.
    pub to_create: Vec<NodePoolSpec>,
    /// Pools present in both sets, desired spec.
    pub to_update: Vec<NodePoolSpec>,
    /// Pools present only in the persisted set.
    pub to_delete: Vec<NodePoolSpec>,
}

impl NodePoolDiff {
    /// True when the desired set matches the persisted set by name.
    pub fn is_noop(&self) -> bool {
        self.to_create.is_empty() && self.to_delete.is_empty() && self.to_update.is_empty()
    }
}

/// Partition old and new pool sets by name.
///
/// create = new \ old, delete = old \ new, update = old ∩ new. The three sets
/// are pairwise disjoint and their union covers every name in either input.
pub fn diff_node_pools(old: &[NodePoolSpec], new: &[NodePoolSpec]) -> NodePoolDiff {
    let old_names: BTreeSet<&str> = old.iter().map(|p| p.name.as_str()).collect();
    let new_names: BTreeSet<&str> = new.iter().map(|p| p.name.as_str()).collect();

    NodePoolDiff {
        to_create: new
            .iter()
            .filter(|p| !old_names.contains(p.name.as_str()))
            .cloned()
            .collect(),
        to_update: new
            .iter()
            .filter(|p| old_names.contains(p.name.as_str()))
            .cloned()
            .collect(),
        to_delete: old
            .iter()
            .filter(|p| !new_names.contains(p.name.as_str()))
            .cloned()
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodepool::NodePoolRole;
    use std::collections::BTreeMap;

    fn pool(name: &str) -> NodePoolSpec {
        NodePoolSpec {
            name: name.into(),
            role: NodePoolRole::Worker,
            min_count: 1,
            max_count: 3,
            count: 2,
            instance_type: "m5.large".into(),
            image: None,
            volume_size_gb: None,
            spot_price: None,
            autoscaling: false,
            zones: vec!["eu-west-1a".into()],
            subnet_ids: vec![],
            labels: BTreeMap::new(),
        }
    }

    fn names(pools: &[NodePoolSpec]) -> BTreeSet<String> {
        pools.iter().map(|p| p.name.clone()).collect()
    }

    #[test]
    fn test_diff_partitions_the_union() {
        let old = vec![pool("a"), pool("b"), pool("c")];
        let new = vec![pool("b"), pool("c"), pool("d")];
        let diff = diff_node_pools(&old, &new);

        assert_eq!(names(&diff.to_create), ["d".to_string()].into());
        assert_eq!(
            names(&diff.to_update),
            ["b".to_string(), "c".to_string()].into()
        );
        assert_eq!(names(&diff.to_delete), ["a".to_string()].into());

        // Pairwise disjoint, union equals O ∪ N.
        let mut union = names(&diff.to_create);
        for set in [names(&diff.to_update), names(&diff.to_delete)] {
            for n in set {
                assert!(union.insert(n), "name appears in more than one set");
            }
        }
        let mut expected = names(&old);
        expected.extend(names(&new));
        assert_eq!(union, expected);
    }

    #[test]
    fn test_diff_identical_sets_is_update_only() {
        let old = vec![pool("a"), pool("b")];
        let diff = diff_node_pools(&old, &old.clone());
        assert!(diff.to_create.is_empty());
        assert!(diff.to_delete.is_empty());
        assert_eq!(names(&diff.to_update), names(&old));
    }

    #[test]
    fn test_diff_empty_old_creates_everything() {
        let new = vec![pool("a")];
        let diff = diff_node_pools(&[], &new);
        assert_eq!(names(&diff.to_create), names(&new));
        assert!(diff.to_update.is_empty() && diff.to_delete.is_empty());
    }

    #[test]
    fn test_update_carries_desired_spec() {
        let old = vec![pool("a")];
        let mut desired = pool("a");
        desired.count = 9;
        let diff = diff_node_pools(&old, &[desired.clone()]);
        assert_eq!(diff.to_update, vec![desired]);
    }
}
