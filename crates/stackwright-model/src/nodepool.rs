// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Node pool specifications.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Role of a node pool. Exactly one pool per cluster carries the master role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodePoolRole {
    /// Control plane nodes.
    Master,
    /// Workload nodes.
    Worker,
}

impl NodePoolRole {
    /// String form used in stack names and tags.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Master => "master",
            Self::Worker => "worker",
        }
    }
}

/// Desired shape of one homogeneous group of machines.
///
/// Supplied at workflow start and treated as a read-only input by activities;
/// activities that resolve missing fields (image, volume size) return enriched
/// copies instead of mutating shared state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePoolSpec {
    /// Pool name, unique within the cluster.
    pub name: String,
    /// Master or worker.
    pub role: NodePoolRole,
    /// Minimum instance count for the scaling group.
    pub min_count: u32,
    /// Maximum instance count for the scaling group.
    pub max_count: u32,
    /// Desired instance count requested by the caller.
    pub count: u32,
    /// Provider instance type, e.g. `m5.xlarge`.
    pub instance_type: String,
    /// Machine image id. Resolved by the image selector when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Root volume size in GB. Resolved from the image when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_size_gb: Option<u32>,
    /// Maximum spot price. `None` or zero means on-demand instances.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spot_price: Option<f64>,
    /// Whether an external autoscaler owns the desired capacity.
    #[serde(default)]
    pub autoscaling: bool,
    /// Availability zones the pool spans when no explicit subnets are given.
    #[serde(default)]
    pub zones: Vec<String>,
    /// Pre-existing subnet ids, used verbatim instead of created subnets.
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    /// Kubernetes node labels applied to members of the pool.
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
}

impl NodePoolSpec {
    /// Whether this pool hosts the control plane.
    pub fn is_master(&self) -> bool {
        self.role == NodePoolRole::Master
    }

    /// Whether the pool bids for spot capacity rather than on-demand.
    pub fn is_spot(&self) -> bool {
        matches!(self.spot_price, Some(p) if p > 0.0)
    }

    /// A multi-master pool is exposed through a load balancer; a single
    /// master gets an elastic IP instead.
    pub fn uses_load_balancer(&self) -> bool {
        self.is_master() && self.max_count > 1
    }

    /// Zones this pool needs subnets created in. Empty when the caller
    /// supplied explicit subnet ids.
    pub fn zones_needing_subnets(&self) -> &[String] {
        if self.subnet_ids.is_empty() {
            &self.zones
        } else {
            &[]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(role: NodePoolRole, max: u32) -> NodePoolSpec {
        NodePoolSpec {
            name: "p".into(),
            role,
            min_count: 1,
            max_count: max,
            count: 1,
            instance_type: "m5.large".into(),
            image: None,
            volume_size_gb: None,
            spot_price: None,
            autoscaling: false,
            zones: vec![],
            subnet_ids: vec![],
            labels: BTreeMap::new(),
        }
    }

    #[test]
    fn test_single_master_uses_elastic_ip() {
        assert!(!pool(NodePoolRole::Master, 1).uses_load_balancer());
    }

    #[test]
    fn test_multi_master_uses_load_balancer() {
        assert!(pool(NodePoolRole::Master, 3).uses_load_balancer());
    }

    #[test]
    fn test_worker_never_uses_load_balancer() {
        assert!(!pool(NodePoolRole::Worker, 5).uses_load_balancer());
    }

    #[test]
    fn test_spot_detection() {
        let mut p = pool(NodePoolRole::Worker, 2);
        assert!(!p.is_spot());
        p.spot_price = Some(0.0);
        assert!(!p.is_spot());
        p.spot_price = Some(0.23);
        assert!(p.is_spot());
    }

    #[test]
    fn test_explicit_subnets_suppress_zone_subnet_creation() {
        let mut p = pool(NodePoolRole::Worker, 2);
        p.zones = vec!["eu-west-1a".into()];
        assert_eq!(p.zones_needing_subnets(), &["eu-west-1a".to_string()][..]);
        p.subnet_ids = vec!["subnet-123".into()];
        assert!(p.zones_needing_subnets().is_empty());
    }
}
