// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The immutable workflow input.

use crate::nodepool::{NodePoolRole, NodePoolSpec};
use crate::provider::Provider;
use serde::{Deserialize, Serialize};

/// Everything a provisioning workflow needs, captured once at start.
///
/// The request never changes for the life of a workflow execution; an update
/// request starts a new workflow with a new request value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvisioningRequest {
    /// Owning organization.
    pub organization_id: u64,
    /// Database id of the cluster record.
    pub cluster_id: u64,
    /// Stable unique id of the cluster, used in resource names and tags.
    pub cluster_uid: String,
    /// Human-readable cluster name, used in stack names.
    pub cluster_name: String,
    /// Cloud provider variant.
    pub provider: Provider,
    /// Cloud region the cluster lives in.
    pub region: String,
    /// Reference to the provider credential in the secret store.
    pub secret_id: String,
    /// Reference to the cluster SSH key pair secret.
    pub ssh_secret_id: String,
    /// Desired node pool set.
    pub node_pools: Vec<NodePoolSpec>,
    /// Whether to register an OIDC client for the API server.
    #[serde(default)]
    pub oidc_enabled: bool,
    /// Externally reachable base URL, when fronted by existing DNS.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl ProvisioningRequest {
    /// The single master pool, if the request is well formed.
    pub fn master_pool(&self) -> Option<&NodePoolSpec> {
        self.node_pools.iter().find(|p| p.is_master())
    }

    /// Worker pools in request order.
    pub fn worker_pools(&self) -> impl Iterator<Item = &NodePoolSpec> {
        self.node_pools.iter().filter(|p| !p.is_master())
    }

    /// Validate the request before any cloud call is made.
    pub fn validate(&self) -> Result<(), RequestValidationError> {
        let masters = self
            .node_pools
            .iter()
            .filter(|p| p.role == NodePoolRole::Master)
            .count();
        if masters != 1 {
            return Err(RequestValidationError::MasterPoolCount { found: masters });
        }
        for pool in &self.node_pools {
            if pool.min_count > pool.max_count {
                return Err(RequestValidationError::InvalidCounts {
                    pool: pool.name.clone(),
                    min: pool.min_count,
                    max: pool.max_count,
                });
            }
            if pool.zones.is_empty() && pool.subnet_ids.is_empty() {
                return Err(RequestValidationError::NoPlacement {
                    pool: pool.name.clone(),
                });
            }
        }
        let mut names: Vec<&str> = self.node_pools.iter().map(|p| p.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        if names.len() != self.node_pools.len() {
            return Err(RequestValidationError::DuplicatePoolNames);
        }
        Ok(())
    }
}

/// Rejections produced by [`ProvisioningRequest::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestValidationError {
    /// A cluster needs exactly one master pool.
    #[error("expected exactly one master pool, found {found}")]
    MasterPoolCount {
        /// Number of master pools found.
        found: usize,
    },
    /// min_count must not exceed max_count.
    #[error("node pool '{pool}' has min count {min} greater than max count {max}")]
    InvalidCounts {
        /// Offending pool name.
        pool: String,
        /// Requested minimum.
        min: u32,
        /// Requested maximum.
        max: u32,
    },
    /// A pool must name zones or bring explicit subnets.
    #[error("node pool '{pool}' specifies neither availability zones nor subnet ids")]
    NoPlacement {
        /// Offending pool name.
        pool: String,
    },
    /// Pool names must be unique within a cluster.
    #[error("node pool names are not unique")]
    DuplicatePoolNames,
}
