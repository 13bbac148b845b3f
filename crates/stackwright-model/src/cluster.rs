// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Persisted cluster records.

use crate::nodepool::NodePoolSpec;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Coarse lifecycle status written back through the cluster accessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterStatus {
    /// Infrastructure is being created.
    Creating,
    /// Cluster is up and serving.
    Running,
    /// A requested change is being applied.
    Updating,
    /// Teardown in progress.
    Deleting,
    /// Up, but a best-effort step failed.
    Warning,
    /// A fatal provisioning error was recorded.
    Error,
    /// Teardown finished.
    Deleted,
}

impl ClusterStatus {
    /// String form stored in the cluster record.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Deleted => "deleted",
        }
    }
}

/// Network identifiers persisted once the network stack is up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNetwork {
    /// VPC the cluster lives in.
    pub vpc_id: Option<String>,
    /// Subnets the cluster spans, created and pre-existing combined.
    pub subnet_ids: Vec<String>,
    /// Created subnets keyed by availability zone. Later pool additions
    /// look their zones up here; explicit pre-existing subnets are not
    /// listed since pools name those directly.
    #[serde(default)]
    pub subnets_by_zone: BTreeMap<String, String>,
    /// Externally reachable API server address: an elastic IP for a single
    /// master, a load balancer DNS name for multi-master.
    pub external_address: Option<String>,
}

/// The cluster record as seen through the accessor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Database id.
    pub id: u64,
    /// Stable unique id.
    pub uid: String,
    /// Human-readable name.
    pub name: String,
    /// Owning organization.
    pub organization_id: u64,
    /// Cloud region.
    pub region: String,
    /// Current lifecycle status.
    pub status: ClusterStatus,
    /// Human-readable status detail.
    pub status_message: String,
    /// Persisted network identifiers.
    pub network: ClusterNetwork,
    /// OIDC client registered for the API server, if any. Deletion removes
    /// the registration through this id.
    #[serde(default)]
    pub oidc_client_id: Option<String>,
    /// Persisted node pool set.
    pub node_pools: Vec<NodePoolSpec>,
    /// Record creation time.
    pub created_at: DateTime<Utc>,
}
