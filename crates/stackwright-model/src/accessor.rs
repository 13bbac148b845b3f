// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster persistence seam.
//!
//! Workflow code never touches storage directly; specific activities call
//! through this trait and the backing store lives outside this workspace.

use crate::cluster::{Cluster, ClusterStatus};
use crate::nodepool::NodePoolSpec;
use async_trait::async_trait;

/// Read/write access to cluster and node-pool records.
#[async_trait]
pub trait ClusterAccessor: Send + Sync {
    /// Fetch a cluster record by id.
    async fn get_cluster(&self, cluster_id: u64) -> Result<Cluster, AccessorError>;

    /// Fetch the persisted node pool set for a cluster.
    async fn get_node_pools(&self, cluster_id: u64) -> Result<Vec<NodePoolSpec>, AccessorError>;

    /// Record a coarse status transition with a human-readable message.
    async fn update_status(
        &self,
        cluster_id: u64,
        status: ClusterStatus,
        message: &str,
    ) -> Result<(), AccessorError>;

    /// Write the full record back.
    async fn persist(&self, cluster: &Cluster) -> Result<(), AccessorError>;
}

/// Failures crossing the accessor seam.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AccessorError {
    /// No record for the requested cluster.
    #[error("cluster {cluster_id} not found")]
    NotFound {
        /// The missing cluster id.
        cluster_id: u64,
    },
    /// The backing store failed.
    #[error("cluster store error during '{operation}': {details}")]
    Storage {
        /// Operation that failed.
        operation: String,
        /// Error details from the store.
        details: String,
    },
}
