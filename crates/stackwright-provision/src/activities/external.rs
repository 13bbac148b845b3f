// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Activities against the cluster itself and external DNS.
//!
//! These run during deletion (evacuating in-cluster resources, removing DNS
//! records) and right after creation (master scheduling). The cluster may
//! already be unreachable when deletion runs, so the deletion-side
//! activities treat an unreachable API server as done.

use crate::activities::Dependencies;
use crate::errors::reason;
use crate::names;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_runtime::{Activity, ActivityContext, ActivityError};
use thiserror::Error;

/// Failures crossing the Kubernetes seam.
#[derive(Debug, Clone, Error)]
pub enum KubernetesError {
    /// The API server did not answer.
    #[error("cluster API unreachable: {details}")]
    Unreachable {
        /// Connection error details.
        details: String,
    },
    /// The API server answered with an error.
    #[error("cluster API error: {details}")]
    Api {
        /// Error details.
        details: String,
    },
}

/// Operations performed inside the cluster.
#[async_trait]
pub trait KubernetesApi: Send + Sync {
    /// Delete load-balancer services and persistent volume claims, so the
    /// cloud resources they own get released before infrastructure teardown.
    async fn evacuate_cluster(&self, cluster_id: u64) -> Result<(), KubernetesError>;

    /// Remove the master taint, allowing workloads on the control plane.
    async fn allow_workloads_on_master(&self, cluster_id: u64) -> Result<(), KubernetesError>;
}

/// External DNS record management.
#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Remove every record registered for the cluster's domain.
    async fn delete_cluster_records(
        &self,
        organization_id: u64,
        cluster_uid: &str,
    ) -> Result<(), KubernetesError>;
}

/// Input for the delete-kubernetes-resources activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteKubernetesResourcesRequest {
    /// Cluster record id.
    pub cluster_id: u64,
}

/// Output of the delete-kubernetes-resources activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteKubernetesResourcesResponse {
    /// False when the API server could not be reached; the caller decides
    /// whether that blocks the deletion.
    pub evacuated: bool,
}

/// Deletes in-cluster resources that own cloud infrastructure: services of
/// type LoadBalancer and persistent volume claims.
pub struct DeleteKubernetesResourcesActivity {
    deps: Dependencies,
}

impl DeleteKubernetesResourcesActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DeleteKubernetesResourcesActivity {
    type Input = DeleteKubernetesResourcesRequest;
    type Output = DeleteKubernetesResourcesResponse;

    fn name(&self) -> &'static str {
        names::activities::DELETE_KUBERNETES_RESOURCES
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<DeleteKubernetesResourcesResponse, ActivityError> {
        match self.deps.kubernetes.evacuate_cluster(input.cluster_id).await {
            Ok(()) => Ok(DeleteKubernetesResourcesResponse { evacuated: true }),
            // A dead cluster has nothing left to evacuate through its API.
            Err(KubernetesError::Unreachable { details }) => {
                tracing::warn!(
                    cluster_id = input.cluster_id,
                    %details,
                    "cluster unreachable, skipping resource evacuation"
                );
                Ok(DeleteKubernetesResourcesResponse { evacuated: false })
            }
            Err(KubernetesError::Api { details }) => Err(ActivityError::retryable(
                reason::CLOUD_ERROR,
                format!("resource evacuation failed: {details}"),
            )),
        }
    }
}

/// Input for the allow-workloads-on-master activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowWorkloadsOnMasterRequest {
    /// Cluster record id.
    pub cluster_id: u64,
}

/// Removes the master taint on single-pool clusters, so user workloads can
/// schedule on the only nodes there are.
pub struct AllowWorkloadsOnMasterActivity {
    deps: Dependencies,
}

impl AllowWorkloadsOnMasterActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for AllowWorkloadsOnMasterActivity {
    type Input = AllowWorkloadsOnMasterRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::ALLOW_WORKLOADS_ON_MASTER
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        self.deps
            .kubernetes
            .allow_workloads_on_master(input.cluster_id)
            .await
            .map_err(|err| match err {
                // The master just signalled ready; a connection blip is
                // worth retrying.
                KubernetesError::Unreachable { details } => {
                    ActivityError::retryable(reason::CLOUD_TRANSIENT, details)
                }
                KubernetesError::Api { details } => ActivityError::retryable(
                    reason::CLOUD_ERROR,
                    format!("failed to untaint master: {details}"),
                ),
            })
    }
}

/// Input for the delete-dns-records activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteDnsRecordsRequest {
    /// Owning organization.
    pub organization_id: u64,
    /// Cluster uid the records were registered under.
    pub cluster_uid: String,
}

/// Removes the cluster's external DNS records.
pub struct DeleteDnsRecordsActivity {
    deps: Dependencies,
}

impl DeleteDnsRecordsActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DeleteDnsRecordsActivity {
    type Input = DeleteDnsRecordsRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::DELETE_DNS_RECORDS
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        self.deps
            .dns
            .delete_cluster_records(input.organization_id, &input.cluster_uid)
            .await
            .map_err(|err| {
                ActivityError::retryable(
                    reason::CLOUD_ERROR,
                    format!("failed to delete DNS records: {err}"),
                )
            })
    }
}
