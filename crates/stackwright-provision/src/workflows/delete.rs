// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster deletion.
//!
//! The ordered steps are: evacuate in-cluster resources, remove external
//! DNS, tear down the infrastructure (child workflow), delete the cluster's
//! secrets. In forced mode each failure is logged and the teardown keeps
//! going; otherwise the first failure aborts with its classified error.

use crate::activities::cluster::{DeleteClusterSecretsRequest, GetClusterRequest};
use crate::activities::external::{
    DeleteDnsRecordsRequest, DeleteKubernetesResourcesRequest, DeleteKubernetesResourcesResponse,
};
use crate::activities::oidc::RemoveOidcClientRequest;
use crate::names;
use crate::workflows::create::set_status;
use crate::workflows::infra_delete::{DeleteInfrastructureRequest, DeleteInfrastructureOutput};
use crate::workflows::{session_ref, short_opts};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_model::{Cluster, ClusterStatus, ProvisioningRequest};
use stackwright_runtime::{Workflow, WorkflowContext, WorkflowError, call_activity, call_child};
use std::sync::Arc;

/// Input of the delete-cluster workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteClusterRequest {
    /// The cluster being deleted, same shape the creation was started with.
    pub request: ProvisioningRequest,
    /// Best-effort mode: log failures of ordered steps and keep going.
    #[serde(default)]
    pub forced: bool,
}

/// What a finished deletion reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteClusterOutput {
    /// Steps that failed but were skipped in forced mode.
    pub skipped_failures: Vec<String>,
}

/// The delete-cluster workflow.
#[derive(Default)]
pub struct DeleteClusterWorkflow;

impl DeleteClusterWorkflow {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Workflow for DeleteClusterWorkflow {
    type Input = DeleteClusterRequest;
    type Output = DeleteClusterOutput;

    fn name(&self) -> &'static str {
        names::workflows::DELETE_CLUSTER
    }

    async fn run(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError> {
        let ctx = ctx.as_ref();
        let request = &input.request;
        let mut skipped = Vec::new();

        set_status(
            ctx,
            request.cluster_id,
            ClusterStatus::Deleting,
            "deleting cluster",
        )
        .await?;

        // Read once up front; the record outlives the teardown but the
        // ordered steps below should not each re-fetch it.
        let cluster: Cluster = call_activity(
            ctx,
            names::activities::GET_CLUSTER,
            &GetClusterRequest {
                cluster_id: request.cluster_id,
            },
            short_opts(),
        )
        .await?;

        let evacuation = call_activity::<_, DeleteKubernetesResourcesResponse>(
            ctx,
            names::activities::DELETE_KUBERNETES_RESOURCES,
            &DeleteKubernetesResourcesRequest {
                cluster_id: request.cluster_id,
            },
            short_opts(),
        )
        .await
        .map(|_| ());
        absorb(input.forced, "delete kubernetes resources", evacuation, &mut skipped)?;

        let dns = call_activity::<_, ()>(
            ctx,
            names::activities::DELETE_DNS_RECORDS,
            &DeleteDnsRecordsRequest {
                organization_id: request.organization_id,
                cluster_uid: request.cluster_uid.clone(),
            },
            short_opts(),
        )
        .await;
        absorb(input.forced, "delete dns records", dns, &mut skipped)?;

        let infra = call_child::<_, DeleteInfrastructureOutput>(
            ctx,
            names::workflows::DELETE_INFRASTRUCTURE,
            &DeleteInfrastructureRequest {
                request: request.clone(),
                forced: input.forced,
            },
        )
        .await
        .map(|_| ());
        absorb_workflow(input.forced, "delete infrastructure", infra, &mut skipped)?;

        let secrets = call_activity::<_, ()>(
            ctx,
            names::activities::DELETE_CLUSTER_SECRETS,
            &DeleteClusterSecretsRequest {
                organization_id: request.organization_id,
                cluster_name: request.cluster_name.clone(),
            },
            short_opts(),
        )
        .await;
        absorb(input.forced, "delete cluster secrets", secrets, &mut skipped)?;

        // A cluster created without OIDC has nothing registered.
        if let Some(client_id) = cluster.oidc_client_id {
            let oidc = call_activity::<_, ()>(
                ctx,
                names::activities::REMOVE_OIDC_CLIENT,
                &RemoveOidcClientRequest {
                    session: session_ref(request),
                    client_id,
                },
                short_opts(),
            )
            .await;
            absorb(input.forced, "remove oidc client", oidc, &mut skipped)?;
        }

        let final_status = if skipped.is_empty() {
            (ClusterStatus::Deleted, "cluster deleted".to_string())
        } else {
            (
                ClusterStatus::Deleted,
                format!("cluster deleted, {} step(s) skipped", skipped.len()),
            )
        };
        set_status(ctx, request.cluster_id, final_status.0, &final_status.1).await?;

        Ok(DeleteClusterOutput {
            skipped_failures: skipped,
        })
    }
}

fn absorb(
    forced: bool,
    step: &str,
    result: Result<(), stackwright_runtime::ActivityError>,
    skipped: &mut Vec<String>,
) -> Result<(), WorkflowError> {
    absorb_workflow(forced, step, result.map_err(WorkflowError::from), skipped)
}

fn absorb_workflow(
    forced: bool,
    step: &str,
    result: Result<(), WorkflowError>,
    skipped: &mut Vec<String>,
) -> Result<(), WorkflowError> {
    match result {
        Ok(()) => Ok(()),
        Err(err) if forced => {
            tracing::warn!(step, error = %err, "forced delete, skipping failed step");
            skipped.push(format!("{step}: {err}"));
            Ok(())
        }
        Err(err) => Err(err),
    }
}
