// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Infrastructure teardown, run as a child of the delete-cluster workflow.
//!
//! The ordering is strict: every load balancer owned by the cluster must be
//! observed absent before the first node pool stack delete is dispatched,
//! because a balancer still routing into a pool pins network interfaces
//! that the later subnet and VPC deletions depend on. After the pools go
//! the control plane, the SSH key, orphaned interfaces, the cluster
//! address, subnets, the network stack, the IAM stack, and finally the
//! cluster user's access keys.

use crate::activities::cluster::{DeleteAccessKeysRequest, DeleteAccessKeysResponse};
use crate::activities::keypair::DeleteSshKeyRequest;
use crate::activities::network::{
    ListOwnedLoadBalancersRequest, ListOwnedLoadBalancersResponse,
    ReleaseClusterAddressRequest, ReleaseOrphanedInterfacesRequest,
    ReleaseOrphanedInterfacesResponse, WaitLoadBalancersGoneRequest,
};
use crate::activities::stack::{
    DeleteStackRequest, DescribeStackRequest, DescribeStackResponse, WaitStackRequest,
    WaitStackResponse, WaitTarget,
};
use crate::config::Config;
use crate::names;
use crate::workflows::{lb_wait_opts, session_ref, short_opts, stack_wait_opts};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use stackwright_model::ProvisioningRequest;
use stackwright_runtime::{Workflow, WorkflowContext, WorkflowError, call_activity};
use std::sync::Arc;

/// Input of the delete-infrastructure workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteInfrastructureRequest {
    /// The cluster whose infrastructure is being removed.
    pub request: ProvisioningRequest,
    /// Best-effort mode, inherited from the parent deletion.
    #[serde(default)]
    pub forced: bool,
}

/// What a finished teardown reports back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteInfrastructureOutput {
    /// VPC that was torn down, when the network stack still existed.
    pub vpc_id: Option<String>,
    /// Steps that failed but were skipped in forced mode.
    pub skipped_failures: Vec<String>,
}

/// The delete-infrastructure workflow.
pub struct DeleteInfrastructureWorkflow {
    config: Config,
}

impl DeleteInfrastructureWorkflow {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Workflow for DeleteInfrastructureWorkflow {
    type Input = DeleteInfrastructureRequest;
    type Output = DeleteInfrastructureOutput;

    fn name(&self) -> &'static str {
        names::workflows::DELETE_INFRASTRUCTURE
    }

    async fn run(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError> {
        let ctx = ctx.as_ref();
        let request = &input.request;
        let forced = input.forced;
        let mut skipped = Vec::new();

        let network = call_activity::<_, DescribeStackResponse>(
            ctx,
            names::activities::DESCRIBE_STACK,
            &DescribeStackRequest {
                session: session_ref(request),
                stack_name: names::network_stack(&request.cluster_name),
            },
            short_opts(),
        )
        .await?;
        let vpc_id = network.outputs.get("VpcId").cloned();

        // Balancers first. Nothing below may start until they are gone.
        let balancers = call_activity::<_, ListOwnedLoadBalancersResponse>(
            ctx,
            names::activities::LIST_OWNED_LOAD_BALANCERS,
            &ListOwnedLoadBalancersRequest {
                session: session_ref(request),
                cluster_uid: request.cluster_uid.clone(),
            },
            short_opts(),
        )
        .await?;
        if !balancers.arns.is_empty() {
            let wait = call_activity::<_, ()>(
                ctx,
                names::activities::WAIT_LOAD_BALANCERS_GONE,
                &WaitLoadBalancersGoneRequest {
                    session: session_ref(request),
                    arns: balancers.arns,
                },
                lb_wait_opts(&self.config),
            )
            .await
            .map_err(WorkflowError::from);
            self.absorb(forced, "wait for load balancers", wait, &mut skipped)?;
        }

        // Node pool stacks, in parallel; names come from the request so a
        // teardown works even when the record was never fully persisted.
        let pool_deletes = request.worker_pools().map(|pool| {
            self.delete_stack(
                ctx,
                request,
                names::node_pool_stack(&request.cluster_name, &pool.name),
            )
        });
        let mut failures = Vec::new();
        for result in join_all(pool_deletes).await {
            if let Err(err) = result {
                failures.push(err);
            }
        }
        self.absorb(
            forced,
            "delete node pool stacks",
            WorkflowError::combine(failures),
            &mut skipped,
        )?;

        let master = self
            .delete_stack(ctx, request, names::master_stack(&request.cluster_name))
            .await;
        self.absorb(forced, "delete master stack", master, &mut skipped)?;

        let key = call_activity::<_, ()>(
            ctx,
            names::activities::DELETE_SSH_KEY,
            &DeleteSshKeyRequest {
                session: session_ref(request),
                cluster_name: request.cluster_name.clone(),
            },
            short_opts(),
        )
        .await
        .map_err(WorkflowError::from);
        self.absorb(forced, "delete ssh key", key, &mut skipped)?;

        let interfaces = call_activity::<_, ReleaseOrphanedInterfacesResponse>(
            ctx,
            names::activities::RELEASE_ORPHANED_INTERFACES,
            &ReleaseOrphanedInterfacesRequest {
                session: session_ref(request),
                cluster_uid: request.cluster_uid.clone(),
            },
            short_opts(),
        )
        .await
        .map(|_| ())
        .map_err(WorkflowError::from);
        self.absorb(forced, "release orphaned interfaces", interfaces, &mut skipped)?;

        let address = call_activity::<_, ()>(
            ctx,
            names::activities::RELEASE_CLUSTER_ADDRESS,
            &ReleaseClusterAddressRequest {
                session: session_ref(request),
                cluster_uid: request.cluster_uid.clone(),
            },
            short_opts(),
        )
        .await
        .map_err(WorkflowError::from);
        self.absorb(forced, "release cluster address", address, &mut skipped)?;

        // Subnet stacks, parallel; zones reconstructed from the request.
        let mut zones: Vec<String> = request
            .node_pools
            .iter()
            .flat_map(|p| p.zones.iter().cloned())
            .collect();
        zones.sort();
        zones.dedup();
        let subnet_deletes = zones.iter().map(|zone| {
            self.delete_stack(
                ctx,
                request,
                names::subnet_stack(&request.cluster_name, zone),
            )
        });
        let mut failures = Vec::new();
        for result in join_all(subnet_deletes).await {
            if let Err(err) = result {
                failures.push(err);
            }
        }
        self.absorb(
            forced,
            "delete subnet stacks",
            WorkflowError::combine(failures),
            &mut skipped,
        )?;

        let network = self
            .delete_stack(ctx, request, names::network_stack(&request.cluster_name))
            .await;
        self.absorb(forced, "delete network stack", network, &mut skipped)?;

        let iam = self.delete_stack(ctx, request, names::iam_stack()).await;
        self.absorb(forced, "delete iam stack", iam, &mut skipped)?;

        let keys = call_activity::<_, DeleteAccessKeysResponse>(
            ctx,
            names::activities::DELETE_ACCESS_KEYS,
            &DeleteAccessKeysRequest {
                session: session_ref(request),
                cluster_name: request.cluster_name.clone(),
            },
            short_opts(),
        )
        .await
        .map(|_| ())
        .map_err(WorkflowError::from);
        self.absorb(forced, "delete access keys", keys, &mut skipped)?;

        Ok(DeleteInfrastructureOutput {
            vpc_id,
            skipped_failures: skipped,
        })
    }
}

impl DeleteInfrastructureWorkflow {
    async fn delete_stack(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
        stack_name: String,
    ) -> Result<(), WorkflowError> {
        call_activity::<_, ()>(
            ctx,
            names::activities::DELETE_STACK,
            &DeleteStackRequest {
                session: session_ref(request),
                stack_name: stack_name.clone(),
                token_base: ctx.workflow_id().to_string(),
            },
            short_opts(),
        )
        .await?;
        let _: WaitStackResponse = call_activity(
            ctx,
            names::activities::WAIT_STACK,
            &WaitStackRequest {
                session: session_ref(request),
                stack_name,
                target: WaitTarget::Deleted,
            },
            stack_wait_opts(&self.config),
        )
        .await?;
        Ok(())
    }

    fn absorb(
        &self,
        forced: bool,
        step: &str,
        result: Result<(), WorkflowError>,
        skipped: &mut Vec<String>,
    ) -> Result<(), WorkflowError> {
        match result {
            Ok(()) => Ok(()),
            Err(err) if forced => {
                tracing::warn!(step, error = %err, "forced teardown, skipping failed step");
                skipped.push(format!("{step}: {err}"));
                Ok(())
            }
            Err(err) => Err(err),
        }
    }
}
