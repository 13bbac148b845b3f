// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster update: diff the requested pool set against the persisted one
//! and fan out the delete, create, and resize work per pool.

use crate::activities::asg::{UpdateGroupRequest, UpdateGroupResponse};
use crate::activities::cluster::{
    GetClusterRequest, GetNodePoolsRequest, GetNodePoolsResponse, PersistNodePoolsRequest,
};
use crate::activities::network::{GetDefaultSecurityGroupRequest, GetDefaultSecurityGroupResponse};
use crate::activities::stack::{DeleteStackRequest, WaitStackRequest, WaitStackResponse, WaitTarget};
use crate::config::Config;
use crate::errors::reason;
use crate::names;
use crate::workflows::create::set_status;
use crate::workflows::nodepool::{self, PoolInfra};
use crate::workflows::{session_ref, short_opts, stack_wait_opts};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use stackwright_model::{
    Cluster, ClusterStatus, NodePoolSpec, ProvisioningRequest, diff_node_pools,
};
use stackwright_runtime::{
    ActivityError, Workflow, WorkflowContext, WorkflowError, call_activity,
};
use std::sync::Arc;

/// What a finished update reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateClusterOutput {
    /// Pool names whose stacks were created.
    pub created: Vec<String>,
    /// Pool names whose scaling groups were resized.
    pub updated: Vec<String>,
    /// Pool names whose stacks were deleted.
    pub deleted: Vec<String>,
}

/// The update-cluster workflow.
pub struct UpdateClusterWorkflow {
    config: Config,
}

impl UpdateClusterWorkflow {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Workflow for UpdateClusterWorkflow {
    type Input = ProvisioningRequest;
    type Output = UpdateClusterOutput;

    fn name(&self) -> &'static str {
        names::workflows::UPDATE_CLUSTER
    }

    async fn run(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        request: Self::Input,
    ) -> Result<Self::Output, WorkflowError> {
        let ctx = ctx.as_ref();
        set_status(
            ctx,
            request.cluster_id,
            ClusterStatus::Updating,
            "updating node pools",
        )
        .await?;

        match self.apply(ctx, &request).await {
            Ok(output) => {
                set_status(ctx, request.cluster_id, ClusterStatus::Running, "cluster is running")
                    .await?;
                Ok(output)
            }
            Err(err) => {
                let _ = set_status(
                    ctx,
                    request.cluster_id,
                    ClusterStatus::Warning,
                    &err.to_string(),
                )
                .await;
                Err(err)
            }
        }
    }
}

impl UpdateClusterWorkflow {
    async fn apply(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<UpdateClusterOutput, WorkflowError> {
        request.validate().map_err(|err| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::INVALID_PARAMETER,
                err.to_string(),
            ))
        })?;

        let existing: GetNodePoolsResponse = call_activity(
            ctx,
            names::activities::GET_NODE_POOLS,
            &GetNodePoolsRequest {
                cluster_id: request.cluster_id,
            },
            short_opts(),
        )
        .await?;

        // The control plane is not updated through this path; diff only the
        // worker pools against each other.
        let old: Vec<NodePoolSpec> = existing
            .pools
            .iter()
            .filter(|p| !p.is_master())
            .cloned()
            .collect();
        let new: Vec<NodePoolSpec> = request.worker_pools().cloned().collect();
        let diff = diff_node_pools(&old, &new);

        let infra = self.resolve_infra(ctx, request).await?;

        let deletions = diff.to_delete.iter().map(|pool| async {
            self.delete_pool_stack(ctx, request, &pool.name).await?;
            Ok::<_, WorkflowError>(pool.name.clone())
        });
        let creations = diff.to_create.iter().map(|pool| async {
            let resolved = nodepool::resolve_pool(ctx, request, &self.config, pool).await?;
            nodepool::provision_worker_pool(ctx, request, &self.config, &infra, &resolved)
                .await?;
            Ok::<_, WorkflowError>(resolved)
        });
        let resizes = diff.to_update.iter().map(|pool| async {
            let group: UpdateGroupResponse = call_activity(
                ctx,
                names::activities::UPDATE_GROUP,
                &UpdateGroupRequest {
                    session: session_ref(request),
                    group_name: names::node_pool_stack(&request.cluster_name, &pool.name),
                    min_size: pool.min_count,
                    max_size: pool.max_count,
                    count: pool.count,
                    autoscaling: pool.autoscaling,
                },
                short_opts(),
            )
            .await?;
            let mut updated = (*pool).clone();
            updated.count = group.desired_capacity;
            Ok::<_, WorkflowError>(updated)
        });

        // All three groups fan out together; every pool's verdict is
        // observed before any error propagates.
        let (delete_results, create_results, resize_results) = tokio::join!(
            join_all(deletions),
            join_all(creations),
            join_all(resizes),
        );

        let mut failures = Vec::new();
        let mut deleted = Vec::new();
        for result in delete_results {
            match result {
                Ok(name) => deleted.push(name),
                Err(err) => failures.push(err),
            }
        }
        let mut created_pools = Vec::new();
        for result in create_results {
            match result {
                Ok(pool) => created_pools.push(pool),
                Err(err) => failures.push(err),
            }
        }
        let mut updated_pools = Vec::new();
        for result in resize_results {
            match result {
                Ok(pool) => updated_pools.push(pool),
                Err(err) => failures.push(err),
            }
        }
        WorkflowError::combine(failures)?;

        let mut pools: Vec<NodePoolSpec> = existing
            .pools
            .iter()
            .filter(|p| p.is_master())
            .cloned()
            .collect();
        pools.extend(created_pools.iter().cloned());
        pools.extend(updated_pools.iter().cloned());
        call_activity::<_, ()>(
            ctx,
            names::activities::PERSIST_NODE_POOLS,
            &PersistNodePoolsRequest {
                cluster_id: request.cluster_id,
                pools,
            },
            short_opts(),
        )
        .await?;

        Ok(UpdateClusterOutput {
            created: created_pools.into_iter().map(|p| p.name).collect(),
            updated: updated_pools.into_iter().map(|p| p.name).collect(),
            deleted,
        })
    }

    /// Rebuild the shared pool infrastructure from the persisted cluster
    /// record; an update workflow has no network stack outputs in hand.
    async fn resolve_infra(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<PoolInfra, WorkflowError> {
        let cluster: Cluster = call_activity(
            ctx,
            names::activities::GET_CLUSTER,
            &GetClusterRequest {
                cluster_id: request.cluster_id,
            },
            short_opts(),
        )
        .await?;
        let vpc_id = cluster.network.vpc_id.clone().ok_or_else(|| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::INVALID_PARAMETER,
                "cluster record carries no VPC id; was creation completed?",
            ))
        })?;
        let external_address = cluster.network.external_address.clone().ok_or_else(|| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::INVALID_PARAMETER,
                "cluster record carries no external address",
            ))
        })?;
        let security_group: GetDefaultSecurityGroupResponse = call_activity(
            ctx,
            names::activities::GET_DEFAULT_SECURITY_GROUP,
            &GetDefaultSecurityGroupRequest {
                session: session_ref(request),
                vpc_id: vpc_id.clone(),
            },
            short_opts(),
        )
        .await?;

        Ok(PoolInfra {
            vpc_id,
            security_group_id: security_group.security_group_id,
            key_name: names::ssh_key_name(&request.cluster_name),
            external_address,
            // Persisted at creation; pools added here find their zones in
            // it or bring explicit subnet ids.
            subnets_by_zone: cluster.network.subnets_by_zone,
        })
    }

    async fn delete_pool_stack(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
        pool_name: &str,
    ) -> Result<(), WorkflowError> {
        let stack_name = names::node_pool_stack(&request.cluster_name, pool_name);
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
}
