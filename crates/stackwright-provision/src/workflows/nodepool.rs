// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-pool provisioning shared by the create and update workflows.

use crate::activities::asg::{WaitGroupHealthyRequest, WaitGroupHealthyResponse};
use crate::activities::image::{SelectPoolImageRequest, SelectPoolImageResponse};
use crate::activities::stack::{CreateStackRequest, StackKind, WaitStackRequest, WaitTarget};
use crate::config::Config;
use crate::errors::reason;
use crate::names;
use crate::tags;
use crate::workflows::{session_ref, short_opts, group_wait_opts, stack_wait_opts};
use stackwright_model::{NodePoolSpec, ProvisioningRequest};
use stackwright_runtime::{ActivityError, WorkflowContext, WorkflowError, call_activity};
use std::collections::BTreeMap;

/// Shared infrastructure a pool stack is parameterized with, resolved once
/// per workflow before any pool work starts.
#[derive(Debug, Clone)]
pub(crate) struct PoolInfra {
    /// VPC the pool lives in.
    pub vpc_id: String,
    /// Default security group of the VPC.
    pub security_group_id: String,
    /// Registered SSH key pair name.
    pub key_name: String,
    /// Externally reachable API server address nodes join through.
    pub external_address: String,
    /// Created subnets keyed by availability zone.
    pub subnets_by_zone: BTreeMap<String, String>,
}

impl PoolInfra {
    /// Subnets a pool spans: explicit ids verbatim, otherwise the created
    /// subnet of each zone the pool names.
    pub fn subnets_for(&self, pool: &NodePoolSpec) -> Result<Vec<String>, WorkflowError> {
        if !pool.subnet_ids.is_empty() {
            return Ok(pool.subnet_ids.clone());
        }
        pool.zones
            .iter()
            .map(|zone| {
                self.subnets_by_zone.get(zone).cloned().ok_or_else(|| {
                    WorkflowError::Activity(ActivityError::fatal(
                        reason::INVALID_PARAMETER,
                        format!("no subnet exists for zone '{zone}' of pool '{}'", pool.name),
                    ))
                })
            })
            .collect()
    }
}

/// Resolve a pool's image and volume size through the selection activity.
pub(crate) async fn resolve_pool(
    ctx: &dyn WorkflowContext,
    request: &ProvisioningRequest,
    config: &Config,
    pool: &NodePoolSpec,
) -> Result<NodePoolSpec, WorkflowError> {
    let response: SelectPoolImageResponse = call_activity(
        ctx,
        names::activities::SELECT_POOL_IMAGE,
        &SelectPoolImageRequest {
            session: session_ref(request),
            pool: pool.clone(),
            kubernetes_version: config.kubernetes_version.clone(),
            os: config.node_os.clone(),
            container_runtime: config.container_runtime.clone(),
        },
        short_opts(),
    )
    .await?;
    Ok(response.pool)
}

/// Parameters the node pool template is instantiated with.
pub(crate) fn pool_stack_parameters(
    request: &ProvisioningRequest,
    pool: &NodePoolSpec,
    infra: &PoolInfra,
    bootstrap_command: &str,
    subnets: &[String],
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    params.insert("ClusterName".into(), request.cluster_name.clone());
    params.insert("NodePoolName".into(), pool.name.clone());
    params.insert("InstanceType".into(), pool.instance_type.clone());
    params.insert("ImageId".into(), pool.image.clone().unwrap_or_default());
    params.insert(
        "VolumeSize".into(),
        pool.volume_size_gb.unwrap_or_default().to_string(),
    );
    params.insert("MinSize".into(), pool.min_count.to_string());
    params.insert("MaxSize".into(), pool.max_count.to_string());
    params.insert("DesiredCapacity".into(), pool.count.to_string());
    if let Some(price) = pool.spot_price.filter(|p| *p > 0.0) {
        params.insert("SpotPrice".into(), price.to_string());
    }
    params.insert("KeyName".into(), infra.key_name.clone());
    params.insert("VpcId".into(), infra.vpc_id.clone());
    params.insert("SecurityGroupId".into(), infra.security_group_id.clone());
    params.insert("SubnetIds".into(), subnets.join(","));
    params.insert("BootstrapCommand".into(), bootstrap_command.to_string());
    if !pool.labels.is_empty() {
        let labels: Vec<String> = pool
            .labels
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        params.insert("NodeLabels".into(), labels.join(","));
    }
    params
}

/// Provision one worker pool end to end: stack create, stack settle, and
/// the health wait on the scaling group it produced.
///
/// The pool must already carry a resolved image and volume size; callers
/// run [`resolve_pool`] first (the create workflow does it for all pools in
/// one fan-out so per-pool errors combine).
pub(crate) async fn provision_worker_pool(
    ctx: &dyn WorkflowContext,
    request: &ProvisioningRequest,
    config: &Config,
    infra: &PoolInfra,
    pool: &NodePoolSpec,
) -> Result<NodePoolSpec, WorkflowError> {
    let pool = pool.clone();
    let capability = request.provider.capability().map_err(|err| {
        WorkflowError::Activity(ActivityError::fatal(
            reason::UNSUPPORTED_PROVIDER,
            err.to_string(),
        ))
    })?;
    let subnets = infra.subnets_for(&pool)?;
    let bootstrap = capability.bootstrap_command(request, &pool, &infra.external_address);
    let stack_name = names::node_pool_stack(&request.cluster_name, &pool.name);

    call_activity::<_, ()>(
        ctx,
        names::activities::CREATE_STACK,
        &CreateStackRequest {
            session: session_ref(request),
            stack_name: stack_name.clone(),
            kind: StackKind::NodePool,
            parameters: pool_stack_parameters(request, &pool, infra, &bootstrap, &subnets),
            tags: tags::node_pool_tags(&request.cluster_uid, &request.cluster_name, &pool.name),
            token_base: ctx.workflow_id().to_string(),
        },
        short_opts(),
    )
    .await?;

    call_activity::<_, crate::activities::stack::WaitStackResponse>(
        ctx,
        names::activities::WAIT_STACK,
        &WaitStackRequest {
            session: session_ref(request),
            stack_name: stack_name.clone(),
            target: WaitTarget::Created,
        },
        stack_wait_opts(config),
    )
    .await?;

    let _: WaitGroupHealthyResponse = call_activity(
        ctx,
        names::activities::WAIT_GROUP_HEALTHY,
        &WaitGroupHealthyRequest {
            session: session_ref(request),
            group_name: stack_name,
            expected_count: pool.count,
            spot: pool.is_spot(),
        },
        group_wait_opts(config),
    )
    .await?;

    Ok(pool)
}
