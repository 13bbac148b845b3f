// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster creation.
//!
//! Stage ordering matters: shared IAM roles and certificate material first,
//! then networking, then the control plane, then the readiness rendezvous,
//! and only then the worker pools. Independent stages (subnet creation,
//! per-pool image resolution, worker pool creation) fan out in parallel and
//! their errors are combined rather than short-circuited.

use crate::activities::cluster::{
    GenerateClusterCaRequest, GenerateClusterCaResponse, PersistNetworkRequest,
    PersistNodePoolsRequest, PersistOidcClientRequest, SetClusterStatusRequest,
};
use crate::activities::external::AllowWorkloadsOnMasterRequest;
use crate::activities::keypair::{ImportSshKeyRequest, ImportSshKeyResponse};
use crate::activities::network::{
    AllocateClusterAddressRequest, AllocateClusterAddressResponse,
    CreateMasterLoadBalancerRequest, CreateMasterLoadBalancerResponse,
    GetDefaultSecurityGroupRequest, GetDefaultSecurityGroupResponse,
};
use crate::activities::oidc::{RegisterOidcClientRequest, RegisterOidcClientResponse};
use crate::activities::stack::{
    CreateStackRequest, EnsureIamRolesRequest, EnsureIamRolesResponse, StackKind,
    WaitStackRequest, WaitStackResponse, WaitTarget,
};
use crate::cidr;
use crate::config::Config;
use crate::errors::reason;
use crate::names;
use crate::tags;
use crate::workflows::handshake;
use crate::workflows::nodepool::{self, PoolInfra};
use crate::workflows::{session_ref, short_opts, stack_wait_opts};
use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use stackwright_model::{ClusterNetwork, ClusterStatus, NodePoolSpec, ProvisioningRequest};
use stackwright_runtime::{
    ActivityError, Workflow, WorkflowContext, WorkflowError, call_activity,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// What a finished creation reports back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateClusterOutput {
    /// VPC the cluster was placed in.
    pub vpc_id: String,
    /// Subnets the cluster spans, created and pre-existing combined.
    pub subnet_ids: Vec<String>,
    /// Externally reachable API server address.
    pub external_address: String,
    /// The pool set as provisioned, with resolved images and volumes.
    pub node_pools: Vec<NodePoolSpec>,
}

/// The create-cluster workflow.
pub struct CreateClusterWorkflow {
    config: Config,
}

impl CreateClusterWorkflow {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Workflow for CreateClusterWorkflow {
    type Input = ProvisioningRequest;
    type Output = CreateClusterOutput;

    fn name(&self) -> &'static str {
        names::workflows::CREATE_CLUSTER
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
            ClusterStatus::Creating,
            "creating cluster infrastructure",
        )
        .await?;

        match self.provision(ctx, &request).await {
            Ok(output) => {
                set_status(ctx, request.cluster_id, ClusterStatus::Running, "cluster is running")
                    .await?;
                Ok(output)
            }
            Err(err) => {
                // Best effort; the provisioning error is the one to surface.
                let _ = set_status(
                    ctx,
                    request.cluster_id,
                    ClusterStatus::Error,
                    &err.to_string(),
                )
                .await;
                Err(err)
            }
        }
    }
}

impl CreateClusterWorkflow {
    async fn provision(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<CreateClusterOutput, WorkflowError> {
        request.validate().map_err(|err| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::INVALID_PARAMETER,
                err.to_string(),
            ))
        })?;
        request.provider.capability().map_err(|err| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::UNSUPPORTED_PROVIDER,
                err.to_string(),
            ))
        })?;

        let _: GenerateClusterCaResponse = call_activity(
            ctx,
            names::activities::GENERATE_CLUSTER_CA,
            &GenerateClusterCaRequest {
                organization_id: request.organization_id,
                cluster_uid: request.cluster_uid.clone(),
                cluster_name: request.cluster_name.clone(),
            },
            short_opts(),
        )
        .await?;

        self.ensure_iam_roles(ctx, request).await?;

        // Resolve every pool's image and volume up front, independently;
        // one bad pool must not hide the others' verdicts.
        let resolved = self.resolve_pools(ctx, request).await?;
        let master = resolved
            .iter()
            .find(|p| p.is_master())
            .cloned()
            .ok_or_else(|| {
                WorkflowError::Activity(ActivityError::fatal(
                    reason::INVALID_PARAMETER,
                    "request lost its master pool during resolution",
                ))
            })?;

        let zones: Vec<String> = resolved
            .iter()
            .flat_map(|p| p.zones_needing_subnets().iter().cloned())
            .collect();
        let blocks = cidr::assign_subnet_blocks(&zones).ok_or_else(|| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::INVALID_PARAMETER,
                format!("{} availability zones exceed the VPC address plan", zones.len()),
            ))
        })?;

        // The SSH key import has no dependency on the network stack; run
        // them concurrently.
        let (network_outputs, key) = tokio::try_join!(
            self.create_network_stack(ctx, request),
            self.import_ssh_key(ctx, request),
        )?;
        let vpc_id = network_outputs.get("VpcId").cloned().ok_or_else(|| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::STACK_FAILED,
                "network stack published no VpcId output",
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

        let subnets_by_zone = self
            .create_subnet_stacks(ctx, request, &vpc_id, &blocks)
            .await?;

        if request.oidc_enabled {
            if let Some(base_url) = &request.base_url {
                let client: RegisterOidcClientResponse = call_activity(
                    ctx,
                    names::activities::REGISTER_OIDC_CLIENT,
                    &RegisterOidcClientRequest {
                        session: session_ref(request),
                        cluster_uid: request.cluster_uid.clone(),
                        base_url: base_url.clone(),
                    },
                    short_opts(),
                )
                .await?;
                call_activity::<_, ()>(
                    ctx,
                    names::activities::PERSIST_OIDC_CLIENT,
                    &PersistOidcClientRequest {
                        cluster_id: request.cluster_id,
                        client_id: client.client_id,
                    },
                    short_opts(),
                )
                .await?;
            }
        }

        // Single master gets an elastic IP; a multi-master control plane is
        // fronted by a network load balancer.
        let master_subnets: Vec<String> = if master.subnet_ids.is_empty() {
            master
                .zones
                .iter()
                .filter_map(|z| subnets_by_zone.get(z).cloned())
                .collect()
        } else {
            master.subnet_ids.clone()
        };
        let external_address = if master.uses_load_balancer() {
            let lb: CreateMasterLoadBalancerResponse = call_activity(
                ctx,
                names::activities::CREATE_MASTER_LOAD_BALANCER,
                &CreateMasterLoadBalancerRequest {
                    session: session_ref(request),
                    cluster_uid: request.cluster_uid.clone(),
                    cluster_name: request.cluster_name.clone(),
                    subnet_ids: master_subnets.clone(),
                },
                short_opts(),
            )
            .await?;
            lb.dns_name
        } else {
            let address: AllocateClusterAddressResponse = call_activity(
                ctx,
                names::activities::ALLOCATE_CLUSTER_ADDRESS,
                &AllocateClusterAddressRequest {
                    session: session_ref(request),
                    cluster_uid: request.cluster_uid.clone(),
                },
                short_opts(),
            )
            .await?;
            address.public_ip
        };

        let mut subnet_ids: Vec<String> = subnets_by_zone.values().cloned().collect();
        for pool in &resolved {
            for explicit in &pool.subnet_ids {
                if !subnet_ids.contains(explicit) {
                    subnet_ids.push(explicit.clone());
                }
            }
        }

        call_activity::<_, ()>(
            ctx,
            names::activities::PERSIST_NETWORK,
            &PersistNetworkRequest {
                cluster_id: request.cluster_id,
                network: ClusterNetwork {
                    vpc_id: Some(vpc_id.clone()),
                    subnet_ids: subnet_ids.clone(),
                    subnets_by_zone: subnets_by_zone.clone(),
                    external_address: Some(external_address.clone()),
                },
            },
            short_opts(),
        )
        .await?;

        let infra = PoolInfra {
            vpc_id: vpc_id.clone(),
            security_group_id: security_group.security_group_id,
            key_name: key.key_name,
            external_address: external_address.clone(),
            subnets_by_zone,
        };

        self.create_master_stack(ctx, request, &master, &infra, &master_subnets)
            .await?;

        handshake::await_master_ready(ctx, self.config.master_ready_timeout)
            .await
            .into_result(self.config.master_ready_timeout)?;

        // A cluster whose only pool is the master needs that node to accept
        // workloads.
        if resolved.len() == 1 {
            call_activity::<_, ()>(
                ctx,
                names::activities::ALLOW_WORKLOADS_ON_MASTER,
                &AllowWorkloadsOnMasterRequest {
                    cluster_id: request.cluster_id,
                },
                short_opts(),
            )
            .await?;
        }

        let workers = self
            .create_worker_pools(ctx, request, &infra, &resolved)
            .await?;

        let mut node_pools = vec![master];
        node_pools.extend(workers);
        call_activity::<_, ()>(
            ctx,
            names::activities::PERSIST_NODE_POOLS,
            &PersistNodePoolsRequest {
                cluster_id: request.cluster_id,
                pools: node_pools.clone(),
            },
            short_opts(),
        )
        .await?;

        Ok(CreateClusterOutput {
            vpc_id,
            subnet_ids,
            external_address,
            node_pools,
        })
    }

    async fn ensure_iam_roles(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<(), WorkflowError> {
        let _: EnsureIamRolesResponse = call_activity(
            ctx,
            names::activities::ENSURE_IAM_ROLES,
            &EnsureIamRolesRequest {
                session: session_ref(request),
                token_base: ctx.workflow_id().to_string(),
                tags: tags::cluster_tags(&request.cluster_uid, &request.cluster_name),
            },
            short_opts(),
        )
        .await?;
        let _: WaitStackResponse = call_activity(
            ctx,
            names::activities::WAIT_STACK,
            &WaitStackRequest {
                session: session_ref(request),
                stack_name: names::iam_stack(),
                target: WaitTarget::Created,
            },
            stack_wait_opts(&self.config),
        )
        .await?;
        Ok(())
    }

    async fn resolve_pools(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<Vec<NodePoolSpec>, WorkflowError> {
        let futures = request
            .node_pools
            .iter()
            .map(|pool| nodepool::resolve_pool(ctx, request, &self.config, pool));
        let mut resolved = Vec::with_capacity(request.node_pools.len());
        let mut failures = Vec::new();
        for result in join_all(futures).await {
            match result {
                Ok(pool) => resolved.push(pool),
                Err(err) => failures.push(err),
            }
        }
        WorkflowError::combine(failures)?;
        Ok(resolved)
    }

    async fn create_network_stack(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<BTreeMap<String, String>, WorkflowError> {
        let stack_name = names::network_stack(&request.cluster_name);
        let mut parameters = BTreeMap::new();
        parameters.insert("ClusterName".into(), request.cluster_name.clone());
        parameters.insert("VpcCidr".into(), cidr::VPC_CIDR.into());
        call_activity::<_, ()>(
            ctx,
            names::activities::CREATE_STACK,
            &CreateStackRequest {
                session: session_ref(request),
                stack_name: stack_name.clone(),
                kind: StackKind::Network,
                parameters,
                tags: tags::cluster_tags(&request.cluster_uid, &request.cluster_name),
                token_base: ctx.workflow_id().to_string(),
            },
            short_opts(),
        )
        .await?;
        let waited: WaitStackResponse = call_activity(
            ctx,
            names::activities::WAIT_STACK,
            &WaitStackRequest {
                session: session_ref(request),
                stack_name,
                target: WaitTarget::Created,
            },
            stack_wait_opts(&self.config),
        )
        .await?;
        Ok(waited.outputs)
    }

    async fn import_ssh_key(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
    ) -> Result<ImportSshKeyResponse, WorkflowError> {
        Ok(call_activity(
            ctx,
            names::activities::IMPORT_SSH_KEY,
            &ImportSshKeyRequest {
                session: session_ref(request),
                cluster_uid: request.cluster_uid.clone(),
                cluster_name: request.cluster_name.clone(),
                ssh_secret_id: request.ssh_secret_id.clone(),
            },
            short_opts(),
        )
        .await?)
    }

    async fn create_subnet_stacks(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
        vpc_id: &str,
        blocks: &BTreeMap<String, String>,
    ) -> Result<BTreeMap<String, String>, WorkflowError> {
        let futures = blocks.iter().map(|(zone, block)| async move {
            let stack_name = names::subnet_stack(&request.cluster_name, zone);
            let mut parameters = BTreeMap::new();
            parameters.insert("ClusterName".into(), request.cluster_name.clone());
            parameters.insert("VpcId".into(), vpc_id.to_string());
            parameters.insert("AvailabilityZone".into(), zone.clone());
            parameters.insert("SubnetCidr".into(), block.clone());
            call_activity::<_, ()>(
                ctx,
                names::activities::CREATE_STACK,
                &CreateStackRequest {
                    session: session_ref(request),
                    stack_name: stack_name.clone(),
                    kind: StackKind::Subnet,
                    parameters,
                    tags: tags::cluster_tags(&request.cluster_uid, &request.cluster_name),
                    token_base: ctx.workflow_id().to_string(),
                },
                short_opts(),
            )
            .await?;
            let waited: WaitStackResponse = call_activity(
                ctx,
                names::activities::WAIT_STACK,
                &WaitStackRequest {
                    session: session_ref(request),
                    stack_name: stack_name.clone(),
                    target: WaitTarget::Created,
                },
                stack_wait_opts(&self.config),
            )
            .await?;
            let subnet_id = waited.outputs.get("SubnetId").cloned().ok_or_else(|| {
                WorkflowError::Activity(ActivityError::fatal(
                    reason::STACK_FAILED,
                    format!("subnet stack '{stack_name}' published no SubnetId output"),
                ))
            })?;
            Ok::<_, WorkflowError>((zone.clone(), subnet_id))
        });

        let mut subnets = BTreeMap::new();
        let mut failures = Vec::new();
        for result in join_all(futures).await {
            match result {
                Ok((zone, subnet_id)) => {
                    subnets.insert(zone, subnet_id);
                }
                Err(err) => failures.push(err),
            }
        }
        WorkflowError::combine(failures)?;
        Ok(subnets)
    }

    async fn create_master_stack(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
        master: &NodePoolSpec,
        infra: &PoolInfra,
        master_subnets: &[String],
    ) -> Result<(), WorkflowError> {
        let capability = request.provider.capability().map_err(|err| {
            WorkflowError::Activity(ActivityError::fatal(
                reason::UNSUPPORTED_PROVIDER,
                err.to_string(),
            ))
        })?;
        let bootstrap = capability.bootstrap_command(request, master, &infra.external_address);
        let stack_name = names::master_stack(&request.cluster_name);
        call_activity::<_, ()>(
            ctx,
            names::activities::CREATE_STACK,
            &CreateStackRequest {
                session: session_ref(request),
                stack_name: stack_name.clone(),
                kind: StackKind::Master,
                parameters: nodepool::pool_stack_parameters(
                    request,
                    master,
                    infra,
                    &bootstrap,
                    master_subnets,
                ),
                tags: tags::node_pool_tags(
                    &request.cluster_uid,
                    &request.cluster_name,
                    &master.name,
                ),
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
                target: WaitTarget::Created,
            },
            stack_wait_opts(&self.config),
        )
        .await?;
        Ok(())
    }

    async fn create_worker_pools(
        &self,
        ctx: &dyn WorkflowContext,
        request: &ProvisioningRequest,
        infra: &PoolInfra,
        resolved: &[NodePoolSpec],
    ) -> Result<Vec<NodePoolSpec>, WorkflowError> {
        let futures = resolved
            .iter()
            .filter(|p| !p.is_master())
            .map(|pool| nodepool::provision_worker_pool(ctx, request, &self.config, infra, pool));
        let mut pools = Vec::new();
        let mut failures = Vec::new();
        for result in join_all(futures).await {
            match result {
                Ok(pool) => pools.push(pool),
                Err(err) => failures.push(err),
            }
        }
        WorkflowError::combine(failures)?;
        Ok(pools)
    }
}

/// Record a status transition; shared with the other workflows.
pub(crate) async fn set_status(
    ctx: &dyn WorkflowContext,
    cluster_id: u64,
    status: ClusterStatus,
    message: &str,
) -> Result<(), WorkflowError> {
    Ok(call_activity::<_, ()>(
        ctx,
        names::activities::SET_CLUSTER_STATUS,
        &SetClusterStatusRequest {
            cluster_id,
            status,
            message: message.to_string(),
        },
        short_opts(),
    )
    .await?)
}
