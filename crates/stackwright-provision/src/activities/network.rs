// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Network activities: elastic IPs, the master load balancer, and the
//! load-balancer / interface cleanup that gates infrastructure deletion.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::{classify_cloud, reason};
use crate::names;
use crate::tags;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_cloud::{CloudError, CreateLoadBalancerInput, LoadBalancer};
use stackwright_runtime::{Activity, ActivityContext, ActivityError, codes};

/// Kubernetes API server port, the only listener the master balancer carries.
const API_SERVER_PORT: u16 = 6443;

/// Input for the get-default-security-group activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDefaultSecurityGroupRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// VPC to look in.
    pub vpc_id: String,
}

/// Output of the get-default-security-group activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetDefaultSecurityGroupResponse {
    /// Security group id.
    pub security_group_id: String,
}

/// Looks up the default security group of the cluster VPC.
pub struct GetDefaultSecurityGroupActivity {
    deps: Dependencies,
}

impl GetDefaultSecurityGroupActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for GetDefaultSecurityGroupActivity {
    type Input = GetDefaultSecurityGroupRequest;
    type Output = GetDefaultSecurityGroupResponse;

    fn name(&self) -> &'static str {
        names::activities::GET_DEFAULT_SECURITY_GROUP
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<GetDefaultSecurityGroupResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let security_group_id = session
            .network
            .default_security_group(&input.vpc_id)
            .await
            .map_err(classify_cloud)?;
        Ok(GetDefaultSecurityGroupResponse { security_group_id })
    }
}

/// Input for the allocate-cluster-address activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateClusterAddressRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid, recorded in the ownership tag.
    pub cluster_uid: String,
}

/// Output of the allocate-cluster-address activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocateClusterAddressResponse {
    /// Provider allocation id, passed to the master stack.
    pub allocation_id: String,
    /// The public IP the cluster API is reached at.
    pub public_ip: String,
}

/// Allocates the single-master elastic IP.
///
/// Looks for an address already tagged for this cluster first, so a retried
/// workflow reattaches to the allocation of an earlier attempt instead of
/// leaking one address per attempt.
pub struct AllocateClusterAddressActivity {
    deps: Dependencies,
}

impl AllocateClusterAddressActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for AllocateClusterAddressActivity {
    type Input = AllocateClusterAddressRequest;
    type Output = AllocateClusterAddressResponse;

    fn name(&self) -> &'static str {
        names::activities::ALLOCATE_CLUSTER_ADDRESS
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<AllocateClusterAddressResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let tag = tags::ownership_tag(&input.cluster_uid);

        let address = match session
            .network
            .find_address_by_tag(&tag)
            .await
            .map_err(classify_cloud)?
        {
            Some(existing) => {
                tracing::debug!(
                    cluster = %input.cluster_uid,
                    allocation = %existing.allocation_id,
                    "reusing previously allocated address"
                );
                existing
            }
            None => session
                .network
                .allocate_address(vec![tag])
                .await
                .map_err(classify_cloud)?,
        };

        Ok(AllocateClusterAddressResponse {
            allocation_id: address.allocation_id,
            public_ip: address.public_ip,
        })
    }
}

/// Input for the release-cluster-address activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseClusterAddressRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid whose tagged address to release.
    pub cluster_uid: String,
}

/// Releases the cluster's tagged elastic IP. No address is success.
pub struct ReleaseClusterAddressActivity {
    deps: Dependencies,
}

impl ReleaseClusterAddressActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for ReleaseClusterAddressActivity {
    type Input = ReleaseClusterAddressRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::RELEASE_CLUSTER_ADDRESS
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let tag = tags::ownership_tag(&input.cluster_uid);

        match session
            .network
            .find_address_by_tag(&tag)
            .await
            .map_err(classify_cloud)?
        {
            Some(address) => {
                match session.network.release_address(&address.allocation_id).await {
                    Ok(()) | Err(CloudError::NotFound { .. }) => Ok(()),
                    Err(err) => Err(classify_cloud(err)),
                }
            }
            None => Ok(()),
        }
    }
}

/// Input for the create-master-load-balancer activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMasterLoadBalancerRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid, recorded in the ownership tag.
    pub cluster_uid: String,
    /// Cluster name, used for the balancer name.
    pub cluster_name: String,
    /// Subnets the balancer spans, one per master availability zone.
    pub subnet_ids: Vec<String>,
}

/// Output of the create-master-load-balancer activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateMasterLoadBalancerResponse {
    /// Balancer ARN, passed to the master stack as the target group owner.
    pub arn: String,
    /// DNS name the cluster API is reached at.
    pub dns_name: String,
}

/// Creates the network load balancer fronting a multi-master control plane.
///
/// Reuses a balancer already tagged for this cluster, mirroring the address
/// reuse on the single-master path.
pub struct CreateMasterLoadBalancerActivity {
    deps: Dependencies,
}

impl CreateMasterLoadBalancerActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for CreateMasterLoadBalancerActivity {
    type Input = CreateMasterLoadBalancerRequest;
    type Output = CreateMasterLoadBalancerResponse;

    fn name(&self) -> &'static str {
        names::activities::CREATE_MASTER_LOAD_BALANCER
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<CreateMasterLoadBalancerResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let tag = tags::ownership_tag(&input.cluster_uid);
        let name = names::load_balancer_name(&input.cluster_name);

        let existing = session
            .load_balancers
            .find_by_tag(&tag)
            .await
            .map_err(classify_cloud)?;
        let balancer: LoadBalancer = match existing.into_iter().find(|lb| lb.name == name) {
            Some(lb) => lb,
            None => session
                .load_balancers
                .create_network_load_balancer(CreateLoadBalancerInput {
                    name,
                    subnet_ids: input.subnet_ids,
                    port: API_SERVER_PORT,
                    tags: vec![tag],
                })
                .await
                .map_err(classify_cloud)?,
        };

        Ok(CreateMasterLoadBalancerResponse {
            arn: balancer.arn,
            dns_name: balancer.dns_name,
        })
    }
}

/// Input for the list-owned-load-balancers activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOwnedLoadBalancersRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid whose ownership tag to match.
    pub cluster_uid: String,
}

/// Output of the list-owned-load-balancers activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOwnedLoadBalancersResponse {
    /// ARNs of every balancer carrying the cluster's ownership tag. This
    /// covers both the master balancer and balancers created by in-cluster
    /// services.
    pub arns: Vec<String>,
}

/// Lists every load balancer tagged as owned by the cluster.
pub struct ListOwnedLoadBalancersActivity {
    deps: Dependencies,
}

impl ListOwnedLoadBalancersActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for ListOwnedLoadBalancersActivity {
    type Input = ListOwnedLoadBalancersRequest;
    type Output = ListOwnedLoadBalancersResponse;

    fn name(&self) -> &'static str {
        names::activities::LIST_OWNED_LOAD_BALANCERS
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<ListOwnedLoadBalancersResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let tag = tags::ownership_tag(&input.cluster_uid);
        let balancers = session
            .load_balancers
            .find_by_tag(&tag)
            .await
            .map_err(classify_cloud)?;
        Ok(ListOwnedLoadBalancersResponse {
            arns: balancers.into_iter().map(|lb| lb.arn).collect(),
        })
    }
}

/// Input for the wait-load-balancers-gone activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitLoadBalancersGoneRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// ARNs to watch until they disappear.
    pub arns: Vec<String>,
}

/// Waits until every listed load balancer has disappeared.
///
/// Deleting node pools while a balancer still routes to their instances
/// wedges the VPC teardown, so this must complete before any node pool
/// stack is deleted. An exhausted budget fails retryable.
pub struct WaitLoadBalancersGoneActivity {
    deps: Dependencies,
}

impl WaitLoadBalancersGoneActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for WaitLoadBalancersGoneActivity {
    type Input = WaitLoadBalancersGoneRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::WAIT_LOAD_BALANCERS_GONE
    }

    async fn run(&self, ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let config = &self.deps.config;

        let mut remaining = input.arns;
        for attempt in 1..=config.lb_wait_attempts {
            ctx.record_heartbeat();
            if ctx.is_cancelled() {
                return Err(ActivityError::fatal(
                    codes::CANCELLED,
                    "workflow cancelled while waiting for load balancers to disappear",
                ));
            }

            let mut still_present = Vec::new();
            for arn in &remaining {
                if session
                    .load_balancers
                    .describe(arn)
                    .await
                    .map_err(classify_cloud)?
                    .is_some()
                {
                    still_present.push(arn.clone());
                }
            }
            remaining = still_present;
            if remaining.is_empty() {
                return Ok(());
            }

            tracing::debug!(attempt, remaining = remaining.len(), "load balancers still present");
            tokio::time::sleep(config.lb_poll_interval).await;
        }

        Err(ActivityError::retryable(
            reason::LOAD_BALANCERS_PRESENT,
            format!(
                "{} load balancer(s) still present after the wait budget",
                remaining.len()
            ),
        ))
    }
}

/// Input for the release-orphaned-interfaces activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOrphanedInterfacesRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid whose ownership tag to match.
    pub cluster_uid: String,
}

/// Output of the release-orphaned-interfaces activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOrphanedInterfacesResponse {
    /// How many interfaces were deleted.
    pub released: u32,
}

/// Deletes detached network interfaces left behind by in-cluster services.
/// They hold subnet references that block subnet stack deletion.
pub struct ReleaseOrphanedInterfacesActivity {
    deps: Dependencies,
}

impl ReleaseOrphanedInterfacesActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for ReleaseOrphanedInterfacesActivity {
    type Input = ReleaseOrphanedInterfacesRequest;
    type Output = ReleaseOrphanedInterfacesResponse;

    fn name(&self) -> &'static str {
        names::activities::RELEASE_ORPHANED_INTERFACES
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<ReleaseOrphanedInterfacesResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let tag = tags::ownership_tag(&input.cluster_uid);

        let interfaces = session
            .network
            .detached_interfaces_by_tag(&tag)
            .await
            .map_err(classify_cloud)?;

        let mut released = 0;
        for interface in interfaces.iter().filter(|i| !i.attached) {
            match session.network.delete_interface(&interface.id).await {
                Ok(()) => released += 1,
                // Already gone, or raced an attach; either way not ours to fail on.
                Err(CloudError::NotFound { .. }) => {}
                Err(err) => return Err(classify_cloud(err)),
            }
        }

        if released > 0 {
            tracing::info!(cluster = %input.cluster_uid, released, "orphaned interfaces deleted");
        }
        Ok(ReleaseOrphanedInterfacesResponse { released })
    }
}
