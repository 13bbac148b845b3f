// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! One trait per cloud concern. Activities depend on these, never on an SDK.

use crate::error::CloudError;
use crate::model::{
    Address, CreateLoadBalancerInput, CreateStackInput, DeleteStackInput, KeyPair, LoadBalancer,
    MachineImage, NetworkInterface, OidcClient, ScalingGroup, SpotRequest, Stack, StackEvent,
    Tag, UpdateStackInput,
};
use async_trait::async_trait;

/// Declarative infrastructure stacks.
#[async_trait]
pub trait StackApi: Send + Sync {
    /// Begin creating a stack. Re-invoking with the same client request
    /// token against an existing stack is a provider-side no-op.
    async fn create_stack(&self, input: CreateStackInput) -> Result<(), CloudError>;

    /// Begin updating a stack. A no-change update surfaces the provider's
    /// "No updates are to be performed." validation error.
    async fn update_stack(&self, input: UpdateStackInput) -> Result<(), CloudError>;

    /// Begin deleting a stack.
    async fn delete_stack(&self, input: DeleteStackInput) -> Result<(), CloudError>;

    /// Describe a stack; `None` when it does not exist.
    async fn describe_stack(&self, name: &str) -> Result<Option<Stack>, CloudError>;

    /// Resource events for a stack, newest first.
    async fn stack_events(&self, name: &str) -> Result<Vec<StackEvent>, CloudError>;
}

/// Scaling groups and their spot requests.
#[async_trait]
pub trait ScalingApi: Send + Sync {
    /// Describe a group; `None` when it does not exist.
    async fn describe_group(&self, name: &str) -> Result<Option<ScalingGroup>, CloudError>;

    /// Change min/max/desired in one call.
    async fn update_group(
        &self,
        name: &str,
        min_size: u32,
        max_size: u32,
        desired_capacity: u32,
    ) -> Result<(), CloudError>;

    /// Spot requests serving the group, empty for on-demand groups.
    async fn spot_requests_for_group(&self, name: &str) -> Result<Vec<SpotRequest>, CloudError>;
}

/// Elastic IPs, network interfaces, and VPC lookups.
#[async_trait]
pub trait NetworkApi: Send + Sync {
    /// Allocate a new elastic IP carrying the given tags.
    async fn allocate_address(&self, tags: Vec<Tag>) -> Result<Address, CloudError>;

    /// Find an already-allocated address by tag, for reuse across retries.
    async fn find_address_by_tag(&self, tag: &Tag) -> Result<Option<Address>, CloudError>;

    /// Release an elastic IP.
    async fn release_address(&self, allocation_id: &str) -> Result<(), CloudError>;

    /// Default security group of a VPC.
    async fn default_security_group(&self, vpc_id: &str) -> Result<String, CloudError>;

    /// Detached network interfaces carrying the given tag.
    async fn detached_interfaces_by_tag(
        &self,
        tag: &Tag,
    ) -> Result<Vec<NetworkInterface>, CloudError>;

    /// Delete a network interface.
    async fn delete_interface(&self, interface_id: &str) -> Result<(), CloudError>;
}

/// Load balancers fronting the control plane or created by in-cluster
/// services.
#[async_trait]
pub trait LoadBalancerApi: Send + Sync {
    /// Create a network load balancer and target group spanning the given
    /// subnets.
    async fn create_network_load_balancer(
        &self,
        input: CreateLoadBalancerInput,
    ) -> Result<LoadBalancer, CloudError>;

    /// All load balancers carrying the given tag.
    async fn find_by_tag(&self, tag: &Tag) -> Result<Vec<LoadBalancer>, CloudError>;

    /// Describe one load balancer; `None` once it has disappeared.
    async fn describe(&self, arn: &str) -> Result<Option<LoadBalancer>, CloudError>;
}

/// SSH key pairs.
#[async_trait]
pub trait KeyPairApi: Send + Sync {
    /// Describe a key pair by name; `None` when absent.
    async fn describe_key_pair(&self, name: &str) -> Result<Option<KeyPair>, CloudError>;

    /// Import a public key under the given name.
    async fn import_key_pair(
        &self,
        name: &str,
        public_key: &str,
        tags: Vec<Tag>,
    ) -> Result<KeyPair, CloudError>;

    /// Delete a key pair by name.
    async fn delete_key_pair(&self, name: &str) -> Result<(), CloudError>;
}

/// Machine images.
#[async_trait]
pub trait ImageApi: Send + Sync {
    /// Describe an image; `None` when it does not exist in the region.
    async fn describe_image(&self, image_id: &str) -> Result<Option<MachineImage>, CloudError>;
}

/// IAM access keys of the cluster user.
#[async_trait]
pub trait IamApi: Send + Sync {
    /// Access key ids of a user.
    async fn list_access_keys(&self, user_name: &str) -> Result<Vec<String>, CloudError>;

    /// Delete one access key.
    async fn delete_access_key(&self, user_name: &str, key_id: &str) -> Result<(), CloudError>;
}

/// OIDC client registration for the cluster API server.
#[async_trait]
pub trait OidcApi: Send + Sync {
    /// Register a client for the cluster; idempotent per cluster uid.
    async fn create_client(
        &self,
        cluster_uid: &str,
        redirect_url: &str,
    ) -> Result<OidcClient, CloudError>;

    /// Remove a client.
    async fn delete_client(&self, client_id: &str) -> Result<(), CloudError>;
}
