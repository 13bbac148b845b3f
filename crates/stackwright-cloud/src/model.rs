// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Typed views of the cloud resources the activities interact with.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resource tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    /// Tag key.
    pub key: String,
    /// Tag value.
    pub value: String,
}

impl Tag {
    /// Construct a tag.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Lifecycle state of a declarative stack, mirroring the provider's states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StackState {
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    RollbackInProgress,
    RollbackComplete,
    RollbackFailed,
    UpdateInProgress,
    UpdateComplete,
    UpdateFailed,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
}

impl StackState {
    /// Whether the stack has settled (no operation in flight).
    pub fn is_terminal(&self) -> bool {
        !matches!(
            self,
            Self::CreateInProgress
                | Self::RollbackInProgress
                | Self::UpdateInProgress
                | Self::DeleteInProgress
        )
    }

    /// Whether the state represents a failed or rolled-back operation.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::CreateFailed
                | Self::RollbackInProgress
                | Self::RollbackComplete
                | Self::RollbackFailed
                | Self::UpdateFailed
                | Self::DeleteFailed
        )
    }
}

/// A declarative stack as described by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stack {
    /// Logical stack name.
    pub name: String,
    /// Current state.
    pub state: StackState,
    /// Output key/values published by the stack.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
    /// Provider reason for the current state, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_reason: Option<String>,
}

/// One resource event in a stack's history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackEvent {
    /// Logical id of the resource the event concerns.
    pub logical_id: String,
    /// Provider resource type.
    pub resource_type: String,
    /// Resource status string, e.g. `CREATE_FAILED`.
    pub status: String,
    /// Provider reason for the status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
}

/// Input for a stack create call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStackInput {
    /// Logical stack name.
    pub name: String,
    /// Template body.
    pub template: String,
    /// Template parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Tags applied to the stack and its resources.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Deterministic idempotency key; retried calls with the same token are
    /// collapsed by the provider into one operation.
    pub client_request_token: String,
}

/// Input for a stack update call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStackInput {
    /// Logical stack name.
    pub name: String,
    /// Template body.
    pub template: String,
    /// Template parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Deterministic idempotency key.
    pub client_request_token: String,
}

/// Input for a stack delete call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStackInput {
    /// Logical stack name.
    pub name: String,
    /// Deterministic idempotency key.
    pub client_request_token: String,
}

/// One instance inside a scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupInstance {
    /// Provider instance id.
    pub id: String,
    /// Health check result, `Healthy` when passing.
    pub health_status: String,
    /// Lifecycle state, `InService` once the instance serves traffic.
    pub lifecycle_state: String,
}

impl GroupInstance {
    /// Counted toward desired healthy capacity only when both checks hold.
    pub fn is_healthy_in_service(&self) -> bool {
        self.health_status == "Healthy" && self.lifecycle_state == "InService"
    }
}

/// A scaling group as described by the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingGroup {
    /// Group name.
    pub name: String,
    /// Minimum size.
    pub min_size: u32,
    /// Maximum size.
    pub max_size: u32,
    /// Current desired capacity.
    pub desired_capacity: u32,
    /// Member instances.
    #[serde(default)]
    pub instances: Vec<GroupInstance>,
}

impl ScalingGroup {
    /// Instances that are both health-checked OK and in service.
    pub fn healthy_in_service_count(&self) -> u32 {
        self.instances
            .iter()
            .filter(|i| i.is_healthy_in_service())
            .count() as u32
    }
}

/// A spot capacity request associated with a scaling group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpotRequest {
    /// Request id.
    pub id: String,
    /// Request state, e.g. `open`, `active`, `closed`.
    pub state: String,
    /// Status code, e.g. `fulfilled`, `price-too-low`, `capacity-not-available`.
    pub status_code: String,
    /// Human-readable status detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
}

impl SpotRequest {
    /// Status codes that cannot self-resolve: polling longer will not help.
    pub fn is_terminal_failure(&self) -> bool {
        matches!(
            self.status_code.as_str(),
            "price-too-low"
                | "capacity-not-available"
                | "capacity-oversubscribed"
                | "bad-parameters"
                | "constraint-not-fulfillable"
        )
    }
}

/// An elastic IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Provider allocation id.
    pub allocation_id: String,
    /// The public IP.
    pub public_ip: String,
}

/// A load balancer owned by the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadBalancer {
    /// Provider ARN or id.
    pub arn: String,
    /// Load balancer name.
    pub name: String,
    /// DNS name clients connect to.
    pub dns_name: String,
}

/// Input for creating the master network load balancer and target group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateLoadBalancerInput {
    /// Load balancer name.
    pub name: String,
    /// Subnets the balancer spans, one per master AZ.
    pub subnet_ids: Vec<String>,
    /// Listener/target port.
    pub port: u16,
    /// Ownership tags.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// An SSH key pair registered with the provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyPair {
    /// Key pair name.
    pub name: String,
    /// Public key fingerprint.
    pub fingerprint: String,
}

/// A machine image, reduced to what selection needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineImage {
    /// Image id.
    pub id: String,
    /// Size of the image's root block device in GB.
    pub block_device_size_gb: u32,
}

/// A network interface, reduced to what orphan cleanup needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    /// Interface id.
    pub id: String,
    /// Whether the interface is attached to an instance.
    pub attached: bool,
}

/// OIDC client registered for a cluster's API server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OidcClient {
    /// Issued client id.
    pub client_id: String,
    /// Issued client secret.
    pub client_secret: String,
}
