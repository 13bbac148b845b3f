// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Deterministic names: activities, workflows, signals, stacks, and client
//! request tokens.
//!
//! Activity and workflow names follow the `stackwright::{type}::{name}`
//! convention. Stack names are pure functions of the cluster and pool names,
//! so retried and replayed executions always address the same provider-side
//! resources.

/// Workflow names.
pub mod workflows {
    /// Provision a new cluster end to end.
    pub const CREATE_CLUSTER: &str = "stackwright::workflow::create-cluster";
    /// Reconcile the node-pool set of an existing cluster.
    pub const UPDATE_CLUSTER: &str = "stackwright::workflow::update-cluster";
    /// Tear a cluster down, optionally best-effort.
    pub const DELETE_CLUSTER: &str = "stackwright::workflow::delete-cluster";
    /// Tear down the cloud infrastructure of a cluster, strictly ordered.
    pub const DELETE_INFRASTRUCTURE: &str = "stackwright::workflow::delete-infrastructure";
}

/// Activity names.
pub mod activities {
    pub const CREATE_STACK: &str = "stackwright::activity::create-stack";
    pub const UPDATE_STACK: &str = "stackwright::activity::update-stack";
    pub const DELETE_STACK: &str = "stackwright::activity::delete-stack";
    pub const WAIT_STACK: &str = "stackwright::activity::wait-stack";
    pub const DESCRIBE_STACK: &str = "stackwright::activity::describe-stack";
    pub const ENSURE_IAM_ROLES: &str = "stackwright::activity::ensure-iam-roles";

    pub const GET_DEFAULT_SECURITY_GROUP: &str =
        "stackwright::activity::get-default-security-group";
    pub const ALLOCATE_CLUSTER_ADDRESS: &str = "stackwright::activity::allocate-cluster-address";
    pub const RELEASE_CLUSTER_ADDRESS: &str = "stackwright::activity::release-cluster-address";
    pub const CREATE_MASTER_LOAD_BALANCER: &str =
        "stackwright::activity::create-master-load-balancer";
    pub const LIST_OWNED_LOAD_BALANCERS: &str = "stackwright::activity::list-owned-load-balancers";
    pub const WAIT_LOAD_BALANCERS_GONE: &str = "stackwright::activity::wait-load-balancers-gone";
    pub const RELEASE_ORPHANED_INTERFACES: &str =
        "stackwright::activity::release-orphaned-interfaces";

    pub const IMPORT_SSH_KEY: &str = "stackwright::activity::import-ssh-key";
    pub const DELETE_SSH_KEY: &str = "stackwright::activity::delete-ssh-key";

    pub const SELECT_POOL_IMAGE: &str = "stackwright::activity::select-pool-image";
    pub const WAIT_GROUP_HEALTHY: &str = "stackwright::activity::wait-group-healthy";
    pub const UPDATE_GROUP: &str = "stackwright::activity::update-group";

    pub const GENERATE_CLUSTER_CA: &str = "stackwright::activity::generate-cluster-ca";
    pub const SET_CLUSTER_STATUS: &str = "stackwright::activity::set-cluster-status";
    pub const GET_CLUSTER: &str = "stackwright::activity::get-cluster";
    pub const GET_NODE_POOLS: &str = "stackwright::activity::get-node-pools";
    pub const PERSIST_NETWORK: &str = "stackwright::activity::persist-network";
    pub const PERSIST_NODE_POOLS: &str = "stackwright::activity::persist-node-pools";
    pub const DELETE_CLUSTER_SECRETS: &str = "stackwright::activity::delete-cluster-secrets";
    pub const DELETE_ACCESS_KEYS: &str = "stackwright::activity::delete-access-keys";

    pub const REGISTER_OIDC_CLIENT: &str = "stackwright::activity::register-oidc-client";
    pub const PERSIST_OIDC_CLIENT: &str = "stackwright::activity::persist-oidc-client";
    pub const REMOVE_OIDC_CLIENT: &str = "stackwright::activity::remove-oidc-client";

    pub const DELETE_DNS_RECORDS: &str = "stackwright::activity::delete-dns-records";
    pub const DELETE_KUBERNETES_RESOURCES: &str =
        "stackwright::activity::delete-kubernetes-resources";
    pub const ALLOW_WORKLOADS_ON_MASTER: &str = "stackwright::activity::allow-workloads-on-master";
}

/// Signal channel names, scoped per workflow execution.
pub mod signals {
    /// Bootstrap agent reports the master node is ready. No payload.
    pub const NODE_READY: &str = "node-ready";
    /// Bootstrap agent reports failure. Payload carries the decoded message.
    pub const NODE_BOOTSTRAP_FAILED: &str = "node-bootstrap-failed";
}

const STACK_PREFIX: &str = "stackwright";

/// Name of the VPC/routing stack.
pub fn network_stack(cluster_name: &str) -> String {
    format!("{STACK_PREFIX}-network-{cluster_name}")
}

/// Name of the per-AZ subnet stack.
pub fn subnet_stack(cluster_name: &str, zone: &str) -> String {
    format!("{STACK_PREFIX}-subnet-{cluster_name}-{zone}")
}

/// Name of the account-global IAM role stack, shared across clusters.
pub fn iam_stack() -> String {
    format!("{STACK_PREFIX}-global-roles")
}

/// Name of the control plane stack.
pub fn master_stack(cluster_name: &str) -> String {
    format!("{STACK_PREFIX}-master-{cluster_name}")
}

/// Name of a worker pool stack. The prefix differs from the master stack, so
/// a worker pool named like the master pool can never collide with it.
pub fn node_pool_stack(cluster_name: &str, pool_name: &str) -> String {
    format!("{STACK_PREFIX}-nodepool-{cluster_name}-{pool_name}")
}

/// Name of the cluster SSH key pair at the provider.
pub fn ssh_key_name(cluster_name: &str) -> String {
    format!("{STACK_PREFIX}-ssh-{cluster_name}")
}

/// Name of the master network load balancer.
pub fn load_balancer_name(cluster_name: &str) -> String {
    format!("{STACK_PREFIX}-api-{cluster_name}")
}

/// Name of the provisioned cluster IAM user.
pub fn cluster_user_name(cluster_name: &str) -> String {
    format!("{STACK_PREFIX}-cluster-{cluster_name}")
}

/// Derive a deterministic client request token from identifying parts.
///
/// Parts are joined with `-`; characters outside `[0-9a-zA-Z-]` are replaced
/// with `-`; leading dashes are stripped; the result is truncated to the
/// provider's 64-character token limit. Identical inputs always yield
/// identical tokens, so a retried create collapses into the original
/// operation.
pub fn client_request_token(parts: &[&str]) -> String {
    let joined = parts.join("-");
    let sanitized: String = joined
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();
    let stripped = sanitized.trim_start_matches('-');
    stripped.chars().take(64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_names_are_deterministic() {
        assert_eq!(network_stack("demo"), network_stack("demo"));
        assert_eq!(
            node_pool_stack("demo", "pool1"),
            node_pool_stack("demo", "pool1")
        );
    }

    #[test]
    fn test_master_and_worker_stacks_never_collide() {
        // Even a worker pool literally named "master" gets a distinct stack.
        assert_ne!(master_stack("demo"), node_pool_stack("demo", "master"));
    }

    #[test]
    fn test_token_character_set_and_length() {
        let token = client_request_token(&["wf run 42/7!", "create_stack", "x".repeat(80).as_str()]);
        assert!(token.len() <= 64);
        assert!(!token.starts_with('-'));
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric() || c == '-'));
    }

    #[test]
    fn test_token_is_deterministic() {
        let a = client_request_token(&["wf-1", "create-stack"]);
        let b = client_request_token(&["wf-1", "create-stack"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_token_strips_leading_dashes() {
        let token = client_request_token(&["***wf", "create"]);
        assert!(token.starts_with("wf"));
    }
}
