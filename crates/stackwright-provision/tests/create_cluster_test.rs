// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the create-cluster workflow.
//!
//! These tests verify:
//! 1. A single-master cluster is exposed through an elastic IP, a
//!    multi-master cluster through a network load balancer
//! 2. The master-ready handshake: ready, bootstrap failure, and timeout
//! 3. Spot capacity failures fail fast instead of polling out the budget
//! 4. Malformed requests are rejected before any cloud call
//! 5. A replayed creation tolerates resources its earlier run already made
//!
//! Run with:
//! ```bash
//! cargo test -p stackwright-provision --test create_cluster_test
//! ```

mod support;

use serde_json::json;
use stackwright_model::{ClusterStatus, NodePoolRole};
use stackwright_provision::errors::reason;
use stackwright_provision::names;
use stackwright_provision::workflows::create::CreateClusterOutput;
use support::{GENERAL_IMAGE, harness, master_pool, pool, request};

#[tokio::test(start_paused = true)]
async fn test_single_master_cluster_gets_elastic_ip() {
    let h = harness();
    let req = request(vec![
        master_pool(1),
        pool("pool1", NodePoolRole::Worker, 2),
        pool("pool2", NodePoolRole::Worker, 1),
    ]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-1", &req)
        .unwrap();
    exec.signal(names::signals::NODE_READY, json!({}));
    let output: CreateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(output.vpc_id, "vpc-00000001");
    assert_eq!(output.subnet_ids, vec!["subnet-eu-west-1a".to_string()]);
    // Single master: an elastic IP, never a load balancer.
    assert_eq!(output.external_address, "198.51.100.1");
    h.cloud.with_state(|state| {
        assert_eq!(state.addresses.len(), 1);
        assert!(state.balancers.is_empty());
        assert!(state.stacks.contains_key("stackwright-master-demo"));
        assert!(state.stacks.contains_key("stackwright-nodepool-demo-pool1"));
        assert!(state.stacks.contains_key("stackwright-nodepool-demo-pool2"));
        assert!(state.stacks.contains_key("stackwright-global-roles"));
        assert!(state.key_pairs.contains_key("stackwright-ssh-demo"));
    });

    // Every pool came back with a resolved image and volume.
    assert_eq!(output.node_pools.len(), 3);
    for p in &output.node_pools {
        assert_eq!(p.image.as_deref(), Some(GENERAL_IMAGE));
        assert_eq!(p.volume_size_gb, Some(50));
    }

    // The record went creating -> running and carries the network.
    assert_eq!(
        h.clusters.status_history(req.cluster_id),
        vec![ClusterStatus::Creating, ClusterStatus::Running]
    );
    let record = h.clusters.get(req.cluster_id).unwrap();
    assert_eq!(record.network.vpc_id.as_deref(), Some("vpc-00000001"));
    assert_eq!(
        record.network.external_address.as_deref(),
        Some("198.51.100.1")
    );
    assert_eq!(record.node_pools.len(), 3);
    assert!(h.secrets.by_name("cluster-ca-demo").is_some());
}

#[tokio::test(start_paused = true)]
async fn test_multi_master_cluster_fronted_by_load_balancer() {
    let h = harness();
    let req = request(vec![master_pool(3)]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-2", &req)
        .unwrap();
    exec.signal(names::signals::NODE_READY, json!({}));
    let output: CreateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(
        output.external_address,
        "stackwright-api-demo.elb.example.com"
    );
    h.cloud.with_state(|state| {
        assert!(state.addresses.is_empty());
        assert_eq!(state.balancers.len(), 1);
    });
    // The master is the only pool, so it must accept workloads.
    assert!(
        h.kubernetes
            .calls()
            .contains(&format!("allow-workloads:{}", req.cluster_id))
    );
}

#[tokio::test(start_paused = true)]
async fn test_master_bootstrap_failure_fails_creation() {
    let h = harness();
    let req = request(vec![master_pool(1), pool("pool1", NodePoolRole::Worker, 1)]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-3", &req)
        .unwrap();
    exec.signal(
        names::signals::NODE_BOOTSTRAP_FAILED,
        json!({"message": "cloud-init: kubeadm join timed out"}),
    );
    let err = exec.result().await.unwrap_err();

    assert_eq!(err.code(), Some(reason::NODE_BOOTSTRAP_FAILED));
    assert!(err.to_string().contains("kubeadm join timed out"));
    // No worker pool stack was started after the failed handshake.
    h.cloud.with_state(|state| {
        assert!(!state.stacks.contains_key("stackwright-nodepool-demo-pool1"));
    });
    assert_eq!(
        h.clusters.get(req.cluster_id).unwrap().status,
        ClusterStatus::Error
    );
}

#[tokio::test(start_paused = true)]
async fn test_master_ready_timeout_fails_creation() {
    let h = harness();
    let req = request(vec![master_pool(1)]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-4", &req)
        .unwrap();
    // No signal is ever delivered; the paused clock runs out the window.
    let err = exec.result().await.unwrap_err();

    assert_eq!(err.code(), Some(reason::MASTER_READY_TIMEOUT));
    assert_eq!(
        h.clusters.get(req.cluster_id).unwrap().status,
        ClusterStatus::Error
    );
}

#[tokio::test(start_paused = true)]
async fn test_buffered_failure_signal_wins_over_ready() {
    let h = harness();
    let req = request(vec![master_pool(1)]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-5", &req)
        .unwrap();
    // Both signals are buffered before the workflow reaches the handshake;
    // the failure must take precedence regardless of delivery order.
    exec.signal(names::signals::NODE_READY, json!({}));
    exec.signal(
        names::signals::NODE_BOOTSTRAP_FAILED,
        json!({"message": "etcd never came up"}),
    );
    let err = exec.result().await.unwrap_err();

    assert_eq!(err.code(), Some(reason::NODE_BOOTSTRAP_FAILED));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_ready_signals_are_harmless() {
    let h = harness();
    let req = request(vec![master_pool(1)]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-6", &req)
        .unwrap();
    exec.signal(names::signals::NODE_READY, json!({}));
    exec.signal(names::signals::NODE_READY, json!({}));
    let output: CreateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(output.external_address, "198.51.100.1");
}

#[tokio::test(start_paused = true)]
async fn test_spot_request_failure_fails_fast() {
    let h = harness();
    let mut spot = pool("pool1", NodePoolRole::Worker, 2);
    spot.spot_price = Some(0.42);
    let req = request(vec![master_pool(1), spot]);
    h.seed_cluster(&req);

    h.cloud.with_state(|state| {
        state.spot_requests.insert(
            "stackwright-nodepool-demo-pool1".to_string(),
            vec![stackwright_cloud::SpotRequest {
                id: "sir-1".to_string(),
                state: "closed".to_string(),
                status_code: "capacity-not-available".to_string(),
                status_message: Some("no spot capacity in eu-west-1a".to_string()),
            }],
        );
    });

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-7", &req)
        .unwrap();
    exec.signal(names::signals::NODE_READY, json!({}));
    let err = exec.result().await.unwrap_err();

    assert_eq!(err.code(), Some(reason::SPOT_REQUEST_FAILED));
    assert!(err.to_string().contains("no spot capacity"));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_request_rejected_before_any_cloud_call() {
    let h = harness();
    // Two master pools can never be valid.
    let mut second = master_pool(1);
    second.name = "master2".to_string();
    let req = request(vec![master_pool(1), second]);
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-8", &req)
        .unwrap();
    let err = exec.result().await.unwrap_err();

    assert_eq!(err.code(), Some(reason::INVALID_PARAMETER));
    assert!(
        !h.cloud.calls().iter().any(|c| c.starts_with("create-stack")),
        "no stack may be created for an invalid request"
    );
}

#[tokio::test(start_paused = true)]
async fn test_create_tolerates_resources_from_an_earlier_run() {
    let h = harness();
    let req = request(vec![master_pool(1), pool("pool1", NodePoolRole::Worker, 1)]);
    h.seed_cluster(&req);

    // An interrupted earlier run already created the network stack and
    // imported the key; the provider answers AlreadyExists for both.
    h.cloud
        .seed_stack("stackwright-network-demo", &[("VpcId", "vpc-00000001")]);
    h.cloud.with_state(|state| {
        state.key_pairs.insert(
            "stackwright-ssh-demo".to_string(),
            stackwright_cloud::KeyPair {
                name: "stackwright-ssh-demo".to_string(),
                fingerprint: "aa:bb:cc:dd".to_string(),
            },
        );
    });

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-9", &req)
        .unwrap();
    exec.signal(names::signals::NODE_READY, json!({}));
    let output: CreateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(output.vpc_id, "vpc-00000001");
    h.cloud.with_state(|state| {
        assert_eq!(state.key_pairs.len(), 1);
    });
}

#[tokio::test(start_paused = true)]
async fn test_oidc_client_registered_when_enabled() {
    let h = harness();
    let mut req = request(vec![master_pool(1)]);
    req.oidc_enabled = true;
    req.base_url = Some("https://demo.example.com".to_string());
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::CREATE_CLUSTER, "wf-create-10", &req)
        .unwrap();
    exec.signal(names::signals::NODE_READY, json!({}));
    exec.result().await.unwrap();

    assert!(
        h.cloud
            .calls()
            .contains(&format!("create-oidc-client:{}", req.cluster_uid))
    );
    // The issued client id lands on the record, where deletion finds it.
    assert_eq!(
        h.clusters.get(req.cluster_id).unwrap().oidc_client_id,
        Some(format!("oidc-{}", req.cluster_uid))
    );
}
