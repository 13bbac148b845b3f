// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Integration tests for the update-cluster workflow.
//!
//! These tests verify:
//! 1. The requested pool set is reconciled against the persisted one:
//!    pools are created, deleted, and resized per the name diff
//! 2. Autoscaled pools keep their autoscaler-owned desired capacity,
//!    clamped into the new bounds, instead of the requested count
//! 3. A stack update the provider has nothing to do for is a success
//! 4. An update against an incomplete cluster record fails cleanly
//!
//! Run with:
//! ```bash
//! cargo test -p stackwright-provision --test update_cluster_test
//! ```

mod support;

use stackwright_model::{ClusterStatus, NodePoolRole};
use stackwright_provision::activities::SessionRef;
use stackwright_provision::activities::stack::{StackKind, UpdateStackRequest, UpdateStackResponse};
use stackwright_provision::errors::reason;
use stackwright_provision::names;
use stackwright_provision::workflows::update::UpdateClusterOutput;
use support::{PROBE, ProbeInput, REGION, harness, master_pool, pool, request};

#[tokio::test(start_paused = true)]
async fn test_autoscaled_pool_resize_preserves_clamped_desired_capacity() {
    let h = harness();
    let mut old_pool = pool("pool1", NodePoolRole::Worker, 2);
    old_pool.min_count = 2;
    old_pool.max_count = 4;
    old_pool.autoscaling = true;
    let old = request(vec![master_pool(1), old_pool]);
    h.seed_running_cluster(&old, &["subnet-eu-west-1a"], "198.51.100.1");
    // The autoscaler has meanwhile grown the group to 4 instances.
    h.cloud.seed_group("stackwright-nodepool-demo-pool1", 2, 4, 4);

    let mut new_pool = pool("pool1", NodePoolRole::Worker, 2);
    new_pool.min_count = 1;
    new_pool.max_count = 5;
    new_pool.autoscaling = true;
    let req = request(vec![master_pool(1), new_pool]);

    let exec = h
        .runtime
        .start_as(names::workflows::UPDATE_CLUSTER, "wf-update-1", &req)
        .unwrap();
    let output: UpdateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(output.updated, vec!["pool1".to_string()]);
    assert!(output.created.is_empty());
    assert!(output.deleted.is_empty());
    // Desired stays at the autoscaler's 4, not the requested 2.
    h.cloud.with_state(|state| {
        let group = state.groups.get("stackwright-nodepool-demo-pool1").unwrap();
        assert_eq!(group.min_size, 1);
        assert_eq!(group.max_size, 5);
        assert_eq!(group.desired_capacity, 4);
    });
    let record = h.clusters.get(req.cluster_id).unwrap();
    let persisted = record.node_pools.iter().find(|p| p.name == "pool1").unwrap();
    assert_eq!(persisted.count, 4);
}

#[tokio::test(start_paused = true)]
async fn test_update_creates_and_deletes_pools_per_diff() {
    let h = harness();
    let old = request(vec![master_pool(1), pool("pool1", NodePoolRole::Worker, 2)]);
    h.seed_running_cluster(&old, &["subnet-eu-west-1a"], "198.51.100.1");
    h.cloud.seed_stack("stackwright-nodepool-demo-pool1", &[]);
    h.cloud.seed_group("stackwright-nodepool-demo-pool1", 1, 2, 2);

    let req = request(vec![master_pool(1), pool("pool2", NodePoolRole::Worker, 3)]);
    let exec = h
        .runtime
        .start_as(names::workflows::UPDATE_CLUSTER, "wf-update-2", &req)
        .unwrap();
    let output: UpdateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(output.created, vec!["pool2".to_string()]);
    assert_eq!(output.deleted, vec!["pool1".to_string()]);
    assert!(output.updated.is_empty());
    h.cloud.with_state(|state| {
        assert!(!state.stacks.contains_key("stackwright-nodepool-demo-pool1"));
        assert!(state.stacks.contains_key("stackwright-nodepool-demo-pool2"));
    });

    // The persisted set is the master plus the surviving workers.
    let record = h.clusters.get(req.cluster_id).unwrap();
    let mut names: Vec<&str> = record.node_pools.iter().map(|p| p.name.as_str()).collect();
    names.sort_unstable();
    assert_eq!(names, vec!["master", "pool2"]);
    assert_eq!(
        h.clusters.status_history(req.cluster_id),
        vec![ClusterStatus::Updating, ClusterStatus::Running]
    );
}

#[tokio::test(start_paused = true)]
async fn test_added_pool_lands_in_its_own_zone_subnet() {
    let h = harness();
    // A two-zone cluster: the persisted subnet list starts with the master
    // zone's subnet, so a positional guess would hand pool2 the wrong one.
    let mut spread = pool("pool1", NodePoolRole::Worker, 2);
    spread.zones = vec![format!("{REGION}a"), format!("{REGION}b")];
    let old = request(vec![master_pool(1), spread]);
    h.seed_running_cluster(
        &old,
        &["subnet-eu-west-1a", "subnet-eu-west-1b"],
        "198.51.100.1",
    );
    h.cloud.seed_group("stackwright-nodepool-demo-pool1", 1, 2, 2);

    let mut added = pool("pool2", NodePoolRole::Worker, 1);
    added.zones = vec![format!("{REGION}b")];
    let mut kept = pool("pool1", NodePoolRole::Worker, 2);
    kept.zones = vec![format!("{REGION}a"), format!("{REGION}b")];
    let req = request(vec![master_pool(1), kept, added]);

    let exec = h
        .runtime
        .start_as(names::workflows::UPDATE_CLUSTER, "wf-update-6", &req)
        .unwrap();
    let output: UpdateClusterOutput = exec.result_as().await.unwrap();

    assert_eq!(output.created, vec!["pool2".to_string()]);
    h.cloud.with_state(|state| {
        let params = state
            .stack_parameters
            .get("stackwright-nodepool-demo-pool2")
            .unwrap();
        assert_eq!(params.get("SubnetIds").unwrap(), "subnet-eu-west-1b");
        let kept_params = state
            .stack_parameters
            .get("stackwright-nodepool-demo-pool1");
        // The surviving pool is reconciled through its group, not its stack.
        assert!(kept_params.is_none());
    });
}

#[tokio::test(start_paused = true)]
async fn test_unchanged_pool_set_touches_no_stacks() {
    let h = harness();
    let req = request(vec![master_pool(1), pool("pool1", NodePoolRole::Worker, 2)]);
    h.seed_running_cluster(&req, &["subnet-eu-west-1a"], "198.51.100.1");
    h.cloud.seed_group("stackwright-nodepool-demo-pool1", 1, 2, 2);

    let exec = h
        .runtime
        .start_as(names::workflows::UPDATE_CLUSTER, "wf-update-3", &req)
        .unwrap();
    let output: UpdateClusterOutput = exec.result_as().await.unwrap();

    // A pool present on both sides is reconciled through its scaling group
    // only; no stack is created or deleted.
    assert_eq!(output.updated, vec!["pool1".to_string()]);
    assert!(output.created.is_empty());
    assert!(output.deleted.is_empty());
    let calls = h.cloud.calls();
    assert!(!calls.iter().any(|c| c.starts_with("create-stack")));
    assert!(!calls.iter().any(|c| c.starts_with("delete-stack")));
}

#[tokio::test(start_paused = true)]
async fn test_stack_update_with_nothing_to_change_is_success() {
    let h = harness();
    h.cloud.seed_stack("stackwright-network-demo", &[]);

    let session = SessionRef {
        organization_id: 1,
        secret_id: "secret-aws".to_string(),
        region: REGION.to_string(),
    };
    let update = |parameters: &[(&str, &str)]| UpdateStackRequest {
        session: session.clone(),
        stack_name: "stackwright-network-demo".to_string(),
        kind: StackKind::Network,
        parameters: parameters
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        token_base: "wf-update-4".to_string(),
    };

    let exec = h
        .runtime
        .start_as(
            PROBE,
            "wf-update-4a",
            &ProbeInput {
                activity: names::activities::UPDATE_STACK.to_string(),
                input: serde_json::to_value(update(&[("ClusterName", "demo")])).unwrap(),
            },
        )
        .unwrap();
    let first: UpdateStackResponse = exec.result_as().await.unwrap();
    assert!(first.changed);

    // Re-submitting identical parameters surfaces the provider's
    // "No updates are to be performed" error, which is success, not failure.
    let exec = h
        .runtime
        .start_as(
            PROBE,
            "wf-update-4b",
            &ProbeInput {
                activity: names::activities::UPDATE_STACK.to_string(),
                input: serde_json::to_value(update(&[("ClusterName", "demo")])).unwrap(),
            },
        )
        .unwrap();
    let second: UpdateStackResponse = exec.result_as().await.unwrap();
    assert!(!second.changed);
}

#[tokio::test(start_paused = true)]
async fn test_update_fails_when_cluster_record_is_incomplete() {
    let h = harness();
    let req = request(vec![master_pool(1), pool("pool1", NodePoolRole::Worker, 1)]);
    // Record exists but creation never persisted the network.
    h.seed_cluster(&req);

    let exec = h
        .runtime
        .start_as(names::workflows::UPDATE_CLUSTER, "wf-update-5", &req)
        .unwrap();
    let err = exec.result().await.unwrap_err();

    assert_eq!(err.code(), Some(reason::INVALID_PARAMETER));
    assert_eq!(
        h.clusters.get(req.cluster_id).unwrap().status,
        ClusterStatus::Warning
    );
}
