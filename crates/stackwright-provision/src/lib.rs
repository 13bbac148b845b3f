// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster provisioning workflows and activities.
//!
//! This crate composes idempotent cloud activities into durable workflows:
//! [`workflows::create::CreateClusterWorkflow`] builds a cluster from CA
//! material to running worker pools, [`workflows::update::UpdateClusterWorkflow`]
//! reconciles node pool sets, and [`workflows::delete::DeleteClusterWorkflow`]
//! tears everything down in dependency order. Every cloud interaction lives
//! in an activity (`activities`); workflow bodies only sequence activity
//! calls, fan-outs, timers, and signal waits, keeping them safe to replay.
//!
//! [`register_all`] wires the full set into a runtime builder; callers
//! supply a [`activities::Dependencies`] bundle with their cloud factory,
//! stores, and template catalog.

pub mod activities;
pub mod cidr;
pub mod config;
pub mod errors;
pub mod image;
pub mod names;
pub mod tags;
pub mod workflows;

use activities::Dependencies;
use stackwright_runtime::LocalRuntimeBuilder;

/// Register every provisioning activity and workflow on a runtime builder.
pub fn register_all(builder: LocalRuntimeBuilder, deps: Dependencies) -> LocalRuntimeBuilder {
    let config = deps.config.clone();
    builder
        // Stack orchestration.
        .activity(activities::stack::CreateStackActivity::new(deps.clone()))
        .activity(activities::stack::UpdateStackActivity::new(deps.clone()))
        .activity(activities::stack::DeleteStackActivity::new(deps.clone()))
        .activity(activities::stack::WaitStackActivity::new(deps.clone()))
        .activity(activities::stack::DescribeStackActivity::new(deps.clone()))
        .activity(activities::stack::EnsureIamRolesActivity::new(deps.clone()))
        // Scaling groups.
        .activity(activities::asg::WaitGroupHealthyActivity::new(deps.clone()))
        .activity(activities::asg::UpdateGroupActivity::new(deps.clone()))
        // Network.
        .activity(activities::network::GetDefaultSecurityGroupActivity::new(deps.clone()))
        .activity(activities::network::AllocateClusterAddressActivity::new(deps.clone()))
        .activity(activities::network::ReleaseClusterAddressActivity::new(deps.clone()))
        .activity(activities::network::CreateMasterLoadBalancerActivity::new(deps.clone()))
        .activity(activities::network::ListOwnedLoadBalancersActivity::new(deps.clone()))
        .activity(activities::network::WaitLoadBalancersGoneActivity::new(deps.clone()))
        .activity(activities::network::ReleaseOrphanedInterfacesActivity::new(deps.clone()))
        // Key pairs and images.
        .activity(activities::keypair::ImportSshKeyActivity::new(deps.clone()))
        .activity(activities::keypair::DeleteSshKeyActivity::new(deps.clone()))
        .activity(activities::image::SelectPoolImageActivity::new(deps.clone()))
        // Cluster bookkeeping.
        .activity(activities::cluster::SetClusterStatusActivity::new(deps.clone()))
        .activity(activities::cluster::GetClusterActivity::new(deps.clone()))
        .activity(activities::cluster::GetNodePoolsActivity::new(deps.clone()))
        .activity(activities::cluster::PersistNetworkActivity::new(deps.clone()))
        .activity(activities::cluster::PersistNodePoolsActivity::new(deps.clone()))
        .activity(activities::cluster::PersistOidcClientActivity::new(deps.clone()))
        .activity(activities::cluster::GenerateClusterCaActivity::new(deps.clone()))
        .activity(activities::cluster::DeleteClusterSecretsActivity::new(deps.clone()))
        .activity(activities::cluster::DeleteAccessKeysActivity::new(deps.clone()))
        // OIDC.
        .activity(activities::oidc::RegisterOidcClientActivity::new(deps.clone()))
        .activity(activities::oidc::RemoveOidcClientActivity::new(deps.clone()))
        // In-cluster and DNS.
        .activity(activities::external::DeleteKubernetesResourcesActivity::new(deps.clone()))
        .activity(activities::external::AllowWorkloadsOnMasterActivity::new(deps.clone()))
        .activity(activities::external::DeleteDnsRecordsActivity::new(deps))
        // Workflows.
        .workflow(workflows::create::CreateClusterWorkflow::new(config.clone()))
        .workflow(workflows::update::UpdateClusterWorkflow::new(config.clone()))
        .workflow(workflows::delete::DeleteClusterWorkflow::new())
        .workflow(workflows::infra_delete::DeleteInfrastructureWorkflow::new(config))
}
