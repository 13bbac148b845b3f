// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud provider variants and the capability seam.
//!
//! Instead of a runtime downcast to a "cloud-capable cluster", the provider
//! set is closed: each variant either yields a [`CloudCapable`] implementation
//! or a typed [`UnsupportedProvider`] error that activities surface as a final
//! failure.

use crate::nodepool::NodePoolSpec;
use crate::request::ProvisioningRequest;
use serde::{Deserialize, Serialize};

/// The closed set of providers this layer knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon Web Services.
    Amazon,
    /// Reserved: records imported from other providers can be listed but not
    /// provisioned through this layer.
    Azure,
    /// Reserved, same as [`Provider::Azure`].
    Google,
}

impl Provider {
    /// String form used in tags and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amazon => "amazon",
            Self::Azure => "azure",
            Self::Google => "google",
        }
    }

    /// Resolve the provisioning capability for this variant.
    pub fn capability(&self) -> Result<&'static dyn CloudCapable, UnsupportedProvider> {
        match self {
            Self::Amazon => Ok(&AmazonCapability),
            other => Err(UnsupportedProvider {
                provider: other.as_str(),
            }),
        }
    }
}

/// The provider variant cannot be provisioned through this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("provider '{provider}' does not support cloud provisioning")]
pub struct UnsupportedProvider {
    /// Offending provider variant.
    pub provider: &'static str,
}

/// What a provisionable provider must supply to the workflows.
pub trait CloudCapable: Send + Sync + std::fmt::Debug {
    /// Shell command baked into node user data that joins the node to the
    /// cluster once the machine boots.
    fn bootstrap_command(
        &self,
        request: &ProvisioningRequest,
        pool: &NodePoolSpec,
        external_address: &str,
    ) -> String;

    /// Tag key marking resources as owned by a cluster; the value is the
    /// cluster uid.
    fn ownership_tag_key(&self) -> &'static str;
}

#[derive(Debug)]
struct AmazonCapability;

impl CloudCapable for AmazonCapability {
    fn bootstrap_command(
        &self,
        request: &ProvisioningRequest,
        pool: &NodePoolSpec,
        external_address: &str,
    ) -> String {
        let role = if pool.is_master() {
            "install master"
        } else {
            "install worker"
        };
        // Contract of the node bootstrap agent baked into the images; it
        // reports back through the readiness signals.
        format!(
            "stackwright-agent {role} --cluster-name {name} --api-server {addr}:6443 --nodepool {pool}",
            name = request.cluster_name,
            addr = external_address,
            pool = pool.name,
        )
    }

    fn ownership_tag_key(&self) -> &'static str {
        "stackwright.io/cluster"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodepool::NodePoolRole;

    #[test]
    fn test_amazon_is_cloud_capable() {
        assert!(Provider::Amazon.capability().is_ok());
    }

    #[test]
    fn test_bootstrap_command_carries_role_and_pool() {
        let capability = Provider::Amazon.capability().unwrap();
        let request = ProvisioningRequest {
            organization_id: 1,
            cluster_id: 7,
            cluster_uid: "c-7".into(),
            cluster_name: "demo".into(),
            provider: Provider::Amazon,
            region: "eu-west-1".into(),
            secret_id: "secret-aws".into(),
            ssh_secret_id: "secret-ssh".into(),
            node_pools: vec![],
            oidc_enabled: false,
            base_url: None,
        };
        let pool = NodePoolSpec {
            name: "pool1".into(),
            role: NodePoolRole::Worker,
            min_count: 1,
            max_count: 2,
            count: 1,
            instance_type: "m5.large".into(),
            image: None,
            volume_size_gb: None,
            spot_price: None,
            autoscaling: false,
            zones: vec!["eu-west-1a".into()],
            subnet_ids: vec![],
            labels: std::collections::BTreeMap::new(),
        };

        let cmd = capability.bootstrap_command(&request, &pool, "198.51.100.1");
        assert!(cmd.starts_with("stackwright-agent install worker "));
        assert!(cmd.contains("--cluster-name demo"));
        assert!(cmd.contains("--api-server 198.51.100.1:6443"));
        assert!(cmd.ends_with("--nodepool pool1"));
    }

    #[test]
    fn test_reserved_variants_are_unsupported() {
        for p in [Provider::Azure, Provider::Google] {
            let err = p.capability().unwrap_err();
            assert_eq!(err.provider, p.as_str());
        }
    }
}
