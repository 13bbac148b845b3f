// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cluster record bookkeeping, certificate material, and the secret cleanup
//! that ends a deletion.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::{classify_accessor, classify_cloud, classify_secret};
use crate::names;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_model::{Cluster, ClusterNetwork, ClusterStatus, NodePoolSpec, SecretError};
use stackwright_runtime::{Activity, ActivityContext, ActivityError};
use std::collections::BTreeMap;

/// Generates certificate authority material for a new cluster.
///
/// The production implementation talks to the certificate service; tests
/// hand out static material.
#[async_trait]
pub trait CaProvider: Send + Sync {
    /// PEM bundles keyed by purpose (`ca`, `etcd`, `front-proxy`, `sa`).
    async fn generate(&self, cluster_uid: &str) -> Result<BTreeMap<String, String>, SecretError>;
}

/// Input for the set-cluster-status activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetClusterStatusRequest {
    /// Cluster record id.
    pub cluster_id: u64,
    /// The status to record.
    pub status: ClusterStatus,
    /// Human-readable detail stored alongside.
    pub message: String,
}

/// Records a coarse status transition on the cluster record.
pub struct SetClusterStatusActivity {
    deps: Dependencies,
}

impl SetClusterStatusActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for SetClusterStatusActivity {
    type Input = SetClusterStatusRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::SET_CLUSTER_STATUS
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        tracing::info!(
            cluster_id = input.cluster_id,
            status = input.status.as_str(),
            message = %input.message,
            "cluster status transition"
        );
        self.deps
            .clusters
            .update_status(input.cluster_id, input.status, &input.message)
            .await
            .map_err(classify_accessor)
    }
}

/// Input for the get-cluster activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetClusterRequest {
    /// Cluster record id.
    pub cluster_id: u64,
}

/// Reads the cluster record.
pub struct GetClusterActivity {
    deps: Dependencies,
}

impl GetClusterActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for GetClusterActivity {
    type Input = GetClusterRequest;
    type Output = Cluster;

    fn name(&self) -> &'static str {
        names::activities::GET_CLUSTER
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<Cluster, ActivityError> {
        self.deps
            .clusters
            .get_cluster(input.cluster_id)
            .await
            .map_err(classify_accessor)
    }
}

/// Input for the get-node-pools activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetNodePoolsRequest {
    /// Cluster record id.
    pub cluster_id: u64,
}

/// Output of the get-node-pools activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetNodePoolsResponse {
    /// The persisted pool set, the "old" side of an update diff.
    pub pools: Vec<NodePoolSpec>,
}

/// Reads the persisted node pool set.
pub struct GetNodePoolsActivity {
    deps: Dependencies,
}

impl GetNodePoolsActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for GetNodePoolsActivity {
    type Input = GetNodePoolsRequest;
    type Output = GetNodePoolsResponse;

    fn name(&self) -> &'static str {
        names::activities::GET_NODE_POOLS
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<GetNodePoolsResponse, ActivityError> {
        let pools = self
            .deps
            .clusters
            .get_node_pools(input.cluster_id)
            .await
            .map_err(classify_accessor)?;
        Ok(GetNodePoolsResponse { pools })
    }
}

/// Input for the persist-network activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistNetworkRequest {
    /// Cluster record id.
    pub cluster_id: u64,
    /// Network identifiers to write back.
    pub network: ClusterNetwork,
}

/// Writes the cluster's network identifiers back to its record, so a later
/// deletion can find them even if the workflow that created them is gone.
pub struct PersistNetworkActivity {
    deps: Dependencies,
}

impl PersistNetworkActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for PersistNetworkActivity {
    type Input = PersistNetworkRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::PERSIST_NETWORK
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let mut cluster = self
            .deps
            .clusters
            .get_cluster(input.cluster_id)
            .await
            .map_err(classify_accessor)?;
        cluster.network = input.network;
        self.deps
            .clusters
            .persist(&cluster)
            .await
            .map_err(classify_accessor)
    }
}

/// Input for the persist-node-pools activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistNodePoolsRequest {
    /// Cluster record id.
    pub cluster_id: u64,
    /// The pool set to write back, replacing the stored one.
    pub pools: Vec<NodePoolSpec>,
}

/// Replaces the persisted node pool set with the one just provisioned.
pub struct PersistNodePoolsActivity {
    deps: Dependencies,
}

impl PersistNodePoolsActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for PersistNodePoolsActivity {
    type Input = PersistNodePoolsRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::PERSIST_NODE_POOLS
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let mut cluster = self
            .deps
            .clusters
            .get_cluster(input.cluster_id)
            .await
            .map_err(classify_accessor)?;
        cluster.node_pools = input.pools;
        self.deps
            .clusters
            .persist(&cluster)
            .await
            .map_err(classify_accessor)
    }
}

/// Input for the persist-oidc-client activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistOidcClientRequest {
    /// Cluster record id.
    pub cluster_id: u64,
    /// Registered client id to write back.
    pub client_id: String,
}

/// Writes the registered OIDC client id back to the cluster record, so
/// deletion knows which registration to remove.
pub struct PersistOidcClientActivity {
    deps: Dependencies,
}

impl PersistOidcClientActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for PersistOidcClientActivity {
    type Input = PersistOidcClientRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::PERSIST_OIDC_CLIENT
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let mut cluster = self
            .deps
            .clusters
            .get_cluster(input.cluster_id)
            .await
            .map_err(classify_accessor)?;
        cluster.oidc_client_id = Some(input.client_id);
        self.deps
            .clusters
            .persist(&cluster)
            .await
            .map_err(classify_accessor)
    }
}

/// Input for the generate-cluster-ca activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateClusterCaRequest {
    /// Owning organization.
    pub organization_id: u64,
    /// Cluster uid the material is issued for and tagged with.
    pub cluster_uid: String,
    /// Cluster name used for the secret name.
    pub cluster_name: String,
}

/// Output of the generate-cluster-ca activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateClusterCaResponse {
    /// Id of the stored certificate secret, passed to the master bootstrap.
    pub secret_id: String,
}

/// Generates and stores the cluster's certificate authority material.
///
/// A secret already stored under the cluster's certificate name is reused,
/// so a replayed creation never rotates the CA under a live master.
pub struct GenerateClusterCaActivity {
    deps: Dependencies,
}

impl GenerateClusterCaActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }

    fn secret_name(cluster_name: &str) -> String {
        format!("cluster-ca-{cluster_name}")
    }
}

#[async_trait]
impl Activity for GenerateClusterCaActivity {
    type Input = GenerateClusterCaRequest;
    type Output = GenerateClusterCaResponse;

    fn name(&self) -> &'static str {
        names::activities::GENERATE_CLUSTER_CA
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<GenerateClusterCaResponse, ActivityError> {
        let secret_name = Self::secret_name(&input.cluster_name);
        match self
            .deps
            .secrets
            .get_by_name(input.organization_id, &secret_name)
            .await
        {
            Ok(existing) => {
                tracing::debug!(secret = %secret_name, "reusing stored CA material");
                return Ok(GenerateClusterCaResponse {
                    secret_id: existing.id,
                });
            }
            Err(SecretError::NotFound { .. }) => {}
            Err(err) => return Err(classify_secret(err)),
        }

        let values = self
            .deps
            .ca
            .generate(&input.cluster_uid)
            .await
            .map_err(classify_secret)?;
        let secret_id = self
            .deps
            .secrets
            .store(
                input.organization_id,
                stackwright_model::SecretRequest {
                    name: secret_name,
                    kind: "pkecert".into(),
                    values,
                    tags: vec![input.cluster_uid.clone()],
                },
            )
            .await
            .map_err(classify_secret)?;
        Ok(GenerateClusterCaResponse { secret_id })
    }
}

/// Input for the delete-cluster-secrets activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteClusterSecretsRequest {
    /// Owning organization.
    pub organization_id: u64,
    /// Cluster name the certificate secret name is derived from.
    pub cluster_name: String,
}

/// Deletes the cluster-scoped secrets (certificate material). An absent
/// secret is success; a fresh creation can fail before storing one.
pub struct DeleteClusterSecretsActivity {
    deps: Dependencies,
}

impl DeleteClusterSecretsActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DeleteClusterSecretsActivity {
    type Input = DeleteClusterSecretsRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::DELETE_CLUSTER_SECRETS
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let secret_name = GenerateClusterCaActivity::secret_name(&input.cluster_name);
        let secret = match self
            .deps
            .secrets
            .get_by_name(input.organization_id, &secret_name)
            .await
        {
            Ok(secret) => secret,
            Err(SecretError::NotFound { .. }) => return Ok(()),
            Err(err) => return Err(classify_secret(err)),
        };
        match self
            .deps
            .secrets
            .delete(input.organization_id, &secret.id)
            .await
        {
            Ok(()) | Err(SecretError::NotFound { .. }) => Ok(()),
            Err(err) => Err(classify_secret(err)),
        }
    }
}

/// Input for the delete-access-keys activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccessKeysRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster name the cluster user name is derived from.
    pub cluster_name: String,
}

/// Output of the delete-access-keys activity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteAccessKeysResponse {
    /// How many keys were deleted.
    pub deleted: u32,
}

/// Deletes the cluster user's access keys. The user itself belongs to the
/// IAM stack; keys are created out-of-band and block the stack's deletion
/// of the user if left behind.
pub struct DeleteAccessKeysActivity {
    deps: Dependencies,
}

impl DeleteAccessKeysActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DeleteAccessKeysActivity {
    type Input = DeleteAccessKeysRequest;
    type Output = DeleteAccessKeysResponse;

    fn name(&self) -> &'static str {
        names::activities::DELETE_ACCESS_KEYS
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<DeleteAccessKeysResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let user_name = names::cluster_user_name(&input.cluster_name);

        let key_ids = match session.iam.list_access_keys(&user_name).await {
            Ok(ids) => ids,
            // No user means no keys to clean up.
            Err(stackwright_cloud::CloudError::NotFound { .. }) => Vec::new(),
            Err(err) => return Err(classify_cloud(err)),
        };

        let mut deleted = 0;
        for key_id in &key_ids {
            match session.iam.delete_access_key(&user_name, key_id).await {
                Ok(()) => deleted += 1,
                Err(stackwright_cloud::CloudError::NotFound { .. }) => {}
                Err(err) => return Err(classify_cloud(err)),
            }
        }
        Ok(DeleteAccessKeysResponse { deleted })
    }
}
