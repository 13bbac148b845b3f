// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SSH key pair activities.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::classify_cloud;
use crate::names;
use crate::tags;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_cloud::CloudError;
use stackwright_runtime::{Activity, ActivityContext, ActivityError};

/// Input for the import-ssh-key activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSshKeyRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid, recorded in the ownership tag.
    pub cluster_uid: String,
    /// Cluster name the key name is derived from.
    pub cluster_name: String,
    /// Secret holding the public key material.
    pub ssh_secret_id: String,
}

/// Output of the import-ssh-key activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSshKeyResponse {
    /// Name the key pair is registered under, passed to the node stacks.
    pub key_name: String,
}

/// Registers the cluster's SSH public key with the provider.
///
/// A key pair already registered under the cluster's name is kept as-is, so
/// a retried workflow does not fail on its own earlier import.
pub struct ImportSshKeyActivity {
    deps: Dependencies,
}

impl ImportSshKeyActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for ImportSshKeyActivity {
    type Input = ImportSshKeyRequest;
    type Output = ImportSshKeyResponse;

    fn name(&self) -> &'static str {
        names::activities::IMPORT_SSH_KEY
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<ImportSshKeyResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let key_name = names::ssh_key_name(&input.cluster_name);

        if session
            .key_pairs
            .describe_key_pair(&key_name)
            .await
            .map_err(classify_cloud)?
            .is_some()
        {
            tracing::debug!(key = %key_name, "key pair already registered");
            return Ok(ImportSshKeyResponse { key_name });
        }

        let secret = self
            .deps
            .secrets
            .get(input.session.organization_id, &input.ssh_secret_id)
            .await
            .map_err(crate::errors::classify_secret)?;
        let public_key = secret.values.get("public_key").ok_or_else(|| {
            ActivityError::fatal(
                crate::errors::reason::INVALID_PARAMETER,
                format!("secret {} carries no public_key field", input.ssh_secret_id),
            )
        })?;

        session
            .key_pairs
            .import_key_pair(
                &key_name,
                public_key,
                vec![tags::ownership_tag(&input.cluster_uid)],
            )
            .await
            .map_err(classify_cloud)?;
        tracing::info!(key = %key_name, "ssh key pair imported");
        Ok(ImportSshKeyResponse { key_name })
    }
}

/// Input for the delete-ssh-key activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSshKeyRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster name the key name is derived from.
    pub cluster_name: String,
}

/// Deletes the cluster's SSH key pair. An absent key is success.
pub struct DeleteSshKeyActivity {
    deps: Dependencies,
}

impl DeleteSshKeyActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DeleteSshKeyActivity {
    type Input = DeleteSshKeyRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::DELETE_SSH_KEY
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let key_name = names::ssh_key_name(&input.cluster_name);
        match session.key_pairs.delete_key_pair(&key_name).await {
            Ok(()) | Err(CloudError::NotFound { .. }) => Ok(()),
            Err(err) => Err(classify_cloud(err)),
        }
    }
}
