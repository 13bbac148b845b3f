// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! OIDC client registration for the cluster API server.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::classify_cloud;
use crate::names;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_cloud::CloudError;
use stackwright_runtime::{Activity, ActivityContext, ActivityError};

/// Input for the register-oidc-client activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOidcClientRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Cluster uid the client is registered for.
    pub cluster_uid: String,
    /// Dashboard base URL the redirect is built from.
    pub base_url: String,
}

/// Output of the register-oidc-client activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterOidcClientResponse {
    /// Client id the API server is configured with.
    pub client_id: String,
    /// Client secret, passed into the master bootstrap.
    pub client_secret: String,
}

/// Registers an OIDC client for the cluster. Registration is idempotent per
/// cluster uid on the provider side.
pub struct RegisterOidcClientActivity {
    deps: Dependencies,
}

impl RegisterOidcClientActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for RegisterOidcClientActivity {
    type Input = RegisterOidcClientRequest;
    type Output = RegisterOidcClientResponse;

    fn name(&self) -> &'static str {
        names::activities::REGISTER_OIDC_CLIENT
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<RegisterOidcClientResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let redirect_url = format!("{}/oidc/callback", input.base_url.trim_end_matches('/'));
        let client = session
            .oidc
            .create_client(&input.cluster_uid, &redirect_url)
            .await
            .map_err(classify_cloud)?;
        Ok(RegisterOidcClientResponse {
            client_id: client.client_id,
            client_secret: client.client_secret,
        })
    }
}

/// Input for the remove-oidc-client activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoveOidcClientRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Client id to remove.
    pub client_id: String,
}

/// Removes the cluster's OIDC client. An absent client is success.
pub struct RemoveOidcClientActivity {
    deps: Dependencies,
}

impl RemoveOidcClientActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for RemoveOidcClientActivity {
    type Input = RemoveOidcClientRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::REMOVE_OIDC_CLIENT
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        match session.oidc.delete_client(&input.client_id).await {
            Ok(()) | Err(CloudError::NotFound { .. }) => Ok(()),
            Err(err) => Err(classify_cloud(err)),
        }
    }
}
