// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Authenticated API session bundle and the factory that produces it.

use crate::api::{
    IamApi, ImageApi, KeyPairApi, LoadBalancerApi, NetworkApi, OidcApi, ScalingApi, StackApi,
};
use crate::error::CloudError;
use async_trait::async_trait;
use std::sync::Arc;

/// All API seams for one (organization, credential, region) triple.
///
/// Cheap to clone; every activity that talks to the cloud obtains one of
/// these from the factory at the start of the attempt.
#[derive(Clone)]
pub struct CloudSession {
    /// Region the session is bound to.
    pub region: String,
    /// Declarative stacks.
    pub stacks: Arc<dyn StackApi>,
    /// Scaling groups.
    pub scaling: Arc<dyn ScalingApi>,
    /// Addresses and network interfaces.
    pub network: Arc<dyn NetworkApi>,
    /// Load balancers.
    pub load_balancers: Arc<dyn LoadBalancerApi>,
    /// Key pairs.
    pub key_pairs: Arc<dyn KeyPairApi>,
    /// Machine images.
    pub images: Arc<dyn ImageApi>,
    /// IAM access keys.
    pub iam: Arc<dyn IamApi>,
    /// OIDC client registration.
    pub oidc: Arc<dyn OidcApi>,
}

/// Turns an organization's stored credential into an authenticated session.
///
/// Implementations resolve the secret through the secret store and construct
/// SDK clients; the in-memory test factory hands out fakes.
#[async_trait]
pub trait CloudClientFactory: Send + Sync {
    /// Resolve a session for the given organization, secret, and region.
    async fn session(
        &self,
        organization_id: u64,
        secret_id: &str,
        region: &str,
    ) -> Result<CloudSession, CloudError>;
}
