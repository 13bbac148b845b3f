// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The provisioning activities.
//!
//! Every activity is independently idempotent: the runtime may run it any
//! number of times for one logical step. Activities talk to the cloud
//! through a session resolved per attempt and classify every failure as
//! retryable or final (see [`crate::errors`]).

pub mod asg;
pub mod cluster;
pub mod external;
pub mod image;
pub mod keypair;
pub mod network;
pub mod oidc;
pub mod stack;

use crate::config::Config;
use crate::errors::classify_cloud;
use crate::image::ImageSelectorChain;
use serde::{Deserialize, Serialize};
use stackwright_cloud::{CloudClientFactory, CloudSession};
use stackwright_model::{ClusterAccessor, SecretStore};
use stackwright_runtime::ActivityError;
use std::sync::Arc;

/// Identifies the cloud session an activity should talk through.
///
/// Carried in every cloud-facing activity input; the session itself is
/// resolved inside the attempt so credential rotation takes effect on retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRef {
    /// Owning organization.
    pub organization_id: u64,
    /// Credential secret reference.
    pub secret_id: String,
    /// Region to bind the session to.
    pub region: String,
}

pub(crate) async fn open_session(
    factory: &Arc<dyn CloudClientFactory>,
    session: &SessionRef,
) -> Result<CloudSession, ActivityError> {
    factory
        .session(session.organization_id, &session.secret_id, &session.region)
        .await
        .map_err(classify_cloud)
}

/// Shared dependency bundle the activities are constructed from.
#[derive(Clone)]
pub struct Dependencies {
    /// Cloud session factory.
    pub factory: Arc<dyn CloudClientFactory>,
    /// Infrastructure template source.
    pub templates: Arc<dyn stack::TemplateCatalog>,
    /// Cluster record persistence.
    pub clusters: Arc<dyn ClusterAccessor>,
    /// Organization secret storage.
    pub secrets: Arc<dyn SecretStore>,
    /// Image selection chain.
    pub images: Arc<ImageSelectorChain>,
    /// CA material generator.
    pub ca: Arc<dyn cluster::CaProvider>,
    /// In-cluster Kubernetes operations.
    pub kubernetes: Arc<dyn external::KubernetesApi>,
    /// External DNS record management.
    pub dns: Arc<dyn external::DnsApi>,
    /// Poller and handshake tunables.
    pub config: Config,
}
