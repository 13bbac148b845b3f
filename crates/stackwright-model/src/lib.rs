// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Domain model for stackwright.
//!
//! This crate holds the types shared between the provisioning workflows, the
//! cloud layer, and the external collaborators: the immutable
//! [`ProvisioningRequest`] a workflow is started with, node pool
//! specifications, persisted cluster records, node-pool diffing, the closed
//! set of cloud [`Provider`] variants, and the accessor seams
//! ([`ClusterAccessor`], [`SecretStore`]) through which state leaves the
//! orchestration layer.
//!
//! Nothing in this crate performs I/O; the traits are implemented elsewhere
//! (production adapters or in-memory test fakes).

mod accessor;
mod cluster;
mod diff;
mod nodepool;
mod provider;
mod request;
mod secrets;

pub use accessor::{AccessorError, ClusterAccessor};
pub use cluster::{Cluster, ClusterNetwork, ClusterStatus};
pub use diff::{NodePoolDiff, diff_node_pools};
pub use nodepool::{NodePoolRole, NodePoolSpec};
pub use provider::{CloudCapable, Provider, UnsupportedProvider};
pub use request::{ProvisioningRequest, RequestValidationError};
pub use secrets::{Secret, SecretError, SecretRequest, SecretStore};
