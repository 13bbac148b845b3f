// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud provider model and API seams.
//!
//! The provisioning activities talk to the cloud exclusively through the
//! traits in this crate: one trait per concern (declarative stacks, scaling
//! groups, addresses and network interfaces, load balancers, key pairs,
//! images, IAM access keys, OIDC clients), bundled into a [`CloudSession`]
//! produced by a [`CloudClientFactory`] from an (organization, secret,
//! region) triple. Production adapters wrap the provider SDK; the test
//! suites use in-memory fakes.

mod api;
mod error;
mod model;
mod session;

pub use api::{
    IamApi, ImageApi, KeyPairApi, LoadBalancerApi, NetworkApi, OidcApi, ScalingApi, StackApi,
};
pub use error::CloudError;
pub use model::{
    Address, CreateLoadBalancerInput, CreateStackInput, DeleteStackInput, GroupInstance, KeyPair,
    LoadBalancer, MachineImage, NetworkInterface, OidcClient, ScalingGroup, SpotRequest, Stack,
    StackEvent, StackState, Tag, UpdateStackInput,
};
pub use session::{CloudClientFactory, CloudSession};
