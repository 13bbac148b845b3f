// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Secret store seam.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A secret as resolved from the store. Values are opaque to this layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Secret {
    /// Store-assigned id.
    pub id: String,
    /// Name unique within the organization.
    pub name: String,
    /// Secret kind, e.g. `amazon`, `ssh`, `pkecert`.
    pub kind: String,
    /// Key/value payload.
    pub values: BTreeMap<String, String>,
}

/// Request to create or update a secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretRequest {
    /// Name unique within the organization.
    pub name: String,
    /// Secret kind.
    pub kind: String,
    /// Key/value payload.
    pub values: BTreeMap<String, String>,
    /// Free-form tags, e.g. the owning cluster uid.
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Organization-scoped secret storage.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Resolve a secret by id.
    async fn get(&self, organization_id: u64, secret_id: &str) -> Result<Secret, SecretError>;

    /// Resolve a secret by name.
    async fn get_by_name(&self, organization_id: u64, name: &str) -> Result<Secret, SecretError>;

    /// Store a new secret, returning its id.
    async fn store(
        &self,
        organization_id: u64,
        request: SecretRequest,
    ) -> Result<String, SecretError>;

    /// Replace the payload of an existing secret.
    async fn update(
        &self,
        organization_id: u64,
        secret_id: &str,
        request: SecretRequest,
    ) -> Result<(), SecretError>;

    /// Delete a secret. Deleting an absent secret is an error; the forced
    /// delete path downgrades it to a warning.
    async fn delete(&self, organization_id: u64, secret_id: &str) -> Result<(), SecretError>;
}

/// Failures crossing the secret store seam.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SecretError {
    /// No secret with that id or name.
    #[error("secret '{reference}' not found in organization {organization_id}")]
    NotFound {
        /// Id or name that missed.
        reference: String,
        /// Organization searched.
        organization_id: u64,
    },
    /// A secret with that name already exists.
    #[error("secret '{name}' already exists in organization {organization_id}")]
    AlreadyExists {
        /// Conflicting name.
        name: String,
        /// Organization searched.
        organization_id: u64,
    },
    /// The backing store failed.
    #[error("secret store error: {details}")]
    Storage {
        /// Error details from the store.
        details: String,
    },
}
