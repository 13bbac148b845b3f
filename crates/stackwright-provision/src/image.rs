// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Machine image and volume-size selection.
//!
//! Pools without an explicit image consult a chain of selectors in order:
//! the primary per-region table (which declines GPU instance types), then
//! the GPU table filtered by instance-type prefix. No match is a final
//! "not found" condition, never a guess.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Instance-type prefixes that carry GPUs and need a GPU-enabled image.
const GPU_INSTANCE_PREFIXES: &[&str] = &["p2.", "p3.", "p4d.", "g3.", "g4dn.", "g5."];

/// The tuple an image is selected for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageCriteria {
    /// Cloud region.
    pub region: String,
    /// Provider instance type.
    pub instance_type: String,
    /// Kubernetes minor version, e.g. `1.31`.
    pub kubernetes_version: String,
    /// Operating system identifier, e.g. `ubuntu-22.04`.
    pub os: String,
    /// Container runtime identifier, e.g. `containerd`.
    pub container_runtime: String,
}

impl ImageCriteria {
    fn is_gpu_instance(&self) -> bool {
        GPU_INSTANCE_PREFIXES
            .iter()
            .any(|p| self.instance_type.starts_with(p))
    }

    fn table_key(&self) -> (String, String) {
        (self.region.clone(), self.kubernetes_version.clone())
    }
}

/// One link in the selection chain.
pub trait ImageSelector: Send + Sync {
    /// The image for the criteria, or `None` to pass to the next selector.
    fn select(&self, criteria: &ImageCriteria) -> Option<String>;
}

/// Primary per-region table for general-purpose instance families.
#[derive(Debug, Clone, Default)]
pub struct RegionImageTable {
    images: BTreeMap<(String, String), String>,
}

impl RegionImageTable {
    /// Build an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an image for (region, kubernetes minor version).
    pub fn insert(mut self, region: &str, kubernetes_version: &str, image: &str) -> Self {
        self.images.insert(
            (region.to_string(), kubernetes_version.to_string()),
            image.to_string(),
        );
        self
    }
}

impl ImageSelector for RegionImageTable {
    fn select(&self, criteria: &ImageCriteria) -> Option<String> {
        if criteria.is_gpu_instance() {
            return None;
        }
        self.images.get(&criteria.table_key()).cloned()
    }
}

/// GPU table consulted only for GPU instance-type prefixes.
#[derive(Debug, Clone, Default)]
pub struct GpuImageTable {
    images: BTreeMap<(String, String), String>,
}

impl GpuImageTable {
    /// Build an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a GPU image for (region, kubernetes minor version).
    pub fn insert(mut self, region: &str, kubernetes_version: &str, image: &str) -> Self {
        self.images.insert(
            (region.to_string(), kubernetes_version.to_string()),
            image.to_string(),
        );
        self
    }
}

impl ImageSelector for GpuImageTable {
    fn select(&self, criteria: &ImageCriteria) -> Option<String> {
        if !criteria.is_gpu_instance() {
            return None;
        }
        self.images.get(&criteria.table_key()).cloned()
    }
}

/// Ordered chain of selectors; the first hit wins.
pub struct ImageSelectorChain {
    selectors: Vec<Box<dyn ImageSelector>>,
}

impl ImageSelectorChain {
    /// Compose a chain in consultation order.
    pub fn new(selectors: Vec<Box<dyn ImageSelector>>) -> Self {
        Self { selectors }
    }

    /// Resolve an image, or a descriptive [`SelectionError::ImageNotFound`].
    pub fn select(&self, criteria: &ImageCriteria) -> Result<String, SelectionError> {
        self.selectors
            .iter()
            .find_map(|s| s.select(criteria))
            .ok_or_else(|| SelectionError::ImageNotFound {
                criteria: criteria.clone(),
            })
    }
}

/// Pick the effective volume size for a pool.
///
/// Priority: the explicitly requested size, then the configured default,
/// then the larger of the hard fallback and the image's own size. A result
/// smaller than the image's block device is an error, never a silent resize.
pub fn effective_volume_size(
    requested_gb: Option<u32>,
    configured_default_gb: Option<u32>,
    fallback_gb: u32,
    image_size_gb: u32,
) -> Result<u32, SelectionError> {
    let effective = requested_gb
        .or(configured_default_gb)
        .unwrap_or_else(|| fallback_gb.max(image_size_gb));
    if effective < image_size_gb {
        return Err(SelectionError::VolumeTooSmall {
            requested_gb: effective,
            image_size_gb,
        });
    }
    Ok(effective)
}

/// Selection failures. Both are final: retrying cannot change the outcome.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    /// No selector produced an image for the criteria.
    #[error(
        "no image found for region '{}', instance type '{}', kubernetes {}, os '{}', runtime '{}'",
        criteria.region, criteria.instance_type, criteria.kubernetes_version, criteria.os,
        criteria.container_runtime
    )]
    ImageNotFound {
        /// The criteria that missed.
        criteria: ImageCriteria,
    },
    /// The effective volume would be smaller than the image needs.
    #[error("volume size {requested_gb}GB is smaller than the image's {image_size_gb}GB")]
    VolumeTooSmall {
        /// The size that would have been submitted.
        requested_gb: u32,
        /// The image's block device size.
        image_size_gb: u32,
    },
}
