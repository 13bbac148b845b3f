// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Pool image and volume resolution activity.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::{classify_cloud, reason};
use crate::image::{ImageCriteria, SelectionError, effective_volume_size};
use crate::names;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_model::NodePoolSpec;
use stackwright_runtime::{Activity, ActivityContext, ActivityError};

/// Input for the select-pool-image activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPoolImageRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// The pool to resolve an image and volume size for.
    pub pool: NodePoolSpec,
    /// Kubernetes minor version the image must carry.
    pub kubernetes_version: String,
    /// Operating system identifier.
    pub os: String,
    /// Container runtime identifier.
    pub container_runtime: String,
}

/// Output of the select-pool-image activity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectPoolImageResponse {
    /// The pool with `image` and `volume_size_gb` filled in.
    pub pool: NodePoolSpec,
}

/// Resolves a pool's machine image and effective volume size.
///
/// An explicitly requested image bypasses the selection chain but is still
/// verified to exist in the region, and the volume floor check still runs
/// against its block device size.
pub struct SelectPoolImageActivity {
    deps: Dependencies,
}

impl SelectPoolImageActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

impl SelectPoolImageActivity {
    fn selection_error(err: SelectionError) -> ActivityError {
        let code = match err {
            SelectionError::ImageNotFound { .. } => reason::IMAGE_NOT_FOUND,
            SelectionError::VolumeTooSmall { .. } => reason::VOLUME_TOO_SMALL,
        };
        ActivityError::fatal(code, err.to_string())
    }
}

#[async_trait]
impl Activity for SelectPoolImageActivity {
    type Input = SelectPoolImageRequest;
    type Output = SelectPoolImageResponse;

    fn name(&self) -> &'static str {
        names::activities::SELECT_POOL_IMAGE
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<SelectPoolImageResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let mut pool = input.pool;

        let image_id = match pool.image.clone() {
            Some(explicit) => explicit,
            None => {
                let criteria = ImageCriteria {
                    region: input.session.region.clone(),
                    instance_type: pool.instance_type.clone(),
                    kubernetes_version: input.kubernetes_version.clone(),
                    os: input.os.clone(),
                    container_runtime: input.container_runtime.clone(),
                };
                self.deps
                    .images
                    .select(&criteria)
                    .map_err(Self::selection_error)?
            }
        };

        let image = session
            .images
            .describe_image(&image_id)
            .await
            .map_err(classify_cloud)?
            .ok_or_else(|| {
                ActivityError::fatal(
                    reason::IMAGE_NOT_FOUND,
                    format!(
                        "image '{}' does not exist in region '{}'",
                        image_id, input.session.region
                    ),
                )
            })?;

        let volume_size = effective_volume_size(
            pool.volume_size_gb,
            self.deps.config.default_volume_size_gb,
            self.deps.config.fallback_volume_size_gb,
            image.block_device_size_gb,
        )
        .map_err(Self::selection_error)?;

        tracing::debug!(
            pool = %pool.name,
            image = %image_id,
            volume_gb = volume_size,
            "pool image resolved"
        );
        pool.image = Some(image_id);
        pool.volume_size_gb = Some(volume_size);
        Ok(SelectPoolImageResponse { pool })
    }
}
