// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scaling group activities: health polling and size updates.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::{classify_cloud, reason};
use crate::names;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_runtime::{Activity, ActivityContext, ActivityError};

/// Input for the wait-group-healthy activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitGroupHealthyRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Scaling group name.
    pub group_name: String,
    /// Healthy in-service instances to wait for.
    pub expected_count: u32,
    /// Whether the group runs on spot capacity. Spot groups are additionally
    /// screened for terminal request failures each poll.
    pub spot: bool,
}

/// Output of the wait-group-healthy activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitGroupHealthyResponse {
    /// True once the expected count of healthy in-service instances was
    /// observed. False only on cooperative cancellation.
    pub healthy: bool,
}

/// Polls a scaling group until the expected number of instances is both
/// health-checked OK and in service.
///
/// Three exits besides success:
/// - a terminal spot request failure fails fast with a final error, since
///   no amount of waiting produces capacity the provider refused;
/// - an exhausted attempt budget fails retryable, letting the retry policy
///   decide whether to keep watching;
/// - workflow cancellation returns `healthy: false` without error, so a
///   cancelled provisioning run can unwind cleanly.
///
/// A group that is not visible yet keeps polling; stack completion and
/// group visibility are not atomic.
pub struct WaitGroupHealthyActivity {
    deps: Dependencies,
}

impl WaitGroupHealthyActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for WaitGroupHealthyActivity {
    type Input = WaitGroupHealthyRequest;
    type Output = WaitGroupHealthyResponse;

    fn name(&self) -> &'static str {
        names::activities::WAIT_GROUP_HEALTHY
    }

    async fn run(
        &self,
        ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<WaitGroupHealthyResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let config = &self.deps.config;

        let mut last_healthy = 0;
        for attempt in 1..=config.group_wait_attempts {
            ctx.record_heartbeat();
            if ctx.is_cancelled() {
                tracing::info!(group = %input.group_name, "cancelled while waiting for group health");
                return Ok(WaitGroupHealthyResponse { healthy: false });
            }

            if input.spot {
                let requests = session
                    .scaling
                    .spot_requests_for_group(&input.group_name)
                    .await
                    .map_err(classify_cloud)?;
                if let Some(failed) = requests.iter().find(|r| r.is_terminal_failure()) {
                    return Err(ActivityError::fatal(
                        reason::SPOT_REQUEST_FAILED,
                        format!(
                            "spot request {} for group {} failed: {}",
                            failed.id,
                            input.group_name,
                            failed
                                .status_message
                                .as_deref()
                                .unwrap_or(&failed.status_code)
                        ),
                    ));
                }
            }

            match session
                .scaling
                .describe_group(&input.group_name)
                .await
                .map_err(classify_cloud)?
            {
                Some(group) => {
                    last_healthy = group.healthy_in_service_count();
                    if last_healthy >= input.expected_count {
                        return Ok(WaitGroupHealthyResponse { healthy: true });
                    }
                    tracing::debug!(
                        group = %input.group_name,
                        attempt,
                        healthy = last_healthy,
                        expected = input.expected_count,
                        "group not healthy yet"
                    );
                }
                None => {
                    tracing::debug!(group = %input.group_name, attempt, "group not visible yet");
                }
            }

            tokio::time::sleep(config.group_poll_interval).await;
        }

        Err(ActivityError::retryable(
            reason::NOT_HEALTHY_YET,
            format!(
                "group {} reached {}/{} healthy instances within the wait budget",
                input.group_name, last_healthy, input.expected_count
            ),
        ))
    }
}

/// Input for the update-group activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGroupRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Scaling group name.
    pub group_name: String,
    /// New minimum size.
    pub min_size: u32,
    /// New maximum size.
    pub max_size: u32,
    /// Desired capacity to submit when the group is not autoscaled.
    pub count: u32,
    /// Whether an autoscaler owns the desired capacity.
    pub autoscaling: bool,
}

/// Output of the update-group activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateGroupResponse {
    /// The desired capacity actually submitted.
    pub desired_capacity: u32,
}

/// Resizes a scaling group.
///
/// For autoscaled groups the autoscaler owns the desired capacity, so the
/// current desired is preserved and only clamped into the new `[min, max]`
/// range. For fixed groups the requested count is submitted as-is.
pub struct UpdateGroupActivity {
    deps: Dependencies,
}

impl UpdateGroupActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for UpdateGroupActivity {
    type Input = UpdateGroupRequest;
    type Output = UpdateGroupResponse;

    fn name(&self) -> &'static str {
        names::activities::UPDATE_GROUP
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<UpdateGroupResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;

        let desired = if input.autoscaling {
            let current = session
                .scaling
                .describe_group(&input.group_name)
                .await
                .map_err(classify_cloud)?
                .map(|g| g.desired_capacity)
                .unwrap_or(input.count);
            current.clamp(input.min_size, input.max_size)
        } else {
            input.count
        };

        session
            .scaling
            .update_group(&input.group_name, input.min_size, input.max_size, desired)
            .await
            .map_err(classify_cloud)?;

        tracing::info!(
            group = %input.group_name,
            min = input.min_size,
            max = input.max_size,
            desired,
            autoscaling = input.autoscaling,
            "scaling group updated"
        );
        Ok(UpdateGroupResponse {
            desired_capacity: desired,
        })
    }
}
