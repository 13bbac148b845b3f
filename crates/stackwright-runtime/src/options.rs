// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-call activity options.

use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timeouts and retry policy attached to one activity invocation.
///
/// Timeouts are layered: schedule-to-start bounds queueing, start-to-close
/// bounds a single execution, and the heartbeat timeout bounds the gap
/// between heartbeat renewals of a long-running poller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityOptions {
    /// Bound on time spent queued before a worker picks the task up.
    pub schedule_to_start: Option<Duration>,
    /// Bound on a single execution attempt.
    pub start_to_close: Option<Duration>,
    /// Maximum gap between heartbeats; only meaningful for polling
    /// activities that call `record_heartbeat`.
    pub heartbeat_timeout: Option<Duration>,
    /// Retry policy applied across attempts.
    pub retry: RetryPolicy,
}

impl Default for ActivityOptions {
    fn default() -> Self {
        Self {
            schedule_to_start: Some(Duration::from_secs(5 * 60)),
            start_to_close: Some(Duration::from_secs(5 * 60)),
            heartbeat_timeout: None,
            retry: RetryPolicy::default(),
        }
    }
}

impl ActivityOptions {
    /// Options for a quick cloud API interaction.
    pub fn short() -> Self {
        Self {
            start_to_close: Some(Duration::from_secs(60)),
            ..Self::default()
        }
    }

    /// Options for a bounded poller: generous start-to-close, heartbeat
    /// enforced so a stuck worker is detected before the poll budget ends.
    pub fn polling(start_to_close: Duration, heartbeat: Duration) -> Self {
        Self {
            schedule_to_start: Some(Duration::from_secs(5 * 60)),
            start_to_close: Some(start_to_close),
            heartbeat_timeout: Some(heartbeat),
            retry: RetryPolicy::default(),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}
