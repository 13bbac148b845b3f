// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow bodies.
//!
//! Everything here runs under the runtime's deterministic-replay contract:
//! no clock reads, no randomness, no I/O except through activity calls on
//! the workflow context. Shared plumbing (activity option presets, the
//! session reference derived from a request) lives in this module; each
//! workflow gets its own file.

pub mod create;
pub mod delete;
pub mod handshake;
pub mod infra_delete;
pub mod nodepool;
pub mod update;

use crate::activities::SessionRef;
use crate::config::Config;
use stackwright_model::ProvisioningRequest;
use stackwright_runtime::{ActivityOptions, RetryPolicy};
use std::time::Duration;

/// Session reference every cloud activity of a workflow shares.
pub(crate) fn session_ref(request: &ProvisioningRequest) -> SessionRef {
    SessionRef {
        organization_id: request.organization_id,
        secret_id: request.secret_id.clone(),
        region: request.region.clone(),
    }
}

/// Options for quick cloud interactions (begin-create, describe, tag ops).
pub(crate) fn short_opts() -> ActivityOptions {
    ActivityOptions::short()
}

/// Options for the bounded stack waiter: start-to-close covers the whole
/// poll budget, heartbeat must be renewed every few intervals.
pub(crate) fn stack_wait_opts(config: &Config) -> ActivityOptions {
    poll_opts(config.stack_poll_interval, config.stack_wait_attempts)
}

/// Options for the scaling group health poller. Exhausting the poll budget
/// is retryable, but not forever; three passes through the budget is the
/// point where waiting longer stops being useful.
pub(crate) fn group_wait_opts(config: &Config) -> ActivityOptions {
    poll_opts(config.group_poll_interval, config.group_wait_attempts)
        .with_retry(RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        })
}

/// Options for the load-balancer disappearance waiter during teardown.
pub(crate) fn lb_wait_opts(config: &Config) -> ActivityOptions {
    poll_opts(config.lb_poll_interval, config.lb_wait_attempts)
}

fn poll_opts(interval: Duration, attempts: u32) -> ActivityOptions {
    let budget = interval * attempts.max(1) + interval;
    ActivityOptions::polling(budget, interval * 6)
}
