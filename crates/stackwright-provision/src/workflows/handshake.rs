// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The master-readiness rendezvous.
//!
//! After the master stack settles, the bootstrap agent on the new control
//! plane node calls back out-of-band: either a ready signal with no payload
//! or a bootstrap-failed signal carrying a decoded error message. The
//! workflow races those two channels against a single timer; whichever
//! resolves first decides the outcome, and signals arriving after the race
//! are never re-examined.

use crate::errors::reason;
use crate::names::signals;
use serde_json::Value;
use stackwright_runtime::{ActivityError, WorkflowContext, WorkflowError};
use std::time::Duration;

/// Result of the readiness race.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    /// The bootstrap agent reported the control plane up.
    Ready,
    /// The bootstrap agent reported failure, with its decoded message.
    BootstrapFailed(String),
    /// Neither signal arrived within the timeout.
    TimedOut,
}

impl HandshakeOutcome {
    /// Convert to the workflow's error taxonomy: ready proceeds, the other
    /// two outcomes are final failures.
    pub fn into_result(self, timeout: Duration) -> Result<(), WorkflowError> {
        match self {
            Self::Ready => Ok(()),
            Self::BootstrapFailed(message) => Err(WorkflowError::Activity(ActivityError::fatal(
                reason::NODE_BOOTSTRAP_FAILED,
                format!("master bootstrap failed: {message}"),
            ))),
            Self::TimedOut => Err(WorkflowError::Activity(ActivityError::fatal(
                reason::MASTER_READY_TIMEOUT,
                format!(
                    "master did not signal readiness within {}s",
                    timeout.as_secs()
                ),
            ))),
        }
    }
}

/// Race {bootstrap-failed, ready, timeout}; first resolution wins.
///
/// The failure channel is polled first so that an error buffered alongside
/// a ready signal deterministically surfaces as a failure.
pub async fn await_master_ready(
    ctx: &dyn WorkflowContext,
    timeout: Duration,
) -> HandshakeOutcome {
    let mut ready = ctx.signal_channel(signals::NODE_READY);
    let mut failed = ctx.signal_channel(signals::NODE_BOOTSTRAP_FAILED);

    tokio::select! {
        biased;
        payload = failed.recv() => match payload {
            Some(value) => HandshakeOutcome::BootstrapFailed(decode_error(&value)),
            None => HandshakeOutcome::TimedOut,
        },
        payload = ready.recv() => match payload {
            Some(_) => HandshakeOutcome::Ready,
            None => HandshakeOutcome::TimedOut,
        },
        _ = ctx.sleep(timeout) => HandshakeOutcome::TimedOut,
    }
}

fn decode_error(payload: &Value) -> String {
    payload
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| payload.as_str())
        .unwrap_or("bootstrap agent reported an error without a message")
        .to_string()
}
