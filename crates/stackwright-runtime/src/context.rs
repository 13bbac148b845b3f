// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! The workflow-side API surface.

use crate::error::{ActivityError, WorkflowError, codes};
use crate::options::ActivityOptions;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receiving end of a named signal channel.
///
/// One receiver exists per channel per execution; signals sent before the
/// channel is opened are buffered.
pub struct SignalReceiver {
    rx: mpsc::UnboundedReceiver<Value>,
}

impl SignalReceiver {
    pub(crate) fn new(rx: mpsc::UnboundedReceiver<Value>) -> Self {
        Self { rx }
    }

    /// Wait for the next signal on this channel. Returns `None` when the
    /// execution is being torn down.
    pub async fn recv(&mut self) -> Option<Value> {
        self.rx.recv().await
    }
}

/// What a workflow body may do. Everything else must go through an activity.
#[async_trait]
pub trait WorkflowContext: Send + Sync {
    /// Stable workflow id, shared across retries of the same execution.
    fn workflow_id(&self) -> &str;

    /// Unique id of this run.
    fn run_id(&self) -> &str;

    /// Invoke a named activity. The runtime applies the options' retry
    /// policy; the returned error is the last attempt's failure.
    async fn execute_activity(
        &self,
        name: &str,
        input: Value,
        options: ActivityOptions,
    ) -> Result<Value, ActivityError>;

    /// Run a named child workflow to completion.
    async fn execute_child(&self, workflow: &str, input: Value) -> Result<Value, WorkflowError>;

    /// Durable timer.
    async fn sleep(&self, duration: Duration);

    /// Open a named signal channel scoped to this execution.
    fn signal_channel(&self, name: &str) -> SignalReceiver;

    /// Token cancelled when the workflow is cancelled from outside.
    fn cancellation(&self) -> CancellationToken;
}

/// Typed activity invocation: serde at the boundary, classified errors out.
pub async fn call_activity<I, O>(
    ctx: &dyn WorkflowContext,
    name: &str,
    input: &I,
    options: ActivityOptions,
) -> Result<O, ActivityError>
where
    I: Serialize + Sync,
    O: DeserializeOwned,
{
    let input = serde_json::to_value(input).map_err(|e| {
        ActivityError::fatal(
            codes::SERIALIZATION,
            format!("failed to serialize input for '{name}': {e}"),
        )
    })?;
    let output = ctx.execute_activity(name, input, options).await?;
    serde_json::from_value(output).map_err(|e| {
        ActivityError::fatal(
            codes::SERIALIZATION,
            format!("failed to deserialize output of '{name}': {e}"),
        )
    })
}

/// Typed child workflow invocation.
pub async fn call_child<I, O>(
    ctx: &dyn WorkflowContext,
    workflow: &str,
    input: &I,
) -> Result<O, WorkflowError>
where
    I: Serialize + Sync,
    O: DeserializeOwned,
{
    let input = serde_json::to_value(input).map_err(|e| {
        WorkflowError::Activity(ActivityError::fatal(
            codes::SERIALIZATION,
            format!("failed to serialize input for child '{workflow}': {e}"),
        ))
    })?;
    let output = ctx.execute_child(workflow, input).await?;
    serde_json::from_value(output).map_err(|e| {
        WorkflowError::Activity(ActivityError::fatal(
            codes::SERIALIZATION,
            format!("failed to deserialize output of child '{workflow}': {e}"),
        ))
    })
}
