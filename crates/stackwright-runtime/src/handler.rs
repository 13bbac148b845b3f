// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker-side handler traits and typed adapters.

use crate::context::WorkflowContext;
use crate::error::{ActivityError, WorkflowError, codes};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-attempt context handed to an executing activity.
#[derive(Clone)]
pub struct ActivityContext {
    workflow_id: String,
    activity_name: String,
    attempt: u32,
    last_heartbeat: Arc<Mutex<Instant>>,
    cancellation: CancellationToken,
}

impl ActivityContext {
    pub(crate) fn new(
        workflow_id: String,
        activity_name: String,
        attempt: u32,
        cancellation: CancellationToken,
    ) -> Self {
        Self {
            workflow_id,
            activity_name,
            attempt,
            last_heartbeat: Arc::new(Mutex::new(Instant::now())),
            cancellation,
        }
    }

    /// Workflow this attempt belongs to.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// Name the activity was dispatched under.
    pub fn activity_name(&self) -> &str {
        &self.activity_name
    }

    /// Attempt number, 1-indexed.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Renew the heartbeat. Polling activities call this every iteration so
    /// the runtime can tell a stuck worker from a slow poll.
    pub fn record_heartbeat(&self) {
        *self.last_heartbeat.lock().expect("heartbeat lock") = Instant::now();
    }

    pub(crate) fn last_heartbeat(&self) -> Instant {
        *self.last_heartbeat.lock().expect("heartbeat lock")
    }

    /// Whether the enclosing workflow was cancelled. Pollers exit
    /// cooperatively when this turns true.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Untyped activity handler, the unit of registration.
#[async_trait]
pub trait ActivityHandler: Send + Sync {
    /// Execute one attempt.
    async fn execute(&self, ctx: ActivityContext, input: Value) -> Result<Value, ActivityError>;
}

/// A typed activity. Implementations carry their own dependencies (cloud
/// session factories, accessors) and are registered once per worker.
#[async_trait]
pub trait Activity: Send + Sync + 'static {
    /// Deserialized input type.
    type Input: DeserializeOwned + Send;
    /// Serialized output type.
    type Output: Serialize;

    /// Stable dispatch name.
    fn name(&self) -> &'static str;

    /// Execute one attempt.
    async fn run(
        &self,
        ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<Self::Output, ActivityError>;
}

/// Serde adapter turning a typed [`Activity`] into an [`ActivityHandler`].
pub struct ActivityAdapter<A>(pub Arc<A>);

#[async_trait]
impl<A: Activity> ActivityHandler for ActivityAdapter<A> {
    async fn execute(&self, ctx: ActivityContext, input: Value) -> Result<Value, ActivityError> {
        let name = self.0.name();
        let input: A::Input = serde_json::from_value(input).map_err(|e| {
            ActivityError::fatal(
                codes::SERIALIZATION,
                format!("invalid input for activity '{name}': {e}"),
            )
        })?;
        let output = self.0.run(ctx, input).await?;
        serde_json::to_value(output).map_err(|e| {
            ActivityError::fatal(
                codes::SERIALIZATION,
                format!("failed to serialize output of activity '{name}': {e}"),
            )
        })
    }
}

/// Untyped workflow handler.
#[async_trait]
pub trait WorkflowHandler: Send + Sync {
    /// Run the workflow body to completion.
    async fn execute(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        input: Value,
    ) -> Result<Value, WorkflowError>;
}

/// A typed workflow definition.
#[async_trait]
pub trait Workflow: Send + Sync + 'static {
    /// Deserialized input type.
    type Input: DeserializeOwned + Send;
    /// Serialized output type.
    type Output: Serialize;

    /// Stable dispatch name.
    fn name(&self) -> &'static str;

    /// The workflow body. Must obey the determinism contract: effects only
    /// through `ctx`.
    async fn run(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        input: Self::Input,
    ) -> Result<Self::Output, WorkflowError>;
}

/// Serde adapter turning a typed [`Workflow`] into a [`WorkflowHandler`].
pub struct WorkflowAdapter<W>(pub Arc<W>);

#[async_trait]
impl<W: Workflow> WorkflowHandler for WorkflowAdapter<W> {
    async fn execute(
        &self,
        ctx: Arc<dyn WorkflowContext>,
        input: Value,
    ) -> Result<Value, WorkflowError> {
        let name = self.0.name();
        let input: W::Input = serde_json::from_value(input).map_err(|e| {
            WorkflowError::Activity(ActivityError::fatal(
                codes::SERIALIZATION,
                format!("invalid input for workflow '{name}': {e}"),
            ))
        })?;
        let output = self.0.run(ctx, input).await?;
        serde_json::to_value(output).map_err(|e| {
            WorkflowError::Activity(ActivityError::fatal(
                codes::SERIALIZATION,
                format!("failed to serialize output of workflow '{name}': {e}"),
            ))
        })
    }
}
