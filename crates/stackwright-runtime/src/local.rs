// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-process runtime implementing the workflow contract.
//!
//! `LocalRuntime` is what the test suites and embedded deployments run on: a
//! registry of activity and workflow handlers plus a per-execution context
//! that applies retry policies, layered timeouts, heartbeat supervision, and
//! buffered signal delivery. It does not persist history; crash recovery is
//! the production substrate's job.

use crate::context::{SignalReceiver, WorkflowContext};
use crate::error::{ActivityError, WorkflowError, codes};
use crate::handler::{
    Activity, ActivityAdapter, ActivityContext, ActivityHandler, Workflow, WorkflowAdapter,
    WorkflowHandler,
};
use crate::options::ActivityOptions;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// Builder for [`LocalRuntime`].
#[derive(Default)]
pub struct LocalRuntimeBuilder {
    activities: HashMap<String, Arc<dyn ActivityHandler>>,
    workflows: HashMap<String, Arc<dyn WorkflowHandler>>,
}

impl LocalRuntimeBuilder {
    /// Register a typed activity under its own name.
    pub fn activity<A: Activity>(mut self, activity: A) -> Self {
        let name = activity.name().to_string();
        self.activities
            .insert(name, Arc::new(ActivityAdapter(Arc::new(activity))));
        self
    }

    /// Register an untyped handler under an explicit name.
    pub fn activity_handler(mut self, name: &str, handler: Arc<dyn ActivityHandler>) -> Self {
        self.activities.insert(name.to_string(), handler);
        self
    }

    /// Register a typed workflow under its own name.
    pub fn workflow<W: Workflow>(mut self, workflow: W) -> Self {
        let name = workflow.name().to_string();
        self.workflows
            .insert(name, Arc::new(WorkflowAdapter(Arc::new(workflow))));
        self
    }

    /// Finish registration.
    pub fn build(self) -> LocalRuntime {
        LocalRuntime {
            inner: Arc::new(Registry {
                activities: self.activities,
                workflows: self.workflows,
            }),
        }
    }
}

struct Registry {
    activities: HashMap<String, Arc<dyn ActivityHandler>>,
    workflows: HashMap<String, Arc<dyn WorkflowHandler>>,
}

/// In-process workflow runtime.
#[derive(Clone)]
pub struct LocalRuntime {
    inner: Arc<Registry>,
}

impl LocalRuntime {
    /// Start building a runtime.
    pub fn builder() -> LocalRuntimeBuilder {
        LocalRuntimeBuilder::default()
    }

    /// Start a workflow execution.
    pub fn start(
        &self,
        workflow: &str,
        workflow_id: &str,
        input: Value,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let handler = self
            .inner
            .workflows
            .get(workflow)
            .cloned()
            .ok_or_else(|| WorkflowError::NotRegistered {
                workflow: workflow.to_string(),
            })?;

        let signals = Arc::new(SignalHub::default());
        let cancellation = CancellationToken::new();
        let run_id = Uuid::new_v4().to_string();
        let ctx: Arc<dyn WorkflowContext> = Arc::new(LocalContext {
            registry: self.inner.clone(),
            workflow_id: workflow_id.to_string(),
            run_id: run_id.clone(),
            signals: signals.clone(),
            cancellation: cancellation.clone(),
        });

        debug!(workflow, workflow_id, run_id, "starting workflow");
        let handle = tokio::spawn(async move { handler.execute(ctx, input).await });

        Ok(WorkflowExecution {
            workflow_id: workflow_id.to_string(),
            run_id,
            signals,
            cancellation,
            handle,
        })
    }

    /// Start a workflow with a typed input.
    pub fn start_as<I: Serialize>(
        &self,
        workflow: &str,
        workflow_id: &str,
        input: &I,
    ) -> Result<WorkflowExecution, WorkflowError> {
        let input = serde_json::to_value(input).map_err(|e| {
            WorkflowError::Activity(ActivityError::fatal(
                codes::SERIALIZATION,
                format!("failed to serialize input for '{workflow}': {e}"),
            ))
        })?;
        self.start(workflow, workflow_id, input)
    }
}

/// Handle to a running workflow.
pub struct WorkflowExecution {
    workflow_id: String,
    run_id: String,
    signals: Arc<SignalHub>,
    cancellation: CancellationToken,
    handle: JoinHandle<Result<Value, WorkflowError>>,
}

impl WorkflowExecution {
    /// The workflow id this execution runs under.
    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    /// The run id of this execution.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Deliver a signal into a named channel. Buffered until the workflow
    /// opens the channel; ignored if it never does.
    pub fn signal(&self, name: &str, payload: Value) {
        self.signals.send(name, payload);
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Await the workflow result.
    pub async fn result(self) -> Result<Value, WorkflowError> {
        match self.handle.await {
            Ok(result) => result,
            Err(join_err) => Err(WorkflowError::Activity(ActivityError::fatal(
                "PANIC",
                format!("workflow task failed: {join_err}"),
            ))),
        }
    }

    /// Await the workflow result and deserialize it.
    pub async fn result_as<O: DeserializeOwned>(self) -> Result<O, WorkflowError> {
        let value = self.result().await?;
        serde_json::from_value(value).map_err(|e| {
            WorkflowError::Activity(ActivityError::fatal(
                codes::SERIALIZATION,
                format!("failed to deserialize workflow result: {e}"),
            ))
        })
    }
}

/// Named signal channels for one execution. Channels come into existence on
/// first use from either side, so early signals are buffered rather than
/// dropped.
#[derive(Default)]
struct SignalHub {
    channels: Mutex<HashMap<String, SignalSlot>>,
}

struct SignalSlot {
    tx: mpsc::UnboundedSender<Value>,
    rx: Option<mpsc::UnboundedReceiver<Value>>,
}

impl SignalSlot {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

impl SignalHub {
    fn send(&self, name: &str, payload: Value) {
        let mut channels = self.channels.lock().expect("signal hub lock");
        let slot = channels
            .entry(name.to_string())
            .or_insert_with(SignalSlot::new);
        // Receiver may be gone if the workflow already finished.
        let _ = slot.tx.send(payload);
    }

    /// Take the receiving end. A channel has one receiver; opening the same
    /// name twice yields an empty channel nothing is wired to.
    fn open(&self, name: &str) -> SignalReceiver {
        let mut channels = self.channels.lock().expect("signal hub lock");
        let slot = channels
            .entry(name.to_string())
            .or_insert_with(SignalSlot::new);
        match slot.rx.take() {
            Some(rx) => SignalReceiver::new(rx),
            None => {
                let (_tx, rx) = mpsc::unbounded_channel();
                SignalReceiver::new(rx)
            }
        }
    }
}

struct LocalContext {
    registry: Arc<Registry>,
    workflow_id: String,
    run_id: String,
    signals: Arc<SignalHub>,
    cancellation: CancellationToken,
}

impl LocalContext {
    /// One activity attempt under start-to-close and heartbeat supervision.
    async fn attempt(
        &self,
        handler: &Arc<dyn ActivityHandler>,
        actx: ActivityContext,
        input: Value,
        options: &ActivityOptions,
    ) -> Result<Value, ActivityError> {
        let heartbeat = options.heartbeat_timeout;
        let exec = Self::supervised(handler.clone(), actx, input, heartbeat);
        match options.start_to_close {
            Some(limit) => tokio::time::timeout(limit, exec).await.unwrap_or_else(|_| {
                Err(ActivityError::retryable(
                    codes::TIMEOUT,
                    format!("activity exceeded start-to-close timeout of {limit:?}"),
                ))
            }),
            None => exec.await,
        }
    }

    async fn supervised(
        handler: Arc<dyn ActivityHandler>,
        actx: ActivityContext,
        input: Value,
        heartbeat: Option<Duration>,
    ) -> Result<Value, ActivityError> {
        let watchdog_ctx = actx.clone();
        let exec = handler.execute(actx, input);
        let Some(max_gap) = heartbeat else {
            return exec.await;
        };

        tokio::pin!(exec);
        loop {
            let deadline = watchdog_ctx.last_heartbeat() + max_gap;
            tokio::select! {
                result = &mut exec => return result,
                _ = tokio::time::sleep_until(deadline) => {
                    if watchdog_ctx.last_heartbeat() + max_gap <= Instant::now() {
                        return Err(ActivityError::retryable(
                            codes::HEARTBEAT_TIMEOUT,
                            format!("no heartbeat recorded within {max_gap:?}"),
                        ));
                    }
                }
            }
        }
    }
}

#[async_trait]
impl WorkflowContext for LocalContext {
    fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn execute_activity(
        &self,
        name: &str,
        input: Value,
        options: ActivityOptions,
    ) -> Result<Value, ActivityError> {
        let handler = self.registry.activities.get(name).cloned().ok_or_else(|| {
            ActivityError::fatal(
                codes::NOT_REGISTERED,
                format!("activity '{name}' is not registered"),
            )
        })?;

        let mut attempt = 1u32;
        loop {
            if self.cancellation.is_cancelled() {
                return Err(ActivityError::fatal(
                    codes::CANCELLED,
                    "workflow cancelled before activity dispatch",
                ));
            }

            let actx = ActivityContext::new(
                self.workflow_id.clone(),
                name.to_string(),
                attempt,
                self.cancellation.child_token(),
            );
            match self.attempt(&handler, actx, input.clone(), &options).await {
                Ok(output) => {
                    debug!(activity = name, attempt, "activity completed");
                    return Ok(output);
                }
                Err(err) if options.retry.should_retry(attempt, &err) => {
                    let delay = options.retry.delay_for_attempt(attempt);
                    debug!(
                        activity = name,
                        attempt,
                        code = err.code(),
                        ?delay,
                        "activity attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    warn!(
                        activity = name,
                        attempt,
                        code = err.code(),
                        "activity failed, not retrying"
                    );
                    return Err(err);
                }
            }
        }
    }

    async fn execute_child(&self, workflow: &str, input: Value) -> Result<Value, WorkflowError> {
        let handler = self
            .registry
            .workflows
            .get(workflow)
            .cloned()
            .ok_or_else(|| WorkflowError::NotRegistered {
                workflow: workflow.to_string(),
            })?;

        let child_ctx: Arc<dyn WorkflowContext> = Arc::new(LocalContext {
            registry: self.registry.clone(),
            workflow_id: format!("{}:{workflow}", self.workflow_id),
            run_id: Uuid::new_v4().to_string(),
            signals: Arc::new(SignalHub::default()),
            cancellation: self.cancellation.child_token(),
        });
        debug!(parent = %self.workflow_id, child = workflow, "starting child workflow");
        handler.execute(child_ctx, input).await
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn signal_channel(&self, name: &str) -> SignalReceiver {
        self.signals.open(name)
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }
}
