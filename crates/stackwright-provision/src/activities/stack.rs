// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stack orchestration activities: create, update, delete, wait.
//!
//! The idempotency contracts (spelled out per operation below) are what make
//! the workflows safe to retry at any point:
//! - create carries a deterministic client request token, so a retried
//!   create collapses into the original operation;
//! - an update with nothing to change is success;
//! - deleting an absent stack is success;
//! - the waiter classifies terminal failures into retryable vs final using
//!   the stack's resource events.

use crate::activities::{Dependencies, SessionRef, open_session};
use crate::errors::{classify_cloud, classify_stack_failure};
use crate::names;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stackwright_cloud::{
    CloudError, CreateStackInput, DeleteStackInput, StackState, Tag, UpdateStackInput,
};
use stackwright_runtime::{Activity, ActivityContext, ActivityError, codes};
use std::collections::BTreeMap;

/// The stack templates this layer provisions. Template bodies are external
/// collaborators; the catalog resolves a kind to a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StackKind {
    /// VPC and routing.
    Network,
    /// One subnet per availability zone.
    Subnet,
    /// Account-global IAM roles, shared across clusters.
    IamRoles,
    /// Control plane.
    Master,
    /// Worker scaling group.
    NodePool,
}

/// Source of infrastructure template bodies.
pub trait TemplateCatalog: Send + Sync {
    /// The template body for a stack kind.
    fn template(&self, kind: StackKind) -> String;
}

/// Input for the create-stack activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStackRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Logical stack name.
    pub stack_name: String,
    /// Which template to instantiate.
    pub kind: StackKind,
    /// Template parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Tags for the stack and its resources.
    #[serde(default)]
    pub tags: Vec<Tag>,
    /// Base identifier the client request token is derived from, usually
    /// the workflow id.
    pub token_base: String,
}

/// Begins creation of a declarative stack. Returns as soon as the provider
/// accepts the operation; completion is observed by [`WaitStackActivity`].
pub struct CreateStackActivity {
    deps: Dependencies,
}

impl CreateStackActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for CreateStackActivity {
    type Input = CreateStackRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::CREATE_STACK
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let token =
            names::client_request_token(&[&input.token_base, &input.stack_name, "create"]);

        let result = session
            .stacks
            .create_stack(CreateStackInput {
                name: input.stack_name.clone(),
                template: self.deps.templates.template(input.kind),
                parameters: input.parameters,
                tags: input.tags,
                client_request_token: token,
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            // The stack already exists: an earlier attempt got through.
            Err(CloudError::Api { code, .. }) if code == "AlreadyExistsException" => {
                tracing::debug!(stack = %input.stack_name, "stack already exists, treating as success");
                Ok(())
            }
            Err(err) => Err(classify_cloud(err)),
        }
    }
}

/// Input for the update-stack activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStackRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Logical stack name.
    pub stack_name: String,
    /// Which template to instantiate.
    pub kind: StackKind,
    /// Template parameters.
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Token base, usually the workflow id.
    pub token_base: String,
}

/// Output of the update-stack activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateStackResponse {
    /// False when the provider reported nothing to change.
    pub changed: bool,
}

/// Begins an update of a declarative stack.
pub struct UpdateStackActivity {
    deps: Dependencies,
}

impl UpdateStackActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for UpdateStackActivity {
    type Input = UpdateStackRequest;
    type Output = UpdateStackResponse;

    fn name(&self) -> &'static str {
        names::activities::UPDATE_STACK
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<UpdateStackResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let token =
            names::client_request_token(&[&input.token_base, &input.stack_name, "update"]);

        let result = session
            .stacks
            .update_stack(UpdateStackInput {
                name: input.stack_name.clone(),
                template: self.deps.templates.template(input.kind),
                parameters: input.parameters,
                client_request_token: token,
            })
            .await;

        match result {
            Ok(()) => Ok(UpdateStackResponse { changed: true }),
            // A no-change update is success, not failure.
            Err(CloudError::Api { message, .. })
                if message.contains("No updates are to be performed") =>
            {
                Ok(UpdateStackResponse { changed: false })
            }
            Err(err) => Err(classify_cloud(err)),
        }
    }
}

/// Input for the delete-stack activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteStackRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Logical stack name.
    pub stack_name: String,
    /// Token base, usually the workflow id.
    pub token_base: String,
}

/// Begins deletion of a declarative stack.
pub struct DeleteStackActivity {
    deps: Dependencies,
}

impl DeleteStackActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DeleteStackActivity {
    type Input = DeleteStackRequest;
    type Output = ();

    fn name(&self) -> &'static str {
        names::activities::DELETE_STACK
    }

    async fn run(&self, _ctx: ActivityContext, input: Self::Input) -> Result<(), ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let token =
            names::client_request_token(&[&input.token_base, &input.stack_name, "delete"]);

        let result = session
            .stacks
            .delete_stack(DeleteStackInput {
                name: input.stack_name.clone(),
                client_request_token: token,
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            // Deleting a stack that does not exist is success.
            Err(CloudError::NotFound { .. }) => Ok(()),
            Err(err) => Err(classify_cloud(err)),
        }
    }
}

/// What the waiter is waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitTarget {
    /// Stack reaches `CREATE_COMPLETE`.
    Created,
    /// Stack reaches `UPDATE_COMPLETE`.
    Updated,
    /// Stack disappears or reaches `DELETE_COMPLETE`.
    Deleted,
}

/// Input for the wait-stack activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStackRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Logical stack name.
    pub stack_name: String,
    /// Desired terminal condition.
    pub target: WaitTarget,
}

/// Output of the wait-stack activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitStackResponse {
    /// Stack outputs at completion; empty for deletions.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Bounded waiter for stack settlement: fixed poll interval, fixed attempt
/// budget, heartbeat renewed per poll. A failed stack is classified through
/// its resource events; an exhausted budget stays retryable.
pub struct WaitStackActivity {
    deps: Dependencies,
}

impl WaitStackActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for WaitStackActivity {
    type Input = WaitStackRequest;
    type Output = WaitStackResponse;

    fn name(&self) -> &'static str {
        names::activities::WAIT_STACK
    }

    async fn run(
        &self,
        ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<WaitStackResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let config = &self.deps.config;

        let mut last_state = None;
        for attempt in 1..=config.stack_wait_attempts {
            ctx.record_heartbeat();
            if ctx.is_cancelled() {
                return Err(ActivityError::fatal(
                    codes::CANCELLED,
                    "workflow cancelled while waiting for stack",
                ));
            }

            let stack = session
                .stacks
                .describe_stack(&input.stack_name)
                .await
                .map_err(classify_cloud)?;

            match (&stack, input.target) {
                (None, WaitTarget::Deleted) => return Ok(WaitStackResponse::default()),
                (Some(s), WaitTarget::Deleted) if s.state == StackState::DeleteComplete => {
                    return Ok(WaitStackResponse::default());
                }
                (Some(s), WaitTarget::Created) if s.state == StackState::CreateComplete => {
                    return Ok(WaitStackResponse {
                        outputs: s.outputs.clone(),
                    });
                }
                (Some(s), WaitTarget::Updated) if s.state == StackState::UpdateComplete => {
                    return Ok(WaitStackResponse {
                        outputs: s.outputs.clone(),
                    });
                }
                (Some(s), _) if s.state.is_failure() && s.state.is_terminal() => {
                    let events = session
                        .stacks
                        .stack_events(&input.stack_name)
                        .await
                        .unwrap_or_default();
                    return Err(classify_stack_failure(&input.stack_name, s.state, &events));
                }
                (None, _) => {
                    // Not visible yet; could be consistency lag right after
                    // the create call was accepted.
                }
                (Some(s), _) => last_state = Some(s.state),
            }

            tracing::debug!(
                stack = %input.stack_name,
                attempt,
                state = ?last_state,
                "stack not settled yet"
            );
            tokio::time::sleep(config.stack_poll_interval).await;
        }

        // Budget exhausted with the stack still moving: classify with what
        // we know; an in-progress state stays retryable.
        let state = last_state.unwrap_or(StackState::CreateInProgress);
        let events = session
            .stacks
            .stack_events(&input.stack_name)
            .await
            .unwrap_or_default();
        Err(classify_stack_failure(&input.stack_name, state, &events))
    }
}

/// Input for the describe-stack activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeStackRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Logical stack name.
    pub stack_name: String,
}

/// Output of the describe-stack activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescribeStackResponse {
    /// Whether the stack exists.
    pub exists: bool,
    /// Stack outputs when it does.
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Reads a stack's existence and outputs without waiting on anything.
pub struct DescribeStackActivity {
    deps: Dependencies,
}

impl DescribeStackActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for DescribeStackActivity {
    type Input = DescribeStackRequest;
    type Output = DescribeStackResponse;

    fn name(&self) -> &'static str {
        names::activities::DESCRIBE_STACK
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<DescribeStackResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let stack = session
            .stacks
            .describe_stack(&input.stack_name)
            .await
            .map_err(classify_cloud)?;
        Ok(match stack {
            Some(s) => DescribeStackResponse {
                exists: true,
                outputs: s.outputs,
            },
            None => DescribeStackResponse::default(),
        })
    }
}

/// Input for the ensure-iam-roles activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureIamRolesRequest {
    /// Cloud session to use.
    pub session: SessionRef,
    /// Token base, usually the workflow id.
    pub token_base: String,
    /// Tags for a freshly created stack.
    #[serde(default)]
    pub tags: Vec<Tag>,
}

/// Output of the ensure-iam-roles activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnsureIamRolesResponse {
    /// True when this invocation started the stack creation.
    pub created: bool,
}

/// Ensures the account-global IAM role stack exists.
///
/// List-then-create: concurrent cluster creations can race here, which the
/// source accepts as a known risk. The deterministic client request token
/// collapses the racing creates when the provider honors token idempotency.
pub struct EnsureIamRolesActivity {
    deps: Dependencies,
}

impl EnsureIamRolesActivity {
    pub fn new(deps: Dependencies) -> Self {
        Self { deps }
    }
}

#[async_trait]
impl Activity for EnsureIamRolesActivity {
    type Input = EnsureIamRolesRequest;
    type Output = EnsureIamRolesResponse;

    fn name(&self) -> &'static str {
        names::activities::ENSURE_IAM_ROLES
    }

    async fn run(
        &self,
        _ctx: ActivityContext,
        input: Self::Input,
    ) -> Result<EnsureIamRolesResponse, ActivityError> {
        let session = open_session(&self.deps.factory, &input.session).await?;
        let stack_name = names::iam_stack();

        let existing = session
            .stacks
            .describe_stack(&stack_name)
            .await
            .map_err(classify_cloud)?;
        if existing.is_some() {
            return Ok(EnsureIamRolesResponse { created: false });
        }

        let token = names::client_request_token(&[&input.token_base, &stack_name, "create"]);
        let result = session
            .stacks
            .create_stack(CreateStackInput {
                name: stack_name.clone(),
                template: self.deps.templates.template(StackKind::IamRoles),
                parameters: BTreeMap::new(),
                tags: input.tags,
                client_request_token: token,
            })
            .await;

        match result {
            Ok(()) => Ok(EnsureIamRolesResponse { created: true }),
            // Lost the race to a concurrent cluster creation.
            Err(CloudError::Api { code, .. }) if code == "AlreadyExistsException" => {
                Ok(EnsureIamRolesResponse { created: false })
            }
            Err(err) => Err(classify_cloud(err)),
        }
    }
}
