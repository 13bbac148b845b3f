// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Stackwright runtime seam - the interface workflow code programs against.
//!
//! The durable execution substrate (history persistence, deterministic
//! replay, worker dispatch) is an external dependency. This crate defines the
//! contract the provisioning workflows rely on, and an in-process
//! [`LocalRuntime`] that honors the same contract for tests and embedded
//! deployments:
//!
//! - **Activities**: named, independently retryable units of work. An
//!   activity call crosses the [`WorkflowContext::execute_activity`] boundary
//!   as `serde_json::Value` and comes back as a typed output or a classified
//!   [`ActivityError`].
//! - **Retry policies**: exponential backoff with a bounded coefficient, a
//!   maximum interval and attempt count, and a non-retryable reason-code list
//!   that short-circuits the loop ([`RetryPolicy`]).
//! - **Timeouts**: schedule-to-start, start-to-close, and heartbeat
//!   ([`ActivityOptions`]). Long pollers renew their heartbeat through
//!   [`ActivityContext::record_heartbeat`] so a stuck worker is
//!   distinguishable from one that is legitimately still polling.
//! - **Signals**: named, per-execution channels delivering asynchronous
//!   messages from outside the workflow. Signals sent before the workflow
//!   opens the channel are buffered, not lost.
//! - **Child workflows** and cooperative cancellation.
//!
//! # Determinism contract
//!
//! Workflow bodies must treat every non-deterministic effect (clock,
//! randomness, network I/O) as an activity invocation. The only primitives a
//! workflow may use directly are the ones on [`WorkflowContext`]: activity
//! calls, timers, signal channels, and child workflows. Under a replaying
//! substrate these are recorded and replayed; under [`LocalRuntime`] they
//! simply execute.

mod context;
mod error;
mod handler;
mod local;
mod options;
mod retry;

pub use context::{SignalReceiver, WorkflowContext, call_activity, call_child};
pub use error::{ActivityError, WorkflowError, codes};
pub use handler::{
    Activity, ActivityAdapter, ActivityContext, ActivityHandler, Workflow, WorkflowAdapter,
    WorkflowHandler,
};
pub use local::{LocalRuntime, LocalRuntimeBuilder, WorkflowExecution};
pub use options::ActivityOptions;
pub use retry::RetryPolicy;
