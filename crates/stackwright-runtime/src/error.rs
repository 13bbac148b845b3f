// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Classified errors crossing the activity and workflow boundaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reason codes the runtime itself produces. Domain layers define their own
/// codes in the same SCREAMING_SNAKE form.
pub mod codes {
    /// Activity exceeded its start-to-close timeout.
    pub const TIMEOUT: &str = "TIMEOUT";
    /// Activity stopped renewing its heartbeat.
    pub const HEARTBEAT_TIMEOUT: &str = "HEARTBEAT_TIMEOUT";
    /// The enclosing workflow was cancelled.
    pub const CANCELLED: &str = "CANCELLED";
    /// Input or output failed to (de)serialize at the boundary.
    pub const SERIALIZATION: &str = "SERIALIZATION";
    /// No handler registered under the requested name.
    pub const NOT_REGISTERED: &str = "NOT_REGISTERED";
}

/// Result of an activity: transient failures are retried by the runtime's
/// retry policy, final failures abort the loop immediately.
///
/// Every error carries a stable reason code; the retry policy matches codes
/// against its non-retryable list, so a retryable-classified error can still
/// be treated as final by a specific call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ActivityError {
    /// The failure may resolve on its own; retrying is worthwhile.
    Retryable {
        /// Stable reason code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
    /// Retrying would reproduce the same failure.
    Final {
        /// Stable reason code.
        code: String,
        /// Human-readable detail.
        message: String,
    },
}

impl ActivityError {
    /// Construct a retryable error.
    pub fn retryable(code: &str, message: impl Into<String>) -> Self {
        Self::Retryable {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// Construct a final error.
    pub fn fatal(code: &str, message: impl Into<String>) -> Self {
        Self::Final {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// The stable reason code.
    pub fn code(&self) -> &str {
        match self {
            Self::Retryable { code, .. } | Self::Final { code, .. } => code,
        }
    }

    /// The human-readable detail.
    pub fn message(&self) -> &str {
        match self {
            Self::Retryable { message, .. } | Self::Final { message, .. } => message,
        }
    }

    /// Whether the retry loop must stop on this error.
    pub fn is_final(&self) -> bool {
        matches!(self, Self::Final { .. })
    }
}

impl fmt::Display for ActivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retryable { code, message } => write!(f, "{code}: {message} (retryable)"),
            Self::Final { code, message } => write!(f, "{code}: {message}"),
        }
    }
}

impl std::error::Error for ActivityError {}

/// Failures surfaced by a workflow execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// An activity failed after its retry budget.
    Activity(ActivityError),
    /// The execution was cancelled from outside.
    Cancelled,
    /// No workflow registered under the requested name.
    NotRegistered {
        /// The unknown workflow name.
        workflow: String,
    },
    /// Several parallel branches failed; all captured, none swallowed.
    Combined {
        /// The per-branch failures in dispatch order.
        errors: Vec<WorkflowError>,
    },
}

impl WorkflowError {
    /// Combine the error results of parallel branches into a single error.
    ///
    /// Returns `Ok(())` when no branch failed, the lone error when exactly
    /// one did, and [`WorkflowError::Combined`] otherwise.
    pub fn combine(errors: Vec<WorkflowError>) -> Result<(), WorkflowError> {
        let mut errors = errors;
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(WorkflowError::Combined { errors }),
        }
    }

    /// The reason code of the underlying failure, when there is a single one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Activity(err) => Some(err.code()),
            Self::Cancelled => Some(codes::CANCELLED),
            _ => None,
        }
    }
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Activity(err) => write!(f, "{err}"),
            Self::Cancelled => write!(f, "workflow cancelled"),
            Self::NotRegistered { workflow } => {
                write!(f, "workflow '{workflow}' is not registered")
            }
            Self::Combined { errors } => {
                write!(f, "{} branches failed: ", errors.len())?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, "; ")?;
                    }
                    write!(f, "{err}")?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for WorkflowError {}

impl From<ActivityError> for WorkflowError {
    fn from(err: ActivityError) -> Self {
        WorkflowError::Activity(err)
    }
}
