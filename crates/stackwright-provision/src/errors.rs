// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reason codes and failure classification.
//!
//! Activities return classified [`ActivityError`]s; the reason codes here are
//! the stable vocabulary workflows put on their retry policies'
//! non-retryable lists.

use stackwright_cloud::{CloudError, StackEvent, StackState};
use stackwright_model::{AccessorError, SecretError};
use stackwright_runtime::ActivityError;

/// Stable reason codes produced by the provisioning activities.
pub mod reason {
    /// A stack ended in a failed or rolled-back state.
    pub const STACK_FAILED: &str = "STACK_FAILED";
    /// A provider parameter was rejected; retrying reproduces the failure.
    pub const INVALID_PARAMETER: &str = "INVALID_PARAMETER";
    /// A provider resource limit was hit.
    pub const LIMIT_EXCEEDED: &str = "LIMIT_EXCEEDED";
    /// The scaling group has not reached desired healthy capacity yet.
    pub const NOT_HEALTHY_YET: &str = "NOT_HEALTHY_YET";
    /// A spot request failed terminally (price or capacity).
    pub const SPOT_REQUEST_FAILED: &str = "SPOT_REQUEST_FAILED";
    /// No image matches the requested criteria.
    pub const IMAGE_NOT_FOUND: &str = "IMAGE_NOT_FOUND";
    /// The requested volume is smaller than the image requires.
    pub const VOLUME_TOO_SMALL: &str = "VOLUME_TOO_SMALL";
    /// The bootstrap agent on a master node reported failure.
    pub const NODE_BOOTSTRAP_FAILED: &str = "NODE_BOOTSTRAP_FAILED";
    /// The master-ready signal did not arrive in time.
    pub const MASTER_READY_TIMEOUT: &str = "MASTER_READY_TIMEOUT";
    /// The cluster's provider variant cannot be provisioned here.
    pub const UNSUPPORTED_PROVIDER: &str = "UNSUPPORTED_PROVIDER";
    /// A cloud call failed transiently (throttling, consistency lag).
    pub const CLOUD_TRANSIENT: &str = "CLOUD_TRANSIENT";
    /// A cloud call failed without a more specific classification.
    pub const CLOUD_ERROR: &str = "CLOUD_ERROR";
    /// The credential was rejected or missing a permission.
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    /// The cluster or secret store failed.
    pub const STORE_ERROR: &str = "STORE_ERROR";
    /// Load balancers owned by the cluster are still present.
    pub const LOAD_BALANCERS_PRESENT: &str = "LOAD_BALANCERS_PRESENT";
}

/// Provider error codes that make a call final: the same input will fail the
/// same way.
const FINAL_API_CODES: &[&str] = &[
    "ValidationError",
    "InvalidParameterValue",
    "InvalidParameterCombination",
    "MissingParameter",
    "AlreadyExistsException",
    "InsufficientCapabilitiesException",
];

/// Map a cloud API failure onto the activity error taxonomy.
pub fn classify_cloud(err: CloudError) -> ActivityError {
    if err.is_transient() {
        return ActivityError::retryable(reason::CLOUD_TRANSIENT, err.to_string());
    }
    match &err {
        CloudError::Api { code, .. } if code == "LimitExceeded" => {
            ActivityError::fatal(reason::LIMIT_EXCEEDED, err.to_string())
        }
        CloudError::Api { code, .. } if FINAL_API_CODES.contains(&code.as_str()) => {
            ActivityError::fatal(reason::INVALID_PARAMETER, err.to_string())
        }
        CloudError::AccessDenied { .. } | CloudError::Credential { .. } => {
            ActivityError::fatal(reason::ACCESS_DENIED, err.to_string())
        }
        // Unclassified failures stay retryable; the retry budget bounds them.
        _ => ActivityError::retryable(reason::CLOUD_ERROR, err.to_string()),
    }
}

/// Map a secret store failure onto the activity error taxonomy. Lookups
/// that miss are final; store outages stay retryable.
pub fn classify_secret(err: SecretError) -> ActivityError {
    match &err {
        SecretError::NotFound { .. } | SecretError::AlreadyExists { .. } => {
            ActivityError::fatal(reason::STORE_ERROR, err.to_string())
        }
        SecretError::Storage { .. } => ActivityError::retryable(reason::STORE_ERROR, err.to_string()),
    }
}

/// Map a cluster accessor failure onto the activity error taxonomy.
pub fn classify_accessor(err: AccessorError) -> ActivityError {
    match &err {
        AccessorError::NotFound { .. } => ActivityError::fatal(reason::STORE_ERROR, err.to_string()),
        AccessorError::Storage { .. } => {
            ActivityError::retryable(reason::STORE_ERROR, err.to_string())
        }
    }
}

/// Failure-reason fragments that mean retrying the stack operation would
/// reproduce the failure.
const FINAL_REASON_MARKERS: &[&str] = &[
    "Parameter validation failed",
    "Invalid",
    "limit exceeded",
    "LimitExceeded",
    "is not authorized",
    "ROLLBACK",
];

/// Reason fragments indicating the resource failure was transient.
const TRANSIENT_REASON_MARKERS: &[&str] = &["Rate exceeded", "Throttling", "timed out"];

/// Classify a failed or timed-out stack operation from its terminal state
/// and resource events.
///
/// Rollback and failure states are final unless the underlying resource
/// failure reason is an identifiable transient; a waiter that ran out of
/// attempts with the stack still in progress stays retryable.
pub fn classify_stack_failure(
    stack_name: &str,
    state: StackState,
    events: &[StackEvent],
) -> ActivityError {
    let detail = events
        .iter()
        .find(|e| e.status.ends_with("FAILED") && e.reason.is_some())
        .and_then(|e| e.reason.clone())
        .unwrap_or_else(|| format!("stack is in state {state:?}"));

    if !state.is_terminal() && !state.is_failure() {
        return ActivityError::retryable(
            reason::CLOUD_TRANSIENT,
            format!("stack '{stack_name}' has not settled: {detail}"),
        );
    }

    if TRANSIENT_REASON_MARKERS.iter().any(|m| detail.contains(m))
        && !FINAL_REASON_MARKERS.iter().any(|m| detail.contains(m))
    {
        return ActivityError::retryable(
            reason::CLOUD_TRANSIENT,
            format!("stack '{stack_name}' failed transiently: {detail}"),
        );
    }

    ActivityError::fatal(
        reason::STACK_FAILED,
        format!("stack '{stack_name}' failed: {detail}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn event(status: &str, reason_text: Option<&str>) -> StackEvent {
        StackEvent {
            logical_id: "Resource".into(),
            resource_type: "AWS::EC2::Subnet".into(),
            status: status.into(),
            reason: reason_text.map(String::from),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_throttled_cloud_error_is_retryable() {
        let err = classify_cloud(CloudError::api("Throttling", "rate exceeded"));
        assert!(!err.is_final());
        assert_eq!(err.code(), reason::CLOUD_TRANSIENT);
    }

    #[test]
    fn test_validation_error_is_final() {
        let err = classify_cloud(CloudError::api("ValidationError", "bad subnet"));
        assert!(err.is_final());
        assert_eq!(err.code(), reason::INVALID_PARAMETER);
    }

    #[test]
    fn test_access_denied_is_final() {
        let err = classify_cloud(CloudError::AccessDenied {
            message: "no ec2:CreateVpc".into(),
        });
        assert!(err.is_final());
        assert_eq!(err.code(), reason::ACCESS_DENIED);
    }

    #[test]
    fn test_rollback_with_invalid_parameter_is_final() {
        let events = vec![event(
            "CREATE_FAILED",
            Some("Parameter validation failed: invalid CIDR"),
        )];
        let err = classify_stack_failure("s", StackState::RollbackComplete, &events);
        assert!(err.is_final());
        assert_eq!(err.code(), reason::STACK_FAILED);
        assert!(err.message().contains("invalid CIDR"));
    }

    #[test]
    fn test_transient_resource_failure_is_retryable() {
        let events = vec![event("CREATE_FAILED", Some("Rate exceeded"))];
        let err = classify_stack_failure("s", StackState::CreateFailed, &events);
        assert!(!err.is_final());
    }

    #[test]
    fn test_unsettled_stack_stays_retryable() {
        let err = classify_stack_failure("s", StackState::CreateInProgress, &[]);
        assert!(!err.is_final());
    }
}
