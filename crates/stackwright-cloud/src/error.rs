// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Cloud API failures and transient-error classification.

use serde::{Deserialize, Serialize};

/// Provider-side error codes that resolve on their own: throttling and
/// eventual-consistency lag. Everything else is assumed to reproduce on
/// retry until proven otherwise by the caller.
const TRANSIENT_CODES: &[&str] = &[
    "Throttling",
    "ThrottlingException",
    "RequestLimitExceeded",
    "TooManyRequestsException",
    "ServiceUnavailable",
    "InternalFailure",
    "RequestTimeout",
    // A just-created IAM role is not visible to dependent services yet.
    "InvalidRole.NotYetPropagated",
];

/// Failure crossing a cloud API seam.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum CloudError {
    /// Structured provider error with its native code.
    #[error("{code}: {message}")]
    Api {
        /// Provider error code, e.g. `ValidationError`.
        code: String,
        /// Provider error message.
        message: String,
    },
    /// The addressed resource does not exist.
    #[error("resource not found: {resource}")]
    NotFound {
        /// Description of the missing resource.
        resource: String,
    },
    /// The credential lacks permission.
    #[error("access denied: {message}")]
    AccessDenied {
        /// Provider detail.
        message: String,
    },
    /// The credential could not be resolved or is malformed.
    #[error("invalid credential: {message}")]
    Credential {
        /// Detail from the secret store or the provider.
        message: String,
    },
}

impl CloudError {
    /// Provider error with a native code.
    pub fn api(code: &str, message: impl Into<String>) -> Self {
        Self::Api {
            code: code.to_string(),
            message: message.into(),
        }
    }

    /// The addressed resource does not exist.
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Whether retrying the same call is likely to succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { code, .. } => TRANSIENT_CODES.contains(&code.as_str()),
            _ => false,
        }
    }
}
