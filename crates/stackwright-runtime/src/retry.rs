// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Retry policy applied at the activity invocation boundary.

use crate::error::ActivityError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential backoff with a bounded coefficient, a maximum interval, a
/// maximum attempt count, and a non-retryable reason-code list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub initial_interval: Duration,
    /// Multiplier applied per attempt.
    pub backoff_coefficient: f64,
    /// Ceiling on the computed delay.
    pub max_interval: Duration,
    /// Total attempts including the first (0 = unlimited).
    pub max_attempts: u32,
    /// Reason codes that abort the retry loop immediately even when the
    /// error is classified retryable.
    pub non_retryable: Vec<String>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(60),
            max_attempts: 5,
            non_retryable: Vec::new(),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Add reason codes to the non-retryable list.
    pub fn with_non_retryable<I, S>(mut self, codes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.non_retryable.extend(codes.into_iter().map(Into::into));
        self
    }

    /// Delay to wait before retry number `attempt` (1-indexed: attempt 1 is
    /// the first retry, after the initial failure).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_coefficient
            .powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_interval.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_interval.as_secs_f64()))
    }

    /// Whether another attempt should be made after `err` on attempt number
    /// `attempt` (1-indexed, counting the initial attempt).
    pub fn should_retry(&self, attempt: u32, err: &ActivityError) -> bool {
        if err.is_final() {
            return false;
        }
        if self.non_retryable.iter().any(|c| c == err.code()) {
            return false;
        }
        self.max_attempts == 0 || attempt < self.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially_and_caps() {
        let policy = RetryPolicy {
            initial_interval: Duration::from_secs(1),
            backoff_coefficient: 2.0,
            max_interval: Duration::from_secs(5),
            max_attempts: 10,
            non_retryable: vec![],
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        // 8s capped to 5s.
        assert_eq!(policy.delay_for_attempt(4), Duration::from_secs(5));
    }

    #[test]
    fn test_final_error_is_never_retried() {
        let policy = RetryPolicy::default();
        let err = ActivityError::fatal("STACK_FAILED", "rollback");
        assert!(!policy.should_retry(1, &err));
    }

    #[test]
    fn test_non_retryable_code_aborts_even_when_retryable() {
        let policy = RetryPolicy::default().with_non_retryable(["SPOT_PRICE_TOO_LOW"]);
        let err = ActivityError::retryable("SPOT_PRICE_TOO_LOW", "bid below market");
        assert!(!policy.should_retry(1, &err));
    }

    #[test]
    fn test_attempt_budget_is_honored() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        let err = ActivityError::retryable("THROTTLED", "slow down");
        assert!(policy.should_retry(1, &err));
        assert!(policy.should_retry(2, &err));
        assert!(!policy.should_retry(3, &err));
    }

    #[test]
    fn test_zero_max_attempts_means_unlimited() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        let err = ActivityError::retryable("THROTTLED", "slow down");
        assert!(policy.should_retry(1_000_000, &err));
    }
}
