// Copyright (C) 2025 Stackwright Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provisioning configuration loaded from environment variables.

use std::time::Duration;

/// Tunables for the pollers and the master-ready handshake.
#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between stack describe calls while waiting.
    pub stack_poll_interval: Duration,
    /// Maximum stack describe attempts before the waiter gives up.
    pub stack_wait_attempts: u32,
    /// Interval between scaling group describes while waiting for health.
    pub group_poll_interval: Duration,
    /// Maximum group describes before the health poller gives up.
    pub group_wait_attempts: u32,
    /// Interval between load balancer describes during teardown.
    pub lb_poll_interval: Duration,
    /// Maximum load balancer describes before the teardown waiter gives up.
    pub lb_wait_attempts: u32,
    /// How long the create workflow waits for the master-ready signal.
    pub master_ready_timeout: Duration,
    /// Operator-configured default node volume size, when set.
    pub default_volume_size_gb: Option<u32>,
    /// Hard floor for node volumes when nothing else applies.
    pub fallback_volume_size_gb: u32,
    /// Kubernetes minor version images are selected for.
    pub kubernetes_version: String,
    /// Operating system identifier images are selected for.
    pub node_os: String,
    /// Container runtime identifier images are selected for.
    pub container_runtime: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stack_poll_interval: Duration::from_secs(10),
            stack_wait_attempts: 180,
            group_poll_interval: Duration::from_secs(10),
            group_wait_attempts: 60,
            lb_poll_interval: Duration::from_secs(10),
            lb_wait_attempts: 60,
            master_ready_timeout: Duration::from_secs(60 * 60),
            default_volume_size_gb: None,
            fallback_volume_size_gb: 50,
            kubernetes_version: "1.31".into(),
            node_os: "ubuntu-22.04".into(),
            container_runtime: "containerd".into(),
        }
    }
}

impl Config {
    /// Load configuration from `STACKWRIGHT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(secs) = read_u64("STACKWRIGHT_STACK_POLL_SECS")? {
            config.stack_poll_interval = Duration::from_secs(secs);
        }
        if let Some(n) = read_u64("STACKWRIGHT_STACK_WAIT_ATTEMPTS")? {
            config.stack_wait_attempts = n as u32;
        }
        if let Some(secs) = read_u64("STACKWRIGHT_GROUP_POLL_SECS")? {
            config.group_poll_interval = Duration::from_secs(secs);
        }
        if let Some(n) = read_u64("STACKWRIGHT_GROUP_WAIT_ATTEMPTS")? {
            config.group_wait_attempts = n as u32;
        }
        if let Some(secs) = read_u64("STACKWRIGHT_LB_POLL_SECS")? {
            config.lb_poll_interval = Duration::from_secs(secs);
        }
        if let Some(n) = read_u64("STACKWRIGHT_LB_WAIT_ATTEMPTS")? {
            config.lb_wait_attempts = n as u32;
        }
        if let Some(secs) = read_u64("STACKWRIGHT_MASTER_READY_TIMEOUT_SECS")? {
            config.master_ready_timeout = Duration::from_secs(secs);
        }
        if let Some(gb) = read_u64("STACKWRIGHT_DEFAULT_VOLUME_SIZE_GB")? {
            config.default_volume_size_gb = Some(gb as u32);
        }
        if let Some(gb) = read_u64("STACKWRIGHT_FALLBACK_VOLUME_SIZE_GB")? {
            config.fallback_volume_size_gb = gb as u32;
        }
        if let Ok(v) = std::env::var("STACKWRIGHT_KUBERNETES_VERSION") {
            config.kubernetes_version = v;
        }
        if let Ok(v) = std::env::var("STACKWRIGHT_NODE_OS") {
            config.node_os = v;
        }
        if let Ok(v) = std::env::var("STACKWRIGHT_CONTAINER_RUNTIME") {
            config.container_runtime = v;
        }
        Ok(config)
    }
}

fn read_u64(var: &'static str) -> Result<Option<u64>, ConfigError> {
    match std::env::var(var) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber { var, value: raw }),
        Err(_) => Ok(None),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// An environment variable is set but not a number.
    #[error("environment variable {var} is not a number: '{value}'")]
    InvalidNumber {
        /// The offending variable.
        var: &'static str,
        /// The raw value.
        value: String,
    },
}
