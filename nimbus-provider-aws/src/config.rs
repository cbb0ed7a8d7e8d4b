//! Provider configuration
//!
//! A host passes the provider block as JSON; every field is optional.

use std::time::Duration;

use nimbus_core::waiter::{WaitSpec, Waiter};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid provider configuration: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{name} must be greater than zero")]
    NotPositive { name: &'static str },

    #[error("no AWS region configured: set `region`, AWS_REGION or a profile region")]
    MissingRegion,
}

/// Configuration for the AWS provider
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// AWS region (default: `AWS_REGION`, then `AWS_DEFAULT_REGION`, then the SDK chain)
    pub region: Option<String>,
    /// Named profile for the default credential chain
    pub profile: Option<String>,
    /// Partition used in computed ARNs (default: resolved through STS)
    pub partition: Option<String>,
    /// Account id used in computed ARNs (default: resolved through STS)
    pub account_id: Option<String>,
    /// Seconds between two status probes (default: 5)
    pub poll_interval_secs: u64,
    pub timeouts: Timeouts,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: None,
            profile: None,
            partition: None,
            account_id: None,
            poll_interval_secs: 5,
            timeouts: Timeouts::default(),
        }
    }
}

/// Per-resource waiter timeouts, in seconds
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    /// Contributor insights enable/disable (default: 300)
    pub contributor_insights_secs: u64,
    /// SNS subscription deletion (default: 300)
    pub subscription_delete_secs: u64,
    /// Canary ready/running/stopped/deleted (default: 300)
    pub canary_secs: u64,
    /// Notebook instance state changes (default: 600)
    pub notebook_instance_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            contributor_insights_secs: 300,
            subscription_delete_secs: 300,
            canary_secs: 300,
            notebook_instance_secs: 600,
        }
    }
}

impl ProviderConfig {
    /// Parse and validate a JSON provider block
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("poll_interval_secs", self.poll_interval_secs),
            (
                "timeouts.contributor_insights_secs",
                self.timeouts.contributor_insights_secs,
            ),
            (
                "timeouts.subscription_delete_secs",
                self.timeouts.subscription_delete_secs,
            ),
            ("timeouts.canary_secs", self.timeouts.canary_secs),
            (
                "timeouts.notebook_instance_secs",
                self.timeouts.notebook_instance_secs,
            ),
        ];
        match checks.iter().find(|(_, value)| *value == 0) {
            Some((name, _)) => Err(ConfigError::NotPositive { name: *name }),
            None => Ok(()),
        }
    }

    /// Region from the configuration or the environment
    pub fn resolve_region(&self) -> Option<String> {
        self.region
            .clone()
            .or_else(|| std::env::var("AWS_REGION").ok())
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .filter(|r| !r.is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn contributor_insights_waits(&self, cancel: &CancellationToken) -> WaitSettings {
        self.waits(self.timeouts.contributor_insights_secs, cancel)
    }

    pub fn subscription_waits(&self, cancel: &CancellationToken) -> WaitSettings {
        self.waits(self.timeouts.subscription_delete_secs, cancel)
    }

    pub fn canary_waits(&self, cancel: &CancellationToken) -> WaitSettings {
        self.waits(self.timeouts.canary_secs, cancel)
    }

    pub fn notebook_instance_waits(&self, cancel: &CancellationToken) -> WaitSettings {
        self.waits(self.timeouts.notebook_instance_secs, cancel)
    }

    fn waits(&self, timeout_secs: u64, cancel: &CancellationToken) -> WaitSettings {
        WaitSettings {
            poll_interval: self.poll_interval(),
            timeout: Duration::from_secs(timeout_secs),
            cancel: cancel.clone(),
        }
    }
}

/// Timing and cancellation shared by every wait of one resource handler
#[derive(Debug, Clone)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
    pub cancel: CancellationToken,
}

impl WaitSettings {
    /// Build a cancellable waiter with this handler's timing
    pub fn waiter<S>(&self, label: impl Into<String>, spec: WaitSpec<S>) -> Waiter<S>
    where
        S: Clone + PartialEq + std::fmt::Display + Send + Sync,
    {
        let spec = spec
            .poll_interval(self.poll_interval)
            .timeout(self.timeout);
        Waiter::new(label, spec).with_cancellation(self.cancel.clone())
    }

    /// Same settings with a different timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }
}

impl Default for WaitSettings {
    fn default() -> Self {
        ProviderConfig::default().canary_waits(&CancellationToken::new())
    }
}
