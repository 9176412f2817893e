//! Command line configuration.

use std::time::Duration;

use clap::Parser;

use converge_core::{ReconcilerConfig, RetryPolicy};

use crate::controller::ControllerConfig;

#[derive(Parser, Debug, Clone)]
#[command(name = "converge-operator")]
#[command(about = "Desired-state operator for managed container and autonomous databases")]
pub struct Args {
    /// Listen address for the REST API
    #[arg(short, long, default_value = "[::1]:8080")]
    pub listen: String,

    /// Base URL of the provider API
    #[arg(long, default_value = "http://[::1]:9090")]
    pub provider_endpoint: String,

    /// Reconcile workers per resource kind
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Interval at which every record is reconciled
    #[arg(long, default_value_t = 300)]
    pub resync_secs: u64,

    /// Timeout for a single provider call
    #[arg(long, default_value_t = 30)]
    pub call_timeout_secs: u64,

    /// Poll interval while the provider has an operation in flight
    #[arg(long, default_value_t = 15)]
    pub poll_secs: u64,

    /// Transient failures retried without delay
    #[arg(long, default_value_t = 1)]
    pub immediate_retries: u32,

    /// Transient failures before a change is marked failed
    #[arg(long, default_value_t = 10)]
    pub max_attempts: u32,

    /// First backoff delay after the immediate retries
    #[arg(long, default_value_t = 1000)]
    pub backoff_base_ms: u64,

    /// Backoff cap
    #[arg(long, default_value_t = 300)]
    pub backoff_max_secs: u64,

    /// Re-runs of a pass after conflicting store writes
    #[arg(long, default_value_t = 3)]
    pub max_conflict_retries: u32,
}

impl Args {
    pub fn reconciler_config(&self) -> ReconcilerConfig {
        ReconcilerConfig {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            poll_interval: Duration::from_secs(self.poll_secs),
            resync_period: Duration::from_secs(self.resync_secs),
            retry: RetryPolicy {
                immediate_retries: self.immediate_retries,
                base_delay: Duration::from_millis(self.backoff_base_ms),
                max_delay: Duration::from_secs(self.backoff_max_secs),
                max_attempts: self.max_attempts,
            },
            max_conflict_retries: self.max_conflict_retries,
        }
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            resync_period: Duration::from_secs(self.resync_secs),
            ..Default::default()
        }
    }
}
