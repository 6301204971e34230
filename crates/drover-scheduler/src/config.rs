//! Scheduler configuration

use crate::error::{Result, SchedulerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration consumed by the scheduler control plane
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Delay before the first reconciliation tick
    #[serde(default = "default_reconciliation_initial_delay")]
    pub reconciliation_initial_delay_ms: u64,

    /// Interval between reconciliation ticks
    #[serde(default = "default_reconciliation_interval")]
    pub reconciliation_interval_ms: u64,

    /// Reply timeout for bounded commands
    #[serde(default = "default_command_timeout")]
    pub command_timeout_ms: u64,

    /// Lowest port handed out for auto-assigned service ports
    #[serde(default = "default_local_port_min")]
    pub local_port_min: u32,

    /// Exclusive upper bound for auto-assigned service ports
    #[serde(default = "default_local_port_max")]
    pub local_port_max: u32,

    /// Hostname advertised to the other candidates
    #[serde(default = "default_hostname")]
    pub hostname: String,

    /// Port advertised together with the hostname
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Pause before offering leadership again after the driver exited
    #[serde(default = "default_reoffer_backoff")]
    pub leader_reoffer_backoff_ms: u64,

    /// Run leader election through the coordination backend when one is supplied
    #[serde(default = "default_true")]
    pub ha: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            reconciliation_initial_delay_ms: default_reconciliation_initial_delay(),
            reconciliation_interval_ms: default_reconciliation_interval(),
            command_timeout_ms: default_command_timeout(),
            local_port_min: default_local_port_min(),
            local_port_max: default_local_port_max(),
            hostname: default_hostname(),
            http_port: default_http_port(),
            leader_reoffer_backoff_ms: default_reoffer_backoff(),
            ha: true,
        }
    }
}

// Default value helpers
fn default_true() -> bool {
    true
}

fn default_reconciliation_initial_delay() -> u64 {
    15_000
}

fn default_reconciliation_interval() -> u64 {
    300_000
}

fn default_command_timeout() -> u64 {
    5_000
}

fn default_local_port_min() -> u32 {
    10_000
}

fn default_local_port_max() -> u32 {
    20_000
}

fn default_hostname() -> String {
    "localhost".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_reoffer_backoff() -> u64 {
    500
}

impl SchedulerConfig {
    pub fn reconciliation_initial_delay(&self) -> Duration {
        Duration::from_millis(self.reconciliation_initial_delay_ms)
    }

    pub fn reconciliation_interval(&self) -> Duration {
        Duration::from_millis(self.reconciliation_interval_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn leader_reoffer_backoff(&self) -> Duration {
        Duration::from_millis(self.leader_reoffer_backoff_ms)
    }

    /// `hostname:port` as published through the coordination backend
    pub fn advertised_address(&self) -> String {
        format!("{}:{}", self.hostname, self.http_port)
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_port_min >= self.local_port_max {
            return Err(SchedulerError::Config(format!(
                "empty port range [{}, {})",
                self.local_port_min, self.local_port_max
            )));
        }
        if self.local_port_max > u32::from(u16::MAX) + 1 {
            return Err(SchedulerError::Config(format!(
                "port range upper bound {} exceeds 65536",
                self.local_port_max
            )));
        }
        if self.reconciliation_interval_ms == 0 {
            return Err(SchedulerError::Config(
                "reconciliation interval must be positive".into(),
            ));
        }
        if self.command_timeout_ms == 0 {
            return Err(SchedulerError::Config("command timeout must be positive".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.local_port_min, 10_000);
        assert_eq!(config.local_port_max, 20_000);
        assert_eq!(config.advertised_address(), "localhost:8080");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_range() {
        let config = SchedulerConfig {
            local_port_min: 100,
            local_port_max: 100,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SchedulerError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let config = SchedulerConfig {
            command_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let config: SchedulerConfig =
            serde_json::from_str(r#"{"hostname":"node-1","ha":false}"#).unwrap();
        assert_eq!(config.hostname, "node-1");
        assert!(!config.ha);
        assert_eq!(config.reconciliation_interval_ms, 300_000);
    }
}
