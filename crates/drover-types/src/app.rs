//! Application definitions and partial updates

use crate::error::{Result, TypesError};
use crate::ids::AppId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Port value asking the scheduler to pick a free service port
pub const AUTO_PORT: u32 = 0;

/// Desired state of an application
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppDefinition {
    pub id: AppId,

    /// Shell command run for every instance
    #[serde(default)]
    pub cmd: Option<String>,

    /// Desired number of running instances
    #[serde(default = "default_instances")]
    pub instances: u32,

    #[serde(default = "default_cpus")]
    pub cpus: f64,

    /// Memory in MiB
    #[serde(default = "default_mem")]
    pub mem: f64,

    /// Service ports; `AUTO_PORT` entries are assigned on start
    #[serde(default)]
    pub ports: Vec<u32>,

    /// Version timestamp, bumped on every change
    pub version: DateTime<Utc>,
}

fn default_instances() -> u32 {
    1
}

fn default_cpus() -> f64 {
    1.0
}

fn default_mem() -> f64 {
    128.0
}

impl AppDefinition {
    /// Create an app with default resources and no ports
    pub fn new(id: AppId) -> Self {
        Self {
            id,
            cmd: None,
            instances: default_instances(),
            cpus: default_cpus(),
            mem: default_mem(),
            ports: Vec::new(),
            version: Utc::now(),
        }
    }

    pub fn with_cmd(mut self, cmd: impl Into<String>) -> Self {
        self.cmd = Some(cmd.into());
        self
    }

    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }

    pub fn with_ports(mut self, ports: Vec<u32>) -> Self {
        self.ports = ports;
        self
    }

    /// Number of ports still waiting for assignment
    pub fn auto_port_count(&self) -> usize {
        self.ports.iter().filter(|p| **p == AUTO_PORT).count()
    }

    /// Ports that are already fixed
    pub fn assigned_ports(&self) -> impl Iterator<Item = u32> + '_ {
        self.ports.iter().copied().filter(|p| *p != AUTO_PORT)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cpus < 0.0 || self.mem < 0.0 {
            return Err(TypesError::InvalidApp {
                app_id: self.id.to_string(),
                reason: "resources must not be negative".into(),
            });
        }

        let mut fixed: Vec<u32> = self.assigned_ports().collect();
        fixed.sort_unstable();
        if fixed.windows(2).any(|w| w[0] == w[1]) {
            return Err(TypesError::InvalidApp {
                app_id: self.id.to_string(),
                reason: "duplicate service port".into(),
            });
        }

        Ok(())
    }
}

/// Partial update of an application; `None` fields keep their value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppUpdate {
    #[serde(default)]
    pub cmd: Option<String>,
    #[serde(default)]
    pub instances: Option<u32>,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub mem: Option<f64>,
    #[serde(default)]
    pub ports: Option<Vec<u32>>,
}

impl AppUpdate {
    /// Update that only changes the instance count
    pub fn scale_to(instances: u32) -> Self {
        Self {
            instances: Some(instances),
            ..Default::default()
        }
    }

    /// Produce the new version of `app`
    pub fn apply(&self, app: &AppDefinition) -> AppDefinition {
        AppDefinition {
            id: app.id.clone(),
            cmd: self.cmd.clone().or_else(|| app.cmd.clone()),
            instances: self.instances.unwrap_or(app.instances),
            cpus: self.cpus.unwrap_or(app.cpus),
            mem: self.mem.unwrap_or(app.mem),
            ports: self.ports.clone().unwrap_or_else(|| app.ports.clone()),
            version: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> AppDefinition {
        AppDefinition::new(AppId::new("/web").unwrap())
            .with_cmd("sleep 100")
            .with_instances(3)
            .with_ports(vec![0, 8080, 0])
    }

    #[test]
    fn test_auto_port_count() {
        let app = app();
        assert_eq!(app.auto_port_count(), 2);
        assert_eq!(app.assigned_ports().collect::<Vec<_>>(), vec![8080]);
    }

    #[test]
    fn test_validate_rejects_duplicate_ports() {
        let app = app().with_ports(vec![80, 80]);
        assert!(app.validate().is_err());

        // auto ports may repeat
        let app = app.with_ports(vec![0, 0, 80]);
        assert!(app.validate().is_ok());
    }

    #[test]
    fn test_update_keeps_unset_fields() {
        let original = app();
        let updated = AppUpdate::scale_to(7).apply(&original);

        assert_eq!(updated.instances, 7);
        assert_eq!(updated.cmd, original.cmd);
        assert_eq!(updated.ports, original.ports);
        assert!(updated.version >= original.version);
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let app: AppDefinition =
            serde_json::from_str(r#"{"id":"/svc","version":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(app.instances, 1);
        assert!(app.ports.is_empty());
    }
}
