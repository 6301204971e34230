//! Commands handed to the command-processing actor and the messages it answers with

use crate::app::{AppDefinition, AppUpdate};
use crate::ids::{AppId, DeploymentId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How an upgrade replaces running instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeStrategy {
    /// Old instances kept alive until replacements are healthy
    pub keep_alive: u32,
    /// Upper bound on old + new instances running at once
    pub max_running: Option<u32>,
    /// Cancel a conflicting in-flight upgrade instead of failing
    pub force: bool,
}

impl Default for UpgradeStrategy {
    fn default() -> Self {
        Self {
            keep_alive: 0,
            max_running: None,
            force: false,
        }
    }
}

/// Target state for a set of applications, rolled out as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentPlan {
    pub id: DeploymentId,
    pub target: Vec<AppDefinition>,
    pub version: DateTime<Utc>,
}

impl DeploymentPlan {
    pub fn new(target: Vec<AppDefinition>) -> Self {
        Self {
            id: DeploymentId::generate(),
            target,
            version: Utc::now(),
        }
    }

    pub fn affected_apps(&self) -> impl Iterator<Item = &AppId> {
        self.target.iter().map(|app| &app.id)
    }
}

/// Work submitted to the command-processing actor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SchedulerCommand {
    StartApp { app: AppDefinition },
    StopApp { app_id: AppId },
    UpdateApp { app_id: AppId, update: AppUpdate },
    /// Bring running tasks in line with the desired instance count
    ScaleApp { app_id: AppId },
    UpgradeApp {
        app: AppDefinition,
        strategy: UpgradeStrategy,
    },
    Deploy { plan: DeploymentPlan },
    ReconcileTasks,
}

impl SchedulerCommand {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartApp { .. } => "StartApp",
            Self::StopApp { .. } => "StopApp",
            Self::UpdateApp { .. } => "UpdateApp",
            Self::ScaleApp { .. } => "ScaleApp",
            Self::UpgradeApp { .. } => "UpgradeApp",
            Self::Deploy { .. } => "Deploy",
            Self::ReconcileTasks => "ReconcileTasks",
        }
    }

    /// Application the command targets, if it targets exactly one
    pub fn app_id(&self) -> Option<&AppId> {
        match self {
            Self::StartApp { app } | Self::UpgradeApp { app, .. } => Some(&app.id),
            Self::StopApp { app_id } | Self::UpdateApp { app_id, .. } | Self::ScaleApp { app_id } => {
                Some(app_id)
            }
            Self::Deploy { .. } | Self::ReconcileTasks => None,
        }
    }
}

impl fmt::Display for SchedulerCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.app_id() {
            Some(app_id) => write!(f, "{}({})", self.name(), app_id),
            None => f.write_str(self.name()),
        }
    }
}

/// Messages the actor sends back on a reply channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActorMessage {
    /// Bounded command accepted and applied
    Ack,
    /// Long-running operation completed
    Finished,
    /// Command or long-running operation failed
    Failed { reason: String },
}

impl ActorMessage {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Ack => "Ack",
            Self::Finished => "Finished",
            Self::Failed { .. } => "Failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_display_includes_app() {
        let app_id = AppId::new("/web").unwrap();
        let cmd = SchedulerCommand::ScaleApp { app_id };
        assert_eq!(cmd.to_string(), "ScaleApp(/web)");
        assert_eq!(SchedulerCommand::ReconcileTasks.to_string(), "ReconcileTasks");
    }

    #[test]
    fn test_plan_lists_affected_apps() {
        let plan = DeploymentPlan::new(vec![
            AppDefinition::new(AppId::new("/a").unwrap()),
            AppDefinition::new(AppId::new("/b").unwrap()),
        ]);
        let ids: Vec<_> = plan.affected_apps().map(|id| id.as_str()).collect();
        assert_eq!(ids, vec!["/a", "/b"]);
    }

    #[test]
    fn test_command_serializes_tagged() {
        let json = serde_json::to_string(&SchedulerCommand::ReconcileTasks).unwrap();
        assert_eq!(json, r#"{"type":"reconcile_tasks"}"#);
    }
}
