//! Hook into the health-check subsystem

use async_trait::async_trait;
use drover_types::AppDefinition;

/// Health-check manager owned by another subsystem.
///
/// When this instance starts driving the cluster it hands every known
/// application over so health checks match the current definitions.
#[async_trait]
pub trait HealthCheckManager: Send + Sync {
    async fn reconcile_with(&self, app: &AppDefinition);
}
