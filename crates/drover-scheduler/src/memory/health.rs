//! Health-check manager that only records what it was handed

use crate::health::HealthCheckManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use drover_types::{AppDefinition, AppId};
use tracing::debug;

/// Keeps the latest definition each application was reconciled with
#[derive(Debug, Default)]
pub struct InMemoryHealthCheckManager {
    reconciled: DashMap<AppId, DateTime<Utc>>,
}

impl InMemoryHealthCheckManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all applications reconciled so far, sorted
    pub fn reconciled(&self) -> Vec<AppId> {
        let mut ids: Vec<AppId> = self.reconciled.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Version an application was last reconciled with
    pub fn reconciled_version(&self, id: &AppId) -> Option<DateTime<Utc>> {
        self.reconciled.get(id).map(|v| *v)
    }
}

#[async_trait]
impl HealthCheckManager for InMemoryHealthCheckManager {
    async fn reconcile_with(&self, app: &AppDefinition) {
        debug!(app_id = %app.id, version = %app.version, "Reconciling health checks");
        self.reconciled.insert(app.id.clone(), app.version);
    }
}
