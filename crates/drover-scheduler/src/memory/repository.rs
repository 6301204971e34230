//! In-memory application repository and framework id store

use crate::repository::{AppRepository, FrameworkIdStore, RepositoryResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use drover_types::{AppDefinition, AppId, FrameworkId};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-memory application repository keeping every stored version
#[derive(Debug, Default)]
pub struct InMemoryAppRepository {
    apps: DashMap<AppId, BTreeMap<DateTime<Utc>, AppDefinition>>,
}

impl InMemoryAppRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new version of an application
    pub fn store(&self, app: AppDefinition) {
        self.apps
            .entry(app.id.clone())
            .or_default()
            .insert(app.version, app);
    }

    /// Forget an application with all its versions
    pub fn expunge(&self, id: &AppId) -> bool {
        self.apps.remove(id).is_some()
    }
}

#[async_trait]
impl AppRepository for InMemoryAppRepository {
    async fn list_apps(&self) -> RepositoryResult<Vec<AppDefinition>> {
        let mut apps: Vec<AppDefinition> = self
            .apps
            .iter()
            .filter_map(|versions| versions.values().next_back().cloned())
            .collect();
        apps.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(apps)
    }

    async fn list_versions(&self, id: &AppId) -> RepositoryResult<Vec<DateTime<Utc>>> {
        Ok(self
            .apps
            .get(id)
            .map(|versions| versions.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn get_app(&self, id: &AppId) -> RepositoryResult<Option<AppDefinition>> {
        Ok(self
            .apps
            .get(id)
            .and_then(|versions| versions.values().next_back().cloned()))
    }

    async fn get_app_version(
        &self,
        id: &AppId,
        version: &DateTime<Utc>,
    ) -> RepositoryResult<Option<AppDefinition>> {
        Ok(self
            .apps
            .get(id)
            .and_then(|versions| versions.get(version).cloned()))
    }
}

/// Framework id held in memory
#[derive(Debug, Default)]
pub struct InMemoryFrameworkIdStore {
    id: RwLock<Option<FrameworkId>>,
}

impl InMemoryFrameworkIdStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(id: FrameworkId) -> Self {
        Self {
            id: RwLock::new(Some(id)),
        }
    }

    pub fn store(&self, id: FrameworkId) {
        *self
            .id
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(id);
    }
}

#[async_trait]
impl FrameworkIdStore for InMemoryFrameworkIdStore {
    async fn fetch(&self) -> RepositoryResult<Option<FrameworkId>> {
        Ok(self
            .id
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }
}
