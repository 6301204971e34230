//! Read-only views of persisted state used by the control plane

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drover_types::{AppDefinition, AppId, FrameworkId};
use thiserror::Error;

/// Repository errors
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for repository queries
pub type RepositoryResult<T> = std::result::Result<T, RepositoryError>;

/// Application definitions known to the cluster
#[async_trait]
pub trait AppRepository: Send + Sync {
    /// Latest version of every application
    async fn list_apps(&self) -> RepositoryResult<Vec<AppDefinition>>;

    /// Ids of all applications
    async fn list_ids(&self) -> RepositoryResult<Vec<AppId>> {
        Ok(self.list_apps().await?.into_iter().map(|app| app.id).collect())
    }

    /// All stored version timestamps of an application, oldest first
    async fn list_versions(&self, id: &AppId) -> RepositoryResult<Vec<DateTime<Utc>>>;

    /// Latest version of an application
    async fn get_app(&self, id: &AppId) -> RepositoryResult<Option<AppDefinition>>;

    /// A specific version of an application
    async fn get_app_version(
        &self,
        id: &AppId,
        version: &DateTime<Utc>,
    ) -> RepositoryResult<Option<AppDefinition>>;
}

/// Storage for the framework id assigned by the cluster manager
#[async_trait]
pub trait FrameworkIdStore: Send + Sync {
    async fn fetch(&self) -> RepositoryResult<Option<FrameworkId>>;
}
