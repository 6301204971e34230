//! Strongly-typed identifiers for Drover entities
//!
//! Application ids are hierarchical paths (`/group/app`); task ids embed the
//! application they belong to; the remaining ids are UUID-based newtypes.

use crate::error::{Result, TypesError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier of an application, an absolute path such as `/product/frontend`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Parse and normalize an application id.
    ///
    /// A missing leading slash is added; empty segments and characters
    /// outside `[a-z0-9-._]` are rejected.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let raw = id.as_ref().trim();
        let path = raw.trim_start_matches('/');
        let valid = !path.is_empty()
            && path.split('/').all(|segment| {
                !segment.is_empty()
                    && segment.chars().all(|c| {
                        c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.' | '_')
                    })
            });

        if !valid {
            return Err(TypesError::InvalidAppId(raw.to_string()));
        }

        Ok(Self(format!("/{}", path)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Path segments without the leading slash
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.trim_start_matches('/').split('/')
    }

    /// Form usable inside task ids: `/product/frontend` becomes `product_frontend`
    pub fn safe_path(&self) -> String {
        self.segments().collect::<Vec<_>>().join("_")
    }
}

impl FromStr for AppId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for AppId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a task: `<app safe path>.<uuid>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(String);

impl TaskId {
    /// Generate a fresh task id for an application
    pub fn for_app(app_id: &AppId) -> Self {
        Self(format!("{}.{}", app_id.safe_path(), Uuid::new_v4()))
    }

    /// Wrap a task id reported by the cluster manager
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        match id.rsplit_once('.') {
            Some((prefix, suffix)) if !prefix.is_empty() && !suffix.is_empty() => Ok(Self(id)),
            _ => Err(TypesError::InvalidTaskId(id)),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The application part of the id, in safe-path form
    pub fn app_safe_path(&self) -> &str {
        self.0.rsplit_once('.').map(|(prefix, _)| prefix).unwrap_or(&self.0)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of this scheduler towards the cluster manager.
///
/// Assigned by the cluster manager on first registration and reused on
/// every failover so running tasks stay attached to the framework.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameworkId(String);

impl FrameworkId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FrameworkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "framework:{}", self.0)
    }
}

/// Unique identifier for a deployment plan
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeploymentId(Uuid);

impl DeploymentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for DeploymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deploy:{}", self.0)
    }
}

/// Correlates a submitted command with the reply channel registered for it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cmd:{}", self.0)
    }
}
