//! Error types for Drover core types

use thiserror::Error;

/// Validation errors raised by the core types
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid app id '{0}': must be a non-empty path of [a-z0-9-._] segments")]
    InvalidAppId(String),

    #[error("Invalid task id '{0}'")]
    InvalidTaskId(String),

    #[error("Invalid app definition {app_id}: {reason}")]
    InvalidApp { app_id: String, reason: String },
}

/// Result type for type validation
pub type Result<T> = std::result::Result<T, TypesError>;
