//! Drover Types - Core types for the scheduler control plane
//!
//! Drover is a leader-elected scheduler that drives a resource-offering
//! cluster manager on behalf of declared applications. This crate holds the
//! vocabulary shared by the control plane and its collaborators.
//!
//! ## Key Concepts
//!
//! - **AppDefinition**: Desired state of an application (command, resources, ports, instances)
//! - **TaskId**: A single running copy of an application on the cluster
//! - **FrameworkId**: Identity of this scheduler towards the cluster manager
//! - **SchedulerCommand**: Work handed to the command-processing actor
//! - **ActorMessage**: Everything the actor can answer with

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod app;
pub mod command;
pub mod error;
pub mod ids;

// Re-export main types
pub use app::{AppDefinition, AppUpdate, AUTO_PORT};
pub use command::{ActorMessage, DeploymentPlan, SchedulerCommand, UpgradeStrategy};
pub use error::{Result, TypesError};
pub use ids::{AppId, CorrelationId, DeploymentId, FrameworkId, TaskId};
