//! Drover Scheduler - Leader-elected control plane core
//!
//! Several redundant scheduler instances run side by side; exactly one of
//! them leads and drives the cluster manager. This crate holds the pieces
//! that make that work:
//!
//! - [`LeaderElector`]: candidacy, election callbacks and abdication
//! - [`DriverLifecycleManager`]: the single-use driver handle and its restarts
//! - [`ReconciliationScheduler`]: periodic task reconciliation while leading
//! - [`DeploymentCoordinator`]: application operations routed through the
//!   command-processing actor
//! - [`PortAllocator`]: cluster-unique auto ports
//! - [`SchedulerService`]: the lifecycle tying everything together
//!
//! ## Example
//!
//! ```rust,ignore
//! use drover_scheduler::{memory, MailboxActor, SchedulerConfig, SchedulerServiceBuilder};
//! use std::sync::Arc;
//!
//! let (actor, mailbox) = MailboxActor::channel(1024);
//! let service = SchedulerServiceBuilder::new(SchedulerConfig::default())
//!     .with_driver_factory(Arc::new(memory::LocalDriverFactory::new()))
//!     .with_command_actor(Arc::new(actor))
//!     .with_app_repository(Arc::new(memory::InMemoryAppRepository::new()))
//!     .with_health_check_manager(Arc::new(memory::InMemoryHealthCheckManager::new()))
//!     .with_framework_id_store(Arc::new(memory::InMemoryFrameworkIdStore::new()))
//!     .build()?;
//!
//! service.start_up().await?;
//! service.run().await?;
//! ```

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod actor;
pub mod backend;
pub mod builder;
pub mod config;
pub mod coordinator;
pub mod driver;
pub mod elector;
pub mod error;
pub mod health;
pub mod leadership;
pub mod memory;
pub mod ports;
pub mod reconciliation;
pub mod repository;
pub mod service;

pub use actor::{CommandActor, CommandEnvelope, MailboxActor};
pub use backend::{Abdication, BackendError, Candidate, CoordinationBackend};
pub use builder::SchedulerServiceBuilder;
pub use config::SchedulerConfig;
pub use coordinator::{DeploymentCoordinator, PendingCompletion};
pub use driver::{
    DriverError, DriverExit, DriverFactory, DriverLifecycleManager, DriverStatus, SchedulerDriver,
};
pub use elector::LeaderElector;
pub use error::{Result, SchedulerError};
pub use health::HealthCheckManager;
pub use leadership::Leadership;
pub use ports::{PortAllocator, PortLease};
pub use reconciliation::ReconciliationScheduler;
pub use repository::{AppRepository, FrameworkIdStore, RepositoryError, RepositoryResult};
pub use service::{SchedulerService, ServiceState};
