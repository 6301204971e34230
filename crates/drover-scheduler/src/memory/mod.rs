//! In-memory implementations of the scheduler's collaborators
//!
//! These are suitable for development and testing. Production deployments
//! plug in a real cluster driver, coordination service and persistent
//! repositories.

mod coordinator;
mod driver;
mod health;
mod repository;

pub use coordinator::InMemoryCoordinator;
pub use driver::{LocalDriver, LocalDriverFactory};
pub use health::InMemoryHealthCheckManager;
pub use repository::{InMemoryAppRepository, InMemoryFrameworkIdStore};
