//! Leader election and the driver restarts it drives
//!
//! The elector is the only place that flips [`Leadership`]. Every transition
//! (elect, defeat, reaction to a driver-loop exit) runs under one transition
//! lock, so at most one driver loop is ever active in this process.
//!
//! Candidacy ends whenever leadership is lost. While the service is running a
//! defeated instance offers itself again after a short back-off.

use crate::backend::{Abdication, Candidate, CoordinationBackend};
use crate::config::SchedulerConfig;
use crate::driver::{DriverExit, DriverLifecycleManager};
use crate::health::HealthCheckManager;
use crate::leadership::Leadership;
use crate::repository::AppRepository;
use async_trait::async_trait;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Manages candidacy and reacts to election outcomes
pub struct LeaderElector {
    this: Weak<LeaderElector>,
    address: String,
    reoffer_backoff: Duration,
    leadership: Arc<Leadership>,
    driver: Arc<DriverLifecycleManager>,
    backend: Option<Arc<dyn CoordinationBackend>>,
    repository: Arc<dyn AppRepository>,
    health: Arc<dyn HealthCheckManager>,
    /// Cancelled once the service is shutting down
    shutdown: CancellationToken,
    abdication: Mutex<Option<Arc<dyn Abdication>>>,
    transition: tokio::sync::Mutex<()>,
    registration: tokio::sync::Mutex<()>,
}

impl LeaderElector {
    pub fn new(
        config: &SchedulerConfig,
        leadership: Arc<Leadership>,
        driver: Arc<DriverLifecycleManager>,
        backend: Option<Arc<dyn CoordinationBackend>>,
        repository: Arc<dyn AppRepository>,
        health: Arc<dyn HealthCheckManager>,
        shutdown: CancellationToken,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            address: config.advertised_address(),
            reoffer_backoff: config.leader_reoffer_backoff(),
            leadership,
            driver,
            backend,
            repository,
            health,
            shutdown,
            abdication: Mutex::new(None),
            transition: tokio::sync::Mutex::new(()),
            registration: tokio::sync::Mutex::new(()),
        })
    }

    pub fn is_leader(&self) -> bool {
        self.leadership.is_leader()
    }

    pub fn has_backend(&self) -> bool {
        self.backend.is_some()
    }

    /// Enter the election.
    ///
    /// With a backend this only registers the candidacy; the outcome arrives
    /// through [`Candidate`]. Without one this instance elects itself.
    #[instrument(skip(self), fields(address = %self.address))]
    pub async fn offer_leadership(&self) {
        let Some(backend) = &self.backend else {
            info!("No coordination backend, electing self");
            self.elect(None).await;
            return;
        };

        let _registration = self.registration.lock().await;
        let Some(candidate) = self.this.upgrade() else {
            return;
        };

        info!("Offering leadership");
        if let Err(e) = backend.offer_leadership(candidate).await {
            error!(error = %e, "Candidacy registration failed, staying follower");
        }
    }

    /// Give up leadership voluntarily.
    ///
    /// Returns once the driver has stopped.
    #[instrument(skip(self))]
    pub async fn abdicate_leadership(&self) {
        let abdication = self.lock_abdication().take();
        if let Some(abdication) = abdication {
            info!("Abdicating through coordination backend");
            abdication.abdicate().await;
        }
        self.defeat(None).await;
    }

    /// Drop leadership for good as part of shutdown.
    pub async fn relinquish(&self) {
        let abdication = self.lock_abdication().take();
        self.defeat(None).await;
        if let Some(abdication) = abdication {
            abdication.abdicate().await;
        }
    }

    /// Advertised address of the current leader
    pub async fn current_leader(&self) -> Option<String> {
        if self.leadership.is_leader() {
            return Some(self.address.clone());
        }
        match &self.backend {
            Some(backend) => backend.leader_data().await,
            None => None,
        }
    }

    async fn elect(&self, abdication: Option<Arc<dyn Abdication>>) {
        let transition = self.transition.lock().await;

        if self.shutdown.is_cancelled() {
            drop(transition);
            warn!("Elected while shutting down, giving leadership back");
            if let Some(abdication) = abdication {
                // the backend may still be inside this election callback
                tokio::spawn(async move { abdication.abdicate().await });
            }
            return;
        }

        if !self.leadership.elect() {
            if abdication.is_some() {
                warn!("Elected for a new term while already leading, keeping the newer term");
                *self.lock_abdication() = abdication;
            } else {
                warn!("Elected while already leading, ignoring");
            }
            return;
        }
        *self.lock_abdication() = abdication;

        let generation = match self.driver.start(self.exit_hook()).await {
            Ok(generation) => generation,
            Err(e) => {
                warn!(error = %e, "Current driver handle unusable, replacing it");
                self.driver.stop().await;
                match self.driver.start(self.exit_hook()).await {
                    Ok(generation) => generation,
                    Err(e) => {
                        error!(error = %e, "Could not start driver after election");
                        return;
                    }
                }
            }
        };
        drop(transition);

        info!(generation, "Elected leader, driver started");
        self.spawn_health_reconciliation();
    }

    /// Clear leadership and stop the driver.
    ///
    /// With `generation` set this only acts while that driver generation is
    /// still current.
    async fn defeat(&self, generation: Option<u64>) {
        let transition = self.transition.lock().await;

        if let Some(generation) = generation {
            if !self.driver.is_current(generation) {
                debug!(generation, "Driver loop ended after stop");
                return;
            }
        }

        let was_leader = self.leadership.defeat();
        self.lock_abdication().take();
        if was_leader {
            info!("Lost leadership, stopping driver");
        } else {
            debug!("Defeat while not leading");
        }
        self.driver.stop().await;
        drop(transition);

        if was_leader {
            self.schedule_reoffer();
        }
    }

    fn exit_hook(&self) -> impl FnOnce(DriverExit) -> BoxedTask + Send + 'static {
        let this = self.this.clone();
        move |exit| -> BoxedTask {
            match this.upgrade() {
                Some(elector) => elector.handle_driver_exit(exit),
                None => Box::pin(async {}),
            }
        }
    }

    fn handle_driver_exit(self: Arc<Self>, exit: DriverExit) -> BoxedTask {
        Box::pin(async move {
            if let Err(reason) = &exit.outcome {
                warn!(generation = exit.generation, reason = %reason, "Driver failed while leading");
            }

            let transition = self.transition.lock().await;
            if !self.driver.is_current(exit.generation) {
                debug!(generation = exit.generation, "Driver loop ended after stop");
                return;
            }
            let abdication = self.lock_abdication().take();
            drop(transition);

            match abdication {
                Some(abdication) => {
                    info!(generation = exit.generation, "Driver exited, abdicating");
                    abdication.abdicate().await;
                }
                None => self.defeat(Some(exit.generation)).await,
            }
        })
    }

    fn schedule_reoffer(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        if let Some(this) = self.this.upgrade() {
            tokio::spawn(Self::reoffer(this));
        }
    }

    fn reoffer(self: Arc<Self>) -> BoxedTask {
        Box::pin(async move {
            tokio::select! {
                _ = self.shutdown.cancelled() => return,
                _ = tokio::time::sleep(self.reoffer_backoff) => {}
            }
            info!("Offering leadership again");
            self.offer_leadership().await;
        })
    }

    fn spawn_health_reconciliation(&self) {
        let repository = self.repository.clone();
        let health = self.health.clone();
        tokio::spawn(async move {
            match repository.list_apps().await {
                Ok(apps) => {
                    for app in &apps {
                        health.reconcile_with(app).await;
                    }
                    debug!(apps = apps.len(), "Health checks reconciled");
                }
                Err(e) => warn!(error = %e, "Could not list apps for health check reconciliation"),
            }
        });
    }

    fn lock_abdication(&self) -> MutexGuard<'_, Option<Arc<dyn Abdication>>> {
        self.abdication.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Candidate for LeaderElector {
    fn advertised_address(&self) -> String {
        self.address.clone()
    }

    async fn on_elected(&self, abdication: Arc<dyn Abdication>) {
        self.elect(Some(abdication)).await;
    }

    async fn on_defeated(&self) {
        self.defeat(None).await;
    }
}
