//! Cluster-unique port assignment for auto ports
//!
//! A port counts as used when any stored version of any application carries
//! it, when the requesting application already lists it as a fixed port, or
//! when an allocation of this process reserved it and its lease is still
//! alive.

use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::repository::AppRepository;
use dashmap::DashSet;
use drover_types::{AppDefinition, AUTO_PORT};
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Assigns free ports from `[min, max)` to auto ports
pub struct PortAllocator {
    min: u32,
    max: u32,
    repository: Arc<dyn AppRepository>,
    reserved: Arc<DashSet<u32>>,
    /// Serializes scan, pick and reserve
    gate: Mutex<()>,
}

impl PortAllocator {
    pub fn new(config: &SchedulerConfig, repository: Arc<dyn AppRepository>) -> Self {
        Self {
            min: config.local_port_min,
            max: config.local_port_max,
            repository,
            reserved: Arc::new(DashSet::new()),
            gate: Mutex::new(()),
        }
    }

    pub fn range_size(&self) -> usize {
        self.max.saturating_sub(self.min) as usize
    }

    /// Ports currently held by live leases, sorted
    pub fn reserved(&self) -> Vec<u32> {
        let mut ports: Vec<u32> = self.reserved.iter().map(|p| *p).collect();
        ports.sort_unstable();
        ports
    }

    /// Replace every auto port of `app` with a free port.
    ///
    /// Either all auto ports are assigned or none is. The returned lease
    /// keeps the picked ports reserved until it is dropped.
    #[instrument(skip(self, app), fields(app_id = %app.id))]
    pub async fn allocate(&self, app: AppDefinition) -> Result<PortLease> {
        let requested = app.auto_port_count();
        if requested == 0 {
            return Ok(PortLease {
                app,
                reserved: Vec::new(),
                registry: self.reserved.clone(),
            });
        }

        let _gate = self.gate.lock().await;

        let mut used: HashSet<u32> = self.reserved.iter().map(|p| *p).collect();
        used.extend(self.ports_in_use().await?);
        used.extend(app.assigned_ports());
        let used_in_range = used
            .iter()
            .filter(|p| (self.min..self.max).contains(*p))
            .count();

        if self.range_size() < used_in_range + requested {
            warn!(
                min = self.min,
                max = self.max,
                used = used_in_range,
                requested,
                "Port range exhausted"
            );
            return Err(SchedulerError::PortRangeExhausted {
                min: self.min,
                max: self.max,
                used: used_in_range,
                requested,
            });
        }

        let picked = self.pick(&mut used, requested);
        for port in &picked {
            self.reserved.insert(*port);
        }

        let mut next = picked.iter().copied();
        let mut app = app;
        app.ports = app
            .ports
            .iter()
            .map(|port| match *port {
                AUTO_PORT => next.next().unwrap_or(AUTO_PORT),
                fixed => fixed,
            })
            .collect();

        info!(ports = ?app.ports, "Assigned service ports");

        Ok(PortLease {
            app,
            reserved: picked,
            registry: self.reserved.clone(),
        })
    }

    /// Uniform sampling with rejection of taken values
    fn pick(&self, used: &mut HashSet<u32>, count: usize) -> Vec<u32> {
        let mut rng = rand::thread_rng();
        let mut picked = Vec::with_capacity(count);
        while picked.len() < count {
            let candidate = rng.gen_range(self.min..self.max);
            if used.insert(candidate) {
                picked.push(candidate);
            }
        }
        picked
    }

    async fn ports_in_use(&self) -> Result<HashSet<u32>> {
        let mut used = HashSet::new();
        for id in self.repository.list_ids().await? {
            for version in self.repository.list_versions(&id).await? {
                if let Some(app) = self.repository.get_app_version(&id, &version).await? {
                    used.extend(app.assigned_ports());
                }
            }
        }
        debug!(count = used.len(), "Ports used by stored applications");
        Ok(used)
    }
}

/// Reservation of freshly assigned ports
#[derive(Debug)]
pub struct PortLease {
    app: AppDefinition,
    reserved: Vec<u32>,
    registry: Arc<DashSet<u32>>,
}

impl PortLease {
    /// Application with all auto ports replaced
    pub fn app(&self) -> &AppDefinition {
        &self.app
    }

    /// Ports picked by this allocation
    pub fn assigned(&self) -> &[u32] {
        &self.reserved
    }

    /// Keep the picked ports reserved for the lifetime of the allocator
    pub fn keep(mut self) {
        self.reserved.clear();
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        for port in &self.reserved {
            self.registry.remove(port);
        }
    }
}
