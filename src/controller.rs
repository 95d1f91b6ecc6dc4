//! Lifecycle of the vendor and customer schedules.
//!
//! Each group lives in its own [`ScheduledPool`] with a child of the
//! process-wide cancel token. A group slot records what the group was started
//! with, so the config watcher can tell when another process changed a rate,
//! the vendor list, or asked for a restart, and restart just that group.
//!
//! A group is always drained with its slot unlocked, so readers of the slot
//! never wait out a grace period.

use crate::config::{
    self, ConfigKey, EngineSettings, SystemConfig, SystemStatus, period_from_secs,
};
pub use crate::config::Group;
use crate::customer::CustomerGenerator;
use crate::error::{Error, Result};
use crate::market::Market;
use crate::scheduler::{CancelToken, ScheduledPool, ShutdownReport};
use crate::storage::VendorDirectory;
use crate::vendor::{Vendor, VendorAgent};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::sync::{Arc, Weak};
use std::time::Duration;

struct VendorSchedule {
    pool: ScheduledPool,
    release_rate: i64,
    vendors: Vec<Vendor>,
    generation: u64,
}

struct CustomerSchedule {
    pool: ScheduledPool,
    retrieval_rate: i64,
    generation: u64,
}

pub struct Controller {
    market: Arc<Market>,
    directory: Arc<dyn VendorDirectory>,
    settings: EngineSettings,
    root: CancelToken,
    vendors: Mutex<Option<VendorSchedule>>,
    customers: Mutex<Option<CustomerSchedule>>,
    watcher: Mutex<Option<ScheduledPool>>,
}

impl Controller {
    pub fn new(
        market: Arc<Market>,
        directory: Arc<dyn VendorDirectory>,
        settings: EngineSettings,
    ) -> Arc<Self> {
        Arc::new(Controller {
            market,
            directory,
            settings,
            root: CancelToken::new(),
            vendors: Mutex::new(None),
            customers: Mutex::new(None),
            watcher: Mutex::new(None),
        })
    }

    pub fn market(&self) -> &Arc<Market> {
        &self.market
    }

    pub fn directory(&self) -> &dyn VendorDirectory {
        self.directory.as_ref()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Bring the engine up in the persisted state and start the config watcher
    pub fn boot(self: &Arc<Self>) -> Result<SystemStatus> {
        let status = self.market.status()?;
        if status.is_running() {
            self.start_groups()?;
        }
        self.start_watcher()?;
        tracing::info!(status = %status, "Engine booted");
        Ok(status)
    }

    /// Persist `Running` and start whichever groups are not already running
    pub fn start(&self) -> Result<()> {
        self.ensure_open()?;
        self.market
            .config()
            .set(ConfigKey::SystemStatus, SystemStatus::Running.as_value())?;
        self.start_groups()?;
        tracing::info!("System started");
        Ok(())
    }

    /// Persist `Stopped` and stop both groups. Never fails; a status write
    /// error is logged and the groups are stopped anyway.
    pub fn stop(&self) {
        if let Err(e) = self
            .market
            .config()
            .set(ConfigKey::SystemStatus, SystemStatus::Stopped.as_value())
        {
            tracing::error!(error = %e, "Failed to persist stopped status");
        }
        self.stop_group(Group::Vendors);
        self.stop_group(Group::Customers);
        tracing::info!("System stopped");
    }

    /// Stop one group, waiting out its grace period, then start it again if
    /// the system is running. The other group is untouched.
    pub fn restart(&self, group: Group) -> Result<()> {
        self.ensure_open()?;
        let running = self.market.status()?.is_running();
        self.stop_group(group);
        if running {
            self.start_group(group)?;
        }
        tracing::info!(group = %group, running, "Group restarted");
        Ok(())
    }

    /// Persist `Running` and restart both groups
    pub fn restart_all(&self) -> Result<()> {
        self.ensure_open()?;
        self.market
            .config()
            .set(ConfigKey::SystemStatus, SystemStatus::Running.as_value())?;
        self.restart(Group::Vendors)?;
        self.restart(Group::Customers)
    }

    /// Persisted run state
    pub fn status(&self) -> Result<SystemStatus> {
        self.market.status()
    }

    pub fn is_group_running(&self, group: Group) -> bool {
        match group {
            Group::Vendors => self.vendors.lock().is_some(),
            Group::Customers => self.customers.lock().is_some(),
        }
    }

    /// Names of the vendor jobs currently scheduled
    pub fn vendor_jobs(&self) -> Vec<String> {
        self.vendors
            .lock()
            .as_ref()
            .map(|schedule| schedule.pool.job_names())
            .unwrap_or_default()
    }

    /// Cancel the process-wide token and stop everything, watcher included.
    /// The persisted status is left alone so the next boot resumes it.
    pub fn shutdown(&self) {
        if !self.root.cancel() {
            return;
        }
        if let Some(mut watcher) = self.watcher.lock().take() {
            watcher.shutdown(self.settings.grace_period);
        }
        self.stop_group(Group::Vendors);
        self.stop_group(Group::Customers);
        tracing::info!("Engine shut down");
    }

    pub fn set_total_tickets(&self, total_tickets: i64) -> Result<bool> {
        let accepted = refused_as_false(self.market.pool().set_total_tickets(total_tickets))?;
        if accepted {
            tracing::info!(total = total_tickets, "Total tickets updated");
        }
        Ok(accepted)
    }

    pub fn set_max_capacity(&self, max_capacity: i64) -> Result<bool> {
        let accepted = refused_as_false(self.market.pool().set_max_capacity(max_capacity))?;
        if accepted {
            tracing::info!(max_capacity, "Max ticket capacity updated");
        }
        Ok(accepted)
    }

    pub fn set_ticket_release_rate(&self, secs: i64) -> Result<bool> {
        if !refused_as_false(config::check_release_rate(secs))? {
            return Ok(false);
        }
        self.market.config().set(ConfigKey::TicketReleaseRate, secs)?;
        tracing::info!(secs, "Ticket release rate updated");
        self.restart(Group::Vendors)?;
        Ok(true)
    }

    pub fn set_customer_retrieval_rate(&self, secs: i64) -> Result<bool> {
        if !refused_as_false(config::check_retrieval_rate(secs))? {
            return Ok(false);
        }
        self.market
            .config()
            .set(ConfigKey::CustomerRetrievalRate, secs)?;
        tracing::info!(secs, "Customer retrieval rate updated");
        self.restart(Group::Customers)?;
        Ok(true)
    }

    /// Bring the running groups in line with the durable config.
    ///
    /// Starts or stops groups to match `system_status` and restarts a group
    /// whose rate, vendor list or restart generation no longer matches what
    /// it was started with.
    pub(crate) fn reconcile(&self) -> Result<()> {
        if self.root.is_cancelled() {
            return Ok(());
        }
        let store = self.market.config();
        let cfg = SystemConfig::load(store)?;
        let wanted = cfg.system_status.is_running();

        if let Err(e) = self.market.pool().reload() {
            tracing::warn!(error = %e, "Pool reload refused");
        }

        let vendors = self.directory.list_active()?;
        let generation = store.restart_generation(Group::Vendors)?;
        let outdated = {
            let mut slot = self.vendors.lock();
            let stale = slot.as_ref().is_some_and(|schedule| {
                schedule.release_rate != cfg.ticket_release_rate
                    || schedule.vendors != vendors
                    || schedule.generation != generation
            });
            if stale || !wanted {
                slot.take()
            } else {
                None
            }
        };
        if let Some(schedule) = outdated {
            tracing::info!(group = "vendors", running = wanted, "Config changed, stopping group");
            self.drain(Group::Vendors, schedule.pool);
        }
        if wanted {
            self.start_group(Group::Vendors)?;
        }

        let generation = store.restart_generation(Group::Customers)?;
        let outdated = {
            let mut slot = self.customers.lock();
            let stale = slot.as_ref().is_some_and(|schedule| {
                schedule.retrieval_rate != cfg.customer_retrieval_rate
                    || schedule.generation != generation
            });
            if stale || !wanted {
                slot.take()
            } else {
                None
            }
        };
        if let Some(schedule) = outdated {
            tracing::info!(group = "customers", running = wanted, "Config changed, stopping group");
            self.drain(Group::Customers, schedule.pool);
        }
        if wanted {
            self.start_group(Group::Customers)?;
        }
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.root.is_cancelled() {
            return Err(Error::Scheduler("engine is shut down".into()));
        }
        Ok(())
    }

    fn start_groups(&self) -> Result<()> {
        for group in Group::ALL {
            self.start_group(group)?;
        }
        Ok(())
    }

    /// Launch `group` unless it is already scheduled
    fn start_group(&self, group: Group) -> Result<()> {
        match group {
            Group::Vendors => {
                let mut slot = self.vendors.lock();
                if slot.is_none() {
                    *slot = Some(self.launch_vendors()?);
                }
            }
            Group::Customers => {
                let mut slot = self.customers.lock();
                if slot.is_none() {
                    *slot = Some(self.launch_customers()?);
                }
            }
        }
        Ok(())
    }

    fn stop_group(&self, group: Group) {
        let pool = match group {
            Group::Vendors => self.vendors.lock().take().map(|s| s.pool),
            Group::Customers => self.customers.lock().take().map(|s| s.pool),
        };
        if let Some(pool) = pool {
            self.drain(group, pool);
        }
    }

    fn drain(&self, group: Group, mut pool: ScheduledPool) {
        match pool.shutdown(self.settings.grace_period) {
            ShutdownReport::Drained | ShutdownReport::AlreadyStopped => {
                tracing::debug!(group = %group, "Group stopped");
            }
            ShutdownReport::Abandoned(workers) => {
                tracing::warn!(group = %group, workers, "Group force-stopped after grace period");
            }
        }
    }

    fn launch_vendors(&self) -> Result<VendorSchedule> {
        let generation = self.market.config().restart_generation(Group::Vendors)?;
        let release_rate = self.market.config().get(ConfigKey::TicketReleaseRate)?;
        let vendors = self.directory.list_active()?;
        let pool = ScheduledPool::new("vendor", self.settings.vendor_workers, self.root.child())?;

        for vendor in &vendors {
            let agent = match VendorAgent::new(vendor.clone(), self.market.clone()) {
                Ok(agent) => agent,
                Err(e) => {
                    tracing::error!(vendor_id = vendor.id, error = %e, "Vendor not scheduled");
                    continue;
                }
            };
            let period = agent.period();
            pool.schedule_at_fixed_rate(
                format!("vendor-{}", vendor.id),
                Duration::ZERO,
                period,
                move || agent.run_once(),
            )?;
            tracing::debug!(
                vendor_id = vendor.id,
                period_secs = period.as_secs(),
                "Vendor scheduled"
            );
        }

        tracing::info!(group = "vendors", jobs = pool.job_count(), "Group started");
        Ok(VendorSchedule {
            pool,
            release_rate,
            vendors,
            generation,
        })
    }

    fn launch_customers(&self) -> Result<CustomerSchedule> {
        let generation = self.market.config().restart_generation(Group::Customers)?;
        let retrieval_rate = self.market.config().get(ConfigKey::CustomerRetrievalRate)?;
        let cancel = self.root.child();
        let pool = ScheduledPool::new("customer", 1, cancel.clone())?;

        let generator = Mutex::new(CustomerGenerator::new(
            self.market.clone(),
            self.settings.customers_per_tick,
            self.settings.max_waiting,
            StdRng::from_entropy(),
            cancel,
        ));
        let period = period_from_secs(retrieval_rate);
        pool.schedule_at_fixed_rate("customer-generator", Duration::ZERO, period, move || {
            // Dispatched customers run detached; cancellation reaches them
            // through the group token
            let _ = generator.lock().tick();
        })?;

        tracing::info!(
            group = "customers",
            period_secs = period.as_secs(),
            "Group started"
        );
        Ok(CustomerSchedule {
            pool,
            retrieval_rate,
            generation,
        })
    }

    fn start_watcher(self: &Arc<Self>) -> Result<()> {
        let mut slot = self.watcher.lock();
        if slot.is_some() {
            return Ok(());
        }

        let pool = ScheduledPool::new("config-watch", 1, self.root.child())?;
        let controller: Weak<Controller> = Arc::downgrade(self);
        let interval = self.settings.watch_interval;
        pool.schedule_at_fixed_rate("config-watch", interval, interval, move || {
            let Some(controller) = controller.upgrade() else {
                return;
            };
            if let Err(e) = controller.reconcile() {
                tracing::error!(error = %e, "Config watch failed");
            }
        })?;

        *slot = Some(pool);
        Ok(())
    }
}

/// Turn a validation refusal into `Ok(false)` with a warning
fn refused_as_false(result: Result<()>) -> Result<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(Error::InvalidConfig(reason)) => {
            tracing::warn!(%reason, "Invalid configuration");
            Ok(false)
        }
        Err(e) => Err(e),
    }
}
