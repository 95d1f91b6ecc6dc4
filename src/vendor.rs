//! Vendors: producers that release a fixed batch of tickets on a timer.

use crate::config::{ConfigKey, period_from_secs};
use crate::error::{Error, Result};
use crate::market::Market;
use std::sync::Arc;
use std::time::Duration;

/// A vendor record as kept in the vendor directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vendor {
    pub id: i64,
    pub name: String,
    pub tickets_per_release: u32,
    pub release_rate_secs: u32,
}

impl Vendor {
    /// Check that every field has been set. Zero / empty means unset.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();
        if self.id == 0 {
            missing.push("id");
        }
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.tickets_per_release == 0 {
            missing.push("tickets_per_release");
        }
        if self.release_rate_secs == 0 {
            missing.push("release_rate_secs");
        }

        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::VendorMisconfigured(format!(
                "vendor {} is missing {}",
                self.id,
                missing.join(", ")
            )))
        }
    }

    /// The global release rate is a floor: it can slow a vendor down but
    /// never speed it up.
    pub fn effective_release_rate(&self, global_floor: i64) -> i64 {
        global_floor.max(i64::from(self.release_rate_secs))
    }

    pub fn release_message(&self) -> String {
        format!(
            "Add {} tickets into ticket pool [ID - {}] Vendor {}",
            self.tickets_per_release, self.id, self.name
        )
    }
}

/// What one vendor firing did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// System is stopped; nothing attempted
    Inactive,
    /// Batch added to the pool
    Released(u32),
    /// Batch did not fit; retried next period
    PoolFull,
}

/// A validated vendor bound to the market it releases into
pub struct VendorAgent {
    vendor: Vendor,
    market: Arc<Market>,
    period: Duration,
}

impl VendorAgent {
    /// Validate the vendor and compute its schedule from the current global floor
    pub fn new(vendor: Vendor, market: Arc<Market>) -> Result<Self> {
        vendor.validate()?;
        let floor = market.config().get(ConfigKey::TicketReleaseRate)?;
        let period = period_from_secs(vendor.effective_release_rate(floor));
        Ok(VendorAgent {
            vendor,
            market,
            period,
        })
    }

    pub fn vendor(&self) -> &Vendor {
        &self.vendor
    }

    /// Period this agent is scheduled at
    pub fn period(&self) -> Duration {
        self.period
    }

    /// One scheduled firing
    pub fn tick(&self) -> Result<ReleaseOutcome> {
        if !self.market.is_active()? {
            return Ok(ReleaseOutcome::Inactive);
        }

        let floor = self.market.config().get(ConfigKey::TicketReleaseRate)?;
        let effective = period_from_secs(self.vendor.effective_release_rate(floor));
        if effective != self.period {
            tracing::debug!(
                vendor_id = self.vendor.id,
                scheduled_secs = self.period.as_secs(),
                effective_secs = effective.as_secs(),
                "Release rate changed, applies after the vendor group restarts"
            );
        }

        let pool = self.market.pool();
        pool.refresh()?;

        if !pool.add_tickets(self.vendor.tickets_per_release)? {
            return Ok(ReleaseOutcome::PoolFull);
        }

        if let Err(e) = self.market.ledger().append(&self.vendor.release_message()) {
            tracing::warn!(vendor_id = self.vendor.id, error = %e, "Failed to record release");
        }

        Ok(ReleaseOutcome::Released(self.vendor.tickets_per_release))
    }

    /// Scheduler entry point: run one firing and log the result
    pub fn run_once(&self) {
        match self.tick() {
            Ok(ReleaseOutcome::Released(n)) => tracing::info!(
                vendor_id = self.vendor.id,
                vendor = %self.vendor.name,
                tickets = n,
                total = self.market.pool().snapshot().total_tickets,
                "Vendor released tickets"
            ),
            Ok(ReleaseOutcome::PoolFull) => tracing::debug!(
                vendor_id = self.vendor.id,
                tickets = self.vendor.tickets_per_release,
                "Pool full, release skipped"
            ),
            Ok(ReleaseOutcome::Inactive) => {}
            Err(e) => tracing::error!(
                vendor_id = self.vendor.id,
                error = %e,
                "Vendor tick failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{ConfigStore, SalesLedger, Storage};

    fn vendor(id: i64, tickets: u32, rate: u32) -> Vendor {
        Vendor {
            id,
            name: format!("vendor-{id}"),
            tickets_per_release: tickets,
            release_rate_secs: rate,
        }
    }

    fn market(total: i64, max: i64, active: bool) -> (Arc<Storage>, Arc<Market>) {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        store.set(ConfigKey::MaxTicketCapacity, max).unwrap();
        store.set(ConfigKey::TotalTickets, total).unwrap();
        store.set(ConfigKey::TicketReleaseRate, 1).unwrap();
        store
            .set(ConfigKey::SystemStatus, i64::from(active))
            .unwrap();
        let market = Arc::new(Market::open(store.clone(), store.clone()).unwrap());
        (store, market)
    }

    #[test]
    fn test_validate_reports_missing_fields() {
        assert!(vendor(1, 5, 10).validate().is_ok());

        let blank = Vendor {
            id: 0,
            name: String::new(),
            tickets_per_release: 0,
            release_rate_secs: 0,
        };
        match blank.validate() {
            Err(Error::VendorMisconfigured(msg)) => {
                assert!(msg.contains("id"));
                assert!(msg.contains("name"));
                assert!(msg.contains("tickets_per_release"));
                assert!(msg.contains("release_rate_secs"));
            }
            other => panic!("expected VendorMisconfigured, got {other:?}"),
        }
    }

    #[test]
    fn test_effective_rate_uses_global_floor() {
        let v = vendor(1, 5, 10);
        assert_eq!(v.effective_release_rate(60), 60);
        assert_eq!(v.effective_release_rate(3), 10);
        assert_eq!(v.effective_release_rate(0), 10);
    }

    #[test]
    fn test_misconfigured_vendor_never_touches_pool() {
        let (store, market) = market(0, 10, true);
        let result = VendorAgent::new(vendor(1, 0, 10), market.clone());
        assert!(matches!(result, Err(Error::VendorMisconfigured(_))));
        assert_eq!(market.pool().snapshot().total_tickets, 0);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_schedule_period_respects_floor() {
        let (store, market) = market(0, 10, true);
        store.set(ConfigKey::TicketReleaseRate, 30).unwrap();
        let agent = VendorAgent::new(vendor(1, 2, 5), market).unwrap();
        assert_eq!(agent.period(), Duration::from_secs(30));
    }

    #[test]
    fn test_tick_releases_and_records() {
        let (store, market) = market(0, 10, true);
        let agent = VendorAgent::new(vendor(7, 4, 1), market.clone()).unwrap();

        assert_eq!(agent.tick().unwrap(), ReleaseOutcome::Released(4));
        assert_eq!(market.pool().snapshot().total_tickets, 4);

        let log = store.list_all().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(
            log[0].text,
            "Add 4 tickets into ticket pool [ID - 7] Vendor vendor-7"
        );
    }

    #[test]
    fn test_tick_is_noop_when_inactive() {
        let (store, market) = market(0, 10, false);
        let agent = VendorAgent::new(vendor(1, 4, 1), market.clone()).unwrap();
        assert_eq!(agent.tick().unwrap(), ReleaseOutcome::Inactive);
        assert_eq!(market.pool().snapshot().total_tickets, 0);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_tick_skips_when_full() {
        let (store, market) = market(8, 10, true);
        let agent = VendorAgent::new(vendor(1, 3, 1), market.clone()).unwrap();
        assert_eq!(agent.tick().unwrap(), ReleaseOutcome::PoolFull);
        assert_eq!(market.pool().snapshot().total_tickets, 8);
        assert!(store.list_all().unwrap().is_empty());
    }

    #[test]
    fn test_tick_observes_external_capacity_change() {
        let (store, market) = market(8, 10, true);
        let agent = VendorAgent::new(vendor(1, 3, 1), market.clone()).unwrap();
        assert_eq!(agent.tick().unwrap(), ReleaseOutcome::PoolFull);

        store.set(ConfigKey::MaxTicketCapacity, 20).unwrap();
        assert_eq!(agent.tick().unwrap(), ReleaseOutcome::Released(3));
        assert_eq!(market.pool().snapshot().total_tickets, 11);
    }
}
