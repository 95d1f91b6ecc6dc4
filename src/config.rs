use crate::error::{Error, Result};
use crate::storage::ConfigStore;
use std::fmt;
use std::time::Duration;

/// Durable tunables kept in the `system_config` table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    TotalTickets,
    MaxTicketCapacity,
    TicketReleaseRate,
    CustomerRetrievalRate,
    SystemStatus,
}

impl ConfigKey {
    pub const ALL: [ConfigKey; 5] = [
        ConfigKey::TotalTickets,
        ConfigKey::TicketReleaseRate,
        ConfigKey::CustomerRetrievalRate,
        ConfigKey::MaxTicketCapacity,
        ConfigKey::SystemStatus,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ConfigKey::TotalTickets => "total_tickets",
            ConfigKey::MaxTicketCapacity => "max_ticket_capacity",
            ConfigKey::TicketReleaseRate => "ticket_release_rate",
            ConfigKey::CustomerRetrievalRate => "customer_retrieval_rate",
            ConfigKey::SystemStatus => "system_status",
        }
    }

    /// Value seeded on first run
    pub fn default_value(self) -> i64 {
        match self {
            ConfigKey::TotalTickets => 50,
            ConfigKey::MaxTicketCapacity => 500,
            ConfigKey::TicketReleaseRate => 60,
            ConfigKey::CustomerRetrievalRate => 60,
            ConfigKey::SystemStatus => 0,
        }
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted run state of the whole system
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SystemStatus {
    Stopped,
    Running,
}

impl SystemStatus {
    pub fn from_value(value: i64) -> Self {
        if value == 1 {
            SystemStatus::Running
        } else {
            SystemStatus::Stopped
        }
    }

    pub fn as_value(self) -> i64 {
        match self {
            SystemStatus::Stopped => 0,
            SystemStatus::Running => 1,
        }
    }

    pub fn is_running(self) -> bool {
        self == SystemStatus::Running
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SystemStatus::Stopped => f.write_str("stopped"),
            SystemStatus::Running => f.write_str("running"),
        }
    }
}

/// The two independently scheduled task groups
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Group {
    Vendors,
    Customers,
}

impl Group {
    pub const ALL: [Group; 2] = [Group::Vendors, Group::Customers];

    pub fn as_str(self) -> &'static str {
        match self {
            Group::Vendors => "vendors",
            Group::Customers => "customers",
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time copy of every durable tunable
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemConfig {
    pub total_tickets: i64,
    pub max_ticket_capacity: i64,
    pub ticket_release_rate: i64,
    pub customer_retrieval_rate: i64,
    pub system_status: SystemStatus,
}

impl SystemConfig {
    pub fn load(store: &dyn ConfigStore) -> Result<Self> {
        Ok(SystemConfig {
            total_tickets: store.get(ConfigKey::TotalTickets)?,
            max_ticket_capacity: store.get(ConfigKey::MaxTicketCapacity)?,
            ticket_release_rate: store.get(ConfigKey::TicketReleaseRate)?,
            customer_retrieval_rate: store.get(ConfigKey::CustomerRetrievalRate)?,
            system_status: SystemStatus::from_value(store.get(ConfigKey::SystemStatus)?),
        })
    }
}

/// In-process knobs for the engine (not persisted)
#[derive(Clone, Debug)]
pub struct EngineSettings {
    /// Worker threads shared by all vendor jobs
    pub vendor_workers: usize,
    /// How long stop waits for in-flight ticks before abandoning workers
    pub grace_period: Duration,
    /// Customer attempts manufactured per generator tick
    pub customers_per_tick: usize,
    /// Per-queue bound on waiting customer attempts; oldest dropped first
    pub max_waiting: usize,
    /// Period of the config watcher
    pub watch_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            vendor_workers: 3,
            grace_period: Duration::from_secs(5),
            customers_per_tick: 2,
            max_waiting: 16,
            watch_interval: Duration::from_secs(5),
        }
    }
}

/// Convert a configured number of seconds into a timer period (never zero)
pub fn period_from_secs(secs: i64) -> Duration {
    Duration::from_secs(secs.max(1) as u64)
}

/// `total_tickets` must lie in `[0, max_capacity]`
pub fn check_total_tickets(value: i64, max_capacity: i64) -> Result<()> {
    if value < 0 || value > max_capacity {
        return Err(Error::InvalidConfig(format!(
            "total tickets must be between 0 and {max_capacity}, got {value}"
        )));
    }
    Ok(())
}

/// Capacity may never drop below the tickets already in the pool
pub fn check_max_capacity(value: i64, total_tickets: i64) -> Result<()> {
    if value < 0 || value < total_tickets {
        return Err(Error::InvalidConfig(format!(
            "max capacity must be at least {total_tickets}, got {value}"
        )));
    }
    Ok(())
}

pub fn check_release_rate(value: i64) -> Result<()> {
    if value < 0 {
        return Err(Error::InvalidConfig(format!(
            "ticket release rate must not be negative, got {value}"
        )));
    }
    Ok(())
}

pub fn check_retrieval_rate(value: i64) -> Result<()> {
    if value < 1 {
        return Err(Error::InvalidConfig(format!(
            "customer retrieval rate must be at least 1 second, got {value}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        assert_eq!(SystemStatus::from_value(1), SystemStatus::Running);
        assert_eq!(SystemStatus::from_value(0), SystemStatus::Stopped);
        // Anything other than 1 counts as stopped
        assert_eq!(SystemStatus::from_value(7), SystemStatus::Stopped);
        assert_eq!(SystemStatus::Running.as_value(), 1);
    }

    #[test]
    fn test_period_never_zero() {
        assert_eq!(period_from_secs(0), Duration::from_secs(1));
        assert_eq!(period_from_secs(-4), Duration::from_secs(1));
        assert_eq!(period_from_secs(60), Duration::from_secs(60));
    }

    #[test]
    fn test_key_names_are_unique() {
        let mut names: Vec<_> = ConfigKey::ALL.iter().map(|k| k.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), ConfigKey::ALL.len());
    }

    #[test]
    fn test_config_bounds() {
        assert!(check_total_tickets(0, 10).is_ok());
        assert!(check_total_tickets(10, 10).is_ok());
        assert!(matches!(check_total_tickets(11, 10), Err(Error::InvalidConfig(_))));
        assert!(check_total_tickets(-1, 10).is_err());

        assert!(check_max_capacity(8, 8).is_ok());
        assert!(check_max_capacity(7, 8).is_err());

        assert!(check_release_rate(0).is_ok());
        assert!(check_release_rate(-1).is_err());

        assert!(check_retrieval_rate(1).is_ok());
        assert!(check_retrieval_rate(0).is_err());
    }
}
