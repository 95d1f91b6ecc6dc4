use crate::config::{ConfigKey, SystemStatus};
use crate::error::Result;
use crate::pool::TicketPool;
use crate::storage::{ConfigStore, SalesLedger};
use std::sync::Arc;

/// Everything an agent touches: the pool, the config it reads before
/// acting, and the ledger it records successes in.
///
/// Built once at startup and shared by `Arc` with every task.
pub struct Market {
    pool: TicketPool,
    config: Arc<dyn ConfigStore>,
    ledger: Arc<dyn SalesLedger>,
}

impl Market {
    /// Construct the pool from `config` and bundle it with the ledger
    pub fn open(config: Arc<dyn ConfigStore>, ledger: Arc<dyn SalesLedger>) -> Result<Self> {
        let pool = TicketPool::open(config.clone())?;
        Ok(Market {
            pool,
            config,
            ledger,
        })
    }

    pub fn pool(&self) -> &TicketPool {
        &self.pool
    }

    pub fn config(&self) -> &dyn ConfigStore {
        self.config.as_ref()
    }

    pub fn ledger(&self) -> &dyn SalesLedger {
        self.ledger.as_ref()
    }

    /// Persisted run state, read fresh on every call
    pub fn status(&self) -> Result<SystemStatus> {
        Ok(SystemStatus::from_value(
            self.config.get(ConfigKey::SystemStatus)?,
        ))
    }

    pub fn is_active(&self) -> Result<bool> {
        Ok(self.status()?.is_running())
    }
}
