mod schema;
pub mod store;

use crate::config::{ConfigKey, Group};
use crate::error::Result;
use crate::vendor::Vendor;

pub use store::{SalesLogEntry, Storage};

/// Durable key/value table of tunables
pub trait ConfigStore: Send + Sync {
    /// Fails with `ConfigNotFound` if the key is absent
    fn get(&self, key: ConfigKey) -> Result<i64>;

    /// Fails with `WriteFailed` if the durable write does not happen
    fn set(&self, key: ConfigKey, value: i64) -> Result<()>;

    /// Write a ticket count or capacity only if the stored pair still holds
    /// `0 <= total <= max` afterwards. Check and write are one statement, so
    /// two processes cannot interleave between them. Returns `false` when
    /// the write is refused; other keys are written unconditionally.
    fn set_within_bounds(&self, key: ConfigKey, value: i64) -> Result<bool>;

    /// Bump the restart counter of `group`, returning the new value
    fn request_restart(&self, group: Group) -> Result<u64>;

    /// Restart requests recorded so far for `group`
    fn restart_generation(&self, group: Group) -> Result<u64>;
}

/// Durable append-only log of pool transactions
pub trait SalesLedger: Send + Sync {
    /// Append an entry stamped with the capture time, returning its id
    fn append(&self, text: &str) -> Result<i64>;

    /// Every entry, oldest first
    fn list_all(&self) -> Result<Vec<SalesLogEntry>>;

    /// The newest `limit` entries, oldest first
    fn recent(&self, limit: usize) -> Result<Vec<SalesLogEntry>>;

    fn entry_count(&self) -> Result<u64>;
}

/// Vendor records owned by the CRUD layer
pub trait VendorDirectory: Send + Sync {
    fn list_active(&self) -> Result<Vec<Vendor>>;
    fn add(&self, name: &str, tickets_per_release: u32, release_rate_secs: u32) -> Result<i64>;
    fn update(&self, vendor: &Vendor) -> Result<bool>;
    fn remove(&self, vendor_id: i64) -> Result<bool>;
    fn find(&self, vendor_id: i64) -> Result<Option<Vendor>>;
    fn exists(&self, vendor_id: i64) -> Result<bool>;
    fn count(&self) -> Result<u64>;
}
