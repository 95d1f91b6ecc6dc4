//! The shared bounded ticket counter.
//!
//! Every read and write of the two counters goes through one lock. Writes
//! persist the new total before updating memory, so a failed durable write
//! leaves the pool exactly as it was.
//!
//! Other processes may change the stored capacity at any time, so every
//! durable write is bounded: the store refuses a count above the stored
//! capacity, and the pool then adopts the stored pair.

use crate::config::{self, ConfigKey};
use crate::error::{Error, Result};
use crate::storage::ConfigStore;
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Debug)]
struct PoolState {
    total_tickets: i64,
    max_capacity: i64,
}

/// Counters observed under the pool lock
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolSnapshot {
    pub total_tickets: i64,
    pub max_capacity: i64,
}

impl PoolSnapshot {
    pub fn is_full(&self) -> bool {
        self.total_tickets >= self.max_capacity
    }

    pub fn is_empty(&self) -> bool {
        self.total_tickets == 0
    }

    /// Fill ratio in `[0, 1]`
    pub fn fill_ratio(&self) -> f64 {
        if self.max_capacity <= 0 {
            0.0
        } else {
            self.total_tickets as f64 / self.max_capacity as f64
        }
    }
}

pub struct TicketPool {
    state: Mutex<PoolState>,
    store: Arc<dyn ConfigStore>,
}

impl TicketPool {
    /// Build the pool from the durable config. Failure here is fatal to startup.
    pub fn open(store: Arc<dyn ConfigStore>) -> Result<Self> {
        let max_capacity = store
            .get(ConfigKey::MaxTicketCapacity)
            .map_err(|e| Error::PoolInit(format!("cannot read max capacity: {e}")))?;
        let total_tickets = store
            .get(ConfigKey::TotalTickets)
            .map_err(|e| Error::PoolInit(format!("cannot read ticket count: {e}")))?;

        if max_capacity < 0 || total_tickets < 0 || total_tickets > max_capacity {
            return Err(Error::PoolInit(format!(
                "stored ticket count {total_tickets} is outside [0, {max_capacity}]"
            )));
        }

        Ok(TicketPool {
            state: Mutex::new(PoolState {
                total_tickets,
                max_capacity,
            }),
            store,
        })
    }

    /// Add `count` tickets if they fit under the capacity.
    ///
    /// Returns `Ok(false)` without touching anything when the pool would
    /// overflow.
    pub fn add_tickets(&self, count: u32) -> Result<bool> {
        let mut state = self.state.lock();
        let new_total = state.total_tickets + i64::from(count);
        if new_total > state.max_capacity {
            return Ok(false);
        }

        if !self.store.set_within_bounds(ConfigKey::TotalTickets, new_total)? {
            self.adopt_stored(&mut state)?;
            return Ok(false);
        }
        state.total_tickets = new_total;
        Ok(true)
    }

    /// Take one ticket out of the pool. `Ok(false)` when the pool is empty.
    pub fn remove_ticket(&self) -> Result<bool> {
        let mut state = self.state.lock();
        if state.total_tickets <= 0 {
            return Ok(false);
        }

        let new_total = state.total_tickets - 1;
        if !self.store.set_within_bounds(ConfigKey::TotalTickets, new_total)? {
            self.adopt_stored(&mut state)?;
            return Ok(false);
        }
        state.total_tickets = new_total;
        Ok(true)
    }

    /// Take both counters from the store after a refused write
    fn adopt_stored(&self, state: &mut PoolState) -> Result<()> {
        let max_capacity = self.store.get(ConfigKey::MaxTicketCapacity)?;
        let total_tickets = self.store.get(ConfigKey::TotalTickets)?;
        config::check_total_tickets(total_tickets, max_capacity)?;
        tracing::info!(
            total = total_tickets,
            max_capacity,
            "Pool changed by another process, adopting stored values"
        );
        state.total_tickets = total_tickets;
        state.max_capacity = max_capacity;
        Ok(())
    }

    /// Re-read the capacity from the store.
    ///
    /// The read happens under the pool lock so it cannot interleave with a
    /// concurrent add or remove. A stored value below the current ticket
    /// count is refused and the cached capacity kept.
    pub fn reload_max_capacity(&self) -> Result<()> {
        let mut state = self.state.lock();
        let max_capacity = self.store.get(ConfigKey::MaxTicketCapacity)?;
        if max_capacity < 0 || max_capacity < state.total_tickets {
            return Err(Error::InvalidConfig(format!(
                "stored capacity {max_capacity} is below the {} tickets in the pool",
                state.total_tickets
            )));
        }
        state.max_capacity = max_capacity;
        Ok(())
    }

    /// Re-read the ticket count from the store.
    ///
    /// A stored value outside `[0, capacity]` is refused and the cached count
    /// kept.
    pub fn reload_total_tickets(&self) -> Result<()> {
        let mut state = self.state.lock();
        let total_tickets = self.store.get(ConfigKey::TotalTickets)?;
        if total_tickets < 0 || total_tickets > state.max_capacity {
            return Err(Error::InvalidConfig(format!(
                "stored ticket count {total_tickets} is outside [0, {}]",
                state.max_capacity
            )));
        }
        state.total_tickets = total_tickets;
        Ok(())
    }

    /// Reload capacity first, then the count, so a raised capacity and count
    /// written together are both accepted.
    pub fn reload(&self) -> Result<()> {
        self.reload_max_capacity()?;
        self.reload_total_tickets()
    }

    /// `reload` for agents: a refused stored value is logged and the cached
    /// values stay in effect.
    pub fn refresh(&self) -> Result<()> {
        match self.reload() {
            Err(Error::InvalidConfig(reason)) => {
                tracing::warn!(%reason, "Stored pool values refused, keeping cached values");
                Ok(())
            }
            other => other,
        }
    }

    /// Operator override of the ticket count, validated and persisted under
    /// the pool lock so no concurrent add or remove is lost.
    pub fn set_total_tickets(&self, total_tickets: i64) -> Result<()> {
        let mut state = self.state.lock();
        let max_capacity = self.store.get(ConfigKey::MaxTicketCapacity)?;
        config::check_total_tickets(total_tickets, max_capacity)?;
        if !self.store.set_within_bounds(ConfigKey::TotalTickets, total_tickets)? {
            return Err(Error::InvalidConfig(format!(
                "capacity changed while setting total tickets to {total_tickets}"
            )));
        }
        state.total_tickets = total_tickets;
        state.max_capacity = max_capacity;
        Ok(())
    }

    pub fn set_max_capacity(&self, max_capacity: i64) -> Result<()> {
        let mut state = self.state.lock();
        config::check_max_capacity(max_capacity, state.total_tickets)?;
        if !self.store.set_within_bounds(ConfigKey::MaxTicketCapacity, max_capacity)? {
            return Err(Error::InvalidConfig(format!(
                "stored ticket count exceeds the requested capacity {max_capacity}"
            )));
        }
        state.max_capacity = max_capacity;
        Ok(())
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let state = self.state.lock();
        PoolSnapshot {
            total_tickets: state.total_tickets,
            max_capacity: state.max_capacity,
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Group;
    use crate::storage::Storage;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::thread;
    use std::time::Duration;

    /// Config store whose writes can be made to fail on demand
    pub(crate) struct FlakyStore {
        inner: Storage,
        pub(crate) fail_writes: AtomicBool,
    }

    impl FlakyStore {
        pub(crate) fn new() -> Self {
            FlakyStore {
                inner: Storage::open_in_memory().unwrap(),
                fail_writes: AtomicBool::new(false),
            }
        }
    }

    impl ConfigStore for FlakyStore {
        fn get(&self, key: ConfigKey) -> Result<i64> {
            self.inner.get(key)
        }

        fn set(&self, key: ConfigKey, value: i64) -> Result<()> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::write_failed(
                    key.as_str(),
                    rusqlite::Error::InvalidQuery,
                ));
            }
            self.inner.set(key, value)
        }

        fn set_within_bounds(&self, key: ConfigKey, value: i64) -> Result<bool> {
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(Error::write_failed(
                    key.as_str(),
                    rusqlite::Error::InvalidQuery,
                ));
            }
            self.inner.set_within_bounds(key, value)
        }

        fn request_restart(&self, group: Group) -> Result<u64> {
            self.inner.request_restart(group)
        }

        fn restart_generation(&self, group: Group) -> Result<u64> {
            self.inner.restart_generation(group)
        }
    }

    fn pool_with(total: i64, max: i64) -> (Arc<Storage>, TicketPool) {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        store.set(ConfigKey::MaxTicketCapacity, max).unwrap();
        store.set(ConfigKey::TotalTickets, total).unwrap();
        let pool = TicketPool::open(store.clone()).unwrap();
        (store, pool)
    }

    #[test]
    fn test_open_reads_store() {
        let (_, pool) = pool_with(8, 10);
        assert_eq!(
            pool.snapshot(),
            PoolSnapshot {
                total_tickets: 8,
                max_capacity: 10
            }
        );
    }

    #[test]
    fn test_open_rejects_inconsistent_store() {
        let store = Arc::new(Storage::open_in_memory().unwrap());
        store.set(ConfigKey::MaxTicketCapacity, 5).unwrap();
        store.set(ConfigKey::TotalTickets, 9).unwrap();
        assert!(matches!(TicketPool::open(store), Err(Error::PoolInit(_))));
    }

    #[test]
    fn test_capacity_boundary() {
        let (store, pool) = pool_with(8, 10);

        assert!(!pool.add_tickets(3).unwrap());
        assert_eq!(pool.snapshot().total_tickets, 8);
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 8);

        assert!(pool.add_tickets(2).unwrap());
        assert_eq!(pool.snapshot().total_tickets, 10);
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 10);
        assert!(pool.snapshot().is_full());
    }

    #[test]
    fn test_emptiness_boundary() {
        let (store, pool) = pool_with(0, 10);
        assert!(!pool.remove_ticket().unwrap());
        assert_eq!(pool.snapshot().total_tickets, 0);
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 0);
    }

    #[test]
    fn test_remove_persists() {
        let (store, pool) = pool_with(2, 10);
        assert!(pool.remove_ticket().unwrap());
        assert_eq!(pool.snapshot().total_tickets, 1);
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 1);
    }

    #[test]
    fn test_failed_write_leaves_pool_unchanged() {
        let store = Arc::new(FlakyStore::new());
        let pool = TicketPool::open(store.clone()).unwrap();
        let before = pool.snapshot();

        store.fail_writes.store(true, Ordering::SeqCst);
        assert!(matches!(pool.add_tickets(1), Err(Error::WriteFailed { .. })));
        assert!(matches!(pool.remove_ticket(), Err(Error::WriteFailed { .. })));
        assert_eq!(pool.snapshot(), before);
    }

    #[test]
    fn test_reload_is_idempotent() {
        let (store, pool) = pool_with(5, 10);
        store.set(ConfigKey::MaxTicketCapacity, 20).unwrap();
        store.set(ConfigKey::TotalTickets, 12).unwrap();

        pool.reload_max_capacity().unwrap();
        pool.reload_total_tickets().unwrap();
        let once = pool.snapshot();

        pool.reload_max_capacity().unwrap();
        pool.reload_total_tickets().unwrap();
        assert_eq!(pool.snapshot(), once);
        assert_eq!(
            once,
            PoolSnapshot {
                total_tickets: 12,
                max_capacity: 20
            }
        );
    }

    #[test]
    fn test_reload_refuses_values_that_break_the_invariant() {
        let (store, pool) = pool_with(8, 10);

        store.set(ConfigKey::MaxTicketCapacity, 4).unwrap();
        assert!(matches!(pool.reload_max_capacity(), Err(Error::InvalidConfig(_))));

        store.set(ConfigKey::TotalTickets, 11).unwrap();
        assert!(matches!(pool.reload_total_tickets(), Err(Error::InvalidConfig(_))));

        assert_eq!(
            pool.snapshot(),
            PoolSnapshot {
                total_tickets: 8,
                max_capacity: 10
            }
        );
    }

    #[test]
    fn test_operator_setters_enforce_bounds() {
        let (store, pool) = pool_with(8, 10);

        assert!(matches!(pool.set_total_tickets(11), Err(Error::InvalidConfig(_))));
        assert!(matches!(pool.set_max_capacity(7), Err(Error::InvalidConfig(_))));
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 8);
        assert_eq!(store.get(ConfigKey::MaxTicketCapacity).unwrap(), 10);

        pool.set_max_capacity(8).unwrap();
        pool.set_total_tickets(0).unwrap();
        assert_eq!(
            pool.snapshot(),
            PoolSnapshot {
                total_tickets: 0,
                max_capacity: 8
            }
        );
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 0);
        assert_eq!(store.get(ConfigKey::MaxTicketCapacity).unwrap(), 8);
    }

    #[test]
    fn test_capacity_lowered_elsewhere_is_never_overrun() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("pool.db");
        let engine_store = Arc::new(Storage::open(&path).unwrap());
        engine_store.set(ConfigKey::MaxTicketCapacity, 10).unwrap();
        engine_store.set(ConfigKey::TotalTickets, 8).unwrap();
        let pool = TicketPool::open(engine_store.clone()).unwrap();
        pool.refresh().unwrap();

        // A second handle on the same file lowers the capacity after the
        // pool cached 10
        let other = Storage::open(&path).unwrap();
        assert!(other.set_within_bounds(ConfigKey::MaxTicketCapacity, 8).unwrap());

        assert!(!pool.add_tickets(2).unwrap());
        assert_eq!(
            pool.snapshot(),
            PoolSnapshot {
                total_tickets: 8,
                max_capacity: 8
            }
        );
        assert_eq!(other.get(ConfigKey::TotalTickets).unwrap(), 8);
        assert_eq!(other.get(ConfigKey::MaxTicketCapacity).unwrap(), 8);
        assert!(TicketPool::open(Arc::new(other)).is_ok());
    }

    #[test]
    fn test_remove_adopts_values_written_elsewhere() {
        let (store, pool) = pool_with(5, 10);
        // Another process empties the pool, then shrinks it
        store.set(ConfigKey::TotalTickets, 0).unwrap();
        store.set(ConfigKey::MaxTicketCapacity, 2).unwrap();

        assert!(!pool.remove_ticket().unwrap());
        assert_eq!(
            pool.snapshot(),
            PoolSnapshot {
                total_tickets: 0,
                max_capacity: 2
            }
        );
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 0);
    }

    #[test]
    fn test_refresh_tolerates_refused_values() {
        let (store, pool) = pool_with(8, 10);
        store.set(ConfigKey::MaxTicketCapacity, 2).unwrap();
        pool.refresh().unwrap();
        assert_eq!(pool.snapshot().max_capacity, 10);

        // Nothing is written on top of an inconsistent store
        assert!(matches!(pool.add_tickets(2), Err(Error::InvalidConfig(_))));
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), 8);
        assert_eq!(pool.snapshot().total_tickets, 8);
    }

    #[test]
    fn test_concurrent_adds_and_removes_conserve_tickets() {
        const CAPACITY: i64 = 40;
        const INITIAL: i64 = 10;
        const BATCH: u32 = 3;

        let (store, pool) = pool_with(INITIAL, CAPACITY);
        let pool = Arc::new(pool);
        let added = Arc::new(AtomicU64::new(0));
        let removed = Arc::new(AtomicU64::new(0));
        let done = Arc::new(AtomicBool::new(false));

        // Monitor polls under the same lock and must never see a bad state
        let monitor = {
            let pool = pool.clone();
            let done = done.clone();
            thread::spawn(move || {
                let mut observations = 0u64;
                while !done.load(Ordering::SeqCst) {
                    let snap = pool.snapshot();
                    assert!(snap.total_tickets >= 0);
                    assert!(snap.total_tickets <= snap.max_capacity);
                    observations += 1;
                }
                observations
            })
        };

        let mut workers = Vec::new();
        for _ in 0..4 {
            let pool = pool.clone();
            let added = added.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..200 {
                    if pool.add_tickets(BATCH).unwrap() {
                        added.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }));
        }
        for _ in 0..6 {
            let pool = pool.clone();
            let removed = removed.clone();
            workers.push(thread::spawn(move || {
                for _ in 0..200 {
                    if pool.remove_ticket().unwrap() {
                        removed.fetch_add(1, Ordering::SeqCst);
                    }
                    thread::sleep(Duration::from_micros(10));
                }
            }));
        }

        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        assert!(monitor.join().unwrap() > 0);

        let expected = INITIAL + added.load(Ordering::SeqCst) as i64 * i64::from(BATCH)
            - removed.load(Ordering::SeqCst) as i64;
        assert_eq!(pool.snapshot().total_tickets, expected);
        assert_eq!(store.get(ConfigKey::TotalTickets).unwrap(), expected);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u32),
        Remove,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![(0u32..8).prop_map(Op::Add), Just(Op::Remove)]
    }

    proptest! {
        #[test]
        fn prop_invariant_holds_for_any_sequence(
            max in 0i64..30,
            ops in prop::collection::vec(op_strategy(), 0..60),
        ) {
            let (_, pool) = pool_with(0, max);
            let mut model = 0i64;
            for op in ops {
                match op {
                    Op::Add(n) => {
                        let ok = pool.add_tickets(n).unwrap();
                        prop_assert_eq!(ok, model + i64::from(n) <= max);
                        if ok {
                            model += i64::from(n);
                        }
                    }
                    Op::Remove => {
                        let ok = pool.remove_ticket().unwrap();
                        prop_assert_eq!(ok, model > 0);
                        if ok {
                            model -= 1;
                        }
                    }
                }
                let snap = pool.snapshot();
                prop_assert!(snap.total_tickets >= 0 && snap.total_tickets <= snap.max_capacity);
                prop_assert_eq!(snap.total_tickets, model);
            }
        }
    }
}
