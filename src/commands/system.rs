//! `start`, `stop` and `restart`: persist the run state and restart requests
//! for a live engine's config watcher to act on.

use crate::cli::RestartTarget;
use crate::commands::open_store;
use crate::config::{ConfigKey, SystemStatus};
use crate::error::Result;
use crate::storage::ConfigStore;
use std::path::Path;

pub fn start(db: &Path) -> Result<()> {
    let store = open_store(db)?;
    set_status(store.as_ref(), SystemStatus::Running)?;
    println!("System started");
    Ok(())
}

pub fn stop(db: &Path) -> Result<()> {
    let store = open_store(db)?;
    set_status(store.as_ref(), SystemStatus::Stopped)?;
    println!("System stopped");
    Ok(())
}

/// Bump the restart counter of every targeted group. The watcher of a live
/// engine stops and relaunches a group once its counter moves past the
/// value the group was started with.
pub fn restart(db: &Path, target: RestartTarget) -> Result<()> {
    let store = open_store(db)?;
    request(store.as_ref(), target)?;

    if SystemStatus::from_value(store.get(ConfigKey::SystemStatus)?).is_running() {
        println!("Restart requested for {}", describe(target));
    } else {
        println!("System is stopped; {} will start with it", describe(target));
    }
    Ok(())
}

fn request(store: &dyn ConfigStore, target: RestartTarget) -> Result<()> {
    if target == RestartTarget::All {
        set_status(store, SystemStatus::Running)?;
    }
    for &group in target.groups() {
        let generation = store.request_restart(group)?;
        tracing::debug!(group = %group, generation, "Restart requested");
    }
    Ok(())
}

fn describe(target: RestartTarget) -> &'static str {
    match target {
        RestartTarget::Vendors => "vendors",
        RestartTarget::Customers => "customers",
        RestartTarget::All => "all groups",
    }
}

fn set_status(store: &dyn ConfigStore, status: SystemStatus) -> Result<()> {
    store.set(ConfigKey::SystemStatus, status.as_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::run::boot_engine;
    use crate::config::{EngineSettings, Group};
    use crate::storage::{SalesLedger, Storage, VendorDirectory};
    use std::thread;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn releases(store: &Storage) -> usize {
        store
            .list_all()
            .unwrap()
            .iter()
            .filter(|e| e.text.starts_with("Add "))
            .count()
    }

    fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        done()
    }

    #[test]
    fn test_start_stop_persist() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("pool.db");

        start(&db).unwrap();
        let store = Storage::open(&db).unwrap();
        assert_eq!(store.get(ConfigKey::SystemStatus).unwrap(), 1);

        stop(&db).unwrap();
        assert_eq!(store.get(ConfigKey::SystemStatus).unwrap(), 0);
    }

    #[test]
    fn test_restart_bumps_targeted_groups() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("pool.db");
        let store = Storage::open(&db).unwrap();

        restart(&db, RestartTarget::Vendors).unwrap();
        assert_eq!(store.restart_generation(Group::Vendors).unwrap(), 1);
        assert_eq!(store.restart_generation(Group::Customers).unwrap(), 0);
        // A single group restart leaves the run state alone
        assert_eq!(store.get(ConfigKey::SystemStatus).unwrap(), 0);

        restart(&db, RestartTarget::All).unwrap();
        assert_eq!(store.restart_generation(Group::Vendors).unwrap(), 2);
        assert_eq!(store.restart_generation(Group::Customers).unwrap(), 1);
        assert_eq!(store.get(ConfigKey::SystemStatus).unwrap(), 1);
    }

    #[test]
    fn test_restart_reaches_live_engine() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("pool.db");
        let store = Storage::open(&db).unwrap();
        store.add("acme", 1, 60).unwrap();
        store.set(ConfigKey::CustomerRetrievalRate, 3600).unwrap();
        store.set(ConfigKey::SystemStatus, 1).unwrap();

        let settings = EngineSettings {
            grace_period: Duration::from_secs(1),
            watch_interval: Duration::from_millis(100),
            ..EngineSettings::default()
        };
        let controller = boot_engine(&db, settings).unwrap();
        assert!(wait_until(Duration::from_secs(2), || releases(&store) == 1));

        restart(&db, RestartTarget::Vendors).unwrap();
        assert!(wait_until(Duration::from_secs(3), || releases(&store) == 2));
        assert_eq!(controller.vendor_jobs().len(), 1);
        controller.shutdown();
    }
}
