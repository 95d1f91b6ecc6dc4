use crate::commands::open_store;
use crate::config::EngineSettings;
use crate::controller::Controller;
use crate::error::Result;
use crate::market::Market;
use std::path::Path;
use std::sync::Arc;

/// Wire up the engine in startup order (store, pool, controller) and boot it
/// in the persisted state.
pub fn boot_engine(db: &Path, settings: EngineSettings) -> Result<Arc<Controller>> {
    let store = open_store(db)?;
    let market = Arc::new(Market::open(store.clone(), store.clone())?);
    let controller = Controller::new(market, store, settings);
    let status = controller.boot()?;
    tracing::info!(db = %db.display(), status = %status, "Engine ready");
    Ok(controller)
}
