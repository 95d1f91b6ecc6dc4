use crate::cli::ConfigCommand;
use crate::commands::open_store;
use crate::config::{self, ConfigKey};
use crate::error::{Error, Result};
use crate::storage::ConfigStore;
use std::path::Path;

pub fn run(db: &Path, setting: ConfigCommand) -> Result<()> {
    let store = open_store(db)?;
    let (key, value) = apply(store.as_ref(), setting)?;
    println!("{} set to {}", key, value);
    Ok(())
}

/// Validate `setting` against the stored values and write it.
///
/// Ticket count and capacity go through a bounded write, so a live engine
/// adding tickets between the check and the write cannot leave the stored
/// count above the stored capacity.
pub fn apply(store: &dyn ConfigStore, setting: ConfigCommand) -> Result<(ConfigKey, i64)> {
    let (key, value) = match setting {
        ConfigCommand::TotalTickets { value } => {
            config::check_total_tickets(value, store.get(ConfigKey::MaxTicketCapacity)?)?;
            (ConfigKey::TotalTickets, value)
        }
        ConfigCommand::MaxCapacity { value } => {
            config::check_max_capacity(value, store.get(ConfigKey::TotalTickets)?)?;
            (ConfigKey::MaxTicketCapacity, value)
        }
        ConfigCommand::ReleaseRate { value } => {
            config::check_release_rate(value)?;
            (ConfigKey::TicketReleaseRate, value)
        }
        ConfigCommand::RetrievalRate { value } => {
            config::check_retrieval_rate(value)?;
            (ConfigKey::CustomerRetrievalRate, value)
        }
    };

    if !store.set_within_bounds(key, value)? {
        return Err(Error::InvalidConfig(format!(
            "{key} = {value} no longer fits the stored pool, try again"
        )));
    }
    Ok((key, value))
}
