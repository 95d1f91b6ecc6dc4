use crate::commands::{json_string, open_store};
use crate::error::{Error, Result};
use crate::storage::VendorDirectory;
use crate::vendor::Vendor;
use comfy_table::{Table, presets::UTF8_FULL};
use std::path::Path;

pub fn list(db: &Path, json: bool) -> Result<()> {
    let store = open_store(db)?;
    let vendors = store.list_active()?;

    if json {
        print_json(&vendors);
    } else if vendors.is_empty() {
        println!("No vendors. Add one with 'ticketpool vendors add <NAME> -t <TICKETS> -r <SECS>'.");
    } else {
        println!("{}", vendor_table(&vendors));
    }
    Ok(())
}

pub fn add(db: &Path, name: &str, tickets: u32, rate: u32) -> Result<()> {
    let store = open_store(db)?;
    let id = add_vendor(store.as_ref(), name, tickets, rate)?;
    println!("Added vendor {} ({})", id, name.trim());
    Ok(())
}

pub fn update(
    db: &Path,
    id: i64,
    name: Option<String>,
    tickets: Option<u32>,
    rate: Option<u32>,
) -> Result<()> {
    let store = open_store(db)?;
    let vendor = update_vendor(store.as_ref(), id, name, tickets, rate)?;
    println!(
        "Updated vendor {}: {} tickets every {}s ({})",
        vendor.id, vendor.tickets_per_release, vendor.release_rate_secs, vendor.name
    );
    Ok(())
}

pub fn remove(db: &Path, id: i64) -> Result<()> {
    let store = open_store(db)?;
    if !store.remove(id)? {
        return Err(Error::VendorNotFound(id));
    }
    println!("Removed vendor {}", id);
    Ok(())
}

/// Insert a vendor after checking it would be schedulable
pub fn add_vendor(
    directory: &dyn VendorDirectory,
    name: &str,
    tickets: u32,
    rate: u32,
) -> Result<i64> {
    let candidate = Vendor {
        // Placeholder until the store assigns one
        id: 1,
        name: name.trim().to_string(),
        tickets_per_release: tickets,
        release_rate_secs: rate,
    };
    candidate
        .validate()
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;
    directory.add(&candidate.name, tickets, rate)
}

/// Apply the given field changes to an existing vendor
pub fn update_vendor(
    directory: &dyn VendorDirectory,
    id: i64,
    name: Option<String>,
    tickets: Option<u32>,
    rate: Option<u32>,
) -> Result<Vendor> {
    let mut vendor = directory.find(id)?.ok_or(Error::VendorNotFound(id))?;
    if let Some(name) = name {
        vendor.name = name.trim().to_string();
    }
    if let Some(tickets) = tickets {
        vendor.tickets_per_release = tickets;
    }
    if let Some(rate) = rate {
        vendor.release_rate_secs = rate;
    }

    vendor
        .validate()
        .map_err(|e| Error::InvalidArgument(e.to_string()))?;
    if !directory.update(&vendor)? {
        return Err(Error::VendorNotFound(id));
    }
    Ok(vendor)
}

fn vendor_table(vendors: &[Vendor]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["ID", "NAME", "TICKETS/RELEASE", "RATE (s)"]);
    for vendor in vendors {
        table.add_row(vec![
            vendor.id.to_string(),
            vendor.name.clone(),
            vendor.tickets_per_release.to_string(),
            vendor.release_rate_secs.to_string(),
        ]);
    }
    table
}

fn print_json(vendors: &[Vendor]) {
    println!("[");
    for (i, vendor) in vendors.iter().enumerate() {
        let comma = if i + 1 < vendors.len() { "," } else { "" };
        println!(
            "  {{ \"id\": {}, \"name\": {}, \"tickets_per_release\": {}, \"release_rate_sec\": {} }}{}",
            vendor.id,
            json_string(&vendor.name),
            vendor.tickets_per_release,
            vendor.release_rate_secs,
            comma
        );
    }
    println!("]");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Storage;

    #[test]
    fn test_add_rejects_incomplete_vendor() {
        let store = Storage::open_in_memory().unwrap();
        assert!(matches!(
            add_vendor(&store, "acme", 0, 10),
            Err(Error::InvalidArgument(_))
        ));
        assert!(add_vendor(&store, "   ", 1, 10).is_err());
        assert_eq!(store.count().unwrap(), 0);

        let id = add_vendor(&store, " acme ", 4, 10).unwrap();
        assert_eq!(store.find(id).unwrap().unwrap().name, "acme");
    }

    #[test]
    fn test_update_merges_fields() {
        let store = Storage::open_in_memory().unwrap();
        let id = add_vendor(&store, "acme", 4, 10).unwrap();

        let updated = update_vendor(&store, id, None, Some(9), None).unwrap();
        assert_eq!(updated.tickets_per_release, 9);
        assert_eq!(updated.release_rate_secs, 10);
        assert_eq!(store.find(id).unwrap(), Some(updated));

        assert!(matches!(
            update_vendor(&store, id + 100, None, Some(1), None),
            Err(Error::VendorNotFound(_))
        ));
        assert!(update_vendor(&store, id, None, None, Some(0)).is_err());
    }

    #[test]
    fn test_table_lists_every_vendor() {
        let store = Storage::open_in_memory().unwrap();
        add_vendor(&store, "acme", 4, 10).unwrap();
        add_vendor(&store, "globex", 2, 5).unwrap();

        let rendered = vendor_table(&store.list_active().unwrap()).to_string();
        assert!(rendered.contains("acme"));
        assert!(rendered.contains("globex"));
        assert!(rendered.contains("TICKETS/RELEASE"));
    }
}
