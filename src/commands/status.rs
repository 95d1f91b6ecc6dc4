use crate::commands::{json_string, open_store};
use crate::config::SystemConfig;
use crate::error::Result;
use crate::storage::{SalesLedger, Storage, VendorDirectory};
use std::path::Path;

/// Everything `status` reports
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub config: SystemConfig,
    pub vendors: u64,
    pub sales_entries: u64,
    pub created_at: Option<String>,
}

impl StatusReport {
    pub fn collect(store: &Storage) -> Result<Self> {
        Ok(StatusReport {
            config: SystemConfig::load(store)?,
            vendors: store.count()?,
            sales_entries: store.entry_count()?,
            created_at: store.created_at()?,
        })
    }
}

pub fn run(db: &Path, json: bool) -> Result<()> {
    let store = open_store(db)?;
    let report = StatusReport::collect(&store)?;

    if json {
        print_json(db, &report);
    } else {
        print_table(db, &report);
    }
    Ok(())
}

fn print_table(db: &Path, report: &StatusReport) {
    let cfg = &report.config;
    println!("# {}", db.display());
    if let Some(created) = &report.created_at {
        println!("# Created: {}", created);
    }
    println!();

    println!("{:<26}{}", "system_status", cfg.system_status);
    println!(
        "{:<26}{} / {}",
        "tickets", cfg.total_tickets, cfg.max_ticket_capacity
    );
    println!("{:<26}{}s", "ticket_release_rate", cfg.ticket_release_rate);
    println!(
        "{:<26}{}s",
        "customer_retrieval_rate", cfg.customer_retrieval_rate
    );
    println!("{:<26}{}", "vendors", report.vendors);
    println!("{:<26}{}", "sales_log_entries", report.sales_entries);
}

fn print_json(db: &Path, report: &StatusReport) {
    let cfg = &report.config;
    println!("{{");
    println!("  \"db\": {},", json_string(&db.display().to_string()));
    if let Some(created) = &report.created_at {
        println!("  \"created_at\": {},", json_string(created));
    }
    println!("  \"system_status\": \"{}\",", cfg.system_status);
    println!("  \"total_tickets\": {},", cfg.total_tickets);
    println!("  \"max_ticket_capacity\": {},", cfg.max_ticket_capacity);
    println!("  \"ticket_release_rate\": {},", cfg.ticket_release_rate);
    println!(
        "  \"customer_retrieval_rate\": {},",
        cfg.customer_retrieval_rate
    );
    println!("  \"vendors\": {},", report.vendors);
    println!("  \"sales_log_entries\": {}", report.sales_entries);
    println!("}}");
}
