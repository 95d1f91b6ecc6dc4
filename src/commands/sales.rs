use crate::commands::{csv_field, json_string, open_store};
use crate::error::Result;
use crate::storage::{SalesLedger, SalesLogEntry};
use comfy_table::{Table, presets::UTF8_FULL};
use std::path::Path;

pub fn run(db: &Path, limit: Option<usize>, json: bool, csv: bool) -> Result<()> {
    let store = open_store(db)?;
    let entries = match limit {
        Some(n) => store.recent(n)?,
        None => store.list_all()?,
    };

    if json {
        print_json(&entries);
    } else if csv {
        print_csv(&entries);
    } else if entries.is_empty() {
        println!("Sales log is empty.");
    } else {
        println!("{}", sales_table(&entries));
    }
    Ok(())
}

fn sales_table(entries: &[SalesLogEntry]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["ID", "TIME", "ENTRY"]);
    for entry in entries {
        table.add_row(vec![
            entry.id.to_string(),
            entry.recorded_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.text.clone(),
        ]);
    }
    table
}

fn print_json(entries: &[SalesLogEntry]) {
    println!("[");
    for (i, entry) in entries.iter().enumerate() {
        let comma = if i + 1 < entries.len() { "," } else { "" };
        println!(
            "  {{ \"id\": {}, \"recorded_at\": \"{}\", \"log\": {} }}{}",
            entry.id,
            entry.recorded_at.to_rfc3339(),
            json_string(&entry.text),
            comma
        );
    }
    println!("]");
}

fn print_csv(entries: &[SalesLogEntry]) {
    println!("id,recorded_at,log");
    for entry in entries {
        println!(
            "{},{},{}",
            entry.id,
            entry.recorded_at.to_rfc3339(),
            csv_field(&entry.text)
        );
    }
}
