pub mod config;
pub mod run;
pub mod sales;
pub mod status;
pub mod system;
pub mod vendors;

use crate::error::Result;
use crate::storage::Storage;
use std::path::Path;
use std::sync::Arc;

/// Open (creating and seeding if needed) the database at `db`
pub fn open_store(db: &Path) -> Result<Arc<Storage>> {
    Ok(Arc::new(Storage::open(db)?))
}

/// Quote and escape `s` as a JSON string
pub(crate) fn json_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Quote a CSV field when it needs it
pub(crate) fn csv_field(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
