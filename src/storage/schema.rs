use crate::config::ConfigKey;
use rusqlite::Connection;

pub const SCHEMA_VERSION: i32 = 1;

/// Create all tables if missing. Existing data is kept across runs.
pub fn create_tables(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Metadata table
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );

        -- Durable tunables, one row per key
        CREATE TABLE IF NOT EXISTS system_config (
            id INTEGER PRIMARY KEY,
            config_key TEXT NOT NULL UNIQUE,
            config_value INTEGER NOT NULL
        );

        -- Append-only record of successful pool transactions
        CREATE TABLE IF NOT EXISTS sales_log (
            sale_id INTEGER PRIMARY KEY AUTOINCREMENT,
            recorded_at TEXT NOT NULL,
            log TEXT NOT NULL
        );

        -- Vendors that release tickets while the system runs
        CREATE TABLE IF NOT EXISTS vendors (
            vendor_id INTEGER PRIMARY KEY AUTOINCREMENT,
            vendor_name TEXT NOT NULL,
            tickets_per_release INTEGER NOT NULL,
            release_rate_sec INTEGER NOT NULL
        );
        "#,
    )
}

/// Insert default values for any config key that is not present yet
pub fn seed_defaults(conn: &Connection) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT OR IGNORE INTO system_config (config_key, config_value) VALUES (?, ?)",
    )?;
    for key in ConfigKey::ALL {
        stmt.execute(rusqlite::params![key.as_str(), key.default_value()])?;
    }
    Ok(())
}

/// Set a metadata key
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
        [key, value],
    )?;
    Ok(())
}

/// Get a metadata key
pub fn get_meta(conn: &Connection, key: &str) -> rusqlite::Result<Option<String>> {
    conn.query_row("SELECT value FROM meta WHERE key = ?", [key], |row| {
        row.get(0)
    })
    .optional()
}

pub(crate) trait OptionalExt<T> {
    fn optional(self) -> rusqlite::Result<Option<T>>;
}

impl<T> OptionalExt<T> for rusqlite::Result<T> {
    fn optional(self) -> rusqlite::Result<Option<T>> {
        match self {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
