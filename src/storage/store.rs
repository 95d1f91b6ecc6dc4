use super::schema::{self, OptionalExt, SCHEMA_VERSION};
use super::{ConfigStore, SalesLedger, VendorDirectory};
use crate::config::{ConfigKey, Group};
use crate::error::{Error, Result};
use crate::vendor::Vendor;
use chrono::{DateTime, FixedOffset, Local};
use parking_lot::Mutex;
use rusqlite::Connection;
use std::path::Path;
use std::time::Duration;

/// How long a writer waits on a lock held by another process (e.g. the CLI)
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// One row of the sales log
#[derive(Debug, Clone, PartialEq)]
pub struct SalesLogEntry {
    pub id: i64,
    pub recorded_at: DateTime<FixedOffset>,
    pub text: String,
}

/// SQLite-backed config table, sales log and vendor directory
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Open (or create) a database file, seeding defaults on first run
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // Enable WAL mode so the CLI can read while the engine writes
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::init(conn)
    }

    /// Private in-memory database, used by tests and dry runs
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;

        schema::create_tables(&conn)?;
        schema::seed_defaults(&conn)?;

        if schema::get_meta(&conn, "version")?.is_none() {
            schema::set_meta(&conn, "version", &SCHEMA_VERSION.to_string())?;
            schema::set_meta(&conn, "created_at", &Local::now().to_rfc3339())?;
        }

        Ok(Storage {
            conn: Mutex::new(conn),
        })
    }

    /// RFC 3339 time the database was first created
    pub fn created_at(&self) -> Result<Option<String>> {
        let conn = self.conn.lock();
        Ok(schema::get_meta(&conn, "created_at")?)
    }
}

fn restart_key(group: Group) -> String {
    format!("restart_generation.{}", group.as_str())
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SalesLogEntry> {
    let raw: String = row.get(1)?;
    let recorded_at = DateTime::parse_from_rfc3339(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SalesLogEntry {
        id: row.get(0)?,
        recorded_at,
        text: row.get(2)?,
    })
}

fn vendor_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Vendor> {
    Ok(Vendor {
        id: row.get(0)?,
        name: row.get(1)?,
        tickets_per_release: row.get(2)?,
        release_rate_secs: row.get(3)?,
    })
}

impl ConfigStore for Storage {
    fn get(&self, key: ConfigKey) -> Result<i64> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT config_value FROM system_config WHERE config_key = ?",
            [key.as_str()],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::ConfigNotFound(key.to_string()))
    }

    fn set(&self, key: ConfigKey, value: i64) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE system_config SET config_value = ? WHERE config_key = ?",
                rusqlite::params![value, key.as_str()],
            )
            .map_err(|e| Error::write_failed(key.as_str(), e))?;

        if rows == 0 {
            return Err(Error::ConfigNotFound(key.to_string()));
        }
        Ok(())
    }

    fn set_within_bounds(&self, key: ConfigKey, value: i64) -> Result<bool> {
        let sql = match key {
            ConfigKey::TotalTickets => {
                "UPDATE system_config SET config_value = ?1
                 WHERE config_key = ?2 AND ?1 >= 0 AND ?1 <= (
                     SELECT config_value FROM system_config
                     WHERE config_key = 'max_ticket_capacity'
                 )"
            }
            ConfigKey::MaxTicketCapacity => {
                "UPDATE system_config SET config_value = ?1
                 WHERE config_key = ?2 AND ?1 >= 0 AND ?1 >= (
                     SELECT config_value FROM system_config
                     WHERE config_key = 'total_tickets'
                 )"
            }
            _ => {
                self.set(key, value)?;
                return Ok(true);
            }
        };

        let conn = self.conn.lock();
        let rows = conn
            .execute(sql, rusqlite::params![value, key.as_str()])
            .map_err(|e| Error::write_failed(key.as_str(), e))?;
        if rows > 0 {
            return Ok(true);
        }

        let present: i64 = conn.query_row(
            "SELECT COUNT(*) FROM system_config WHERE config_key = ?",
            [key.as_str()],
            |row| row.get(0),
        )?;
        if present == 0 {
            return Err(Error::ConfigNotFound(key.to_string()));
        }
        Ok(false)
    }

    fn request_restart(&self, group: Group) -> Result<u64> {
        let conn = self.conn.lock();
        let generation: i64 = conn
            .query_row(
                "INSERT INTO meta (key, value) VALUES (?1, '1')
                 ON CONFLICT(key) DO UPDATE SET value = CAST(value AS INTEGER) + 1
                 RETURNING CAST(value AS INTEGER)",
                [restart_key(group)],
                |row| row.get(0),
            )
            .map_err(|e| Error::write_failed(format!("{group} restart request"), e))?;
        Ok(generation as u64)
    }

    fn restart_generation(&self, group: Group) -> Result<u64> {
        let conn = self.conn.lock();
        let raw = schema::get_meta(&conn, &restart_key(group))?;
        Ok(raw.and_then(|value| value.parse().ok()).unwrap_or(0))
    }
}

impl SalesLedger for Storage {
    fn append(&self, text: &str) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO sales_log (recorded_at, log) VALUES (?, ?)",
            rusqlite::params![Local::now().to_rfc3339(), text],
        )
        .map_err(|e| Error::write_failed("sales log entry", e))?;
        Ok(conn.last_insert_rowid())
    }

    fn list_all(&self) -> Result<Vec<SalesLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt =
            conn.prepare_cached("SELECT sale_id, recorded_at, log FROM sales_log ORDER BY sale_id")?;
        let rows = stmt.query_map([], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn recent(&self, limit: usize) -> Result<Vec<SalesLogEntry>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            r#"
            SELECT sale_id, recorded_at, log FROM (
                SELECT sale_id, recorded_at, log FROM sales_log
                ORDER BY sale_id DESC
                LIMIT ?
            )
            ORDER BY sale_id ASC
            "#,
        )?;
        let rows = stmt.query_map([limit as i64], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    fn entry_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM sales_log", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

impl VendorDirectory for Storage {
    fn list_active(&self) -> Result<Vec<Vendor>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT vendor_id, vendor_name, tickets_per_release, release_rate_sec
             FROM vendors ORDER BY vendor_id",
        )?;
        let rows = stmt.query_map([], vendor_from_row)?;

        let mut vendors = Vec::new();
        for row in rows {
            vendors.push(row?);
        }
        Ok(vendors)
    }

    fn add(&self, name: &str, tickets_per_release: u32, release_rate_secs: u32) -> Result<i64> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO vendors (vendor_name, tickets_per_release, release_rate_sec)
             VALUES (?, ?, ?)",
            rusqlite::params![name, tickets_per_release, release_rate_secs],
        )
        .map_err(|e| Error::write_failed(format!("vendor '{name}'"), e))?;
        Ok(conn.last_insert_rowid())
    }

    fn update(&self, vendor: &Vendor) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute(
                "UPDATE vendors
                 SET vendor_name = ?, tickets_per_release = ?, release_rate_sec = ?
                 WHERE vendor_id = ?",
                rusqlite::params![
                    vendor.name,
                    vendor.tickets_per_release,
                    vendor.release_rate_secs,
                    vendor.id
                ],
            )
            .map_err(|e| Error::write_failed(format!("vendor {}", vendor.id), e))?;
        Ok(rows > 0)
    }

    fn remove(&self, vendor_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let rows = conn
            .execute("DELETE FROM vendors WHERE vendor_id = ?", [vendor_id])
            .map_err(|e| Error::write_failed(format!("vendor {vendor_id}"), e))?;
        Ok(rows > 0)
    }

    fn find(&self, vendor_id: i64) -> Result<Option<Vendor>> {
        let conn = self.conn.lock();
        Ok(conn
            .query_row(
                "SELECT vendor_id, vendor_name, tickets_per_release, release_rate_sec
                 FROM vendors WHERE vendor_id = ?",
                [vendor_id],
                vendor_from_row,
            )
            .optional()?)
    }

    fn exists(&self, vendor_id: i64) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM vendors WHERE vendor_id = ?",
            [vendor_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    fn count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM vendors", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}
