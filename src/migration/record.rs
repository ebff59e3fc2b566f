//! Marking migrations as applied

use chrono::{DateTime, Utc};
use tracing::info;

use super::adapter::SchemaAdapter;
use super::error::MigrationError;
use super::naming;
use crate::database::{Connection, ParamMap};

/// Longest migration name stored in the tracking table
pub const MAX_NAME_LENGTH: usize = 100;

/// Timestamp format of the tracking table
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Row of the migration tracking table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    pub version: String,
    pub migration_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub breakpoint: bool,
}

impl MigrationRecord {
    /// Record for a migration that is marked without being run
    pub fn marked(file_name: &str, class_name: &str, now: DateTime<Utc>) -> Self {
        MigrationRecord {
            version: naming::version_of(file_name).to_string(),
            migration_name: class_name.chars().take(MAX_NAME_LENGTH).collect(),
            start_time: now,
            end_time: now,
            breakpoint: false,
        }
    }
}

/// Persists migration records
pub trait MigrationRecorder {
    fn record(
        &mut self,
        conn: &mut Connection,
        record: &MigrationRecord,
    ) -> Result<(), MigrationError>;
}

/// Tracking table written through a [`Connection`]
///
/// Identifiers are quoted once by the schema adapter; all values are bound.
#[derive(Debug, Clone)]
pub struct TrackingTable {
    table: String,
    columns: [String; 5],
}

impl TrackingTable {
    pub fn new(adapter: &dyn SchemaAdapter, table: &str) -> Self {
        let columns = [
            "version",
            "migration_name",
            "start_time",
            "end_time",
            "breakpoint",
        ]
        .map(|c| adapter.quote_column_name(c));
        TrackingTable {
            table: adapter.quote_table_name(table),
            columns,
        }
    }

    /// Create the tracking table when it does not exist yet
    pub fn ensure(&self, conn: &mut Connection) -> Result<(), MigrationError> {
        let [version, name, start, end, breakpoint] = &self.columns;
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {} ({} BIGINT NOT NULL PRIMARY KEY, {} VARCHAR({}), {} TIMESTAMP NULL, {} TIMESTAMP NULL, {} BOOLEAN NOT NULL DEFAULT 0)",
            self.table, version, name, MAX_NAME_LENGTH, start, end, breakpoint
        );
        conn.exec(&sql, &ParamMap::new(), None)?;
        Ok(())
    }
}

impl MigrationRecorder for TrackingTable {
    fn record(
        &mut self,
        conn: &mut Connection,
        record: &MigrationRecord,
    ) -> Result<(), MigrationError> {
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (:version, :migration_name, :start_time, :end_time, :breakpoint)",
            self.table,
            self.columns.join(", ")
        );
        let params = ParamMap::new()
            .with(":version", record.version.as_str())
            .with(":migration_name", record.migration_name.as_str())
            .with(":start_time", record.start_time.format(TIME_FORMAT).to_string())
            .with(":end_time", record.end_time.format(TIME_FORMAT).to_string())
            .with(":breakpoint", record.breakpoint);
        conn.exec(&sql, &params, None)?;
        info!("migration {} marked as applied", record.version);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Query;
    use crate::migration::adapter::SqliteSchemaAdapter;
    use chrono::TimeZone;

    #[test]
    fn test_marked_record() {
        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let long = "A".repeat(150);
        let record = MigrationRecord::marked("20260102030405_a.sql", &long, now);

        assert_eq!(record.version, "20260102030405");
        assert_eq!(record.migration_name.len(), MAX_NAME_LENGTH);
        assert_eq!(record.start_time, record.end_time);
        assert!(!record.breakpoint);
    }

    #[test]
    fn test_tracking_table_insert_binds_values() {
        let mut conn = Connection::open_in_memory().unwrap();
        let adapter = SqliteSchemaAdapter::new();
        let mut table = TrackingTable::new(&adapter, "migration_log");
        table.ensure(&mut conn).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap();
        let record = MigrationRecord::marked("20260102030405_o_neil.sql", "O'Neil", now);
        table.record(&mut conn, &record).unwrap();

        let rows = conn.select(&Query::table("migration_log")).unwrap();
        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert_eq!(row.get("version").and_then(|v| v.to_integer()), Some(20260102030405));
        assert_eq!(
            row.get("migration_name").and_then(|v| v.to_text()).as_deref(),
            Some("O'Neil")
        );
        assert_eq!(
            row.get("start_time").and_then(|v| v.to_text()).as_deref(),
            Some("2026-01-02 03:04:05")
        );
        assert_eq!(row.get("breakpoint").and_then(|v| v.to_integer()), Some(0));
    }
}
