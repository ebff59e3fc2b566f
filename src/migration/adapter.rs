//! Live schema introspection

use serde_json::{json, Map, Value as Json};
use std::collections::BTreeSet;

use super::error::MigrationError;
use super::snapshot::SchemaDescriptor;
use crate::database::{
    Connection, DbError, Engine, ParamMap, Row, SqlBuilder, StandardBuilder, Value,
};

/// Reads the live schema of a data store
pub trait SchemaAdapter {
    /// Describe every table as `{ columns, indexes, options }`
    fn schema(&mut self, conn: &mut Connection) -> Result<SchemaDescriptor, MigrationError>;

    fn quote_table_name(&self, name: &str) -> String;

    fn quote_column_name(&self, name: &str) -> String;
}

/// Introspection through SQLite's `sqlite_master` and `PRAGMA` tables
#[derive(Debug, Clone)]
pub struct SqliteSchemaAdapter {
    quoting: StandardBuilder,
    ignored: BTreeSet<String>,
}

impl Default for SqliteSchemaAdapter {
    fn default() -> Self {
        SqliteSchemaAdapter {
            quoting: StandardBuilder::new(Engine::Sqlite, ""),
            ignored: BTreeSet::new(),
        }
    }
}

impl SqliteSchemaAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave a table out of the descriptor, e.g. the migration tracking table
    pub fn ignore_table(mut self, table: impl Into<String>) -> Self {
        self.ignored.insert(table.into());
        self
    }

    fn rows(&self, conn: &mut Connection, sql: &str) -> Result<Vec<Row>, MigrationError> {
        let rows = match conn.exec(sql, &ParamMap::new(), None)? {
            Some(mut cursor) => cursor.fetch_all().map_err(|source| DbError::Statement {
                sql: sql.to_string(),
                source,
            })?,
            None => Vec::new(),
        };
        Ok(rows)
    }

    fn tables(&self, conn: &mut Connection) -> Result<Vec<String>, MigrationError> {
        let rows = self.rows(
            conn,
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )?;
        Ok(rows
            .iter()
            .filter_map(|row| text(row, "name"))
            .filter(|name| !self.ignored.contains(name))
            .collect())
    }

    fn columns(&self, conn: &mut Connection, table: &str) -> Result<Map<String, Json>, MigrationError> {
        let sql = format!("PRAGMA table_info({})", self.quote_table_name(table));
        let mut columns = Map::new();
        for row in self.rows(conn, &sql)? {
            let Some(name) = text(&row, "name") else {
                continue;
            };
            columns.insert(
                name,
                json!({
                    "type": text(&row, "type").unwrap_or_default(),
                    "notnull": integer(&row, "notnull") != 0,
                    "default": row.get("dflt_value").map(to_json).unwrap_or(Json::Null),
                    "pk": integer(&row, "pk"),
                }),
            );
        }
        Ok(columns)
    }

    fn indexes(&self, conn: &mut Connection, table: &str) -> Result<Map<String, Json>, MigrationError> {
        let sql = format!("PRAGMA index_list({})", self.quote_table_name(table));
        let mut indexes = Map::new();
        for row in self.rows(conn, &sql)? {
            let Some(name) = text(&row, "name") else {
                continue;
            };
            if name.starts_with("sqlite_autoindex") {
                continue;
            }
            let info = format!("PRAGMA index_info({})", self.quote_table_name(&name));
            let columns: Vec<Json> = self
                .rows(conn, &info)?
                .iter()
                .filter_map(|r| text(r, "name"))
                .map(Json::String)
                .collect();
            indexes.insert(
                name,
                json!({
                    "columns": columns,
                    "unique": integer(&row, "unique") != 0,
                }),
            );
        }
        Ok(indexes)
    }
}

impl SchemaAdapter for SqliteSchemaAdapter {
    fn schema(&mut self, conn: &mut Connection) -> Result<SchemaDescriptor, MigrationError> {
        let mut descriptor = SchemaDescriptor::new();
        for table in self.tables(conn)? {
            let columns = self.columns(conn, &table)?;
            let indexes = self.indexes(conn, &table)?;
            descriptor.insert(
                table,
                json!({
                    "columns": columns,
                    "indexes": indexes,
                    "options": {},
                }),
            );
        }
        Ok(descriptor)
    }

    fn quote_table_name(&self, name: &str) -> String {
        self.quoting.table_quote(name)
    }

    fn quote_column_name(&self, name: &str) -> String {
        self.quoting.column_quote(name)
    }
}

fn text(row: &Row, column: &str) -> Option<String> {
    row.get(column).and_then(Value::to_text)
}

fn integer(row: &Row, column: &str) -> i64 {
    row.get(column).and_then(Value::to_integer).unwrap_or(0)
}

fn to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Integer(i) => json!(i),
        Value::Real(r) => json!(r),
        Value::Bool(b) => json!(b),
        other => Json::String(other.to_text().unwrap_or_default()),
    }
}
