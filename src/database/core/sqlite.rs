//! SQLite driver backed by rusqlite

//!
//! Result sets are streamed: each [`Cursor::fetch`] steps the statement once.

use ouroboros::self_referencing;
use rusqlite::types::{Value as SqlValue, ValueRef};
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::Arc;
use tracing::debug;

use super::driver::{
    BufferedCursor, Cursor, Driver, DriverError, ErrorInfo, FetchMode, Handle, ParamMap, Row,
    ServerInfo, Value,
};
use super::engine::{ConnectSpec, Engine};

/// Generic SQLSTATE reported for SQLite failures
const SQLITE_SQLSTATE: &str = "HY000";

/// Driver for the `sqlite:` DSN
#[derive(Debug, Default, Clone, Copy)]
pub struct SqliteDriver;

impl Driver for SqliteDriver {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn connect(&self, spec: &ConnectSpec) -> Result<Box<dyn Handle>, DriverError> {
        if spec.engine != Engine::Sqlite {
            return Err(DriverError::new(format!(
                "sqlite driver cannot open a {} connection",
                spec.engine
            )));
        }
        let path = spec
            .dsn
            .strip_prefix("sqlite:")
            .ok_or_else(|| DriverError::new(format!("not a sqlite DSN: {}", spec.dsn)))?;

        let conn = rusqlite::Connection::open(path).map_err(driver_error)?;
        debug!("opened sqlite database at {}", path);

        Ok(Box::new(SqliteHandle {
            conn: Rc::new(conn),
            path: path.to_string(),
            column_case: ColumnCase::from_options(&spec.options),
            last_error: ErrorInfo::default(),
        }))
    }
}

/// Column-name case folding requested through the `case` driver option
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnCase {
    Natural,
    Lower,
    Upper,
}

impl ColumnCase {
    fn from_options(options: &BTreeMap<String, String>) -> Self {
        match options.get("case").map(|c| c.to_lowercase()).as_deref() {
            Some("lower") => ColumnCase::Lower,
            Some("upper") => ColumnCase::Upper,
            _ => ColumnCase::Natural,
        }
    }

    fn apply(&self, name: &str) -> String {
        match self {
            ColumnCase::Natural => name.to_string(),
            ColumnCase::Lower => name.to_lowercase(),
            ColumnCase::Upper => name.to_uppercase(),
        }
    }
}

struct SqliteHandle {
    /// Shared with the cursors of open result sets
    conn: Rc<rusqlite::Connection>,
    path: String,
    column_case: ColumnCase,
    last_error: ErrorInfo,
}

impl SqliteHandle {
    fn track<T>(&mut self, result: Result<T, DriverError>) -> Result<T, DriverError> {
        match &result {
            Ok(_) => self.last_error = ErrorInfo::default(),
            Err(e) => self.last_error = e.info(),
        }
        result
    }

    fn run_statement(
        &self,
        sql: &str,
        params: &ParamMap,
        fetch: Option<FetchMode>,
    ) -> Result<Box<dyn Cursor>, DriverError> {
        let mut columns: Vec<String> = Vec::new();
        let column_case = self.column_case;
        let mut cell = RowCell::try_new(
            Rc::clone(&self.conn),
            |conn| {
                prepare_bound(conn, sql, params).map(|stmt| {
                    columns = stmt
                        .column_names()
                        .into_iter()
                        .map(|c| column_case.apply(c))
                        .collect();
                    stmt
                })
            },
            |stmt| Ok::<_, DriverError>(stmt.raw_query()),
        )?;

        if columns.is_empty() {
            // no result set: a single step runs the statement to completion
            cell.with_rows_mut(|rows| rows.next().map(|_| ()))
                .map_err(driver_error)?;
            let affected = usize::try_from(self.conn.changes()).unwrap_or(usize::MAX);
            return Ok(Box::new(BufferedCursor::affected(affected)));
        }

        Ok(Box::new(SqliteCursor {
            columns: Arc::from(columns),
            mode: fetch.unwrap_or_default(),
            cell,
        }))
    }
}

fn prepare_bound<'c>(
    conn: &'c rusqlite::Connection,
    sql: &str,
    params: &ParamMap,
) -> Result<rusqlite::Statement<'c>, DriverError> {
    let mut stmt = conn.prepare(sql).map_err(driver_error)?;

    for param in params.iter() {
        let index = match stmt.parameter_index(&param.name).map_err(driver_error)? {
            Some(index) => Some(index),
            None => stmt
                .parameter_index(&format!(":{}", param.name))
                .map_err(driver_error)?,
        };
        let index = index.ok_or_else(|| {
            DriverError::new(format!("unknown parameter {}", param.name))
                .with_sqlstate(SQLITE_SQLSTATE)
        })?;
        stmt.raw_bind_parameter(index, to_sql_value(param.coerced()))
            .map_err(driver_error)?;
    }
    Ok(stmt)
}

/// A prepared statement and its open result, kept alongside the connection they borrow
#[self_referencing]
struct RowCell {
    conn: Rc<rusqlite::Connection>,
    #[borrows(conn)]
    #[not_covariant]
    stmt: rusqlite::Statement<'this>,
    #[borrows(mut stmt)]
    #[not_covariant]
    rows: rusqlite::Rows<'this>,
}

/// Cursor stepping the SQLite statement once per fetch
struct SqliteCursor {
    columns: Arc<[String]>,
    mode: FetchMode,
    cell: RowCell,
}

impl Cursor for SqliteCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self) -> Result<Option<Row>, DriverError> {
        let width = self.columns.len();
        loop {
            let values = self.cell.with_rows_mut(|rows| -> Result<_, DriverError> {
                let Some(row) = rows.next().map_err(driver_error)? else {
                    return Ok(None);
                };
                let mut values = Vec::with_capacity(width);
                for i in 0..width {
                    values.push(from_value_ref(row.get_ref(i).map_err(driver_error)?));
                }
                Ok(Some(values))
            })?;
            let Some(values) = values else {
                return Ok(None);
            };
            if let Some(row) = Row::new(self.columns.clone(), values).shaped(self.mode) {
                return Ok(Some(row));
            }
        }
    }

    fn rows_affected(&self) -> usize {
        0
    }
}

impl Handle for SqliteHandle {
    fn execute_command(&mut self, sql: &str) -> Result<(), DriverError> {
        let result = self.conn.execute_batch(sql).map_err(driver_error);
        self.track(result)
    }

    fn run(
        &mut self,
        sql: &str,
        params: &ParamMap,
        fetch: Option<FetchMode>,
    ) -> Result<Box<dyn Cursor>, DriverError> {
        let result = self.run_statement(sql, params, fetch);
        self.track(result)
    }

    fn begin(&mut self) -> Result<(), DriverError> {
        self.execute_command("BEGIN")
    }

    fn commit(&mut self) -> Result<(), DriverError> {
        self.execute_command("COMMIT")
    }

    fn rollback(&mut self) -> Result<(), DriverError> {
        self.execute_command("ROLLBACK")
    }

    fn last_insert_id(&mut self) -> Result<Value, DriverError> {
        Ok(Value::Integer(self.conn.last_insert_rowid()))
    }

    fn error_info(&self) -> ErrorInfo {
        self.last_error.clone()
    }

    fn server_info(&self) -> ServerInfo {
        ServerInfo {
            driver: "sqlite".to_string(),
            server: None,
            client: Some(format!("rusqlite (libsqlite3 {})", rusqlite::version())),
            version: Some(rusqlite::version().to_string()),
            connection: Some(format!(
                "{}{}",
                self.path,
                if self.conn.is_autocommit() {
                    ""
                } else {
                    " (in transaction)"
                }
            )),
        }
    }
}

fn driver_error(e: rusqlite::Error) -> DriverError {
    match &e {
        rusqlite::Error::SqliteFailure(err, message) => DriverError::new(
            message.clone().unwrap_or_else(|| err.to_string()),
        )
        .with_code(err.extended_code as i64)
        .with_sqlstate(SQLITE_SQLSTATE),
        _ => DriverError::new(e.to_string()).with_sqlstate(SQLITE_SQLSTATE),
    }
}

fn to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(i),
        Value::Real(r) => SqlValue::Real(r),
        Value::Text(s) => SqlValue::Text(s),
        Value::Blob(b) => SqlValue::Blob(b),
        Value::Bool(b) => SqlValue::Integer(b as i64),
    }
}

fn from_value_ref(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(r) => Value::Real(r),
        ValueRef::Text(t) => Value::Text(String::from_utf8_lossy(t).into_owned()),
        ValueRef::Blob(b) => Value::Blob(b.to_vec()),
    }
}
