//! Driver abstraction
//!
//! The connection manager never talks to a database library directly. A
//! [`Driver`] turns a [`ConnectSpec`] into a live [`Handle`], and a handle runs
//! prepared statements, returning a forward-only [`Cursor`] over the result.
//!
//! This module also holds the value types that flow across that boundary:
//! [`Value`], [`ParamMap`], [`Row`] and the driver-native error information.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use super::engine::ConnectSpec;

/// MySQL-family code for "server has gone away"
pub const CR_SERVER_GONE_ERROR: i64 = 2006;

/// MySQL-family code for "lost connection to server during query"
pub const CR_SERVER_LOST: i64 = 2013;

/// A single database value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Bool(bool),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Textual form of the value as a text-returning driver would hand it back
    ///
    /// Booleans and NULL have no textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null | Value::Bool(_) => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(format!("{:?}", r)),
            Value::Text(s) => Some(s.clone()),
            Value::Blob(b) => String::from_utf8(b.clone()).ok(),
        }
    }

    /// Integer view of a numeric value, truncating reals and parsing numeric text
    pub fn to_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Real(r) if r.is_finite() => Some(r.trunc() as i64),
            Value::Text(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|r| r.is_finite()).map(|r| r.trunc() as i64))
            }
            _ => None,
        }
    }

    /// SQL literal used when rendering a statement for inspection
    pub fn to_sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Real(r) => format!("{:?}", r),
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Blob(b) => {
                let hex: String = b.iter().map(|byte| format!("{:02X}", byte)).collect();
                format!("X'{}'", hex)
            }
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            other => write!(f, "{}", other.to_text().unwrap_or_default()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type of a bound parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Null,
    Int,
    Str,
    Lob,
    Bool,
}

impl ParamType {
    /// Type a builder would declare for the given value
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => ParamType::Null,
            Value::Integer(_) => ParamType::Int,
            Value::Bool(_) => ParamType::Bool,
            Value::Blob(_) => ParamType::Lob,
            Value::Real(_) | Value::Text(_) => ParamType::Str,
        }
    }
}

/// A named parameter with its value and declared type
#[derive(Debug, Clone, PartialEq)]
pub struct BoundParam {
    pub name: String,
    pub value: Value,
    pub kind: ParamType,
}

impl BoundParam {
    /// The value converted to its declared type, as a driver binds it
    pub fn coerced(&self) -> Value {
        match (self.kind, &self.value) {
            (ParamType::Null, _) => Value::Null,
            (_, Value::Null) => Value::Null,
            (ParamType::Int, Value::Bool(b)) => Value::Integer(*b as i64),
            (ParamType::Int, v) => v.to_integer().map(Value::Integer).unwrap_or_else(|| v.clone()),
            (ParamType::Bool, Value::Bool(b)) => Value::Integer(*b as i64),
            (ParamType::Bool, v) => Value::Integer(v.to_integer().map_or(0, |i| (i != 0) as i64)),
            (ParamType::Str, Value::Text(s)) => Value::Text(s.clone()),
            (ParamType::Str, Value::Blob(b)) => Value::Blob(b.clone()),
            (ParamType::Str, v) => Value::Text(v.to_string()),
            (ParamType::Lob, Value::Text(s)) => Value::Blob(s.clone().into_bytes()),
            (ParamType::Lob, v) => v.clone(),
        }
    }
}

/// Insertion-ordered placeholder map produced by a SQL builder
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamMap {
    params: Vec<BoundParam>,
}

impl ParamMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter, replacing an earlier one with the same name in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>, kind: ParamType) {
        let name = name.into();
        let value = value.into();
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.value = value;
                existing.kind = kind;
            }
            None => self.params.push(BoundParam { name, value, kind }),
        }
    }

    /// Builder-style insert that infers the declared type from the value
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let value = value.into();
        let kind = ParamType::of(&value);
        self.insert(name, value, kind);
        self
    }

    pub fn get(&self, name: &str) -> Option<&BoundParam> {
        self.params.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BoundParam> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

/// How rows are shaped when fetched from a cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchMode {
    /// Whole row, addressable by column name or position
    #[default]
    Assoc,
    /// Only the column at the given position
    Column(usize),
}

/// A fetched row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn get_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Narrow the row to the column at `index`
    pub fn project(self, index: usize) -> Option<Row> {
        let name = self.columns.get(index)?.clone();
        let value = self.values.into_iter().nth(index)?;
        Some(Row::new(Arc::from(vec![name]), vec![value]))
    }

    /// Apply a fetch mode, `None` when the requested column does not exist
    pub fn shaped(self, mode: FetchMode) -> Option<Row> {
        match mode {
            FetchMode::Assoc => Some(self),
            FetchMode::Column(index) => self.project(index),
        }
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (column, value) in self.columns.iter().zip(self.values.iter()) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Driver-native error information: SQLSTATE, driver code and message
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorInfo {
    pub sqlstate: Option<String>,
    pub code: Option<i64>,
    pub message: Option<String>,
}

impl ErrorInfo {
    pub fn is_clear(&self) -> bool {
        self.code.is_none() && self.message.is_none()
    }
}

/// Error reported by a driver handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: Option<i64>,
    pub sqlstate: Option<String>,
    pub message: String,
}

impl DriverError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            sqlstate: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_sqlstate(mut self, sqlstate: impl Into<String>) -> Self {
        self.sqlstate = Some(sqlstate.into());
        self
    }

    /// Whether the error means the server connection is gone
    pub fn is_connection_lost(&self) -> bool {
        matches!(self.code, Some(CR_SERVER_GONE_ERROR) | Some(CR_SERVER_LOST))
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            sqlstate: self.sqlstate.clone(),
            code: self.code,
            message: Some(self.message.clone()),
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.sqlstate, self.code) {
            (Some(state), Some(code)) => write!(f, "[{}] ({}) {}", state, code, self.message),
            (None, Some(code)) => write!(f, "({}) {}", code, self.message),
            (Some(state), None) => write!(f, "[{}] {}", state, self.message),
            (None, None) => write!(f, "{}", self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Server and driver attributes reported by a live handle
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub driver: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
}

/// Forward-only result of an executed statement
pub trait Cursor {
    /// Names of the result columns (empty for statements without a result set)
    fn columns(&self) -> &[String];

    /// Fetch the next row, `None` once the result is exhausted
    fn fetch(&mut self) -> Result<Option<Row>, DriverError>;

    /// Number of rows affected by a data-changing statement
    fn rows_affected(&self) -> usize;

    fn column_count(&self) -> usize {
        self.columns().len()
    }

    /// Fetch the next row and return the value in its first column
    fn fetch_column(&mut self) -> Result<Option<Value>, DriverError> {
        Ok(self
            .fetch()?
            .and_then(|row| row.into_values().into_iter().next()))
    }

    /// Drain the remaining rows
    fn fetch_all(&mut self) -> Result<Vec<Row>, DriverError> {
        let mut rows = Vec::new();
        while let Some(row) = self.fetch()? {
            rows.push(row);
        }
        Ok(rows)
    }
}

/// A live connection to a data store
pub trait Handle {
    /// Run a statement without parameters or result, used for session commands
    fn execute_command(&mut self, sql: &str) -> Result<(), DriverError>;

    /// Prepare `sql`, bind every parameter by name, apply the fetch mode and execute
    fn run(
        &mut self,
        sql: &str,
        params: &ParamMap,
        fetch: Option<FetchMode>,
    ) -> Result<Box<dyn Cursor>, DriverError>;

    fn begin(&mut self) -> Result<(), DriverError>;

    fn commit(&mut self) -> Result<(), DriverError>;

    fn rollback(&mut self) -> Result<(), DriverError>;

    /// Native "last insert id" primitive
    fn last_insert_id(&mut self) -> Result<Value, DriverError>;

    /// Error state of the handle itself (not of any statement)
    fn error_info(&self) -> ErrorInfo;

    fn server_info(&self) -> ServerInfo;
}

/// Factory for handles
pub trait Driver {
    fn name(&self) -> &str;

    /// Open a new handle for the given connection spec
    fn connect(&self, spec: &ConnectSpec) -> Result<Box<dyn Handle>, DriverError>;
}

/// Cursor over rows that were already read from the driver
pub struct BufferedCursor {
    columns: Arc<[String]>,
    rows: std::collections::VecDeque<Vec<Value>>,
    mode: FetchMode,
    rows_affected: usize,
}

impl BufferedCursor {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>, mode: FetchMode) -> Self {
        Self {
            columns: Arc::from(columns),
            rows: rows.into(),
            mode,
            rows_affected: 0,
        }
    }

    /// Cursor for a statement that produced no result set
    pub fn affected(rows_affected: usize) -> Self {
        Self {
            columns: Arc::from(Vec::<String>::new()),
            rows: Default::default(),
            mode: FetchMode::Assoc,
            rows_affected,
        }
    }
}

impl Cursor for BufferedCursor {
    fn columns(&self) -> &[String] {
        &self.columns
    }

    fn fetch(&mut self) -> Result<Option<Row>, DriverError> {
        while let Some(values) = self.rows.pop_front() {
            if let Some(row) = Row::new(self.columns.clone(), values).shaped(self.mode) {
                return Ok(Some(row));
            }
        }
        Ok(None)
    }

    fn rows_affected(&self) -> usize {
        self.rows_affected
    }
}
