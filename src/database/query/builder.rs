//! SQL generation
//!
//! [`SqlBuilder`] turns a structured [`Query`] into SQL text plus a
//! [`ParamMap`]. The connection manager only consumes the builder's output, so
//! alternative builders can be plugged in with [`Connection::with_builder`].
//!
//! [`Connection::with_builder`]: crate::database::Connection::with_builder

use std::fmt;

use crate::database::core::{Engine, ParamMap, ParamType, Value};

/// Ordering direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    fn sql(&self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// Aggregation functions supported by the aggregate helpers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregate {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl Aggregate {
    pub fn sql_name(&self) -> &'static str {
        match self {
            Aggregate::Count => "COUNT",
            Aggregate::Sum => "SUM",
            Aggregate::Avg => "AVG",
            Aggregate::Min => "MIN",
            Aggregate::Max => "MAX",
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

/// Column/value pairs of a row to write
pub type Record = Vec<(String, Value)>;

/// Structured description of a read query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub table: String,
    /// Projected columns, empty for all columns
    pub columns: Vec<String>,
    /// Equality conditions joined with `AND`; a `NULL` value matches `IS NULL`
    pub conditions: Vec<(String, Value)>,
    pub order: Vec<(String, Order)>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn table(table: impl Into<String>) -> Self {
        Query {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions.push((column.into(), value.into()));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, order: Order) -> Self {
        self.order.push((column.into(), order));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The single projected column, when exactly one was requested
    pub fn single_column(&self) -> Option<&str> {
        match self.columns.as_slice() {
            [column] if column != "*" => Some(column.as_str()),
            _ => None,
        }
    }
}

/// SQL text with its bound parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: ParamMap,
}

/// Translates structured queries into parameterized SQL
pub trait SqlBuilder {
    fn select(&self, query: &Query) -> Statement;

    /// Existence probe; the first column of the single result row is `1` when
    /// a matching row exists
    fn has(&self, query: &Query) -> Statement;

    fn aggregate(&self, kind: Aggregate, column: &str, query: &Query) -> Statement;

    fn insert(&self, table: &str, record: &Record) -> Statement;

    fn update(&self, table: &str, record: &Record, conditions: &[(String, Value)]) -> Statement;

    fn delete(&self, table: &str, conditions: &[(String, Value)]) -> Statement;

    /// In-place string replacement on one column; `None` when there is nothing to replace
    fn replace(
        &self,
        table: &str,
        column: &str,
        replacements: &[(String, String)],
        conditions: &[(String, Value)],
    ) -> Option<Statement>;

    fn truncate(&self, table: &str) -> String;

    /// Render `sql` with its parameters interpolated as literals
    fn generate(&self, sql: &str, params: &ParamMap) -> String;

    /// Quote a string literal
    fn quote(&self, value: &str) -> String;

    /// Quote a table name, applying the table prefix
    fn table_quote(&self, table: &str) -> String;

    fn column_quote(&self, column: &str) -> String;
}

/// Builder producing ANSI-style SQL with engine-specific identifier quoting
#[derive(Debug, Clone)]
pub struct StandardBuilder {
    engine: Engine,
    prefix: String,
}

/// Collects parameters while a statement is being built
struct Binder {
    params: ParamMap,
}

impl Binder {
    fn new() -> Self {
        Binder {
            params: ParamMap::new(),
        }
    }

    fn bind(&mut self, value: &Value) -> String {
        let name = format!(":p{}", self.params.len());
        self.params
            .insert(name.clone(), value.clone(), ParamType::of(value));
        name
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }
}

impl StandardBuilder {
    pub fn new(engine: Engine, prefix: &str) -> Self {
        StandardBuilder {
            engine,
            prefix: prefix.to_string(),
        }
    }

    fn quote_ident(&self, ident: &str) -> String {
        let q = self.engine.quote_char();
        let escaped = ident.replace(q, &format!("{}{}", q, q));
        format!("{}{}{}", q, escaped, q)
    }

    fn where_clause(&self, conditions: &[(String, Value)], binder: &mut Binder) -> String {
        if conditions.is_empty() {
            return String::new();
        }
        let parts: Vec<String> = conditions
            .iter()
            .map(|(column, value)| match value {
                Value::Null => format!("{} IS NULL", self.column_quote(column)),
                value => format!("{} = {}", self.column_quote(column), binder.bind(value)),
            })
            .collect();
        format!(" WHERE {}", parts.join(" AND "))
    }

    fn projection(&self, columns: &[String]) -> String {
        if columns.is_empty() {
            return "*".to_string();
        }
        columns
            .iter()
            .map(|c| self.column_quote(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn tail(&self, query: &Query) -> String {
        let mut sql = String::new();
        if !query.order.is_empty() {
            let order: Vec<String> = query
                .order
                .iter()
                .map(|(column, order)| format!("{} {}", self.column_quote(column), order.sql()))
                .collect();
            sql.push_str(&format!(" ORDER BY {}", order.join(", ")));
        }
        match (query.limit, self.engine) {
            (None, _) => {}
            // TOP goes in front of the projection
            (Some(_), Engine::Mssql | Engine::Sybase) => {}
            (Some(limit), Engine::Oracle) => {
                sql.push_str(&format!(" FETCH FIRST {} ROWS ONLY", limit))
            }
            (Some(limit), _) => sql.push_str(&format!(" LIMIT {}", limit)),
        }
        sql
    }

    fn top(&self, query: &Query) -> String {
        match (query.limit, self.engine) {
            (Some(limit), Engine::Mssql | Engine::Sybase) => format!("TOP {} ", limit),
            _ => String::new(),
        }
    }
}

impl SqlBuilder for StandardBuilder {
    fn select(&self, query: &Query) -> Statement {
        let mut binder = Binder::new();
        let sql = format!(
            "SELECT {}{} FROM {}{}{}",
            self.top(query),
            self.projection(&query.columns),
            self.table_quote(&query.table),
            self.where_clause(&query.conditions, &mut binder),
            self.tail(query)
        );
        binder.finish(sql)
    }

    fn has(&self, query: &Query) -> Statement {
        let inner = self.select(&Query {
            columns: vec![],
            order: vec![],
            limit: None,
            ..query.clone()
        });
        // a plain 1/0 integer on every engine, never a native boolean
        let from_dual = if self.engine == Engine::Oracle {
            " FROM DUAL"
        } else {
            ""
        };
        Statement {
            sql: format!(
                "SELECT CASE WHEN EXISTS({}) THEN 1 ELSE 0 END{}",
                inner.sql.replacen("SELECT *", "SELECT 1", 1),
                from_dual
            ),
            params: inner.params,
        }
    }

    fn aggregate(&self, kind: Aggregate, column: &str, query: &Query) -> Statement {
        let mut binder = Binder::new();
        let sql = format!(
            "SELECT {}({}) FROM {}{}",
            kind.sql_name(),
            self.column_quote(column),
            self.table_quote(&query.table),
            self.where_clause(&query.conditions, &mut binder)
        );
        binder.finish(sql)
    }

    fn insert(&self, table: &str, record: &Record) -> Statement {
        let mut binder = Binder::new();
        let columns: Vec<String> = record.iter().map(|(c, _)| self.column_quote(c)).collect();
        let values: Vec<String> = record.iter().map(|(_, v)| binder.bind(v)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table_quote(table),
            columns.join(", "),
            values.join(", ")
        );
        binder.finish(sql)
    }

    fn update(&self, table: &str, record: &Record, conditions: &[(String, Value)]) -> Statement {
        let mut binder = Binder::new();
        let sets: Vec<String> = record
            .iter()
            .map(|(c, v)| format!("{} = {}", self.column_quote(c), binder.bind(v)))
            .collect();
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.table_quote(table),
            sets.join(", "),
            self.where_clause(conditions, &mut binder)
        );
        binder.finish(sql)
    }

    fn delete(&self, table: &str, conditions: &[(String, Value)]) -> Statement {
        let mut binder = Binder::new();
        let sql = format!(
            "DELETE FROM {}{}",
            self.table_quote(table),
            self.where_clause(conditions, &mut binder)
        );
        binder.finish(sql)
    }

    fn replace(
        &self,
        table: &str,
        column: &str,
        replacements: &[(String, String)],
        conditions: &[(String, Value)],
    ) -> Option<Statement> {
        if replacements.is_empty() {
            return None;
        }
        let mut binder = Binder::new();
        let mut expr = self.column_quote(column);
        for (from, to) in replacements {
            let from = binder.bind(&Value::Text(from.clone()));
            let to = binder.bind(&Value::Text(to.clone()));
            expr = format!("REPLACE({}, {}, {})", expr, from, to);
        }
        let sql = format!(
            "UPDATE {} SET {} = {}{}",
            self.table_quote(table),
            self.column_quote(column),
            expr,
            self.where_clause(conditions, &mut binder)
        );
        Some(binder.finish(sql))
    }

    fn truncate(&self, table: &str) -> String {
        match self.engine {
            Engine::Sqlite => format!("DELETE FROM {}", self.table_quote(table)),
            _ => format!("TRUNCATE TABLE {}", self.table_quote(table)),
        }
    }

    fn generate(&self, sql: &str, params: &ParamMap) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut chars = sql.char_indices().peekable();
        while let Some((start, c)) = chars.next() {
            if c != ':' {
                out.push(c);
                continue;
            }
            let mut end = start + 1;
            while let Some(&(i, next)) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    end = i + next.len_utf8();
                    chars.next();
                } else {
                    break;
                }
            }
            let name = &sql[start..end];
            let bound = params.get(name).or_else(|| params.get(&name[1..]));
            match bound {
                Some(param) if end > start + 1 => out.push_str(&param.coerced().to_sql_literal()),
                _ => out.push_str(name),
            }
        }
        out
    }

    fn quote(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn table_quote(&self, table: &str) -> String {
        self.quote_ident(&format!("{}{}", self.prefix, table))
    }

    fn column_quote(&self, column: &str) -> String {
        if column == "*" {
            return column.to_string();
        }
        match column.split_once('.') {
            Some((table, column)) => format!("{}.{}", self.table_quote(table), self.quote_ident(column)),
            None => self.quote_ident(column),
        }
    }
}
