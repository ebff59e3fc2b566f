//! Convenience operations on top of [`Connection`]
//!
//! Every helper asks the connection's [`SqlBuilder`] for SQL, then runs it
//! through [`Connection::exec`], so the reconnect policy and debug mode apply.
//!
//! [`SqlBuilder`]: super::SqlBuilder

use crate::database::core::{
    Connection, Cursor, DbError, DriverError, FetchMode, ParamMap, Row, Value,
};

use super::builder::{Aggregate, Query, Record, Statement};

/// Result of [`Connection::get`]
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Single-column projection unwrapped to its scalar
    Value(Value),
    Row(Row),
}

impl Fetched {
    pub fn into_value(self) -> Option<Value> {
        match self {
            Fetched::Value(value) => Some(value),
            Fetched::Row(_) => None,
        }
    }

    pub fn into_row(self) -> Option<Row> {
        match self {
            Fetched::Row(row) => Some(row),
            Fetched::Value(_) => None,
        }
    }
}

/// Forward-only sequence of rows, fetched one at a time
pub struct RowStream {
    sql: String,
    cursor: Option<Box<dyn Cursor>>,
}

impl RowStream {
    /// Column names of the underlying result, empty when there is none
    pub fn columns(&self) -> &[String] {
        match &self.cursor {
            Some(cursor) => cursor.columns(),
            None => &[],
        }
    }
}

impl Iterator for RowStream {
    type Item = Result<Row, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.fetch() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(source) => {
                self.cursor = None;
                Some(Err(DbError::Statement {
                    sql: self.sql.clone(),
                    source,
                }))
            }
        }
    }
}

/// Whether an existence probe returned the "row found" marker
///
/// Only the exact text `1` counts; other truthy values do not.
fn is_found_marker(value: &Value) -> bool {
    value.to_text().as_deref() == Some("1")
}

fn affected(cursor: Option<Box<dyn Cursor>>) -> usize {
    cursor.map_or(0, |c| c.rows_affected())
}

fn statement_error(sql: &str) -> impl FnOnce(DriverError) -> DbError + '_ {
    move |source| DbError::Statement {
        sql: sql.to_string(),
        source,
    }
}

impl Connection {
    fn run(&mut self, stmt: &Statement) -> Result<Option<Box<dyn Cursor>>, DbError> {
        self.exec(&stmt.sql, &stmt.params, None)
    }

    pub fn select(&mut self, query: &Query) -> Result<Vec<Row>, DbError> {
        let stmt = self.builder().select(query);
        match self.run(&stmt)? {
            Some(mut cursor) => cursor.fetch_all().map_err(statement_error(&stmt.sql)),
            None => Ok(Vec::new()),
        }
    }

    /// Like [`select`](Self::select) without materializing the result
    pub fn select_lazy(&mut self, query: &Query) -> Result<RowStream, DbError> {
        let stmt = self.builder().select(query);
        let cursor = self.run(&stmt)?;
        Ok(RowStream {
            sql: stmt.sql,
            cursor,
        })
    }

    /// Fetch at most one row
    ///
    /// A single projected column is unwrapped to its value.
    pub fn get(&mut self, query: &Query) -> Result<Option<Fetched>, DbError> {
        let stmt = self.builder().select(&query.clone().limit(1));
        let fetch = query.single_column().map(|_| FetchMode::Column(0));
        let cursor = self.exec(&stmt.sql, &stmt.params, fetch)?;

        let row = match cursor {
            Some(mut cursor) => cursor.fetch().map_err(statement_error(&stmt.sql))?,
            None => None,
        };
        Ok(row.map(|row| match fetch {
            Some(_) => Fetched::Value(row.into_values().into_iter().next().unwrap_or(Value::Null)),
            None => Fetched::Row(row),
        }))
    }

    /// Insert each record, returning the total number of affected rows
    pub fn insert(&mut self, table: &str, records: &[Record]) -> Result<usize, DbError> {
        let mut total = 0;
        for record in records {
            let stmt = self.builder().insert(table, record);
            total += affected(self.run(&stmt)?);
        }
        Ok(total)
    }

    pub fn update(
        &mut self,
        table: &str,
        record: &Record,
        conditions: &[(String, Value)],
    ) -> Result<usize, DbError> {
        let stmt = self.builder().update(table, record, conditions);
        Ok(affected(self.run(&stmt)?))
    }

    pub fn delete(&mut self, table: &str, conditions: &[(String, Value)]) -> Result<usize, DbError> {
        let stmt = self.builder().delete(table, conditions);
        Ok(affected(self.run(&stmt)?))
    }

    /// Replace substrings in a column; `None` when there was nothing to replace
    pub fn replace(
        &mut self,
        table: &str,
        column: &str,
        replacements: &[(String, String)],
        conditions: &[(String, Value)],
    ) -> Result<Option<usize>, DbError> {
        match self.builder().replace(table, column, replacements, conditions) {
            Some(stmt) => Ok(Some(affected(self.run(&stmt)?))),
            None => Ok(None),
        }
    }

    pub fn has(&mut self, query: &Query) -> Result<bool, DbError> {
        let stmt = self.builder().has(query);
        let value = match self.run(&stmt)? {
            Some(mut cursor) => cursor.fetch_column().map_err(statement_error(&stmt.sql))?,
            None => None,
        };
        Ok(value.as_ref().is_some_and(is_found_marker))
    }

    /// Run an aggregate over `column`
    ///
    /// Numeric results are truncated to an integer. `None` means no result row
    /// was produced (including debug mode); a failing statement is an error.
    pub fn aggregate(
        &mut self,
        kind: Aggregate,
        column: &str,
        query: &Query,
    ) -> Result<Option<Value>, DbError> {
        let stmt = self.builder().aggregate(kind, column, query);
        let value = match self.run(&stmt)? {
            Some(mut cursor) => cursor.fetch_column().map_err(statement_error(&stmt.sql))?,
            None => None,
        };
        Ok(value.map(|v| match v.to_integer() {
            Some(i) => Value::Integer(i),
            None => v,
        }))
    }

    pub fn count(&mut self, query: &Query) -> Result<Option<Value>, DbError> {
        self.aggregate(Aggregate::Count, "*", query)
    }

    pub fn sum(&mut self, column: &str, query: &Query) -> Result<Option<Value>, DbError> {
        self.aggregate(Aggregate::Sum, column, query)
    }

    pub fn avg(&mut self, column: &str, query: &Query) -> Result<Option<Value>, DbError> {
        self.aggregate(Aggregate::Avg, column, query)
    }

    pub fn min(&mut self, column: &str, query: &Query) -> Result<Option<Value>, DbError> {
        self.aggregate(Aggregate::Min, column, query)
    }

    pub fn max(&mut self, column: &str, query: &Query) -> Result<Option<Value>, DbError> {
        self.aggregate(Aggregate::Max, column, query)
    }

    /// Remove every row from a table
    pub fn truncate(&mut self, table: &str) -> Result<(), DbError> {
        let sql = self.builder().truncate(table);
        self.exec(&sql, &ParamMap::new(), None)?;
        Ok(())
    }

    /// Column names of a table
    pub fn headers(&mut self, table: &str) -> Result<Vec<String>, DbError> {
        let stmt = self.builder().select(&Query::table(table));
        Ok(self
            .run(&stmt)?
            .map(|cursor| cursor.columns().to_vec())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::testing::ScriptedDriver;
    use crate::database::core::{ConnectionConfig, Engine};
    use crate::database::query::Order;

    fn people() -> Connection {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.exec(
            "CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, age INTEGER, score REAL)",
            &ParamMap::new(),
            None,
        )
        .unwrap();
        let records: Vec<Record> = vec![
            vec![("name".into(), "ann".into()), ("age".into(), 31.into()), ("score".into(), 2.5.into())],
            vec![("name".into(), "bob".into()), ("age".into(), 40.into()), ("score".into(), 4.0.into())],
            vec![("name".into(), "cid".into()), ("age".into(), 40.into()), ("score".into(), 1.25.into())],
        ];
        assert_eq!(conn.insert("people", &records).unwrap(), 3);
        conn
    }

    #[test]
    fn test_select_and_get() {
        let mut conn = people();

        let rows = conn
            .select(&Query::table("people").filter("age", 40).order_by("id", Order::Asc))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name"), Some(&Value::Text("bob".into())));

        let name = conn
            .get(&Query::table("people").columns(["name"]).filter("id", 1))
            .unwrap();
        assert_eq!(name, Some(Fetched::Value(Value::Text("ann".into()))));

        let row = conn
            .get(&Query::table("people").filter("age", 40))
            .unwrap()
            .and_then(Fetched::into_row)
            .unwrap();
        assert_eq!(row.columns().len(), 4);

        assert_eq!(conn.get(&Query::table("people").filter("id", 99)).unwrap(), None);
    }

    #[test]
    fn test_select_lazy_streams_rows() {
        let mut conn = people();
        let mut stream = conn.select_lazy(&Query::table("people").columns(["id"])).unwrap();
        assert_eq!(stream.columns(), &["id".to_string()]);

        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.get("id"), Some(&Value::Integer(1)));
        assert_eq!(stream.by_ref().count(), 2);
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_select_lazy_yields_rows_before_a_failing_row() {
        let mut conn = Connection::open_in_memory().unwrap();
        let none = ParamMap::new();
        conn.exec("CREATE TABLE n (x INTEGER)", &none, None).unwrap();
        let records: Vec<Record> = [1, 2, i64::MIN]
            .into_iter()
            .map(|x| vec![("x".to_string(), Value::Integer(x))])
            .collect();
        conn.insert("n", &records).unwrap();
        conn.exec("CREATE VIEW v AS SELECT abs(x) AS a FROM n", &none, None)
            .unwrap();

        // abs(i64::MIN) overflows only when the third row is stepped
        let mut stream = conn.select_lazy(&Query::table("v")).unwrap();
        let first = stream.next().unwrap().unwrap();
        assert_eq!(first.get("a"), Some(&Value::Integer(1)));
        let second = stream.next().unwrap().unwrap();
        assert_eq!(second.get("a"), Some(&Value::Integer(2)));
        assert!(matches!(stream.next(), Some(Err(DbError::Statement { .. }))));
        assert!(stream.next().is_none());
    }

    #[test]
    fn test_select_lazy_in_debug_mode_is_empty() {
        let mut conn = people();
        conn.debug();
        let mut stream = conn.select_lazy(&Query::table("people")).unwrap();
        assert!(stream.next().is_none());
        assert_eq!(conn.last_debug_sql(), Some("SELECT * FROM \"people\""));
    }

    #[test]
    fn test_write_helpers() {
        let mut conn = people();

        let changed = conn
            .update(
                "people",
                &vec![("age".into(), 41.into())],
                &[("name".into(), "bob".into())],
            )
            .unwrap();
        assert_eq!(changed, 1);

        let replaced = conn
            .replace("people", "name", &[("n".into(), "N".into())], &[])
            .unwrap();
        assert_eq!(replaced, Some(3));
        assert_eq!(conn.replace("people", "name", &[], &[]).unwrap(), None);
        assert!(conn.has(&Query::table("people").filter("name", "aNN")).unwrap());

        assert_eq!(conn.delete("people", &[("age".into(), 41.into())]).unwrap(), 1);
        conn.truncate("people").unwrap();
        assert_eq!(conn.count(&Query::table("people")).unwrap(), Some(Value::Integer(0)));
        assert_eq!(conn.headers("people").unwrap(), vec!["id", "name", "age", "score"]);
    }

    #[test]
    fn test_has() {
        let mut conn = people();
        assert!(conn.has(&Query::table("people").filter("name", "ann")).unwrap());
        assert!(!conn.has(&Query::table("people").filter("name", "zed")).unwrap());
    }

    #[test]
    fn test_found_marker_is_exact() {
        assert!(is_found_marker(&Value::Text("1".into())));
        assert!(is_found_marker(&Value::Integer(1)));

        assert!(!is_found_marker(&Value::Bool(true)));
        assert!(!is_found_marker(&Value::Real(1.0)));
        assert!(!is_found_marker(&Value::Text("01".into())));
        assert!(!is_found_marker(&Value::Text("true".into())));
        assert!(!is_found_marker(&Value::Integer(2)));
        assert!(!is_found_marker(&Value::Null));
    }

    #[test]
    fn test_has_with_non_boolean_driver_marker() {
        let driver = ScriptedDriver::new();
        let config = ConnectionConfig::server(Engine::Mssql, "db", "app");
        let mut conn = Connection::open_with_driver(&config, Box::new(driver.clone())).unwrap();

        driver.push_rows(vec!["found"], vec![vec![Value::Text("true".into())]]);
        assert!(!conn.has(&Query::table("t")).unwrap());

        driver.push_rows(vec!["found"], vec![vec![Value::Text("1".into())]]);
        assert!(conn.has(&Query::table("t")).unwrap());
    }

    #[test]
    fn test_aggregates() {
        let mut conn = people();
        let all = Query::table("people");

        assert_eq!(conn.count(&all).unwrap(), Some(Value::Integer(3)));
        assert_eq!(conn.sum("age", &all).unwrap(), Some(Value::Integer(111)));
        // 7.75 / 3 truncated
        assert_eq!(conn.avg("score", &all).unwrap(), Some(Value::Integer(2)));
        assert_eq!(conn.min("age", &all).unwrap(), Some(Value::Integer(31)));
        assert_eq!(conn.max("name", &all).unwrap(), Some(Value::Text("cid".into())));
    }

    #[test]
    fn test_count_distinguishes_zero_from_failure() {
        let mut conn = people();

        let zero = conn.count(&Query::table("people").filter("age", 99)).unwrap();
        assert_eq!(zero, Some(Value::Integer(0)));

        let failed = conn.count(&Query::table("missing_table"));
        assert!(matches!(failed, Err(DbError::Statement { .. })));

        conn.debug();
        assert_eq!(conn.count(&Query::table("people")).unwrap(), None);
    }

    #[test]
    fn test_count_without_result_row_is_sentinel() {
        let driver = ScriptedDriver::new();
        let config = ConnectionConfig::server(Engine::Pgsql, "db", "app");
        let mut conn = Connection::open_with_driver(&config, Box::new(driver.clone())).unwrap();

        driver.push_rows(vec!["count"], vec![]);
        assert_eq!(conn.count(&Query::table("t")).unwrap(), None);
    }
}
