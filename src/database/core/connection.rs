//! Database connection management
//!
//! [`Connection`] owns exactly one live driver handle, built from a
//! [`ConnectionConfig`]. Statements go through [`Connection::exec`], which
//! reconnects and retries once when the server connection was lost.
//!
//! A connection is single-owner: every operation takes `&mut self`, and any
//! cursor obtained before a reconnect must not be used afterwards.

use tracing::{debug, info, warn};

use super::driver::{Cursor, Driver, ErrorInfo, FetchMode, Handle, ParamMap, ServerInfo, Value};
use super::engine::{ConnectSpec, ConnectionConfig, Engine};
use super::error::DbError;
use super::sqlite::SqliteDriver;
use crate::database::query::{SqlBuilder, StandardBuilder};

/// Number of reconnect-and-retry rounds allowed per statement
const RECONNECT_ATTEMPTS: usize = 1;

/// Result of a transactional unit of work
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome<T> {
    /// Commit and hand the value back
    Commit(T),
    /// Roll back the transaction
    Rollback,
}

impl<T> TxOutcome<T> {
    pub fn is_commit(&self) -> bool {
        matches!(self, TxOutcome::Commit(_))
    }

    pub fn into_committed(self) -> Option<T> {
        match self {
            TxOutcome::Commit(value) => Some(value),
            TxOutcome::Rollback => None,
        }
    }
}

/// The most recently executed statement, kept for error introspection
#[derive(Debug, Clone, PartialEq, Eq)]
struct StatementState {
    sql: String,
    error: ErrorInfo,
}

/// Database connection with reconnect-on-loss statement execution
pub struct Connection {
    spec: ConnectSpec,
    driver: Box<dyn Driver>,
    handle: Option<Box<dyn Handle>>,
    builder: Box<dyn SqlBuilder>,
    statement: Option<StatementState>,
    debug: bool,
    last_debug_sql: Option<String>,
}

impl Connection {
    /// Open a connection using the built-in driver for the configured engine
    pub fn open(config: &ConnectionConfig) -> Result<Self, DbError> {
        let driver: Box<dyn Driver> = match config.engine {
            Engine::Sqlite => Box::new(SqliteDriver),
            other => return Err(DbError::NoDriver(other)),
        };
        Self::open_with_driver(config, driver)
    }

    /// Open a connection through a caller-supplied driver
    pub fn open_with_driver(
        config: &ConnectionConfig,
        driver: Box<dyn Driver>,
    ) -> Result<Self, DbError> {
        let spec = ConnectSpec::build(config)?;
        let builder = Box::new(StandardBuilder::new(config.engine, &config.table_prefix));

        let mut conn = Connection {
            spec,
            driver,
            handle: None,
            builder,
            statement: None,
            debug: false,
            last_debug_sql: None,
        };
        conn.connect()?;
        Ok(conn)
    }

    /// Create an in-memory SQLite connection
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::open(&ConnectionConfig::sqlite(":memory:"))
    }

    /// Replace the SQL builder used by the query helpers
    pub fn with_builder(mut self, builder: Box<dyn SqlBuilder>) -> Self {
        self.builder = builder;
        self
    }

    /// Open a fresh handle and run the post-connect commands in order
    ///
    /// The stored handle is only replaced once every command succeeded.
    pub fn connect(&mut self) -> Result<(), DbError> {
        let mut handle = self
            .driver
            .connect(&self.spec)
            .map_err(|source| DbError::Connection {
                dsn: self.spec.dsn.clone(),
                source,
            })?;

        for command in &self.spec.commands {
            handle
                .execute_command(command)
                .map_err(|source| DbError::Connection {
                    dsn: self.spec.dsn.clone(),
                    source,
                })?;
        }

        info!(
            "connected to {} via {} driver",
            self.spec.dsn,
            self.driver.name()
        );
        self.handle = Some(handle);
        Ok(())
    }

    /// Drop the stale handle and connect again from the stored spec
    fn reconnect(&mut self) -> Result<(), DbError> {
        self.handle = None;
        self.connect()
    }

    fn handle_mut(&mut self) -> Result<&mut Box<dyn Handle>, DbError> {
        self.handle.as_mut().ok_or(DbError::NotConnected)
    }

    /// Render the next statement instead of executing it
    pub fn debug(&mut self) {
        self.debug = true;
    }

    /// SQL rendered by the last statement issued in debug mode
    pub fn last_debug_sql(&self) -> Option<&str> {
        self.last_debug_sql.as_deref()
    }

    pub fn engine(&self) -> Engine {
        self.spec.engine
    }

    /// Database name (the file path for SQLite)
    pub fn database(&self) -> Option<&str> {
        self.spec.database.as_deref()
    }

    pub fn spec(&self) -> &ConnectSpec {
        &self.spec
    }

    pub fn builder(&self) -> &dyn SqlBuilder {
        self.builder.as_ref()
    }

    /// Quote a string literal for this engine
    pub fn quote(&self, value: &str) -> String {
        self.builder.quote(value)
    }

    /// Execute a prepared statement
    ///
    /// Returns `None` in debug mode. When preparing or executing fails because
    /// the connection was lost, the handle is replaced and the statement is
    /// tried exactly once more; a second loss is returned as
    /// [`DbError::ConnectionLost`].
    pub fn exec(
        &mut self,
        sql: &str,
        params: &ParamMap,
        fetch: Option<FetchMode>,
    ) -> Result<Option<Box<dyn Cursor>>, DbError> {
        if self.debug {
            let rendered = self.builder.generate(sql, params);
            info!(target: "hailstone::debug", "{}", rendered);
            self.last_debug_sql = Some(rendered);
            self.debug = false;
            return Ok(None);
        }

        let mut failure = None;
        for attempt in 0..=RECONNECT_ATTEMPTS {
            if attempt > 0 {
                self.reconnect()?;
            }

            match self.handle_mut()?.run(sql, params, fetch) {
                Ok(cursor) => {
                    debug!("executed: {}", sql);
                    self.statement = Some(StatementState {
                        sql: sql.to_string(),
                        error: ErrorInfo::default(),
                    });
                    return Ok(Some(cursor));
                }
                Err(err) => {
                    self.statement = Some(StatementState {
                        sql: sql.to_string(),
                        error: err.info(),
                    });
                    let retry = err.is_connection_lost() && attempt < RECONNECT_ATTEMPTS;
                    if retry {
                        warn!("connection lost ({}), reconnecting", err);
                    }
                    failure = Some(err);
                    if !retry {
                        break;
                    }
                }
            }
        }

        match failure {
            Some(source) if source.is_connection_lost() => Err(DbError::ConnectionLost {
                sql: sql.to_string(),
                source,
            }),
            Some(source) => Err(DbError::Statement {
                sql: sql.to_string(),
                source,
            }),
            None => Ok(None),
        }
    }

    /// Run raw SQL with a caller-supplied parameter map
    pub fn query(
        &mut self,
        sql: &str,
        params: &ParamMap,
    ) -> Result<Option<Box<dyn Cursor>>, DbError> {
        self.exec(sql, params, None)
    }

    /// Run `actions` inside a transaction
    ///
    /// Commits on [`TxOutcome::Commit`], rolls back on [`TxOutcome::Rollback`].
    /// An error from `actions` rolls back and is returned unchanged; a failed
    /// rollback is returned instead as [`DbError::RollbackFailed`], carrying
    /// the original error's message.
    pub fn action<T, E, F>(&mut self, actions: F) -> Result<TxOutcome<T>, E>
    where
        F: FnOnce(&mut Connection) -> Result<TxOutcome<T>, E>,
        E: From<DbError> + std::fmt::Display,
    {
        self.handle_mut()?
            .begin()
            .map_err(|source| DbError::Transaction {
                action: "begin",
                source,
            })?;

        match actions(self) {
            Ok(TxOutcome::Commit(value)) => {
                self.handle_mut()?
                    .commit()
                    .map_err(|source| DbError::Transaction {
                        action: "commit",
                        source,
                    })?;
                Ok(TxOutcome::Commit(value))
            }
            Ok(TxOutcome::Rollback) => {
                self.rollback()?;
                Ok(TxOutcome::Rollback)
            }
            Err(e) => {
                if let Err(source) = self.handle_mut()?.rollback() {
                    warn!("rollback failed after error: {}", e);
                    return Err(DbError::RollbackFailed {
                        original: e.to_string(),
                        source,
                    }
                    .into());
                }
                Err(e)
            }
        }
    }

    fn rollback(&mut self) -> Result<(), DbError> {
        self.handle_mut()?
            .rollback()
            .map_err(|source| DbError::Transaction {
                action: "rollback",
                source,
            })
    }

    /// Last auto-generated identifier
    ///
    /// Oracle always yields `0`; MSSQL and PostgreSQL ask the server with a
    /// dedicated query; other engines use the driver's native primitive.
    pub fn id(&mut self) -> Result<Value, DbError> {
        let engine = self.engine();
        if engine == Engine::Oracle {
            return Ok(Value::Integer(0));
        }

        if let Some(sql) = engine.last_id_query() {
            let value = match self.exec(sql, &ParamMap::new(), None)? {
                Some(mut cursor) => cursor
                    .fetch_column()
                    .map_err(|source| DbError::Statement {
                        sql: sql.to_string(),
                        source,
                    })?,
                None => None,
            };
            return Ok(value.unwrap_or(Value::Null));
        }

        self.handle_mut()?
            .last_insert_id()
            .map_err(|source| DbError::Statement {
                sql: "last insert id".to_string(),
                source,
            })
    }

    /// Error information of the last statement, or of the handle when no
    /// statement has run yet
    pub fn error(&self) -> ErrorInfo {
        match (&self.statement, &self.handle) {
            (Some(statement), _) => statement.error.clone(),
            (None, Some(handle)) => handle.error_info(),
            (None, None) => ErrorInfo::default(),
        }
    }

    /// SQL text of the last statement that was run
    pub fn last_sql(&self) -> Option<&str> {
        self.statement.as_ref().map(|s| s.sql.as_str())
    }

    /// Server and driver attributes of the live handle
    pub fn info(&self) -> Result<ServerInfo, DbError> {
        self.handle
            .as_ref()
            .map(|h| h.server_info())
            .ok_or(DbError::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::core::driver::{DriverError, CR_SERVER_GONE_ERROR, CR_SERVER_LOST};
    use crate::database::core::testing::ScriptedDriver;

    fn scripted(engine: Engine) -> (ScriptedDriver, Connection) {
        let driver = ScriptedDriver::new();
        let config = match engine {
            Engine::Sqlite => ConnectionConfig::sqlite("scripted.db"),
            other => ConnectionConfig::server(other, "db", "app"),
        };
        let conn = Connection::open_with_driver(&config, Box::new(driver.clone())).unwrap();
        (driver, conn)
    }

    fn lost() -> DriverError {
        DriverError::new("MySQL server has gone away").with_code(CR_SERVER_GONE_ERROR)
    }

    #[test]
    fn test_connect_runs_session_commands() {
        let driver = ScriptedDriver::new();
        let config = ConnectionConfig::server(Engine::Mssql, "db", "app").with_charset("utf8");
        let _conn = Connection::open_with_driver(&config, Box::new(driver.clone())).unwrap();

        let script = driver.script();
        assert_eq!(script.connects, 1);
        assert_eq!(
            script.commands,
            vec![
                "SET QUOTED_IDENTIFIER ON".to_string(),
                "SET ANSI_NULLS ON".to_string(),
                "SET NAMES 'utf8'".to_string()
            ]
        );
    }

    #[test]
    fn test_failing_session_command_fails_connect() {
        let driver = ScriptedDriver::new();
        driver.script_mut().fail_command = Some("SET ANSI_NULLS ON".to_string());
        let config = ConnectionConfig::server(Engine::Mssql, "db", "app");

        let result = Connection::open_with_driver(&config, Box::new(driver));
        assert!(matches!(result, Err(DbError::Connection { .. })));
    }

    #[test]
    fn test_connect_failure_is_not_retried() {
        let driver = ScriptedDriver::new();
        driver.script_mut().fail_connect = true;
        let config = ConnectionConfig::server(Engine::Mysql, "db", "app");

        let result = Connection::open_with_driver(&config, Box::new(driver.clone()));
        assert!(matches!(result, Err(DbError::Connection { .. })));
        assert_eq!(driver.script().connects, 1);
    }

    #[test]
    fn test_single_lost_connection_reconnects_once() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        driver.push_failure(lost());
        driver.push_rows(vec!["n"], vec![vec![Value::Integer(1)]]);

        let mut cursor = conn
            .exec("SELECT 1 AS n", &ParamMap::new(), None)
            .unwrap()
            .unwrap();
        assert_eq!(cursor.fetch_column().unwrap(), Some(Value::Integer(1)));

        let script = driver.script();
        assert_eq!(script.connects, 2);
        assert_eq!(script.runs.len(), 2);
        assert!(conn.error().is_clear());
    }

    #[test]
    fn test_second_lost_connection_is_fatal() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        driver.push_failure(lost());
        driver.push_failure(DriverError::new("Lost connection").with_code(CR_SERVER_LOST));
        driver.push_rows(vec!["n"], vec![vec![Value::Integer(1)]]);

        let result = conn.exec("SELECT 1", &ParamMap::new(), None);
        assert!(matches!(result, Err(DbError::ConnectionLost { .. })));

        let script = driver.script();
        assert_eq!(script.runs.len(), 2, "no third attempt");
        assert_eq!(script.connects, 2);
        assert_eq!(conn.error().code, Some(CR_SERVER_LOST));
    }

    #[test]
    fn test_statement_error_is_not_retried() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        driver.push_failure(
            DriverError::new("syntax error")
                .with_code(1064)
                .with_sqlstate("42000"),
        );

        let err = match conn.exec("SELEC 1", &ParamMap::new(), None) {
            Err(e) => e,
            Ok(_) => panic!("expected statement error"),
        };
        assert!(matches!(err, DbError::Statement { .. }));
        assert_eq!(driver.script().runs.len(), 1);
        assert_eq!(driver.script().connects, 1);

        let info = conn.error();
        assert_eq!(info.sqlstate.as_deref(), Some("42000"));
        assert_eq!(info.code, Some(1064));
        assert_eq!(err.error_info(), Some(info));
        assert_eq!(conn.last_sql(), Some("SELEC 1"));
    }

    #[test]
    fn test_debug_mode_does_not_touch_driver() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        conn.debug();

        let params = ParamMap::new().with(":id", 7).with(":name", "o'neil");
        let result = conn
            .exec("SELECT * FROM t WHERE id = :id AND name = :name", &params, None)
            .unwrap();
        assert!(result.is_none());
        assert_eq!(
            conn.last_debug_sql(),
            Some("SELECT * FROM t WHERE id = 7 AND name = 'o''neil'")
        );
        assert!(driver.script().runs.is_empty());

        // one-shot: the next statement runs for real
        conn.exec("SELECT 1", &ParamMap::new(), None).unwrap();
        assert_eq!(driver.script().runs.len(), 1);
    }

    #[test]
    fn test_action_commits() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        let outcome: Result<TxOutcome<u32>, DbError> = conn.action(|c| {
            c.exec("DELETE FROM t", &ParamMap::new(), None)?;
            Ok(TxOutcome::Commit(3))
        });

        assert_eq!(outcome.unwrap(), TxOutcome::Commit(3));
        assert_eq!(driver.script().tx_log, vec!["begin", "commit"]);
    }

    #[test]
    fn test_action_rollback_sentinel() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        let outcome: Result<TxOutcome<()>, DbError> = conn.action(|_| Ok(TxOutcome::Rollback));

        assert_eq!(outcome.unwrap(), TxOutcome::Rollback);
        assert_eq!(driver.script().tx_log, vec!["begin", "rollback"]);
    }

    #[test]
    fn test_action_error_rolls_back_and_propagates_unchanged() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        let outcome: anyhow::Result<TxOutcome<()>> =
            conn.action(|_| Err(anyhow::anyhow!("unit of work failed")));

        let err = match outcome {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.to_string(), "unit of work failed");
        assert_eq!(driver.script().tx_log, vec!["begin", "rollback"]);
    }

    #[test]
    fn test_action_rollback_failure_escalates() {
        let (driver, mut conn) = scripted(Engine::Mysql);
        driver.script_mut().fail_rollback = true;
        let outcome: anyhow::Result<TxOutcome<()>> =
            conn.action(|_| Err(anyhow::anyhow!("unit of work failed")));

        let err = match outcome {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        match err.downcast_ref::<DbError>() {
            Some(DbError::RollbackFailed { original, .. }) => {
                assert_eq!(original, "unit of work failed")
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(err.to_string().contains("unit of work failed"));
    }

    #[test]
    fn test_id_per_engine() {
        let (_, mut oracle) = scripted(Engine::Oracle);
        assert_eq!(oracle.id().unwrap(), Value::Integer(0));

        let (driver, mut pg) = scripted(Engine::Pgsql);
        driver.push_rows(vec!["lastval"], vec![vec![Value::Integer(42)]]);
        assert_eq!(pg.id().unwrap(), Value::Integer(42));
        assert_eq!(driver.script().runs, vec!["SELECT LASTVAL()".to_string()]);

        let (driver, mut mssql) = scripted(Engine::Mssql);
        driver.push_rows(vec![""], vec![vec![Value::Integer(9)]]);
        assert_eq!(mssql.id().unwrap(), Value::Integer(9));
        assert_eq!(
            driver.script().runs,
            vec!["SELECT SCOPE_IDENTITY()".to_string()]
        );

        let (driver, mut mysql) = scripted(Engine::Mysql);
        driver.script_mut().last_id = 17;
        assert_eq!(mysql.id().unwrap(), Value::Integer(17));
        assert!(driver.script().runs.is_empty());
    }

    #[test]
    fn test_error_falls_back_to_handle_state() {
        let (_, conn) = scripted(Engine::Mysql);
        assert!(conn.error().is_clear());
    }

    #[test]
    fn test_sqlite_roundtrip() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.exec("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &ParamMap::new(), None)
            .unwrap();
        conn.exec(
            "INSERT INTO t (v) VALUES (:v)",
            &ParamMap::new().with(":v", "x"),
            None,
        )
        .unwrap();

        assert_eq!(conn.id().unwrap(), Value::Integer(1));
        assert_eq!(conn.database(), Some(":memory:"));
        assert_eq!(conn.info().unwrap().driver, "sqlite");
    }

    #[test]
    fn test_no_builtin_driver_for_server_engines() {
        let config = ConnectionConfig::server(Engine::Pgsql, "db", "app");
        assert!(matches!(
            Connection::open(&config),
            Err(DbError::NoDriver(Engine::Pgsql))
        ));
    }
}
