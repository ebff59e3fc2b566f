//! Core database infrastructure
//!
//! - `Connection`: connection manager with reconnect-on-loss execution and transactions
//! - `ConnectionConfig` / `ConnectSpec`: configuration and pure DSN construction
//! - `Driver` / `Handle` / `Cursor`: the seam to the underlying database library
//! - `SqliteDriver`: the built-in rusqlite driver

mod connection;
mod driver;
mod engine;
mod error;
mod sqlite;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{Connection, TxOutcome};
pub use driver::{
    BoundParam, BufferedCursor, Cursor, Driver, DriverError, ErrorInfo, FetchMode, Handle,
    ParamMap, ParamType, Row, ServerInfo, Value, CR_SERVER_GONE_ERROR, CR_SERVER_LOST,
};
pub use engine::{ConnectSpec, ConnectionConfig, Engine};
pub use error::DbError;
pub use sqlite::SqliteDriver;
