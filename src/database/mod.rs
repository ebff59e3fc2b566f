//! Database module
//!
//! This module provides all database functionality for hailstone, organized into:
//!
//! - **core**: connection configuration, DSN construction, the driver seam and
//!   the `Connection` manager (reconnect-on-loss execution, transactions)
//! - **query**: the `SqlBuilder` seam and the select/insert/update/delete/aggregate helpers
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/             # Foundation
//! │   ├── engine        # Engine kinds, ConnectionConfig, pure DSN builder
//! │   ├── driver        # Driver/Handle/Cursor traits, values, rows, errors
//! │   ├── sqlite        # Built-in rusqlite driver
//! │   └── connection    # Connection manager
//! │
//! └── query/            # Convenience layer
//!     ├── builder       # Query description and SQL generation
//!     └── helpers       # select, get, has, count, ... on Connection
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use hailstone::database::{Connection, ConnectionConfig, Query, TxOutcome};
//!
//! let mut conn = Connection::open(&ConnectionConfig::sqlite("app.sqlite3"))?;
//!
//! let active = conn.count(&Query::table("users").filter("active", 1))?;
//!
//! conn.action(|c| {
//!     c.delete("sessions", &[("user_id".into(), 7.into())])?;
//!     Ok::<_, hailstone::database::DbError>(TxOutcome::Commit(()))
//! })?;
//! ```

pub mod core;
pub mod query;

pub use core::{
    BoundParam, BufferedCursor, ConnectSpec, Connection, ConnectionConfig, Cursor, DbError,
    Driver, DriverError, Engine, ErrorInfo, FetchMode, Handle, ParamMap, ParamType, Row,
    ServerInfo, SqliteDriver, TxOutcome, Value, CR_SERVER_GONE_ERROR, CR_SERVER_LOST,
};
pub use query::{
    Aggregate, Fetched, Order, Query, Record, RowStream, SqlBuilder, StandardBuilder, Statement,
};
