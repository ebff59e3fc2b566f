#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! Hailstone - database access and schema migration generation
//!
//! Hailstone wraps relational database connections behind a small driver seam
//! and adds convenience helpers plus a migration generator that diffs the live
//! schema against a saved snapshot. It can be used as both a command-line
//! application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (default) | Library: connections, query helpers, migrations | `rusqlite`, `serde_json`, `serde_yaml` |
//! | `cli` | The `hailstone` binary | `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: connection management and query helpers
//!   - `core`: engines, DSN construction, driver traits, the `Connection` manager
//!   - `query`: SQL generation and select/insert/update/delete/aggregate helpers
//!
//! - **[`migration`]**: schema snapshots, diffing and migration generation
//!
//! - **[`config`]**: configuration management
//!
//! # Quick Start Examples
//!
//! ## Query Helpers
//!
//! ```rust,ignore
//! use hailstone::database::{Connection, ConnectionConfig, Query};
//!
//! let mut conn = Connection::open(&ConnectionConfig::sqlite("app.sqlite3"))?;
//!
//! let admins = conn.select(&Query::table("users").filter("role", "admin"))?;
//! if conn.has(&Query::table("users").filter("email", "a@example.com"))? {
//!     println!("already registered");
//! }
//! ```
//!
//! ## Generating a Migration
//!
//! ```rust,ignore
//! use hailstone::migration::{
//!     ConsolePrompter, GenerateSettings, MigrationGenerator, SqlMigrationWriter,
//!     SqliteSchemaAdapter,
//! };
//!
//! let mut adapter = SqliteSchemaAdapter::new();
//! let writer = SqlMigrationWriter::new(conn.engine());
//! let mut prompter = ConsolePrompter::stdio();
//!
//! let settings = GenerateSettings {
//!     name: Some("add users".to_string()),
//!     ..Default::default()
//! };
//! let status = MigrationGenerator::new(settings, &mut adapter, &writer, &mut prompter)?
//!     .generate(&mut conn)?;
//! ```

pub mod config;
pub mod database;
pub mod migration;

pub use config::{HailstoneConfig, MigrationConfig};

pub use database::{
    Connection, ConnectionConfig, DbError, Engine, Query, Row, SqlBuilder, TxOutcome, Value,
};

pub use migration::{
    GenerateSettings, GenerateStatus, MigrationError, MigrationGenerator, SchemaDescriptor,
    SchemaDiff, SnapshotStore,
};
