//! Error taxonomy of the connection manager

use thiserror::Error;

use super::driver::{DriverError, ErrorInfo};
use super::engine::Engine;

#[derive(Debug, Error)]
pub enum DbError {
    /// Unsupported or contradictory connection configuration
    #[error("invalid connection configuration: {0}")]
    Config(String),

    #[error("unsupported database engine '{0}'")]
    UnsupportedEngine(String),

    #[error("no driver registered for engine {0}")]
    NoDriver(Engine),

    /// Opening the handle or running a session command failed
    #[error("failed to connect to '{dsn}': {source}")]
    Connection {
        dsn: String,
        #[source]
        source: DriverError,
    },

    /// The connection was lost again after the single reconnect
    #[error("connection lost while running '{sql}': {source}")]
    ConnectionLost {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("statement failed '{sql}': {source}")]
    Statement {
        sql: String,
        #[source]
        source: DriverError,
    },

    #[error("transaction {action} failed: {source}")]
    Transaction {
        action: &'static str,
        #[source]
        source: DriverError,
    },

    /// Rolling back after a failed unit of work failed as well
    #[error("rollback failed after error '{original}': {source}")]
    RollbackFailed {
        original: String,
        #[source]
        source: DriverError,
    },

    #[error("connection is not open")]
    NotConnected,
}

impl DbError {
    /// Driver-native error information carried by this error, if any
    pub fn error_info(&self) -> Option<ErrorInfo> {
        match self {
            DbError::Connection { source, .. }
            | DbError::ConnectionLost { source, .. }
            | DbError::Statement { source, .. }
            | DbError::Transaction { source, .. }
            | DbError::RollbackFailed { source, .. } => Some(source.info()),
            _ => None,
        }
    }
}
