//! Errors raised while generating migrations

use std::path::PathBuf;
use thiserror::Error;

use crate::database::DbError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("the migration class name \"{0}\" is invalid, use CamelCase words such as \"CreateUserTable\"")]
    InvalidClassName(String),

    #[error("the migration class name \"{0}\" already exists")]
    DuplicateClassName(String),

    #[error("the migration file \"{}\" already exists", .0.display())]
    FileExists(PathBuf),

    #[error("unsupported schema file extension for \"{}\", expected .json, .yaml or .yml", .0.display())]
    UnsupportedSnapshotExtension(PathBuf),

    #[error("marking a migration requires a migration recorder")]
    MissingRecorder,

    #[error("i/o error on \"{}\": {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode schema for \"{}\": {message}", path.display())]
    Encode { path: PathBuf, message: String },

    #[error("failed to decode schema file \"{}\": {message}", path.display())]
    Decode { path: PathBuf, message: String },

    #[error("invalid naming pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Database(#[from] DbError),
}

impl MigrationError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(std::io::Error) -> MigrationError {
        let path = path.into();
        move |source| MigrationError::Io { path, source }
    }
}
