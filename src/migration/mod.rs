//! Schema migration generation
//!
//! - `snapshot`: load and save the schema snapshot (JSON or YAML)
//! - `diff`: recursive comparison of two schema descriptors
//! - `naming`: class and file names of migrations
//! - `adapter`: live schema introspection
//! - `writer`: migration rendering
//! - `record`: marking migrations as applied
//! - `prompt`: interactive questions
//! - `generator`: the generation workflow tying everything together

mod adapter;
mod diff;
mod error;
mod generator;
pub mod naming;
mod prompt;
mod record;
mod snapshot;
mod writer;

pub use adapter::{SchemaAdapter, SqliteSchemaAdapter};
pub use diff::{diff, SchemaDiff};
pub use error::MigrationError;
pub use generator::{GenerateSettings, GenerateStatus, MigrationGenerator, DEFAULT_MIGRATION_PATH};
pub use prompt::{ConsolePrompter, Prompter};
pub use record::{MigrationRecord, MigrationRecorder, TrackingTable, MAX_NAME_LENGTH, TIME_FORMAT};
pub use snapshot::{SchemaDescriptor, SnapshotFormat, SnapshotStore, DEFAULT_SCHEMA_FILE};
pub use writer::{MigrationWriter, SqlMigrationWriter};
