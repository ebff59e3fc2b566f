//! Migration generation
//!
//! [`MigrationGenerator::generate`] compares the live schema with the saved
//! snapshot and, when they differ, writes a new migration file:
//!
//! 1. read the live schema (adapter) and the snapshot (store)
//! 2. diff both ways, stop with [`GenerateStatus::NoChanges`] if both are empty
//! 3. take the migration name from the settings or ask for it, stop with
//!    [`GenerateStatus::Aborted`] when it is empty
//! 4. derive and validate the class name, reject duplicates
//! 5. derive the file path, refuse to overwrite an existing file
//! 6. render the migration and write it
//! 7. optionally mark it as applied through the recorder
//! 8. optionally replace the snapshot with the live schema
//!
//! Steps are not undone when a later step fails.

use std::fs;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;

use super::adapter::SchemaAdapter;
use super::diff::SchemaDiff;
use super::error::MigrationError;
use super::naming;
use super::prompt::Prompter;
use super::record::{MigrationRecord, MigrationRecorder};
use super::snapshot::{SnapshotStore, DEFAULT_SCHEMA_FILE};
use super::writer::MigrationWriter;
use crate::database::Connection;

/// Default directory for migration files
pub const DEFAULT_MIGRATION_PATH: &str = "migrations";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateSettings {
    /// Migration name; asked interactively when absent
    pub name: Option<String>,
    pub migration_path: PathBuf,
    pub schema_file: PathBuf,
    /// Replace the snapshot without asking
    pub overwrite: bool,
    /// Record the migration as applied without running it
    pub mark_migration: bool,
}

impl Default for GenerateSettings {
    fn default() -> Self {
        GenerateSettings {
            name: None,
            migration_path: PathBuf::from(DEFAULT_MIGRATION_PATH),
            schema_file: PathBuf::from(DEFAULT_SCHEMA_FILE),
            overwrite: false,
            mark_migration: false,
        }
    }
}

/// Terminal state of a generation run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerateStatus {
    NoChanges,
    /// No migration name was given
    Aborted,
    Completed { class_name: String, path: PathBuf },
}

impl GenerateStatus {
    /// Process exit status for the generate command
    pub fn exit_code(&self) -> i32 {
        match self {
            GenerateStatus::Completed { .. } => 0,
            GenerateStatus::NoChanges | GenerateStatus::Aborted => 1,
        }
    }
}

type Clock<'a> = Box<dyn Fn() -> DateTime<Utc> + 'a>;

pub struct MigrationGenerator<'a> {
    settings: GenerateSettings,
    store: SnapshotStore,
    adapter: &'a mut dyn SchemaAdapter,
    writer: &'a dyn MigrationWriter,
    prompter: &'a mut dyn Prompter,
    recorder: Option<&'a mut dyn MigrationRecorder>,
    clock: Clock<'a>,
}

impl<'a> MigrationGenerator<'a> {
    pub fn new(
        settings: GenerateSettings,
        adapter: &'a mut dyn SchemaAdapter,
        writer: &'a dyn MigrationWriter,
        prompter: &'a mut dyn Prompter,
    ) -> Result<Self, MigrationError> {
        let store = SnapshotStore::new(&settings.schema_file)?;
        Ok(MigrationGenerator {
            settings,
            store,
            adapter,
            writer,
            prompter,
            recorder: None,
            clock: Box::new(Utc::now),
        })
    }

    pub fn with_recorder(mut self, recorder: &'a mut dyn MigrationRecorder) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + 'a) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn settings(&self) -> &GenerateSettings {
        &self.settings
    }

    /// Differences between the live schema and the snapshot
    pub fn diff(&mut self, conn: &mut Connection) -> Result<SchemaDiff, MigrationError> {
        let live = self.adapter.schema(conn)?;
        let prior = self.store.load()?;
        Ok(SchemaDiff::compare(&live, &prior))
    }

    pub fn generate(&mut self, conn: &mut Connection) -> Result<GenerateStatus, MigrationError> {
        if self.settings.mark_migration && self.recorder.is_none() {
            return Err(MigrationError::MissingRecorder);
        }

        let live = self.adapter.schema(conn)?;
        let prior = self.store.load()?;
        if SchemaDiff::compare(&live, &prior).is_empty() {
            info!("no schema changes found");
            return Ok(GenerateStatus::NoChanges);
        }

        let name = match &self.settings.name {
            Some(name) => name.trim().to_string(),
            None => self
                .prompter
                .ask("Migration name:")
                .map_err(MigrationError::io("<stdin>"))?,
        };
        if name.is_empty() {
            info!("no migration name given, aborting");
            return Ok(GenerateStatus::Aborted);
        }

        let class_name = naming::class_name(&name);
        naming::validate_class_name(&class_name)?;
        let dir = &self.settings.migration_path;
        naming::ensure_unique(dir, &class_name)?;

        let now = (self.clock)();
        let file_name = naming::file_name(
            &naming::version(now),
            &class_name,
            self.writer.extension(),
        );
        let path = dir.join(&file_name);
        if path.exists() {
            return Err(MigrationError::FileExists(path));
        }

        let contents = self.writer.render(&class_name, &live, &prior)?;
        fs::create_dir_all(dir).map_err(MigrationError::io(dir))?;
        fs::write(&path, contents).map_err(MigrationError::io(&path))?;
        info!("created migration {}", path.display());

        if self.settings.mark_migration {
            if let Some(recorder) = self.recorder.as_deref_mut() {
                let record = MigrationRecord::marked(&file_name, &class_name, now);
                recorder.record(conn, &record)?;
            }
        }

        let overwrite = self.settings.overwrite
            || self
                .prompter
                .confirm("Overwrite schema file?", false)
                .map_err(MigrationError::io("<stdin>"))?;
        if overwrite {
            self.store.save(&live)?;
        }

        Ok(GenerateStatus::Completed { class_name, path })
    }
}
