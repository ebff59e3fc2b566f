use anyhow::{anyhow, Result};
use config::Config;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::database::{ConnectionConfig, Engine};
use crate::migration::{GenerateSettings, DEFAULT_MIGRATION_PATH, DEFAULT_SCHEMA_FILE};

/// Default SQLite file when no database is configured
const DEFAULT_SQLITE_FILE: &str = "hailstone.sqlite3";

/// Default name of the migration tracking table
const DEFAULT_TRACKING_TABLE: &str = "migration_log";

const EMPTY_CONFIG: &str = r#"### hailstone configuration file

### database connection
# [database]
# engine = "sqlite"            # mysql, mariadb, pgsql, sybase, oracle, mssql, sqlite
# file = "hailstone.sqlite3"   # sqlite only
# host = "localhost"
# port = 3306
# socket = "/run/mysqld/mysqld.sock"
# database = "app"
# username = "app"
# password = ""
# charset = "utf8mb4"
# table_prefix = ""
# session_commands = []

### migration generation
# [migrations]
# migration_path = "migrations"
# schema_file = "schema.json"  # .json, .yaml or .yml
# tracking_table = "migration_log"
"#;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Directory holding migration files
    #[serde(default = "default_migration_path")]
    pub migration_path: String,

    /// Schema snapshot file
    #[serde(default = "default_schema_file")]
    pub schema_file: String,

    /// Table recording migrations marked as applied
    #[serde(default = "default_tracking_table")]
    pub tracking_table: String,
}

fn default_migration_path() -> String {
    DEFAULT_MIGRATION_PATH.to_string()
}

fn default_schema_file() -> String {
    DEFAULT_SCHEMA_FILE.to_string()
}

fn default_tracking_table() -> String {
    DEFAULT_TRACKING_TABLE.to_string()
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            migration_path: default_migration_path(),
            schema_file: default_schema_file(),
            tracking_table: default_tracking_table(),
        }
    }
}

fn default_database() -> ConnectionConfig {
    ConnectionConfig::sqlite(DEFAULT_SQLITE_FILE)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HailstoneConfig {
    #[serde(default = "default_database")]
    pub database: ConnectionConfig,

    #[serde(default)]
    pub migrations: MigrationConfig,
}

impl Default for HailstoneConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            migrations: MigrationConfig::default(),
        }
    }
}

impl HailstoneConfig {
    /// Load the configuration
    ///
    /// Reads `path`, or `$HOME/.hailstone/hailstone.toml` when no path is given,
    /// writing a commented default file first if it does not exist. Environment
    /// variables prefixed with `HAILSTONE_` override file values, with `__`
    /// separating nested keys (e.g. `HAILSTONE_DATABASE__FILE`).
    pub fn new(path: &Option<String>) -> Result<HailstoneConfig> {
        let config_path = match path {
            Some(p) => PathBuf::from(p),
            None => {
                let dir = Self::config_dir()?;
                std::fs::create_dir_all(&dir)
                    .map_err(|e| anyhow!("Unable to create hailstone directory: {}", e))?;
                dir.join("hailstone.toml")
            }
        };
        Self::load(&config_path)
    }

    /// Load the configuration from a specific file plus the environment
    pub fn load(config_path: &Path) -> Result<HailstoneConfig> {
        let mut builder = Config::builder();

        if config_path.exists() {
            let path_str = config_path
                .to_str()
                .ok_or_else(|| anyhow!("Could not convert path to string"))?;
            builder = builder.add_source(config::File::with_name(path_str));
        } else {
            std::fs::write(config_path, EMPTY_CONFIG).map_err(|e| {
                anyhow!(
                    "Unable to create config file {}: {}",
                    config_path.display(),
                    e
                )
            })?;
        }

        builder = builder.add_source(
            config::Environment::with_prefix("HAILSTONE")
                .prefix_separator("_")
                .separator("__"),
        );

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        settings
            .try_deserialize::<HailstoneConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))
    }

    /// Directory holding the default configuration file
    pub fn config_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| anyhow!("Could not find home directory"))?;
        Ok(home.join(".hailstone"))
    }

    /// Settings for the migration generator, before command-line overrides
    pub fn generate_settings(&self) -> GenerateSettings {
        GenerateSettings {
            migration_path: PathBuf::from(&self.migrations.migration_path),
            schema_file: PathBuf::from(&self.migrations.schema_file),
            ..Default::default()
        }
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let db = &self.database;
        let target = match db.engine {
            Engine::Sqlite => db.file.clone().unwrap_or_default(),
            _ => format!(
                "{}/{}",
                db.host.as_deref().or(db.socket.as_deref()).unwrap_or("-"),
                db.database.as_deref().unwrap_or("-")
            ),
        };
        [
            format!("Engine:             {}", db.engine),
            format!("Database:           {}", target),
            format!("Migration Path:     {}", self.migrations.migration_path),
            format!("Schema File:        {}", self.migrations.schema_file),
            format!("Tracking Table:     {}", self.migrations.tracking_table),
        ]
        .join("\n")
    }
}
