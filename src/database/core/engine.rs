//! Engine kinds and DSN construction
//!
//! Building a DSN is a pure function of a [`ConnectionConfig`]: each engine has
//! its own mapping function producing the DSN string and the session commands
//! that run right after connecting. Nothing here touches the network.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::DbError;

/// Default Oracle listener port
const ORACLE_DEFAULT_PORT: u16 = 1521;

/// Supported database backends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Mysql,
    Mariadb,
    #[serde(alias = "postgres", alias = "postgresql")]
    Pgsql,
    Sybase,
    Oracle,
    Mssql,
    Sqlite,
}

impl Engine {
    pub fn all() -> Vec<Engine> {
        vec![
            Engine::Mysql,
            Engine::Mariadb,
            Engine::Pgsql,
            Engine::Sybase,
            Engine::Oracle,
            Engine::Mssql,
            Engine::Sqlite,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Engine::Mysql => "mysql",
            Engine::Mariadb => "mariadb",
            Engine::Pgsql => "pgsql",
            Engine::Sybase => "sybase",
            Engine::Oracle => "oracle",
            Engine::Mssql => "mssql",
            Engine::Sqlite => "sqlite",
        }
    }

    /// Whether the engine speaks the MySQL protocol
    pub fn is_mysql_family(&self) -> bool {
        matches!(self, Engine::Mysql | Engine::Mariadb)
    }

    /// Identifier quote character used by this engine
    pub fn quote_char(&self) -> char {
        if self.is_mysql_family() {
            '`'
        } else {
            '"'
        }
    }

    /// Query that returns the last generated identifier, for engines
    /// without a native "last insert id" hook
    pub fn last_id_query(&self) -> Option<&'static str> {
        match self {
            Engine::Mssql => Some("SELECT SCOPE_IDENTITY()"),
            Engine::Pgsql => Some("SELECT LASTVAL()"),
            _ => None,
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Engine {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" => Ok(Engine::Mysql),
            "mariadb" => Ok(Engine::Mariadb),
            "pgsql" | "postgres" | "postgresql" => Ok(Engine::Pgsql),
            "sybase" => Ok(Engine::Sybase),
            "oracle" => Ok(Engine::Oracle),
            "mssql" => Ok(Engine::Mssql),
            "sqlite" => Ok(Engine::Sqlite),
            other => Err(DbError::UnsupportedEngine(other.to_string())),
        }
    }
}

/// Connection configuration as read from the `[database]` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(alias = "type")]
    pub engine: Engine,
    #[serde(default, alias = "server")]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub socket: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default, alias = "prefix")]
    pub table_prefix: String,
    #[serde(default, alias = "option")]
    pub driver_options: BTreeMap<String, String>,
    #[serde(default, alias = "command")]
    pub session_commands: Vec<String>,
}

impl ConnectionConfig {
    /// Minimal configuration for the given engine
    pub fn new(engine: Engine) -> Self {
        Self {
            engine,
            host: None,
            port: None,
            socket: None,
            file: None,
            database: None,
            username: None,
            password: None,
            charset: None,
            table_prefix: String::new(),
            driver_options: BTreeMap::new(),
            session_commands: Vec::new(),
        }
    }

    /// SQLite configuration backed by a file
    pub fn sqlite(file: impl Into<String>) -> Self {
        Self {
            file: Some(file.into()),
            ..Self::new(Engine::Sqlite)
        }
    }

    /// Server configuration with host and database name
    pub fn server(engine: Engine, host: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            host: Some(host.into()),
            database: Some(database.into()),
            ..Self::new(engine)
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_socket(mut self, socket: impl Into<String>) -> Self {
        self.socket = Some(socket.into());
        self
    }

    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.table_prefix = prefix.into();
        self
    }

    pub fn with_session_command(mut self, command: impl Into<String>) -> Self {
        self.session_commands.push(command.into());
        self
    }

    /// Port with `0` treated as absent
    fn effective_port(&self) -> Option<u16> {
        self.port.filter(|p| *p != 0)
    }
}

/// Everything a driver needs to open a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSpec {
    pub engine: Engine,
    pub dsn: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub options: BTreeMap<String, String>,
    /// Commands executed in order right after connecting
    pub commands: Vec<String>,
    /// Resolved database name (the file path for SQLite)
    pub database: Option<String>,
}

impl ConnectSpec {
    /// Build the connect spec for a configuration
    pub fn build(config: &ConnectionConfig) -> Result<Self, DbError> {
        validate(config)?;

        let mut commands = config.session_commands.clone();
        let (driver, attrs) = match config.engine {
            Engine::Mysql | Engine::Mariadb => mysql_dsn(config),
            Engine::Pgsql => pgsql_dsn(config, &mut commands),
            Engine::Sybase => sybase_dsn(config),
            Engine::Oracle => oracle_dsn(config),
            Engine::Mssql => mssql_dsn(config, &mut commands),
            Engine::Sqlite => sqlite_dsn(config),
        };

        let mut options = BTreeMap::from([("case".to_string(), "natural".to_string())]);
        options.extend(config.driver_options.clone());

        let (username, password, database) = match config.engine {
            Engine::Sqlite => (None, None, config.file.clone()),
            _ => (
                config.username.clone(),
                config.password.clone(),
                config.database.clone(),
            ),
        };

        Ok(ConnectSpec {
            engine: config.engine,
            dsn: join_dsn(driver, &attrs),
            username,
            password,
            options,
            commands,
            database,
        })
    }
}

/// DSN attribute: a `key=value` pair, or a positional segment when the key is `None`
type DsnAttr = (Option<&'static str>, Option<String>);

fn join_dsn(driver: &str, attrs: &[DsnAttr]) -> String {
    let stack: Vec<String> = attrs
        .iter()
        .filter_map(|(key, value)| {
            let value = value.as_ref()?;
            Some(match key {
                Some(key) => format!("{}={}", key, value),
                None => value.clone(),
            })
        })
        .collect();
    format!("{}:{}", driver, stack.join(";"))
}

fn validate(config: &ConnectionConfig) -> Result<(), DbError> {
    let engine = config.engine;
    match engine {
        Engine::Sqlite => {
            if config.file.as_deref().map_or(true, str::is_empty) {
                return Err(DbError::Config(
                    "sqlite requires the `file` option".to_string(),
                ));
            }
            if config.host.is_some() || config.socket.is_some() {
                return Err(DbError::Config(
                    "sqlite is file-backed and takes neither `host` nor `socket`".to_string(),
                ));
            }
        }
        _ => {
            if config.file.is_some() {
                return Err(DbError::Config(format!(
                    "`file` is only meaningful for sqlite, not {}",
                    engine
                )));
            }
            if config.socket.is_some() && !engine.is_mysql_family() {
                return Err(DbError::Config(format!(
                    "`socket` is only supported for mysql and mariadb, not {}",
                    engine
                )));
            }
            let has_endpoint = config.host.is_some() || config.socket.is_some();
            let oracle_tns = engine == Engine::Oracle && config.database.is_some();
            if !has_endpoint && !oracle_tns {
                return Err(DbError::Config(format!(
                    "{} requires `host`{}",
                    engine,
                    if engine.is_mysql_family() {
                        " or `socket`"
                    } else {
                        ""
                    }
                )));
            }
        }
    }
    Ok(())
}

fn mysql_dsn(config: &ConnectionConfig) -> (&'static str, Vec<DsnAttr>) {
    let mut attrs = match &config.socket {
        Some(socket) => vec![
            (Some("dbname"), config.database.clone()),
            (Some("unix_socket"), Some(socket.clone())),
        ],
        None => vec![
            (Some("host"), config.host.clone()),
            (Some("dbname"), config.database.clone()),
            (Some("port"), config.effective_port().map(|p| p.to_string())),
        ],
    };
    attrs.push((Some("charset"), config.charset.clone()));
    ("mysql", attrs)
}

fn pgsql_dsn(config: &ConnectionConfig, commands: &mut Vec<String>) -> (&'static str, Vec<DsnAttr>) {
    if let Some(charset) = &config.charset {
        commands.push(format!("SET NAMES '{}'", charset));
    }
    ("pgsql", host_dbname_port(config))
}

fn sybase_dsn(config: &ConnectionConfig) -> (&'static str, Vec<DsnAttr>) {
    let mut attrs = host_dbname_port(config);
    attrs.push((Some("charset"), config.charset.clone()));
    ("dblib", attrs)
}

fn oracle_dsn(config: &ConnectionConfig) -> (&'static str, Vec<DsnAttr>) {
    let dbname = match &config.host {
        Some(host) => Some(format!(
            "//{}:{}/{}",
            host,
            config.effective_port().unwrap_or(ORACLE_DEFAULT_PORT),
            config.database.clone().unwrap_or_default()
        )),
        None => config.database.clone(),
    };
    (
        "oci",
        vec![
            (Some("dbname"), dbname),
            (Some("charset"), config.charset.clone()),
        ],
    )
}

fn mssql_dsn(config: &ConnectionConfig, commands: &mut Vec<String>) -> (&'static str, Vec<DsnAttr>) {
    // standard identifier quoting and NULL comparison semantics
    commands.push("SET QUOTED_IDENTIFIER ON".to_string());
    commands.push("SET ANSI_NULLS ON".to_string());
    if let Some(charset) = &config.charset {
        commands.push(format!("SET NAMES '{}'", charset));
    }
    let driver = if cfg!(windows) { "sqlsrv" } else { "dblib" };
    (driver, host_dbname_port(config))
}

fn sqlite_dsn(config: &ConnectionConfig) -> (&'static str, Vec<DsnAttr>) {
    ("sqlite", vec![(None, config.file.clone())])
}

fn host_dbname_port(config: &ConnectionConfig) -> Vec<DsnAttr> {
    vec![
        (Some("host"), config.host.clone()),
        (Some("dbname"), config.database.clone()),
        (Some("port"), config.effective_port().map(|p| p.to_string())),
    ]
}
