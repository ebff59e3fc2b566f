use clap::{Args, Subcommand};
use hailstone::database::{FetchMode, ParamMap};
use hailstone::HailstoneConfig;
use std::io::Write;

use super::open_connection;

/// Arguments for the Database command
#[derive(Args)]
pub struct DatabaseArgs {
    #[clap(subcommand)]
    pub command: Option<DatabaseCommands>,
}

/// Database subcommands
#[derive(Subcommand)]
pub enum DatabaseCommands {
    /// Show server and driver information (default when no subcommand)
    Info,

    /// Run a SQL statement and print the resulting rows as JSON lines
    Query {
        /// SQL statement to run
        #[clap(value_name = "SQL")]
        sql: String,

        /// Only print the value of the column at this position
        #[clap(long)]
        column: Option<usize>,
    },
}

pub fn run(config: &HailstoneConfig, args: DatabaseArgs) {
    match args.command {
        None | Some(DatabaseCommands::Info) => run_info(config),
        Some(DatabaseCommands::Query { sql, column }) => run_query(config, &sql, column),
    }
}

fn run_info(config: &HailstoneConfig) {
    let conn = open_connection(config);
    let info = match conn.info() {
        Ok(info) => info,
        Err(e) => {
            eprintln!("Failed to read server information: {}", e);
            std::process::exit(1);
        }
    };
    match serde_json::to_string_pretty(&info) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing server information: {}", e),
    }
}

fn run_query(config: &HailstoneConfig, sql: &str, column: Option<usize>) {
    let mut conn = open_connection(config);
    let fetch = column.map(FetchMode::Column);

    let mut cursor = match conn.exec(sql, &ParamMap::new(), fetch) {
        Ok(Some(cursor)) => cursor,
        Ok(None) => return,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    if cursor.columns().is_empty() {
        println!("{} row(s) affected", cursor.rows_affected());
        return;
    }

    let mut stdout = std::io::stdout();
    loop {
        let row = match cursor.fetch() {
            Ok(Some(row)) => row,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
        let line = match column {
            Some(_) => row
                .values()
                .first()
                .map(serde_json::to_string)
                .unwrap_or_else(|| Ok("null".to_string())),
            None => serde_json::to_string(&row),
        };
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                eprintln!("Error serializing row: {}", e);
                std::process::exit(1);
            }
        };
        if let Err(e) = writeln!(stdout, "{}", line) {
            if e.kind() != std::io::ErrorKind::BrokenPipe {
                eprintln!("{e}");
            }
            std::process::exit(1);
        }
    }
}
