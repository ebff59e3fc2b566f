pub mod database;
pub mod diff;
pub mod generate;

use hailstone::{Connection, HailstoneConfig};

/// Open the configured database or exit with an error message
pub(crate) fn open_connection(config: &HailstoneConfig) -> Connection {
    match Connection::open(&config.database) {
        Ok(conn) => conn,
        Err(e) => {
            eprintln!("Failed to connect to database: {}", e);
            std::process::exit(1);
        }
    }
}
