use clap::{Parser, Subcommand};
use hailstone::HailstoneConfig;
use tracing::Level;

mod commands;

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
#[clap(propagate_version = true)]
struct Cli {
    /// configuration file path, by default $HOME/.hailstone/hailstone.toml is used
    #[clap(short, long)]
    config: Option<String>,

    /// Print debug information
    #[clap(long)]
    debug: bool,

    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a migration from the differences between the database and the schema snapshot
    Generate(commands::generate::GenerateArgs),

    /// Show the differences between the database and the schema snapshot
    Diff(commands::diff::DiffArgs),

    /// Inspect and query the configured database
    Database(commands::database::DatabaseArgs),

    /// Show the effective configuration
    Config,
}

/// Subscriber level, none unless `--debug` is given
fn log_level(debug: bool) -> Option<Level> {
    debug.then_some(Level::DEBUG)
}

fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Some(level) = log_level(cli.debug) {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let config = match HailstoneConfig::new(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Generate(args) => commands::generate::run(&config, args),
        Commands::Diff(args) => commands::diff::run(&config, args),
        Commands::Database(args) => commands::database::run(&config, args),
        Commands::Config => println!("{}", config.summary()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_flag_enables_debug_events() {
        let cli = Cli::parse_from(["hailstone", "--debug", "config"]);
        assert_eq!(log_level(cli.debug), Some(Level::DEBUG));

        let cli = Cli::parse_from(["hailstone", "config"]);
        assert_eq!(log_level(cli.debug), None);
    }
}
