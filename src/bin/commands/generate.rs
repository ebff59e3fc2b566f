use clap::Args;
use hailstone::migration::{
    ConsolePrompter, MigrationGenerator, SqlMigrationWriter, SqliteSchemaAdapter, TrackingTable,
};
use hailstone::{GenerateStatus, HailstoneConfig};

use super::open_connection;

/// Arguments for the Generate command
#[derive(Args)]
pub struct GenerateArgs {
    /// Migration name, asked interactively when omitted
    #[clap(short, long)]
    pub name: Option<String>,

    /// Replace the schema snapshot without asking
    #[clap(long)]
    pub overwrite: bool,

    /// Mark the new migration as applied without running it
    #[clap(long)]
    pub mark: bool,
}

pub fn run(config: &HailstoneConfig, args: GenerateArgs) {
    let GenerateArgs {
        name,
        overwrite,
        mark,
    } = args;

    let mut conn = open_connection(config);
    let tracking = &config.migrations.tracking_table;

    let mut adapter = SqliteSchemaAdapter::new().ignore_table(tracking.as_str());
    let mut recorder = TrackingTable::new(&adapter, tracking);
    if mark {
        if let Err(e) = recorder.ensure(&mut conn) {
            eprintln!("Failed to prepare tracking table: {}", e);
            std::process::exit(1);
        }
    }

    let writer = SqlMigrationWriter::new(conn.engine());
    let mut prompter = ConsolePrompter::stdio();

    let mut settings = config.generate_settings();
    settings.name = name;
    settings.overwrite = overwrite;
    settings.mark_migration = mark;

    let mut generator =
        match MigrationGenerator::new(settings, &mut adapter, &writer, &mut prompter) {
            Ok(generator) => generator.with_recorder(&mut recorder),
            Err(e) => {
                eprintln!("{}", e);
                std::process::exit(1);
            }
        };
    let status = generator.generate(&mut conn);

    match status {
        Ok(status) => {
            match &status {
                GenerateStatus::NoChanges => println!("No schema changes found."),
                GenerateStatus::Aborted => println!("No migration name given, aborting."),
                GenerateStatus::Completed { class_name, path } => {
                    println!("Created migration {} at {}", class_name, path.display())
                }
            }
            std::process::exit(status.exit_code());
        }
        Err(e) => {
            eprintln!("Failed to generate migration: {}", e);
            std::process::exit(1);
        }
    }
}
