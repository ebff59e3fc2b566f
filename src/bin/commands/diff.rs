use clap::Args;
use hailstone::migration::{
    ConsolePrompter, MigrationGenerator, SqlMigrationWriter, SqliteSchemaAdapter,
};
use hailstone::HailstoneConfig;

use super::open_connection;

/// Arguments for the Diff command
#[derive(Args)]
pub struct DiffArgs {
    /// Pretty-print JSON output
    #[clap(long)]
    pub pretty: bool,
}

pub fn run(config: &HailstoneConfig, args: DiffArgs) {
    let mut conn = open_connection(config);

    let mut adapter =
        SqliteSchemaAdapter::new().ignore_table(config.migrations.tracking_table.as_str());
    let writer = SqlMigrationWriter::new(conn.engine());
    let mut prompter = ConsolePrompter::stdio();

    let diff = MigrationGenerator::new(
        config.generate_settings(),
        &mut adapter,
        &writer,
        &mut prompter,
    )
    .and_then(|mut generator| generator.diff(&mut conn));

    let diff = match diff {
        Ok(diff) => diff,
        Err(e) => {
            eprintln!("Failed to compare schemas: {}", e);
            std::process::exit(1);
        }
    };

    let output = if args.pretty {
        serde_json::to_string_pretty(&diff)
    } else {
        serde_json::to_string(&diff)
    };
    match output {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Error serializing diff: {}", e),
    }

    if !diff.is_empty() {
        std::process::exit(1);
    }
}
