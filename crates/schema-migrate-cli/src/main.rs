//! schema-migrate CLI - cross-dialect schema migrations.

use clap::{Parser, Subcommand};
use schema_migrate::{
    ddl_to_migration, dump_with, Config, DatabaseConnection, DatabaseMigrationRepository,
    FileResolver, MigrateError, MigrationOutcome, Migrator,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "schema-migrate")]
#[command(about = "Cross-dialect schema migrations for MySQL, PostgreSQL and SQLite")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "schema-migrate.yaml")]
    config: PathBuf,

    /// Connection URL, used instead of the configuration file
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Override the migrations directory
    #[arg(long, global = true)]
    path: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long, global = true)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the migration ledger table
    Install,

    /// Run all pending migrations as one batch
    Migrate {
        /// Print the SQL instead of executing it
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back the last batch
    Rollback {
        /// Print the SQL instead of executing it
        #[arg(long)]
        pretend: bool,
    },

    /// Roll back every applied migration
    Reset {
        /// Print the SQL instead of executing it
        #[arg(long)]
        pretend: bool,
    },

    /// Show applied and pending migrations
    Status,

    /// Dump the live schema as a migration document
    Dump {
        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a CREATE TABLE script into a migration document
    ParseDdl {
        /// SQL file to convert
        file: PathBuf,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format)
        .map_err(|e| MigrateError::Config(e.to_string()))?;

    // parse-ddl needs neither configuration nor a database
    if let Commands::ParseDdl { file, output } = &cli.command {
        let sql = std::fs::read_to_string(file)?;
        let document = ddl_to_migration(&sql)?;
        return write_output(output.as_deref(), &document);
    }

    let mut config = match &cli.database_url {
        Some(url) => Config::from_url(url.clone())?,
        None => {
            let config = Config::load(&cli.config)?;
            info!("Loaded configuration from {:?}", cli.config);
            config
        }
    };
    if let Some(path) = &cli.path {
        config.migrations.path = path.clone();
    }

    let conn = DatabaseConnection::connect(&config.database.url()?).await?;
    let result = execute(&cli, &config, &conn).await;
    conn.close().await?;
    result
}

async fn execute(cli: &Cli, config: &Config, conn: &DatabaseConnection) -> Result<(), MigrateError> {
    let repository = DatabaseMigrationRepository::new(conn, config.migrations.table.clone());
    let migrator = Migrator::new(conn, &repository, &FileResolver);
    let path = config.migrations.path.as_path();

    match &cli.command {
        Commands::ParseDdl { .. } => unreachable!(), // Handled in run()

        Commands::Install => {
            let created = migrator.install().await?;
            if created {
                println!("Migration table '{}' created", config.migrations.table);
            } else {
                println!("Migration table '{}' already exists", config.migrations.table);
            }
        }

        Commands::Migrate { pretend } => {
            let outcome = migrator.run(path, *pretend).await?;
            report(&outcome, "Migrated", cli.output_json)?;
        }

        Commands::Rollback { pretend } => {
            let outcome = migrator.rollback(path, *pretend).await?;
            report(&outcome, "Rolled back", cli.output_json)?;
        }

        Commands::Reset { pretend } => {
            let outcome = migrator.reset(path, *pretend).await?;
            report(&outcome, "Rolled back", cli.output_json)?;
        }

        Commands::Status => {
            let status = migrator.status(path).await?;
            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&status)?);
            } else if status.is_empty() {
                println!("No migrations found");
            } else {
                println!("{:<8} {:<6} Migration", "State", "Batch");
                for row in &status {
                    let batch = row.batch.map(|b| b.to_string()).unwrap_or_default();
                    let missing = if row.missing { " (missing)" } else { "" };
                    println!("{:<8} {:<6} {}{}", row.state.to_string(), batch, row.name, missing);
                }
            }
        }

        Commands::Dump { output } => {
            // A renamed ledger is skipped like the default one
            let mut options = config.dump.clone();
            options.ignore.push(config.migrations.table.clone());
            let document = dump_with(conn, &options).await?;
            write_output(output.as_deref(), &document)?;
        }
    }

    Ok(())
}

fn report(outcome: &MigrationOutcome, verb: &str, output_json: bool) -> Result<(), MigrateError> {
    if output_json {
        println!("{}", outcome.to_json()?);
        return Ok(());
    }

    if outcome.is_empty() {
        println!("Nothing to do");
        return Ok(());
    }

    if outcome.pretend {
        for unit in &outcome.units {
            println!("-- {}", unit.name);
            for sql in &unit.statements {
                println!("{};", sql);
            }
        }
        return Ok(());
    }

    for unit in &outcome.units {
        println!("{}: {}", verb, unit.name);
    }
    if let Some(batch) = outcome.batch {
        println!("  Batch: {}", batch);
    }
    println!("  Duration: {:.2}s", outcome.duration_seconds);
    Ok(())
}

fn write_output(output: Option<&Path>, content: &str) -> Result<(), MigrateError> {
    match output {
        Some(path) => {
            std::fs::write(path, content)?;
            info!("Wrote {}", path.display());
        }
        None => print!("{}", content),
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr so dumps and JSON on stdout stay clean
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        subscriber.json().try_init().map_err(|e| e.to_string())
    } else {
        subscriber.try_init().map_err(|e| e.to_string())
    }
}
