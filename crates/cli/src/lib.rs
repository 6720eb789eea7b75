pub mod commands;

use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use commands::seed::SeedOptions;

#[derive(Debug, Parser)]
#[command(
    name = "vinoteka",
    about = "Vinoteka catalog sync operator CLI",
    long_about = "Operate the catalog projection pipeline: migrations, demo data, config inspection, readiness checks and manual sync.",
    after_help = "Examples:\n  vinoteka doctor --json\n  vinoteka seed\n  vinoteka sync enqueue-all\n  vinoteka sync run-once\n  vinoteka sync drift"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the deterministic demo catalog")]
    Seed {
        #[arg(long, help = "Only verify that the demo rows are present")]
        verify: bool,
        #[arg(long, conflicts_with = "verify", help = "Delete the demo rows")]
        clean: bool,
    },
    #[command(about = "Inspect effective configuration values with source attribution")]
    Config,
    #[command(about = "Validate config, DB connectivity, schema version and sync queue health")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    /// Enqueue, drain and inspect sync tasks
    #[command(subcommand)]
    Sync(SyncCommand),
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    #[command(about = "Enqueue one task (fire-and-forget)")]
    Enqueue {
        #[arg(long, default_value = "project-variant")]
        kind: String,
        #[arg(help = "Variant id, or product id for project-collection")]
        input_id: String,
    },
    #[command(about = "Enqueue one task per published variant")]
    EnqueueAll {
        #[arg(long, default_value = "project-variant")]
        kind: String,
    },
    #[command(about = "Compare source counts against projections")]
    Drift,
    #[command(about = "Delete tasks by state (default: failed_terminal and retryable_failed)")]
    Purge(PurgeArgs),
    #[command(about = "Drain due tasks in this process, then exit")]
    RunOnce {
        #[arg(long, default_value_t = 1000)]
        max_tasks: usize,
    },
}

#[derive(Debug, Args)]
struct PurgeArgs {
    #[arg(long)]
    kind: Option<String>,
    #[arg(long = "state")]
    states: Vec<String>,
}

/// Logs go to stderr so stdout stays one JSON document per command.
fn init_logging() {
    let filter = EnvFilter::try_from_env("VINOTEKA_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed { verify, clean } => {
            commands::seed::run_with(SeedOptions { verify_only: verify, clean })
        }
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Sync(SyncCommand::Enqueue { kind, input_id }) => {
            commands::sync::enqueue(&kind, &input_id)
        }
        Command::Sync(SyncCommand::EnqueueAll { kind }) => {
            commands::sync::enqueue_all_variants(&kind)
        }
        Command::Sync(SyncCommand::Drift) => commands::sync::drift(),
        Command::Sync(SyncCommand::Purge(args)) => {
            commands::sync::purge(args.kind.as_deref(), &args.states)
        }
        Command::Sync(SyncCommand::RunOnce { max_tasks }) => commands::sync::run_once(max_tasks),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
