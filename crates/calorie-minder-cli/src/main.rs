use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "calorie-minder", version, about = "Calorie Minder energy-balance engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scale listener, activity sync and aggregation loops until Ctrl-C
    Run,
    /// Run one activity sync pass
    Sync,
    /// Rebuild the daily aggregate table once and print it
    Aggregate {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show the daily aggregate history
    History {
        /// Only the most recent N days
        #[arg(long)]
        last: Option<usize>,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Meal intake logging
    Intake {
        #[command(subcommand)]
        action: commands::intake::IntakeAction,
    },
    /// Body-weight history
    Weight {
        #[command(subcommand)]
        action: commands::weight::WeightAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Run => commands::run::run(),
        Commands::Sync => commands::sync::run(),
        Commands::Aggregate { json } => commands::history::aggregate(json),
        Commands::History { last, json } => commands::history::run(last, json),
        Commands::Intake { action } => commands::intake::run(action),
        Commands::Weight { action } => commands::weight::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
