use anyhow::Result;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mapro::config::Config;
use mapro::mock_data::{seed_demo_registry, DEMO_SEED};
use mapro::state::AppState;
use mapro_core::registry::{EntityKind, DEFAULT_LATEST_LIMIT};

/// MaPro - Municipal registry dashboard
#[derive(Parser, Debug)]
#[command(name = "mapro")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Populate the store with demo records before running the command
    #[arg(long, global = true, env = "MAPRO_SEED")]
    seed: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print dashboard counts and the latest citizens
    Dashboard,
    /// Print the most recently encoded citizens
    Latest {
        /// Number of citizens to show
        #[arg(long, short, default_value_t = DEFAULT_LATEST_LIMIT)]
        limit: usize,
    },
    /// Print soft-deleted records of one kind
    Archive {
        /// Record kind (citizen, household, business, infrastructure, sitio, permission_grant)
        #[arg(long, short)]
        kind: EntityKind,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mapro=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::from_env();
    let state = AppState::new(&config).await?;

    if cli.seed {
        seed_demo_registry(state.store.as_ref(), state.accounts.as_ref(), DEMO_SEED).await?;
    }

    match cli.command {
        Command::Dashboard => print_json(&state.registry.get_dashboard().await?),
        Command::Latest { limit } => {
            print_json(&state.registry.get_latest_citizens(limit).await?)
        }
        Command::Archive { kind } => print_json(&state.registry.get_archived(kind).await?),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
