// node/src/main.rs
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "stake-pool-node")]
#[command(about = "Pooled validator-staking treasury node", version, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the node
    Start {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        /// Override data directory
        #[arg(short, long)]
        data_dir: Option<String>,
    },

    /// Initialize a new node
    Init {
        /// Data directory
        #[arg(short, long, default_value = "./data")]
        data_dir: String,

        /// Chain preset ("mainnet" or "test")
        #[arg(long, default_value = "mainnet")]
        chain: String,
    },

    /// Database operations
    Db {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,

        #[command(subcommand)]
        command: DbCommands,
    },

    /// Show the pool's treasury state
    Status {
        /// Configuration file path
        #[arg(short, long, default_value = "./config.toml")]
        config: String,
    },
}

#[derive(Subcommand)]
enum DbCommands {
    /// Show database statistics
    Stats,

    /// Compact database
    Compact,

    /// Drop old transactions according to the pruning mode
    Prune,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},hyper=warn", log_level).into())
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Start { config, data_dir } => {
            start_node(&config, data_dir).await?;
        }
        Commands::Init { data_dir, chain } => {
            init_node(&data_dir, &chain)?;
        }
        Commands::Db { config, command } => {
            handle_db_command(&config, command)?;
        }
        Commands::Status { config } => {
            show_status(&config).await?;
        }
    }

    Ok(())
}

async fn start_node(config_path: &str, data_dir_override: Option<String>) -> anyhow::Result<()> {
    use node::{Node, NodeConfig};
    use std::sync::Arc;

    tracing::info!("Loading configuration from {}", config_path);
    let mut config = NodeConfig::from_file(config_path)?;

    if let Some(data_dir) = data_dir_override {
        config.data_dir = data_dir;
    }

    tracing::info!("Starting node with data directory: {}", config.data_dir);

    let node = Arc::new(Node::new(config)?);
    node.clone().start().await?;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    node.stop().await?;
    tracing::info!("Node stopped gracefully");

    Ok(())
}

fn init_node(data_dir: &str, chain: &str) -> anyhow::Result<()> {
    tracing::info!("Initializing node at {}", data_dir);

    // Create directories
    std::fs::create_dir_all(data_dir)?;
    std::fs::create_dir_all(format!("{}/db", data_dir))?;

    let config = node::NodeConfig {
        data_dir: data_dir.to_string(),
        chain: chain.to_string(),
        ..Default::default()
    };
    config.chain_config()?;
    config.to_file(&format!("{}/config.toml", data_dir))?;

    tracing::info!("Node initialized successfully at {}", data_dir);
    tracing::info!("Edit {}/config.toml to configure your node", data_dir);

    Ok(())
}

fn open_database(config_path: &str) -> anyhow::Result<storage::Database> {
    let config = node::NodeConfig::from_file(config_path)?;
    let pruning_mode = if config.storage.pruning == "archive" {
        storage::PruningMode::Archive
    } else {
        storage::PruningMode::Pruned { keep_transactions: config.storage.keep_transactions }
    };
    let db = storage::Database::open(storage::DatabaseConfig {
        path: format!("{}/db", config.data_dir),
        max_open_files: config.storage.max_open_files,
        pruning_mode,
        ..Default::default()
    })?;
    Ok(db)
}

fn handle_db_command(config_path: &str, command: DbCommands) -> anyhow::Result<()> {
    let db = open_database(config_path)?;
    match command {
        DbCommands::Stats => {
            let stats = db.stats()?;
            tracing::info!("Database statistics:");
            tracing::info!("  Accounts:        {}", stats.total_accounts);
            tracing::info!("  Transactions:    {}", stats.total_transactions);
            tracing::info!("  Latest lt:       {}", stats.latest_lt);
            tracing::info!("  Pruning:         {:?}", stats.pruning_mode);
        }
        DbCommands::Compact => {
            db.compact()?;
        }
        DbCommands::Prune => {
            let pruned = db.prune()?;
            tracing::info!("Pruned {} transactions", pruned);
        }
    }

    Ok(())
}

async fn show_status(config_path: &str) -> anyhow::Result<()> {
    let config = node::NodeConfig::from_file(config_path)?;
    let db = open_database(config_path)?;
    let treasury = node::runtime::treasury_address(&config);

    match db.get_treasury_state(&treasury)? {
        Some(state) => {
            let view = state.view();
            tracing::info!("Treasury {}", treasury);
            tracing::info!("  Coins:          {}", view.total_coins);
            tracing::info!("  Tokens:         {}", view.total_tokens);
            tracing::info!("  Lent:           {}", view.total_validators_stake);
            tracing::info!("  Exchange rate:  {}", view.exchange_rate);
            tracing::info!("  Open rounds:    {:?}", view.participations);
            tracing::info!("  Stopped:        {}", view.stopped);
        }
        None => tracing::warn!("No treasury stored at {}", treasury),
    }
    Ok(())
}
