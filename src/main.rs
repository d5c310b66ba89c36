//! Ethscriptions Indexer CLI
//!
//! Usage:
//!   ethscriptions-indexer start    - Run the indexer until interrupted
//!   ethscriptions-indexer status   - Show checkpoint and store stats

use clap::{Parser, Subcommand};
use ethscriptions_indexer::{Indexer, IndexerConfig};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ethscriptions-indexer")]
#[command(about = "Ethscriptions indexer for Base-style L2 chains")]
#[command(version)]
struct Cli {
    /// Sled data directory (overrides ETHSCRIPTIONS_DATA_DIR)
    #[arg(long)]
    data_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the block processor until interrupted
    Start {
        /// Override the starting block instead of resuming the checkpoint
        #[arg(long)]
        start_block: Option<u64>,
    },

    /// Print the checkpoint and store statistics
    Status,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run_command(cli).await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut config = IndexerConfig::from_env();
    if let Some(data_dir) = cli.data_dir {
        config.storage.data_dir = data_dir;
    }

    match cli.command {
        Commands::Start { start_block } => {
            if start_block.is_some() {
                config.start_block = start_block;
            }

            let indexer = Indexer::open(config)?;
            let handle = indexer.start();

            tokio::signal::ctrl_c().await?;
            info!("shutting down");
            handle.stop().await;

            let snapshot = indexer.metrics();
            info!(
                "processed {} blocks across {} batches",
                snapshot.blocks_processed, snapshot.batches_committed
            );
            Ok(())
        }

        Commands::Status => {
            let indexer = Indexer::open(config)?;

            match indexer.checkpoint().await? {
                Some(checkpoint) => println!(
                    "checkpoint: block {} at {}",
                    checkpoint.block_number, checkpoint.updated_at
                ),
                None => println!("checkpoint: none"),
            }

            let stats = indexer.stats().await?;
            println!("inscriptions:     {}", stats.inscriptions);
            println!("transfers:        {}", stats.transfers);
            println!("collections:      {}", stats.collections);
            println!("collection items: {}", stats.collection_items);
            println!("fixed tokens:     {}", stats.fixed_tokens);
            println!("curve tokens:     {}", stats.curve_tokens);
            println!("fixed notes:      {}", stats.fixed_notes);
            println!("curve notes:      {}", stats.curve_notes);
            Ok(())
        }
    }
}
