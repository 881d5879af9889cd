use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use graft::commands::{index_document, query, show_config, show_status};

#[derive(Parser)]
#[command(name = "graft")]
#[command(about = "A retrieval-augmented document query service")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index a plain-text document, replacing any existing index
    Index {
        /// Path to the document to index
        file: PathBuf,
    },
    /// Query the indexed document
    Query {
        /// The question to answer
        text: String,
        /// Number of supporting chunks to retrieve
        #[arg(long)]
        top_k: Option<usize>,
    },
    /// Show the state of the persisted index
    Status,
    /// Show configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Index { file } => {
            index_document(&file).await?;
        }
        Commands::Query { text, top_k } => {
            query(text, top_k).await?;
        }
        Commands::Status => {
            show_status().await?;
        }
        Commands::Config { show: _ } => {
            show_config()?;
        }
    }

    Ok(())
}
