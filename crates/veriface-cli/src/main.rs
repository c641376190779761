use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use verifaced::{Config, SqliteVectorStore};

mod replay;

#[derive(Parser)]
#[command(name = "veriface", version, about = "Veriface liveness enrollment tools")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines detection trace through a liveness session
    Verify {
        /// Trace file, one frame per line
        #[arg(long)]
        trace: PathBuf,
        /// Wallet address to attach to the enrolled record
        #[arg(long)]
        wallet: Option<String>,
        /// Print every progress update
        #[arg(long)]
        progress: bool,
    },
    /// List enrolled records (metadata only)
    List,
    /// Print store status as JSON
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env();

    match cli.command {
        Command::Verify {
            trace,
            wallet,
            progress,
        } => replay::run(&config, &trace, wallet, progress).await,
        Command::List => list(&config).await,
        Command::Status => status(&config).await,
    }
}

async fn open_store(config: &Config) -> Result<SqliteVectorStore> {
    if !config.store_enabled {
        bail!("vector store is disabled (VERIFACE_STORE_ENABLED=0)");
    }
    SqliteVectorStore::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open vector store {}", config.db_path.display()))
}

async fn list(config: &Config) -> Result<()> {
    let store = open_store(config).await?;
    let records = store.list().await?;
    println!("{}", serde_json::to_string_pretty(&records)?);
    Ok(())
}

async fn status(config: &Config) -> Result<()> {
    let records = if config.store_enabled {
        Some(open_store(config).await?.count_all().await?)
    } else {
        None
    };

    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "store_enabled": config.store_enabled,
        "db_path": config.db_path.display().to_string(),
        "records": records,
        "match_threshold": config.match_threshold,
        "descriptor_dim": veriface_core::DESCRIPTOR_DIM,
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify() {
        let cli = Cli::try_parse_from(["veriface", "verify", "--trace", "t.jsonl", "--progress"])
            .unwrap();
        match cli.command {
            Command::Verify {
                trace,
                wallet,
                progress,
            } => {
                assert_eq!(trace, PathBuf::from("t.jsonl"));
                assert!(wallet.is_none());
                assert!(progress);
            }
            _ => panic!("expected verify"),
        }
    }
}
