use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;
use verifaced::{feed, spawn_session, Config, NullStore, Pipeline, SqliteVectorStore, VectorStore};

/// Reads detector frames as JSON lines on stdin and writes session events
/// as JSON lines on stdout. Logs go to stderr.
#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    tracing::info!(
        store_enabled = config.store_enabled,
        db = %config.db_path.display(),
        threshold = config.match_threshold,
        "verifaced starting"
    );

    if config.store_enabled {
        let store = SqliteVectorStore::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open vector store {}", config.db_path.display()))?;
        run(store, &config).await
    } else {
        tracing::warn!("vector store disabled; duplicate check and enrollment are skipped");
        run(NullStore, &config).await
    }
}

async fn run<S: VectorStore + 'static>(store: S, config: &Config) -> Result<()> {
    let pipeline =
        Pipeline::new(store, config.match_threshold).with_wallet(config.wallet_address.clone());
    let (session, events) = spawn_session(pipeline, config.frame_queue);

    let writer = tokio::spawn(feed::write_events(events, tokio::io::stdout()));

    let stdin = BufReader::new(tokio::io::stdin());
    tokio::select! {
        res = feed::pump_frames(stdin, &session) => {
            let frames = res.context("frame feed failed")?;
            tracing::info!(frames, "frame feed ended");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted; cancelling session");
            session.cancel();
        }
    }
    // EOF: queued frames are still processed before the session ends
    drop(session);

    let outcome = writer.await?.context("event output failed")?;
    if outcome.is_none() {
        tracing::warn!("session ended before the challenge was completed");
    }

    tracing::info!("verifaced shutting down");
    Ok(())
}
