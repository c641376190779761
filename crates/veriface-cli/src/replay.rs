//! `veriface verify` — replays a recorded detection trace through a liveness session.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tokio::io::BufReader;
use verifaced::{
    feed, spawn_session, Config, NullStore, Pipeline, SessionEvent, SessionOutcome,
    SqliteVectorStore, VectorStore,
};

/// Run the verify command: feed every frame of `trace` to a fresh session
/// and print the outcome as JSON.
pub async fn run(
    config: &Config,
    trace: &Path,
    wallet: Option<String>,
    show_progress: bool,
) -> Result<()> {
    let wallet = wallet.or_else(|| config.wallet_address.clone());

    let outcome = if config.store_enabled {
        let store = SqliteVectorStore::open(&config.db_path)
            .await
            .with_context(|| format!("failed to open vector store {}", config.db_path.display()))?;
        replay(store, config, trace, wallet, show_progress).await?
    } else {
        replay(NullStore, config, trace, wallet, show_progress).await?
    };

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let SessionOutcome::Error { reason } = outcome {
        bail!("verification failed: {reason}");
    }
    Ok(())
}

async fn replay<S: VectorStore + 'static>(
    store: S,
    config: &Config,
    trace: &Path,
    wallet: Option<String>,
    show_progress: bool,
) -> Result<SessionOutcome> {
    let file = tokio::fs::File::open(trace)
        .await
        .with_context(|| format!("failed to open trace {}", trace.display()))?;

    let pipeline = Pipeline::new(store, config.match_threshold).with_wallet(wallet);
    let (session, mut events) = spawn_session(pipeline, config.frame_queue);

    let pump = tokio::spawn(async move {
        let submitted = feed::pump_frames(BufReader::new(file), &session).await;
        // dropping the handle lets the session drain what is queued
        drop(session);
        submitted
    });

    let mut outcome = None;
    let mut last_progress = None;
    while let Some(event) = events.recv().await {
        match event {
            SessionEvent::Progress(progress) => {
                if show_progress {
                    println!("{}", serde_json::to_string(&progress)?);
                }
                last_progress = Some(progress);
            }
            SessionEvent::Outcome(o) => outcome = Some(o),
        }
    }

    let frames = pump.await?.context("failed to read trace")?;
    tracing::debug!(frames, "trace replayed");

    match (outcome, last_progress) {
        (Some(outcome), _) => Ok(outcome),
        (None, Some(progress)) => bail!(
            "trace ended after {frames} frames without completing the challenge \
             (phase: {:?}, blinks: {}/2, prompt: {:?})",
            progress.phase,
            progress.blink_count,
            progress.prompt
        ),
        (None, None) => bail!("trace contained no frames"),
    }
}
