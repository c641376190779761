use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::pipeline::{Frame, Pipeline, ProgressUpdate, SessionOutcome};
use crate::store::VectorStore;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("session closed")]
    Closed,
}

/// Events a session reports to its caller.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Emitted for every processed frame.
    Progress(ProgressUpdate),
    /// Emitted at most once.
    Outcome(SessionOutcome),
}

/// Clone-safe handle feeding frames to a running session.
///
/// Dropping every handle ends the session once the queued frames are
/// drained. [`SessionHandle::cancel`] ends it immediately for all clones:
/// queued frames are discarded and the challenge state is dropped with the
/// task.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<Frame>,
    cancel: Arc<watch::Sender<bool>>,
}

impl SessionHandle {
    /// Queue a frame. Frames are processed strictly in submission order.
    pub async fn submit(&self, frame: Frame) -> Result<(), SessionError> {
        if self.is_cancelled() {
            return Err(SessionError::Closed);
        }
        self.tx.send(frame).await.map_err(|_| SessionError::Closed)
    }

    /// Stop the session. Frames not yet processed are discarded; a store
    /// call already in flight is not rolled back but its outcome is never
    /// reported.
    pub fn cancel(&self) {
        if !self.cancel.send_replace(true) {
            tracing::debug!("session cancelled");
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }
}

/// Resolves once the session is cancelled. Never resolves if every handle
/// is dropped without cancelling.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|c| *c).await.is_err();
    if closed {
        std::future::pending::<()>().await;
    }
}

/// Spawn a session task running `pipeline` over submitted frames.
///
/// Returns the frame handle and the event stream. The event stream ends
/// when the session does.
pub fn spawn_session<S>(
    mut pipeline: Pipeline<S>,
    queue_depth: usize,
) -> (SessionHandle, mpsc::Receiver<SessionEvent>)
where
    S: VectorStore + 'static,
{
    let (frame_tx, mut frame_rx) = mpsc::channel::<Frame>(queue_depth.max(1));
    let (event_tx, event_rx) = mpsc::channel::<SessionEvent>(queue_depth.max(1));
    let (cancel_tx, mut cancel_rx) = watch::channel(false);

    tokio::spawn(async move {
        tracing::info!("session started");
        let mut frames = 0u64;
        loop {
            let frame = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => break,
                frame = frame_rx.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
            };
            frames += 1;

            let report = tokio::select! {
                biased;
                _ = cancelled(&mut cancel_rx) => break,
                report = pipeline.process(&frame) => report,
            };

            if event_tx
                .send(SessionEvent::Progress(report.progress))
                .await
                .is_err()
            {
                tracing::debug!("event receiver dropped; ending session");
                break;
            }
            if let Some(outcome) = report.outcome {
                tracing::info!(?outcome, "session outcome");
                if event_tx.send(SessionEvent::Outcome(outcome)).await.is_err() {
                    break;
                }
            }
        }
        tracing::info!(
            frames,
            cancelled = *cancel_rx.borrow(),
            phase = ?pipeline.state().phase(),
            "session ended"
        );
    });

    (
        SessionHandle {
            tx: frame_tx,
            cancel: Arc::new(cancel_tx),
        },
        event_rx,
    )
}
