//! JSON-lines transport between the detector and a session.
//!
//! Input: one [`Frame`] per line, e.g.
//!
//! ```text
//! {"t_ms": 1200, "face": {"left_eye": [[0,0], ...], "right_eye": [...], "nose": [...], "jaw_outline": [...]}}
//! {"t_ms": 1300, "face": null}
//! ```
//!
//! Output: one [`SessionEvent`] per line.

use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::pipeline::Frame;
use crate::session::{SessionError, SessionEvent, SessionHandle};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("event encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Parse one input line. Blank lines yield `Ok(None)`.
pub fn parse_frame(line: &str) -> Result<Option<Frame>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line).map(Some)
}

/// Read frames from `reader` until EOF and submit them to the session.
///
/// Malformed lines are logged and skipped like any other detection gap.
/// Returns the number of frames submitted.
pub async fn pump_frames<R>(reader: R, session: &SessionHandle) -> Result<u64, FeedError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut submitted = 0u64;

    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        match parse_frame(&line) {
            Ok(Some(frame)) => {
                session.submit(frame).await?;
                submitted += 1;
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(line = line_no, error = %e, "skipping malformed frame");
            }
        }
    }

    Ok(submitted)
}

/// Write every event as a JSON line until the session ends. Returns the
/// outcome, if the session produced one.
pub async fn write_events<W>(
    mut events: mpsc::Receiver<SessionEvent>,
    mut writer: W,
) -> Result<Option<SessionEvent>, FeedError>
where
    W: AsyncWrite + Unpin,
{
    let mut outcome = None;
    while let Some(event) = events.recv().await {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        writer.write_all(&line).await?;
        writer.flush().await?;
        if matches!(event, SessionEvent::Outcome(_)) {
            outcome = Some(event);
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::tests::{challenge_prefix, one_hot, right_turn};
    use crate::pipeline::{Pipeline, SessionOutcome};
    use crate::session::spawn_session;
    use crate::store::NullStore;

    fn trace() -> String {
        let mut lines: Vec<String> = challenge_prefix()
            .iter()
            .map(|f| serde_json::to_string(f).unwrap())
            .collect();
        lines.insert(2, String::new());
        lines.insert(3, "{not json".to_string());
        lines.push(serde_json::to_string(&right_turn(1500, Some(one_hot(0)))).unwrap());
        lines.join("\n")
    }

    #[test]
    fn test_parse_frame() {
        assert_eq!(parse_frame("   ").unwrap(), None);
        let f = parse_frame(r#"{"t_ms": 42, "face": null}"#).unwrap().unwrap();
        assert_eq!(f.t_ms, 42);
        assert!(f.face.is_none());
        assert!(f.descriptor.is_none());
        assert!(parse_frame("{").is_err());
    }

    #[test]
    fn test_parse_landmarks() {
        let line = r#"{"t_ms": 1, "face": {"left_eye": [[0,0],[1,1],[2,1],[3,0],[2,-1],[1,-1]], "right_eye": [[10,0],[11,1],[12,1],[13,0],[12,-1],[11,-1]]}}"#;
        let f = parse_frame(line).unwrap().unwrap();
        let face = f.face.unwrap();
        assert_eq!(face.left_eye.len(), 6);
        assert_eq!(face.right_eye[3].x, 13.0);
        assert!(face.nose.is_empty());
        assert!(face.eyes().is_some());
        assert!(face.head_pose_eyes().is_none());
    }

    #[tokio::test]
    async fn test_pump_and_write() {
        let (session, events) = spawn_session(Pipeline::new(NullStore, 0.9), 4);
        let writer = tokio::spawn(write_events(events, Vec::new()));

        let input = trace();
        let submitted = pump_frames(input.as_bytes(), &session).await.unwrap();
        assert_eq!(submitted, 7);
        drop(session);

        let outcome = writer.await.unwrap().unwrap();
        assert_eq!(
            outcome,
            Some(SessionEvent::Outcome(SessionOutcome::Success {
                record_id: None
            }))
        );
    }

    #[tokio::test]
    async fn test_written_lines_are_json() {
        let (session, events) = spawn_session(Pipeline::new(NullStore, 0.9), 4);
        for f in challenge_prefix() {
            session.submit(f).await.unwrap();
        }
        drop(session);

        let mut out = Vec::new();
        let outcome = write_events(events, &mut out).await.unwrap();
        assert!(outcome.is_none());

        let text = String::from_utf8(out).unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 6);
        assert!(lines.iter().all(|v| v["event"] == "progress"));
        assert_eq!(lines[5]["phase"], "awaiting_head_right");
        assert_eq!(lines[5]["descriptor_requested"], true);
    }
}
