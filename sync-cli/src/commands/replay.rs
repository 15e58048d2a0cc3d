//! Replay recorded change payloads through the invalidation path.

use anyhow::{Context, Result};
use chatsync_client::{ChangeStreamSubscriber, ChannelSink, Config, MockChangeStream};
use chatsync_types::{ChangeEvent, InvalidationTarget, UserId};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::info;

/// Outcome of a replay.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    /// Events decoded and delivered.
    pub events: usize,
    /// Lines that could not be decoded.
    pub skipped: usize,
    /// Invalidation targets produced.
    pub invalidations: usize,
}

/// Run the replay command.
pub async fn run(config: &Config, events: &Path, user: &str) -> Result<ReplaySummary> {
    let contents = tokio::fs::read_to_string(events)
        .await
        .with_context(|| format!("Failed to read {}", events.display()))?;

    info!(path = %events.display(), user, "replaying change events");

    let stream = MockChangeStream::new();
    let (sink, mut targets) = ChannelSink::new();
    let subscriber = ChangeStreamSubscriber::from_config(
        stream.clone(),
        UserId::from(user),
        Arc::new(sink),
        &config.realtime,
    );
    subscriber
        .start()
        .await
        .context("Failed to subscribe to change stream")?;

    let mut summary = ReplaySummary::default();
    for (index, line) in contents.lines().enumerate() {
        let line_no = index + 1;
        if line.trim().is_empty() {
            continue;
        }

        let event = match decode(line) {
            Ok(event) => event,
            Err(e) => {
                eprintln!("line {}: skipped ({:#})", line_no, e);
                summary.skipped += 1;
                continue;
            }
        };

        stream.emit(event);
        summary.events += 1;
        for target in drain(&mut targets) {
            println!("{}: {}", line_no, target);
            summary.invalidations += 1;
        }
    }

    subscriber.stop().await;

    println!(
        "Replayed {} events ({} skipped), {} invalidations.",
        summary.events, summary.skipped, summary.invalidations
    );
    Ok(summary)
}

fn decode(line: &str) -> Result<ChangeEvent> {
    let payload: serde_json::Value = serde_json::from_str(line).context("invalid JSON")?;
    ChangeEvent::from_payload(&payload).context("invalid change payload")
}

fn drain(rx: &mut UnboundedReceiver<InvalidationTarget>) -> Vec<InvalidationTarget> {
    let mut drained = Vec::new();
    while let Ok(target) = rx.try_recv() {
        drained.push(target);
    }
    drained
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counts_events_skips_and_targets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        std::fs::write(
            &path,
            concat!(
                r#"{"table":"messages","eventType":"INSERT","new":{"id":"m1","conversation_id":"c1"}}"#,
                "\n",
                "not json\n",
                "\n",
                r#"{"table":"conversations","eventType":"UPDATE","new":{"id":"c1"}}"#,
                "\n",
                r#"{"table":"profiles","eventType":"UPDATE","new":{}}"#,
                "\n",
            ),
        )
        .unwrap();

        let summary = run(&Config::default(), &path, "u1").await.unwrap();

        assert_eq!(
            summary,
            ReplaySummary {
                events: 2,
                skipped: 2,
                invalidations: 4,
            }
        );
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let missing = Path::new("/nonexistent/events.jsonl");
        let result = run(&Config::default(), missing, "u1").await;
        assert!(result.is_err());
    }
}
