//! NDJSON event log writer.
//!
//! Subscribes to a [`CrawlEventBus`] and appends one JSON object per line to
//! a configurable file path, independent of the in-process broadcast
//! consumers (progress bars, tests). Written in parallel to the archive, per
//! the event types enumerated in [`crate::crawl_events::types::CrawlEvent`].

use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::bus::CrawlEventBus;
use super::types::CrawlEvent;

/// Handle to a running event-log writer task.
pub struct EventLogWriter {
    handle: JoinHandle<()>,
}

impl EventLogWriter {
    /// Spawn a task that drains `bus` and appends NDJSON records to `path`.
    ///
    /// The file is opened in append mode so a resumed crawl continues the
    /// same log rather than truncating it.
    pub async fn spawn(bus: &CrawlEventBus, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let receiver = bus.subscribe();
        let handle = tokio::spawn(run(file, receiver));
        Ok(Self { handle })
    }

    /// Wait for the writer task to drain and exit (after a `Shutdown` event).
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

async fn run(mut file: tokio::fs::File, mut receiver: broadcast::Receiver<CrawlEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => {
                let is_shutdown = matches!(event, CrawlEvent::Shutdown { .. });
                if let Ok(mut line) = serde_json::to_vec(&event) {
                    line.push(b'\n');
                    if let Err(err) = file.write_all(&line).await {
                        tracing::error!("event log write failed: {err}");
                    }
                }
                if is_shutdown {
                    let _ = file.flush().await;
                    break;
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("event log writer lagged, skipped {skipped} events");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
    let _ = file.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawl_events::types::ShutdownReason;

    #[tokio::test]
    async fn writes_ndjson_lines_and_stops_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.ndjson");

        let bus = CrawlEventBus::new(16);
        let writer = EventLogWriter::spawn(&bus, &path).await.unwrap();

        bus.publish(CrawlEvent::crawl_started(
            "https://example.com".into(),
            dir.path().to_path_buf(),
            3,
            8,
        ))
        .await
        .unwrap();
        bus.publish(CrawlEvent::shutdown(ShutdownReason::CrawlCompleted))
            .await
            .unwrap();

        writer.join().await;

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("\"crawl.started\""));
        assert!(lines[1].contains("\"shutdown\""));
    }
}
