//! Typed progress events emitted during ingestion and retrieval.
//!
//! Every event carries a correlation id naming the file or request it
//! belongs to, so a caller watching a batch of concurrently processed
//! files can attribute interleaved events. A stream is terminated by
//! exactly one [`EventKind::FinalNotification`] carrying the aggregate
//! result or the ranked context.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::Result;

/// The kind of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// A stage transition or informational update.
    Notification,
    /// A failure report. Does not necessarily end the stream.
    Error,
    /// A timing measurement.
    Metric,
    /// The single terminal event carrying the aggregate result.
    FinalNotification,
}

/// A progress event pushed to the caller during pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Which file or request this event belongs to.
    pub correlation_id: String,
    /// Event kind.
    pub kind: EventKind,
    /// Human-readable message.
    pub message: String,
}

/// Handle for emitting progress events to a caller-held receiver.
///
/// Cloning is cheap; [`with_correlation`](ProgressSender::with_correlation)
/// derives a sender tagged for one file. A closed or absent receiver makes
/// every send a no-op — progress reporting never fails the pipeline.
#[derive(Clone)]
pub struct ProgressSender {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    correlation_id: String,
}

impl ProgressSender {
    /// Create a sender/receiver pair with the given root correlation id.
    pub fn channel(
        correlation_id: impl Into<String>,
    ) -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx), correlation_id: correlation_id.into() }, rx)
    }

    /// A sender that drops every event, for callers that don't observe progress.
    pub fn disabled() -> Self {
        Self { tx: None, correlation_id: String::new() }
    }

    /// Derive a sender tagged with a different correlation id, sharing the
    /// same underlying channel.
    pub fn with_correlation(&self, correlation_id: impl Into<String>) -> Self {
        Self { tx: self.tx.clone(), correlation_id: correlation_id.into() }
    }

    fn send(&self, kind: EventKind, message: String) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(ProgressEvent {
                correlation_id: self.correlation_id.clone(),
                kind,
                message,
            });
        }
    }

    /// Emit a notification event.
    pub fn notify(&self, message: impl Into<String>) {
        self.send(EventKind::Notification, message.into());
    }

    /// Emit an error event.
    pub fn error(&self, message: impl Into<String>) {
        self.send(EventKind::Error, message.into());
    }

    /// Emit a metric event.
    pub fn metric(&self, message: impl Into<String>) {
        self.send(EventKind::Metric, message.into());
    }

    /// Emit the terminal event for this stream.
    pub fn finish(&self, message: impl Into<String>) {
        self.send(EventKind::FinalNotification, message.into());
    }
}

/// Run a stage, emitting its description before and its elapsed time after.
///
/// On failure nothing extra is emitted here; classification and the error
/// event are the orchestrator's job.
pub async fn measured<T, F>(sender: &ProgressSender, description: &str, stage: F) -> Result<T>
where
    F: std::future::Future<Output = Result<T>>,
{
    sender.notify(description);
    let start = Instant::now();
    let out = stage.await?;
    sender.notify(format!("{description} completed in {:.2} seconds", start.elapsed().as_secs_f64()));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn measured_emits_start_and_elapsed() {
        let (sender, mut rx) = ProgressSender::channel("file-1");
        let value = measured(&sender, "Parsing: 'a.txt'", async { Ok(42) }).await.unwrap();
        assert_eq!(value, 42);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.kind, EventKind::Notification);
        assert_eq!(first.message, "Parsing: 'a.txt'");
        assert_eq!(first.correlation_id, "file-1");

        let second = rx.recv().await.unwrap();
        assert!(second.message.contains("completed in"));
    }

    #[tokio::test]
    async fn derived_senders_tag_their_own_correlation() {
        let (sender, mut rx) = ProgressSender::channel("batch-1");
        sender.with_correlation("file-a").notify("one");
        sender.with_correlation("file-b").notify("two");

        assert_eq!(rx.recv().await.unwrap().correlation_id, "file-a");
        assert_eq!(rx.recv().await.unwrap().correlation_id, "file-b");
    }

    #[test]
    fn disabled_sender_is_a_no_op() {
        ProgressSender::disabled().notify("dropped");
    }
}
