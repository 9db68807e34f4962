//! The inbound edge of the composition root. The cluster bus itself is an
//! external collaborator (§1); this trait is the stated interface the
//! pipeline expects from it, plus a line-delimited-JSON adapter so the
//! binary is runnable standalone (e.g. piped from a bridging process).

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use crate::notification::ChangeNotification;

#[async_trait]
pub trait NotificationSource: Send {
    /// Returns the next notification, or `None` once the source is
    /// exhausted (which the composition root treats as a shutdown signal).
    async fn recv(&mut self) -> Option<ChangeNotification>;
}

/// Reads one JSON-encoded `ChangeNotification` per line from stdin.
/// Malformed lines are logged and skipped rather than ending the stream.
pub struct StdinNotificationSource {
    lines: tokio::io::Lines<BufReader<tokio::io::Stdin>>,
}

impl StdinNotificationSource {
    pub fn new() -> Self {
        Self { lines: BufReader::new(tokio::io::stdin()).lines() }
    }
}

impl Default for StdinNotificationSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSource for StdinNotificationSource {
    async fn recv(&mut self) -> Option<ChangeNotification> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    warn!(error = %err, "failed reading notification source, shutting down");
                    return None;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ChangeNotification>(&line) {
                Ok(notification) => return Some(notification),
                Err(err) => {
                    warn!(error = %err, "dropping malformed change notification");
                    continue;
                }
            }
        }
    }
}
