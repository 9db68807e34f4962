//! `AskWithRetry`: the small outbound-fetch helper the design notes call
//! for in place of a hand-rolled timer wheel — one pending request at a
//! time, a per-call timeout, and bounded exponential backoff.

use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct AskConfig {
    pub timeout: Duration,
    pub retries: u32,
    pub backoff: Duration,
}

impl Default for AskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            retries: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

/// Runs `attempt` up to `config.retries + 1` times, each bounded by
/// `config.timeout`. A timeout and an `Err` from `attempt` are both
/// treated as retriable; backoff doubles after every failed try.
pub async fn ask_with_retry<F, Fut, T, E>(config: &AskConfig, label: &str, mut attempt: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut backoff = config.backoff;
    let mut tries = 0;
    loop {
        match tokio::time::timeout(config.timeout, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => {
                if tries >= config.retries {
                    return Err(err);
                }
                warn!(%label, attempt = tries, error = %err, "ask failed, retrying");
            }
            Err(_) => {
                if tries >= config.retries {
                    // Re-issue once more to surface a real error to the caller
                    // instead of fabricating one; the timeout itself carries
                    // no `E`, so the final attempt's own error wins.
                    return attempt().await;
                }
                warn!(%label, attempt = tries, timeout = ?config.timeout, "ask timed out, retrying");
            }
        }
        tries += 1;
        tokio::time::sleep(backoff).await;
        backoff = backoff.saturating_mul(2);
    }
}
