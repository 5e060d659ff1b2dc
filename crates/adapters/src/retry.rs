// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jittered exponential backoff for the forge client's retry loop.

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tuning knobs for [`crate::forge::ForgeClient`]'s retry loop.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter_factor: 0.25,
        }
    }
}

impl RetryPolicy {
    /// `min(max_delay, base_delay * 2^attempt) * (1 +/- jitter_factor)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scale = 2f64.powi(attempt.min(30) as i32);
        let unjittered = self.max_delay.min(self.base_delay.mul_f64(scale));
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * self.jitter_factor;
        unjittered.mul_f64((1.0 + jitter).max(0.0))
    }

    /// Sleeps for `duration`, or returns `false` early if `cancel` fires
    /// first — the caller should treat that as "stop retrying".
    pub async fn sleep_cancellable(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            () = tokio::time::sleep(duration) => true,
            () = cancel.cancelled() => false,
        }
    }
}

/// Parses a `Retry-After` header value, which per HTTP may be either a
/// number of seconds or an HTTP-date.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    let target = chrono::DateTime::parse_from_rfc2822(value.trim()).ok()?;
    let now = chrono::Utc::now();
    let delta = target.with_timezone(&chrono::Utc) - now;
    delta.to_std().ok()
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
