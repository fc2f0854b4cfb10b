//! Retry combinator for network calls: exponential backoff with optional
//! jitter, applied only to failures the error type reports as transient.
//! Strategies stay retry-free; the installer wraps their calls with this.

use crate::log_debug;
use crate::schemas::errors::FetchError;
use crate::schemas::global_config::DownloadSettings;
use colored::Colorize;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, first try included. 1 means no retries.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub jitter: bool,
}

impl RetryPolicy {
    pub fn from_settings(settings: &DownloadSettings) -> RetryPolicy {
        RetryPolicy {
            max_attempts: settings.retries + 1,
            base_delay: Duration::from_millis(500),
            jitter: true,
        }
    }

    /// Delay before attempt `attempt` (1-based; the first retry waits
    /// `base_delay`, doubling from there). Jitter spreads callers out by
    /// up to +50%.
    fn delay_before(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(8);
        let mut millis = self.base_delay.as_millis() as u64 * (1u64 << exponent);
        if self.jitter {
            // Cheap jitter from the clock's sub-millisecond noise; good
            // enough to de-synchronize a handful of workers.
            let noise = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.subsec_nanos() as u64)
                .unwrap_or(0);
            millis += noise % (millis / 2 + 1);
        }
        Duration::from_millis(millis)
    }
}

/// Runs `op` until it succeeds, fails non-transiently, or exhausts the
/// policy. The closure receives the 1-based attempt number.
pub fn with_retry<T, F>(policy: &RetryPolicy, mut op: F) -> Result<T, FetchError>
where
    F: FnMut(u32) -> Result<T, FetchError>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_err = None;
    for attempt in 1..=attempts {
        if attempt > 1 {
            let delay = policy.delay_before(attempt - 1);
            log_debug!(
                "[Retry] Attempt {}/{} after {:?} backoff.",
                attempt,
                attempts,
                delay
            );
            std::thread::sleep(delay);
        }
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < attempts => {
                log_debug!("[Retry] Transient failure: {}", e.to_string().yellow());
                last_err = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    Err(last_err.unwrap_or(FetchError::Network("retry budget exhausted".to_string())))
}
