use std::time::Duration;

use serde::Deserialize;

use relay_api::{PacketStream, TelemetrySource};

use crate::error::ProducerError;

// ═══════════════════════════════════════════════════════════════
//  RetryPolicy
// ═══════════════════════════════════════════════════════════════

/// Стратегия повторного acquisition (connect / load session).
///
/// Применяется только к `TelemetrySource::open()`. Ошибка посреди
/// потока всегда terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RetryPolicy {
    /// Первая ошибка: terminal.
    #[default]
    Never,
    /// Экспоненциальный backoff: delay удваивается до `max_delay_ms`.
    Backoff {
        /// Total attempts, including the first one.
        #[serde(default = "default_max_attempts")]
        max_attempts: u32,
        #[serde(default = "default_initial_delay_ms")]
        initial_delay_ms: u64,
        #[serde(default = "default_max_delay_ms")]
        max_delay_ms: u64,
    },
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay_ms() -> u64 {
    500
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl RetryPolicy {
    pub fn max_attempts(&self) -> u32 {
        match self {
            RetryPolicy::Never => 1,
            RetryPolicy::Backoff { max_attempts, .. } => *max_attempts,
        }
    }

    /// Delay before the next attempt after `failures` failed attempts,
    /// or `None` once the budget is spent.
    pub fn delay_after(&self, failures: u32) -> Option<Duration> {
        match *self {
            RetryPolicy::Never => None,
            RetryPolicy::Backoff {
                max_attempts,
                initial_delay_ms,
                max_delay_ms,
            } => {
                if failures == 0 || failures >= max_attempts {
                    return None;
                }
                let factor = 1u64.checked_shl(failures - 1).unwrap_or(u64::MAX);
                let ms = initial_delay_ms.saturating_mul(factor).min(max_delay_ms);
                Some(Duration::from_millis(ms))
            }
        }
    }

    pub fn validate(&self) -> Result<(), ProducerError> {
        if let RetryPolicy::Backoff {
            max_attempts,
            initial_delay_ms,
            max_delay_ms,
        } = *self
        {
            if max_attempts == 0 {
                return Err(ProducerError::InvalidConfig {
                    field: "retry.max_attempts",
                    detail: "must be > 0".into(),
                });
            }
            if max_delay_ms < initial_delay_ms {
                return Err(ProducerError::InvalidConfig {
                    field: "retry.max_delay_ms",
                    detail: format!("{max_delay_ms} is below initial_delay_ms {initial_delay_ms}"),
                });
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Acquisition
// ═══════════════════════════════════════════════════════════════

/// Open `source`, retrying per `policy`.
///
/// On final failure returns the diagnostic destined for the store.
pub(crate) async fn acquire(
    source: &dyn TelemetrySource,
    policy: &RetryPolicy,
) -> Result<Box<dyn PacketStream>, String> {
    let mut failures = 0u32;
    loop {
        let err = match source.open().await {
            Ok(stream) => return Ok(stream),
            Err(e) => e,
        };
        failures += 1;

        if !err.is_retryable() {
            tracing::error!(source = %source.name(), error = %err, "acquisition failed, not retryable");
            return Err(err.to_string());
        }

        match policy.delay_after(failures) {
            Some(delay) => {
                tracing::warn!(
                    source = %source.name(),
                    error = %err,
                    attempt = failures,
                    max_attempts = policy.max_attempts(),
                    delay_ms = delay.as_millis() as u64,
                    "acquisition failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            None if failures > 1 => {
                tracing::error!(source = %source.name(), error = %err, attempts = failures, "giving up");
                return Err(format!("{err} (gave up after {failures} attempts)"));
            }
            None => {
                tracing::error!(source = %source.name(), error = %err, "acquisition failed");
                return Err(err.to_string());
            }
        }
    }
}
