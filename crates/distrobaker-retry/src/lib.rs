//! Retry strategies and backoff policies.
//!
//! Generalized from the teacher's publish-retry crate for the two places
//! DistroBuildSync retries a network operation: the config repository
//! `git` clone and the Content-Resolver HTTP fetch (both bounded by the
//! `--retry` CLI flag, default 3 attempts).

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Strategy type for retry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategyType {
    /// No delay between retries.
    Immediate,
    /// Exponential backoff: delay doubles each attempt.
    #[default]
    Exponential,
    /// Linear backoff: delay increases linearly each attempt.
    Linear,
}

/// Configuration for a retry strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryStrategyConfig {
    #[serde(default)]
    pub strategy: RetryStrategyType,
    /// Maximum number of attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay", with = "humantime_serde")]
    pub base_delay: Duration,
    #[serde(default = "default_max_delay", with = "humantime_serde")]
    pub max_delay: Duration,
    /// Jitter factor (0.0 = none, 1.0 = full jitter).
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_jitter() -> f64 {
    0.2
}

impl Default for RetryStrategyConfig {
    fn default() -> Self {
        Self {
            strategy: RetryStrategyType::Exponential,
            max_attempts: default_max_attempts(),
            base_delay: default_base_delay(),
            max_delay: default_max_delay(),
            jitter: default_jitter(),
        }
    }
}

impl RetryStrategyConfig {
    /// Build a config from just an attempt count, keeping every other knob
    /// at its default. This is what the `-r/--retry` CLI flag maps to.
    pub fn with_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }
}

/// Calculate the delay before the next retry attempt (1-indexed).
pub fn calculate_delay(config: &RetryStrategyConfig, attempt: u32) -> Duration {
    let delay = match config.strategy {
        RetryStrategyType::Immediate => Duration::ZERO,
        RetryStrategyType::Exponential => {
            let pow = attempt.saturating_sub(1).min(16);
            config.base_delay.saturating_mul(2_u32.saturating_pow(pow))
        }
        RetryStrategyType::Linear => config.base_delay.saturating_mul(attempt),
    };
    let capped = delay.min(config.max_delay);
    if config.jitter > 0.0 {
        apply_jitter(capped, config.jitter)
    } else {
        capped
    }
}

fn apply_jitter(delay: Duration, jitter: f64) -> Duration {
    use rand::Rng;
    let jitter_range = 2.0 * jitter;
    let mut rng = rand::thread_rng();
    let random_value: f64 = rng.gen();
    let random_factor = 1.0 - jitter + (random_value * jitter_range);
    let millis = (delay.as_millis() as f64 * random_factor).max(0.0).round() as u64;
    Duration::from_millis(millis)
}

/// Run a fallible async operation with retry behavior, sleeping between
/// attempts via `tokio::time::sleep`.
///
/// The operation receives the current attempt number (starting at 1).
pub async fn retry_async<T, E, F, Fut>(config: &RetryStrategyConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
{
    let mut attempt = 1;
    loop {
        match operation(attempt).await {
            Ok(v) => return Ok(v),
            Err(e) => {
                if attempt >= config.max_attempts {
                    return Err(e);
                }
                let delay = calculate_delay(config, attempt);
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_backoff_doubles_and_caps() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Exponential,
            max_attempts: 10,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            jitter: 0.0,
        };
        assert_eq!(calculate_delay(&config, 1), Duration::from_secs(1));
        assert_eq!(calculate_delay(&config, 2), Duration::from_secs(2));
        assert_eq!(calculate_delay(&config, 3), Duration::from_secs(4));
        assert_eq!(calculate_delay(&config, 10), Duration::from_secs(10));
    }

    #[test]
    fn immediate_strategy_has_no_delay() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            ..RetryStrategyConfig::default()
        };
        assert_eq!(calculate_delay(&config, 1), Duration::ZERO);
        assert_eq!(calculate_delay(&config, 5), Duration::ZERO);
    }

    #[test]
    fn with_attempts_overrides_only_attempt_count() {
        let config = RetryStrategyConfig::with_attempts(7);
        assert_eq!(config.max_attempts, 7);
        assert_eq!(config.strategy, RetryStrategyType::Exponential);
    }

    #[tokio::test]
    async fn retry_async_succeeds_after_transient_failures() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 5,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        };
        let mut attempts = 0;
        let result: Result<&str, &str> = retry_async(&config, |attempt| {
            attempts = attempt;
            async move {
                if attempt < 3 {
                    Err("transient")
                } else {
                    Ok("ok")
                }
            }
        })
        .await;
        assert_eq!(result, Ok("ok"));
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn retry_async_gives_up_after_max_attempts() {
        let config = RetryStrategyConfig {
            strategy: RetryStrategyType::Immediate,
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: 0.0,
        };
        let result: Result<&str, &str> =
            retry_async(&config, |_| async { Err("permanent") }).await;
        assert_eq!(result, Err("permanent"));
    }
}
