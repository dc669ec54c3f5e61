//! Retry logic with exponential backoff for the HTTP collaborators
//!
//! Fetches and API lookups go through [`with_retry`]. Only failures that
//! [`IsRetryable`] classifies as transient are retried; everything else is
//! returned on the first attempt.
//!
//! # Example
//!
//! ```no_run
//! use input_vfs::config::RetryConfig;
//! use input_vfs::error::Error;
//! use input_vfs::retry::with_retry;
//!
//! # async fn example() -> Result<(), Error> {
//! let config = RetryConfig::default();
//! let body = with_retry(&config, "datum lookup", || async {
//!     Ok::<_, Error>("resolved".to_string())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::RetryConfig;
use crate::error::{DownloadError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Classify errors as transient (worth retrying) or permanent
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Network(e) => e.is_timeout() || e.is_connect(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::NotConnected
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::UnexpectedEof
            ),
            // Server-side hiccups and throttling
            Error::Download(DownloadError::HttpStatus { status, .. }) => {
                *status >= 500 || *status == 429 || *status == 408
            }
            Error::Download(_) => false,
            Error::Config { .. }
            | Error::Input(_)
            | Error::Vfs(_)
            | Error::DuplicateName { .. }
            | Error::InvalidPattern(_)
            | Error::Serialization(_)
            | Error::Other(_) => false,
        }
    }
}

/// Run an async operation, retrying transient failures with exponential backoff
///
/// `operation_name` only labels the log lines. Returns the first success or
/// the last error once `config.max_attempts` retries are used up.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        let error = match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(e) => e,
        };

        if !error.is_retryable() {
            tracing::debug!(operation = operation_name, error = %error, "non-retryable failure");
            return Err(error);
        }
        if attempt >= config.max_attempts {
            tracing::warn!(
                operation = operation_name,
                error = %error,
                attempts = attempt + 1,
                "retry attempts exhausted"
            );
            return Err(error);
        }

        attempt += 1;
        let wait = if config.jitter {
            add_jitter(delay)
        } else {
            delay
        };
        tracing::warn!(
            operation = operation_name,
            error = %error,
            attempt,
            max_attempts = config.max_attempts,
            delay_ms = wait.as_millis() as u64,
            "transient failure, retrying"
        );
        tokio::time::sleep(wait).await;

        delay = Duration::from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
            .min(config.max_delay);
    }
}

/// Spread a delay uniformly over `[delay, 2 * delay]`
fn add_jitter(delay: Duration) -> Duration {
    let factor: f64 = rand::thread_rng().gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + factor))
}
