//! Retry with exponential backoff around remote calls.

use crate::rpc::{FailureClass, RpcError, RpcResult};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// How often and how patiently a remote call is attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt for transient failures.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each later one.
    pub backoff_base: Duration,
    /// Bound on a single attempt.
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

/// Why a retried call gave up.
#[derive(Debug, Clone, Error)]
pub enum RetryFailure {
    /// The last attempt failed and no retry remains or applies.
    #[error("{method} failed after {attempts} attempt(s): {error}")]
    Failed {
        /// Remote procedure.
        method: String,
        /// Attempts issued.
        attempts: u32,
        /// Last observed error.
        error: RpcError,
    },

    /// The backend throttled the call; it was not retried.
    #[error("{method} rate limited: {error}")]
    RateLimited {
        /// Remote procedure.
        method: String,
        /// Attempts issued.
        attempts: u32,
        /// The throttling error.
        error: RpcError,
    },

    /// The backend was already throttling; the call was not issued again.
    #[error("{method} skipped, backend is rate limited")]
    ShortCircuited {
        /// Remote procedure.
        method: String,
        /// Attempts issued before the block was noticed.
        attempts: u32,
    },
}

impl RetryFailure {
    /// Returns whether throttling ended the call.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::ShortCircuited { .. })
    }

    /// Returns the number of attempts actually issued.
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Failed { attempts, .. }
            | Self::RateLimited { attempts, .. }
            | Self::ShortCircuited { attempts, .. } => *attempts,
        }
    }

    /// Returns the last remote error, if an attempt produced one.
    #[must_use]
    pub const fn error(&self) -> Option<&RpcError> {
        match self {
            Self::Failed { error, .. } | Self::RateLimited { error, .. } => Some(error),
            Self::ShortCircuited { .. } => None,
        }
    }
}

impl RetryPolicy {
    /// Returns the delay after the given number of failed attempts.
    #[must_use]
    pub fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        let factor = 1_u32.checked_shl(exponent).unwrap_or(u32::MAX);
        self.backoff_base.saturating_mul(factor)
    }

    /// Runs `attempt` until it succeeds or the policy gives up.
    ///
    /// `attempt` receives the 1-based attempt number.
    ///
    /// # Errors
    ///
    /// Returns [`RetryFailure`] describing the final outcome.
    pub async fn execute<T, F, Fut>(&self, method: &str, attempt: F) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RpcResult<T>>,
    {
        self.execute_gated(method, || false, attempt).await
    }

    /// Like [`Self::execute`], but consults `blocked` before every attempt
    /// and stops without calling when it reports that the backend is
    /// throttling.
    ///
    /// # Errors
    ///
    /// Returns [`RetryFailure`] describing the final outcome.
    pub async fn execute_gated<T, F, Fut, G>(
        &self,
        method: &str,
        blocked: G,
        mut attempt: F,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = RpcResult<T>>,
        G: Fn() -> bool,
    {
        let mut attempts = 0_u32;
        loop {
            if blocked() {
                return Err(RetryFailure::ShortCircuited {
                    method: method.to_owned(),
                    attempts,
                });
            }
            attempts += 1;

            let error = match tokio::time::timeout(self.attempt_timeout, attempt(attempts)).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(error)) => error,
                Err(_) => RpcError::Timeout {
                    method: method.to_owned(),
                    after: self.attempt_timeout,
                },
            };

            match error.failure_class() {
                FailureClass::RateLimited => {
                    warn!(method, attempt = attempts, error = %error, "rate limited; not retrying");
                    return Err(RetryFailure::RateLimited {
                        method: method.to_owned(),
                        attempts,
                        error,
                    });
                }
                FailureClass::Transient if attempts <= self.max_retries => {
                    let delay = self.backoff_for(attempts);
                    warn!(method, attempt = attempts, error = %error, ?delay, "transient failure; retrying");
                    tokio::time::sleep(delay).await;
                }
                FailureClass::Transient | FailureClass::Permanent => {
                    return Err(RetryFailure::Failed {
                        method: method.to_owned(),
                        attempts,
                        error,
                    });
                }
            }
        }
    }
}
