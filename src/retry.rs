//! Retry decisions and retry budgets.
//!
//! Two pieces cooperate when an attempt fails:
//!
//! - a [`RetryPolicy`] decides *whether* the failure deserves another attempt;
//! - a [`RetryStrategy`] decides *when* the next attempt happens and caps how
//!   many retries a single call may use.
//!
//! The default policy, [`NeverRetry`], fails closed. Only
//! [`Error::Transport`] and [`Error::Status`] failures are ever offered to a
//! policy.

use crate::request::{HttpRequest, Verb};
use crate::Error;
use rand::Rng;
use std::time::Duration;

/// Default retry cap of [`RetryStrategy::default`].
pub const DEFAULT_MAX_RETRIES: usize = 3;

/// Defines the delay between attempts and the number of retries allowed.
///
/// # Examples
///
/// ```
/// use webcaller::RetryStrategy;
/// use std::time::Duration;
///
/// // Resend right away, at most three times (the default)
/// let immediate = RetryStrategy::Immediate { max_retries: 3 };
///
/// // Exponential backoff: 100ms, 200ms, 400ms, 800ms...
/// let exponential = RetryStrategy::ExponentialBackoff {
///     initial_delay: Duration::from_millis(100),
///     max_delay: Duration::from_secs(30),
///     max_retries: 5,
///     jitter: true,
/// };
///
/// // Linear backoff: 1s, 1s, 1s...
/// let linear = RetryStrategy::Linear {
///     delay: Duration::from_secs(1),
///     max_retries: 3,
/// };
/// ```
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Never retry, whatever the policy says.
    None,

    /// Retry without waiting.
    Immediate {
        /// The maximum number of retry attempts.
        max_retries: usize,
    },

    /// Retry with exponentially increasing delays.
    ///
    /// Each retry waits for `initial_delay * 2^(retry - 1)` (capped at
    /// `max_delay`). Optional jitter scales the delay by a random factor
    /// between 0.5 and 1.0.
    ExponentialBackoff {
        /// The initial delay before the first retry.
        initial_delay: Duration,
        /// The maximum delay between retries.
        max_delay: Duration,
        /// The maximum number of retry attempts.
        max_retries: usize,
        /// Whether to add random jitter to delays.
        jitter: bool,
    },

    /// Retry with a fixed delay between attempts.
    Linear {
        /// The delay between retry attempts.
        delay: Duration,
        /// The maximum number of retry attempts.
        max_retries: usize,
    },

    /// Custom retry schedule.
    ///
    /// The function receives the retry number (starting from 1) and returns
    /// `Some(delay)` to retry after the delay, or `None` to stop. The caller's
    /// `max_attempts` ceiling still applies.
    Custom {
        /// Function that determines the retry delay.
        delay_fn: fn(retry: usize) -> Option<Duration>,
    },
}

impl Default for RetryStrategy {
    fn default() -> Self {
        RetryStrategy::Immediate {
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

impl RetryStrategy {
    /// Returns the delay before the given retry, or `None` if retries are exhausted.
    ///
    /// `retry` is 1-indexed: 1 is the first retry, i.e. the second attempt.
    pub fn delay_for_attempt(&self, retry: usize) -> Option<Duration> {
        match self {
            RetryStrategy::None => None,
            RetryStrategy::Immediate { max_retries } => {
                (retry <= *max_retries).then_some(Duration::ZERO)
            }
            RetryStrategy::ExponentialBackoff {
                initial_delay,
                max_delay,
                max_retries,
                jitter,
            } => {
                if retry > *max_retries {
                    return None;
                }

                let exponent = u32::try_from(retry.saturating_sub(1)).unwrap_or(u32::MAX);
                let multiplier = 2u32.saturating_pow(exponent);
                let delay = initial_delay.saturating_mul(multiplier).min(*max_delay);

                if *jitter {
                    let factor = rand::thread_rng().gen_range(0.5..=1.0);
                    Some(delay.mul_f64(factor))
                } else {
                    Some(delay)
                }
            }
            RetryStrategy::Linear { delay, max_retries } => {
                (retry <= *max_retries).then_some(*delay)
            }
            RetryStrategy::Custom { delay_fn } => delay_fn(retry),
        }
    }

    /// Returns the maximum number of retries, if the strategy defines one.
    pub fn max_retries(&self) -> Option<usize> {
        match self {
            RetryStrategy::None => Some(0),
            RetryStrategy::Immediate { max_retries }
            | RetryStrategy::ExponentialBackoff { max_retries, .. }
            | RetryStrategy::Linear { max_retries, .. } => Some(*max_retries),
            RetryStrategy::Custom { .. } => None,
        }
    }
}

/// Everything a [`RetryPolicy`] knows about a failed attempt.
#[derive(Debug, Clone, Copy)]
pub struct RetryContext<'a> {
    /// The URI of the call, as given in the call description.
    pub uri: &'a str,
    /// The verb of the call.
    pub verb: Verb,
    /// The built request, resent unchanged if the policy says so.
    pub request: &'a HttpRequest,
    /// The failure: [`Error::Transport`] or [`Error::Status`].
    pub error: &'a Error,
    /// The number of the attempt that failed, starting from 1.
    pub attempt: usize,
}

/// Decides whether a failed attempt should be retried.
///
/// Closures `Fn(&RetryContext) -> bool` are policies too.
///
/// # Examples
///
/// ```
/// use webcaller::{Error, RetryContext, RetryPolicy};
///
/// struct RetryOnRateLimit;
///
/// impl RetryPolicy for RetryOnRateLimit {
///     fn should_retry(&self, context: &RetryContext<'_>) -> bool {
///         context.error.status().map(|s| s.as_u16()) == Some(429)
///     }
/// }
/// ```
pub trait RetryPolicy: Send + Sync {
    /// Returns `true` to resend the request.
    fn should_retry(&self, context: &RetryContext<'_>) -> bool;
}

impl<F> RetryPolicy for F
where
    F: Fn(&RetryContext<'_>) -> bool + Send + Sync,
{
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        self(context)
    }
}

/// Never retry. The default policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverRetry;

impl RetryPolicy for NeverRetry {
    fn should_retry(&self, _context: &RetryContext<'_>) -> bool {
        false
    }
}

/// Retry all errors that are marked as retryable.
///
/// This uses [`Error::is_retryable`]: transport errors, 5xx and 429.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnRetryable;

impl RetryPolicy for RetryOnRetryable {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        context.error.is_retryable()
    }
}

/// Retry only on 5xx server errors.
#[derive(Debug, Clone, Copy)]
pub struct RetryOn5xx;

impl RetryPolicy for RetryOn5xx {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        matches!(context.error, Error::Status { status, .. } if status.is_server_error())
    }
}

/// Retry only on transport failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryOnConnectionError;

impl RetryPolicy for RetryOnConnectionError {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        context.error.is_transport()
    }
}

/// Combine multiple retry policies with OR logic.
///
/// Retries if ANY of the policies return `true`.
///
/// # Examples
///
/// ```
/// use webcaller::retry::{OrPredicate, RetryOn5xx, RetryOnConnectionError};
///
/// let policy = OrPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(RetryOnConnectionError),
/// ]);
/// ```
pub struct OrPredicate {
    policies: Vec<Box<dyn RetryPolicy>>,
}

impl OrPredicate {
    /// Creates a new `OrPredicate` from a list of policies.
    pub fn new(policies: Vec<Box<dyn RetryPolicy>>) -> Self {
        Self { policies }
    }
}

impl RetryPolicy for OrPredicate {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        self.policies.iter().any(|p| p.should_retry(context))
    }
}

/// Combine multiple retry policies with AND logic.
///
/// Retries only if ALL of the policies return `true`.
///
/// # Examples
///
/// ```
/// use webcaller::retry::{AndPredicate, RetryOn5xx};
/// use webcaller::RetryContext;
///
/// // Retry on 5xx errors, for GET calls only
/// let policy = AndPredicate::new(vec![
///     Box::new(RetryOn5xx),
///     Box::new(|context: &RetryContext<'_>| context.verb == webcaller::Verb::Get),
/// ]);
/// ```
pub struct AndPredicate {
    policies: Vec<Box<dyn RetryPolicy>>,
}

impl AndPredicate {
    /// Creates a new `AndPredicate` from a list of policies.
    pub fn new(policies: Vec<Box<dyn RetryPolicy>>) -> Self {
        Self { policies }
    }
}

impl RetryPolicy for AndPredicate {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        self.policies.iter().all(|p| p.should_retry(context))
    }
}
