//! Example demonstrating custom retry policies.
//!
//! This example shows how to:
//! - Write a custom retry policy
//! - Combine policies with AND/OR logic
//! - Bound retries with a strategy and a hard attempt ceiling
//!
//! Run with: `cargo run --example custom_retry`

use std::time::Duration;
use webcaller::retry::{AndPredicate, OrPredicate, RetryOn5xx, RetryOnConnectionError};
use webcaller::{Caller, Error, RetryContext, RetryPolicy, RetryStrategy, Verb};

/// Custom policy: retry on rate limit errors (HTTP 429)
struct RetryOnRateLimit;

impl RetryPolicy for RetryOnRateLimit {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        context.error.status().map(|s| s.as_u16()) == Some(429)
    }
}

/// Custom policy: only retry idempotent verbs
struct IdempotentOnly;

impl RetryPolicy for IdempotentOnly {
    fn should_retry(&self, context: &RetryContext<'_>) -> bool {
        matches!(context.verb, Verb::Get | Verb::Head | Verb::Put | Verb::Delete)
    }
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("webcaller=info,custom_retry=info")
        .init();

    println!("=== Example 1: Retry on rate limits ===");
    let caller = Caller::builder()
        .base_url("https://httpbin.org")?
        .retry_policy(Box::new(RetryOnRateLimit))
        .retry_strategy(RetryStrategy::Linear {
            delay: Duration::from_secs(1),
            max_retries: 2,
        })
        .build()?;
    report(caller.get("/status/429"));

    println!("=== Example 2: Server or connection errors, idempotent calls only ===");
    let caller = Caller::builder()
        .base_url("https://httpbin.org")?
        .retry_policy(Box::new(AndPredicate::new(vec![
            Box::new(OrPredicate::new(vec![
                Box::new(RetryOn5xx),
                Box::new(RetryOnConnectionError),
            ])),
            Box::new(IdempotentOnly),
        ])))
        .retry_strategy(RetryStrategy::ExponentialBackoff {
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            max_retries: 3,
            jitter: true,
        })
        .build()?;
    report(caller.get("/status/503"));
    report(caller.post("/status/503", "not retried"));

    println!("=== Example 3: Closure policy with an attempt ceiling ===");
    let caller = Caller::builder()
        .base_url("https://httpbin.org")?
        .retry_policy(Box::new(|context: &RetryContext<'_>| {
            println!("  attempt {} failed: {}", context.attempt, context.error);
            true
        }))
        .retry_strategy(RetryStrategy::Custom {
            delay_fn: |retry| Some(Duration::from_millis(100 * retry as u64)),
        })
        .max_attempts(3)
        .build()?;
    report(caller.get("/status/500"));

    Ok(())
}

fn report(result: Result<webcaller::CallResponse, Error>) {
    match result {
        Ok(response) => println!("Succeeded after {} attempt(s)", response.attempts),
        Err(e) => println!("Failed: {}", e),
    }
    println!();
}
