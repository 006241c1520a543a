// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded retry for Network calls.
//!
//! Only two error shapes ever re-enter the loop: a 429 on an idempotent
//! call, and a connection-level failure on a mutation where the request
//! provably never left this process. A server-side 429 on a mutation is
//! final — the Network may already have applied the side effect, and a
//! blind resend could double-create.

use crate::error::GatewayError;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff schedule. Defaults to the production budget:
/// 5 attempts, 500 ms base, doubling, capped at 8 s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { attempts: 5, base: Duration::from_millis(500), cap: Duration::from_secs(8) }
    }
}

impl RetryPolicy {
    /// Delay before attempt `n + 1` (zero-based `n`), capped.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.cap)
    }

    #[cfg(test)]
    pub(crate) fn fast() -> Self {
        Self { attempts: 5, base: Duration::from_millis(1), cap: Duration::from_millis(4) }
    }
}

/// Run an idempotent call, retrying rate-limit rejections with backoff.
pub(crate) async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    retry_when(policy, op_name, &mut op, |e| matches!(e, GatewayError::RateLimited)).await
}

/// Run a mutation. Retries only connection-level failures where the request
/// never reached the server; everything else, including 429 responses, is
/// reported to the caller on the first occurrence.
pub(crate) async fn send_mutation<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    mut op: F,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    retry_when(policy, op_name, &mut op, |e| matches!(e, GatewayError::Connect(_))).await
}

async fn retry_when<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &'static str,
    op: &mut F,
    retriable: impl Fn(&GatewayError) -> bool,
) -> Result<T, GatewayError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if retriable(&err) && attempt + 1 < policy.attempts => {
                let delay = policy.delay(attempt);
                warn!(
                    op = op_name,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "retrying Network call"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
