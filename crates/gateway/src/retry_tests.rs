// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn rate_limited() -> GatewayError {
    GatewayError::RateLimited
}

#[tokio::test]
async fn backoff_retries_429_until_success() {
    let calls = AtomicU32::new(0);
    let result = with_backoff(&RetryPolicy::fast(), "get", || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move { if n < 2 { Err(rate_limited()) } else { Ok(42) } }
    })
    .await;
    assert_eq!(result.unwrap(), 42);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn backoff_exhausts_after_budget() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_backoff(&RetryPolicy::fast(), "get", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(rate_limited()) }
    })
    .await;
    assert!(matches!(result, Err(GatewayError::RateLimited)));
    assert_eq!(calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn backoff_does_not_retry_remote_errors() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = with_backoff(&RetryPolicy::fast(), "get", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(GatewayError::Remote { status: 500, body: "boom".into() }) }
    })
    .await;
    assert!(matches!(result, Err(GatewayError::Remote { status: 500, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mutation_treats_server_429_as_final() {
    let calls = AtomicU32::new(0);
    let result: Result<(), _> = send_mutation(&RetryPolicy::fast(), "create", || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err(rate_limited()) }
    })
    .await;
    assert!(matches!(result, Err(GatewayError::RateLimited)));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn mutation_retries_connect_failures() {
    let calls = AtomicU32::new(0);
    let result = send_mutation(&RetryPolicy::fast(), "create", || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        async move {
            if n == 0 {
                Err(GatewayError::Connect("refused".into()))
            } else {
                Ok("d1")
            }
        }
    })
    .await;
    assert_eq!(result.unwrap(), "d1");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn delay_doubles_and_caps() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.delay(0), Duration::from_millis(500));
    assert_eq!(policy.delay(1), Duration::from_secs(1));
    assert_eq!(policy.delay(2), Duration::from_secs(2));
    assert_eq!(policy.delay(3), Duration::from_secs(4));
    assert_eq!(policy.delay(4), Duration::from_secs(8));
    assert_eq!(policy.delay(10), Duration::from_secs(8));
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // Attempts are always bounded by the policy, whatever the error mix.
        #[test]
        fn attempt_count_never_exceeds_budget(fail_count in 0u32..20) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let calls = AtomicU32::new(0);
            let _ = runtime.block_on(with_backoff(&RetryPolicy::fast(), "op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move { if n < fail_count { Err(rate_limited()) } else { Ok(()) } }
            }));
            prop_assert!(calls.load(Ordering::SeqCst) <= 5);
        }
    }
}
