// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Timing knobs for the launch and watchdog loops.

use std::time::Duration;

/// Production cadence for one provider client. Tests shrink the intervals
/// and drive the clock instead of sleeping.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// Pause between watchdog iterations.
    pub watchdog_interval: Duration,
    /// Minimum spacing between ready-heartbeats.
    pub heartbeat_interval_ms: u64,
    /// Assumed job timeout the extend logic races against.
    pub job_timeout_ms: u64,
    /// Extend when the remaining timeout drops to this window.
    pub extend_threshold_ms: u64,
    /// Seconds added by the per-job extend fallback.
    pub extend_duration_secs: u64,
    /// Minutes requested from the deployment-level timeout update.
    pub extend_timeout_minutes: u64,
    /// Deployments that die younger than this are not re-launched.
    pub min_runtime_for_redeploy_ms: u64,
    /// Launch: spacing of deployment status polls.
    pub start_poll_interval: Duration,
    /// Launch: give up waiting for `RUNNING` after this long.
    pub start_poll_horizon_ms: u64,
    /// Confidential handoff: spacing of job state polls.
    pub handoff_poll_interval: Duration,
    /// Confidential handoff: abandon the job after this long.
    pub handoff_horizon_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            watchdog_interval: Duration::from_secs(60),
            heartbeat_interval_ms: 30 * 1000,
            job_timeout_ms: 30 * 60 * 1000,
            extend_threshold_ms: 5 * 60 * 1000,
            extend_duration_secs: 1800,
            extend_timeout_minutes: 60,
            min_runtime_for_redeploy_ms: 20 * 60 * 1000,
            start_poll_interval: Duration::from_secs(10),
            start_poll_horizon_ms: 5 * 60 * 1000,
            handoff_poll_interval: Duration::from_secs(3),
            handoff_horizon_ms: 10 * 60 * 1000,
        }
    }
}

impl ProviderConfig {
    /// Millisecond-scale polling for tests. The watchdog interval stays at
    /// its default: tests drive iterations directly, and a quiescent
    /// background task keeps scripted fakes deterministic.
    #[cfg(any(test, feature = "test-support"))]
    pub fn fast() -> Self {
        Self {
            start_poll_interval: Duration::from_millis(1),
            handoff_poll_interval: Duration::from_millis(1),
            ..Self::default()
        }
    }
}
