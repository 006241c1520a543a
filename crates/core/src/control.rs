// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Seam between the watchdogs and the orchestrator.
//!
//! The real implementation POSTs to the orchestrator's inventory and audit
//! endpoints; tests record calls through [`FakeControlPlane`]. Both sinks
//! are best-effort from the caller's perspective — a watchdog logs a failed
//! send and keeps going.

use crate::audit::AuditEvent;
use crate::heartbeat::HeartbeatEvent;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from orchestrator-bound sends.
#[derive(Debug, Error)]
pub enum ControlError {
    #[error("orchestrator unreachable: {0}")]
    Transport(String),

    #[error("orchestrator rejected event: {status} {body}")]
    Rejected { status: u16, body: String },
}

/// Sink for heartbeats and audit records.
#[async_trait]
pub trait ControlPlane: Send + Sync + 'static {
    async fn heartbeat(&self, event: &HeartbeatEvent) -> Result<(), ControlError>;

    async fn audit(&self, event: &AuditEvent) -> Result<(), ControlError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::{AuditEvent, ControlError, ControlPlane, HeartbeatEvent};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// One recorded call, in arrival order.
    #[derive(Debug, Clone)]
    pub enum ControlCall {
        Heartbeat(HeartbeatEvent),
        Audit(AuditEvent),
    }

    /// Recording control plane for tests.
    #[derive(Clone, Default)]
    pub struct FakeControlPlane {
        calls: Arc<Mutex<Vec<ControlCall>>>,
        fail_heartbeats: Arc<Mutex<bool>>,
    }

    impl FakeControlPlane {
        pub fn new() -> Self {
            Self::default()
        }

        /// All recorded calls in order.
        pub fn calls(&self) -> Vec<ControlCall> {
            self.calls.lock().clone()
        }

        /// Heartbeats only, in order.
        pub fn heartbeats(&self) -> Vec<HeartbeatEvent> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    ControlCall::Heartbeat(hb) => Some(hb.clone()),
                    ControlCall::Audit(_) => None,
                })
                .collect()
        }

        /// Audit events only, in order.
        pub fn audits(&self) -> Vec<AuditEvent> {
            self.calls
                .lock()
                .iter()
                .filter_map(|c| match c {
                    ControlCall::Audit(a) => Some(a.clone()),
                    ControlCall::Heartbeat(_) => None,
                })
                .collect()
        }

        /// Make subsequent heartbeat sends fail (watchdogs must survive it).
        pub fn fail_heartbeats(&self, fail: bool) {
            *self.fail_heartbeats.lock() = fail;
        }
    }

    #[async_trait]
    impl ControlPlane for FakeControlPlane {
        async fn heartbeat(&self, event: &HeartbeatEvent) -> Result<(), ControlError> {
            if *self.fail_heartbeats.lock() {
                return Err(ControlError::Transport("injected failure".into()));
            }
            self.calls.lock().push(ControlCall::Heartbeat(event.clone()));
            Ok(())
        }

        async fn audit(&self, event: &AuditEvent) -> Result<(), ControlError> {
            self.calls.lock().push(ControlCall::Audit(event.clone()));
            Ok(())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{ControlCall, FakeControlPlane};
