// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Core domain types for the DePIN sidecar.
//!
//! Everything in this crate is I/O-free: credential records and their
//! fingerprints, deployment and job state, the heartbeat and audit event
//! families sent to the orchestrator, and the [`Clock`] abstraction the
//! time-driven loops are generic over. The [`ControlPlane`] trait is the
//! seam between those loops and the orchestrator's HTTP surface.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod audit;
mod clock;
mod control;
mod credential;
mod deployment;
mod heartbeat;
mod id;

pub use audit::{AuditAction, AuditEvent, AuditStatus};
pub use clock::{Clock, FakeClock, SystemClock};
pub use control::{ControlError, ControlPlane};
pub use credential::{Credential, CredentialError, Fingerprint, Secret, SignerMode};
pub use deployment::{
    DeploymentStatus, Endpoint, JobState, LaunchStrategy, ResourceSpec, WatchedDeployment,
};
pub use heartbeat::{HeartbeatEvent, HeartbeatState, NOSANA_PROVIDER};
pub use id::{CredentialName, DeploymentId, JobAddress};

#[cfg(any(test, feature = "test-support"))]
pub use control::{ControlCall, FakeControlPlane};
