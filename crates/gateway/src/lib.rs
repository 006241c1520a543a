// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Network-facing clients for the DePIN sidecar.
//!
//! One [`Network`] implementation per credential mode: [`RestNetwork`] calls
//! the Network's REST API with an API key, [`ChainNetwork`] drives the jobs
//! program over JSON-RPC with a local wallet. [`AuthSigner`] produces the
//! `MESSAGE:SIGNATURE` tokens compute nodes require, and [`NodeClient`]
//! talks to the nodes themselves (confidential job-definition handoff and
//! live log streams).

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod artifact;
mod chain;
mod error;
mod network;
mod node;
mod rest;
mod retry;
mod signer;

pub use artifact::ArtifactStore;
pub use chain::{ChainConfig, ChainNetwork};
pub use error::{GatewayError, SignerError};
pub use network::{
    Balance, CreateDeploymentRequest, DeploymentSnapshot, JobDetail, JobSummary, Network,
};
pub use node::{parse_log_frame, stream_logs, LogStreamParams, NodeClient, StreamOutcome};
pub use rest::RestNetwork;
pub use retry::RetryPolicy;
pub use signer::{AuthSigner, EphemeralSigner, SignerStats};

#[cfg(any(test, feature = "test-support"))]
pub use network::{FakeNetwork, NetworkCall};
