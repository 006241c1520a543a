// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared fixtures for client and watchdog tests.

use crate::client::{ProviderClient, ProviderEndpoints};
use crate::config::ProviderConfig;
use depin_core::{
    Clock, Credential, DeploymentId, DeploymentStatus, Endpoint, FakeClock, FakeControlPlane,
    JobAddress, JobState, ResourceSpec, Secret, WatchedDeployment,
};
use depin_gateway::{DeploymentSnapshot, FakeNetwork, JobSummary};
use std::sync::Arc;

pub(crate) struct Harness {
    pub client: ProviderClient<FakeControlPlane, FakeClock>,
    pub network: FakeNetwork,
    pub control: FakeControlPlane,
    pub clock: FakeClock,
}

pub(crate) fn harness() -> Harness {
    let network = FakeNetwork::new();
    let control = FakeControlPlane::new();
    let clock = FakeClock::new();
    let credential =
        Credential::new("test-cred", None, Some(Secret::new("api-key"))).unwrap();
    let client = ProviderClient::new(
        credential,
        Arc::new(network.clone()),
        control.clone(),
        clock.clone(),
        ProviderConfig::fast(),
        &ProviderEndpoints {
            api_base: "https://api.test".into(),
            ingress_domain: "ingress.test".into(),
        },
    )
    .unwrap();
    Harness { client, network, control, clock }
}

pub(crate) fn snapshot(id: &str, status: DeploymentStatus) -> DeploymentSnapshot {
    DeploymentSnapshot {
        id: DeploymentId::new(id),
        status,
        endpoints: Vec::new(),
        error_message: None,
    }
}

pub(crate) fn running_snapshot(id: &str, url: &str) -> DeploymentSnapshot {
    DeploymentSnapshot {
        id: DeploymentId::new(id),
        status: DeploymentStatus::Running,
        endpoints: vec![Endpoint { url: url.to_string() }],
        error_message: None,
    }
}

pub(crate) fn running_job(address: &str, node: Option<&str>) -> JobSummary {
    JobSummary {
        address: JobAddress::new(address),
        state: JobState::Running,
        node_address: node.map(str::to_string),
    }
}

/// Insert a launched deployment record directly, bypassing the launch flow.
pub(crate) fn insert_watched(harness: &Harness, id: &str, definition_held: bool) {
    let now = harness.clock.epoch_ms();
    let dep = if definition_held {
        WatchedDeployment::launched(
            DeploymentId::new(id),
            serde_json::json!({ "image": "x" }),
            "M1",
            false,
            ResourceSpec::default(),
            now,
        )
    } else {
        WatchedDeployment::recovered(DeploymentId::new(id), now)
    };
    harness
        .client
        .inner()
        .watched
        .lock()
        .insert(DeploymentId::new(id), dep);
}
