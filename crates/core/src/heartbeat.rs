// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Heartbeat events sent to the orchestrator's inventory endpoint.

use crate::deployment::ResourceSpec;
use crate::id::DeploymentId;
use serde::Serialize;

/// Provider tag carried by every heartbeat from this sidecar.
pub const NOSANA_PROVIDER: &str = "nosana";

/// Lifecycle state reported for one provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HeartbeatState {
    Provisioning,
    Ready,
    Failed,
    Terminated,
}

/// One inventory heartbeat. Serialized verbatim to
/// `POST /inventory/heartbeat`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HeartbeatEvent {
    pub provider: &'static str,
    pub provider_instance_id: DeploymentId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deployment_id: Option<String>,
    pub gpu_allocated: u32,
    pub vcpu_allocated: u32,
    pub ram_gb_allocated: u32,
    /// 0–100.
    pub health_score: u8,
    pub state: HeartbeatState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expose_url: Option<String>,
    /// Set on the provisioning heartbeat of a re-launched deployment so the
    /// orchestrator can link the successor to the instance it replaces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_provider_instance_id: Option<DeploymentId>,
}

impl HeartbeatEvent {
    fn base(instance: &DeploymentId, resources: ResourceSpec, state: HeartbeatState) -> Self {
        Self {
            provider: NOSANA_PROVIDER,
            provider_instance_id: instance.clone(),
            deployment_id: None,
            gpu_allocated: resources.gpu,
            vcpu_allocated: resources.vcpu,
            ram_gb_allocated: resources.ram_gb,
            health_score: 0,
            state,
            expose_url: None,
            old_provider_instance_id: None,
        }
    }

    /// Periodic liveness heartbeat for a running instance.
    pub fn ready(
        instance: &DeploymentId,
        resources: ResourceSpec,
        expose_url: Option<String>,
    ) -> Self {
        let mut hb = Self::base(instance, resources, HeartbeatState::Ready);
        hb.health_score = 100;
        hb.expose_url = expose_url;
        hb
    }

    /// A replacement instance is coming up after its predecessor failed.
    pub fn provisioning(
        instance: &DeploymentId,
        resources: ResourceSpec,
        replaces: &DeploymentId,
    ) -> Self {
        let mut hb = Self::base(instance, resources, HeartbeatState::Provisioning);
        hb.health_score = 50;
        hb.old_provider_instance_id = Some(replaces.clone());
        hb
    }

    /// The instance failed and will not be replaced by this watchdog.
    pub fn failed(instance: &DeploymentId, resources: ResourceSpec) -> Self {
        Self::base(instance, resources, HeartbeatState::Failed)
    }

    /// Final heartbeat for an instance; closes its record. Resources are
    /// zeroed because nothing is allocated any more.
    pub fn terminated(instance: &DeploymentId) -> Self {
        Self::base(instance, ResourceSpec::zero(), HeartbeatState::Terminated)
    }
}

#[cfg(test)]
#[path = "heartbeat_tests.rs"]
mod tests;
