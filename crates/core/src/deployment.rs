// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Deployment and job state as observed from the Network, plus the
//! watched-deployment record each watchdog maintains.

use crate::id::{CredentialName, DeploymentId, JobAddress};
use serde::{Deserialize, Serialize};

/// Network-side deployment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeploymentStatus {
    Draft,
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
    InsufficientFunds,
    Archived,
}

impl DeploymentStatus {
    /// Terminal statuses end the watchdog; everything else keeps polling.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Stopped
                | DeploymentStatus::Error
                | DeploymentStatus::Archived
                | DeploymentStatus::InsufficientFunds
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::Draft => "DRAFT",
            DeploymentStatus::Starting => "STARTING",
            DeploymentStatus::Running => "RUNNING",
            DeploymentStatus::Stopping => "STOPPING",
            DeploymentStatus::Stopped => "STOPPED",
            DeploymentStatus::Error => "ERROR",
            DeploymentStatus::InsufficientFunds => "INSUFFICIENT_FUNDS",
            DeploymentStatus::Archived => "ARCHIVED",
        }
    }

    /// Parse the Network's status strings. Unknown strings map to `None`
    /// rather than an error so a Network-side addition doesn't kill a
    /// watchdog.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "DRAFT" => Some(DeploymentStatus::Draft),
            "STARTING" => Some(DeploymentStatus::Starting),
            "RUNNING" => Some(DeploymentStatus::Running),
            "STOPPING" => Some(DeploymentStatus::Stopping),
            "STOPPED" => Some(DeploymentStatus::Stopped),
            "ERROR" => Some(DeploymentStatus::Error),
            "INSUFFICIENT_FUNDS" => Some(DeploymentStatus::InsufficientFunds),
            "ARCHIVED" => Some(DeploymentStatus::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of one job execution on a compute node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Stopped,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Stopped | JobState::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "QUEUED",
            JobState::Running => "RUNNING",
            JobState::Completed => "COMPLETED",
            JobState::Stopped => "STOPPED",
            JobState::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "QUEUED" => Some(JobState::Queued),
            "RUNNING" => Some(JobState::Running),
            "COMPLETED" => Some(JobState::Completed),
            "STOPPED" => Some(JobState::Stopped),
            "CANCELLED" => Some(JobState::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Job rotation strategy of a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LaunchStrategy {
    Simple,
    /// The Network rotates the underlying job before it times out. This is
    /// the launch default; the watchdog still runs its own extend path on
    /// top of it.
    #[default]
    SimpleExtend,
    Scheduled,
    Infinite,
}

impl LaunchStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchStrategy::Simple => "SIMPLE",
            LaunchStrategy::SimpleExtend => "SIMPLE-EXTEND",
            LaunchStrategy::Scheduled => "SCHEDULED",
            LaunchStrategy::Infinite => "INFINITE",
        }
    }
}

impl Serialize for LaunchStrategy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for LaunchStrategy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.as_str() {
            "SIMPLE" => Ok(LaunchStrategy::Simple),
            "SIMPLE-EXTEND" => Ok(LaunchStrategy::SimpleExtend),
            "SCHEDULED" => Ok(LaunchStrategy::Scheduled),
            "INFINITE" => Ok(LaunchStrategy::Infinite),
            other => Err(serde::de::Error::custom(format!("unknown strategy {other:?}"))),
        }
    }
}

/// Resources the orchestrator accounted to a deployment. Reported back in
/// every heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub gpu: u32,
    pub vcpu: u32,
    pub ram_gb: u32,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self { gpu: 1, vcpu: 4, ram_gb: 16 }
    }
}

impl ResourceSpec {
    /// Used in the final heartbeat of a terminated instance.
    pub fn zero() -> Self {
        Self { gpu: 0, vcpu: 0, ram_gb: 0 }
    }
}

/// An exposed service endpoint of a running deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub url: String,
}

/// Per-deployment record owned by exactly one watchdog.
///
/// Created on launch or recovery, mutated only by the owning client's tasks
/// under the client's watched-map lock, removed when the watchdog exits.
#[derive(Debug, Clone)]
pub struct WatchedDeployment {
    pub deployment_id: DeploymentId,
    /// Current job addresses, in Network order. Replaced wholesale when the
    /// running-jobs listing changes under SIMPLE-EXTEND rotation.
    pub job_addresses: Vec<JobAddress>,
    /// Epoch ms when the watchdog first saw this deployment.
    pub start_time_ms: u64,
    /// Epoch ms of the last successful timeout extension (or launch).
    pub last_extend_ms: u64,
    /// Epoch ms of the last heartbeat sent for this instance.
    pub last_heartbeat_ms: u64,
    /// Original job definition. `None` for recovered deployments, which
    /// disables re-launch.
    pub job_definition: Option<serde_json::Value>,
    pub market_address: String,
    pub confidential: bool,
    pub strategy: LaunchStrategy,
    pub resources: ResourceSpec,
    /// Set before an external stop so the watchdog's termination policy
    /// skips re-launch.
    pub user_stopped: bool,
    pub service_url: Option<String>,
    pub credential_name: Option<CredentialName>,
}

impl WatchedDeployment {
    /// A freshly launched deployment, extend clock starting now.
    pub fn launched(
        deployment_id: DeploymentId,
        job_definition: serde_json::Value,
        market_address: impl Into<String>,
        confidential: bool,
        resources: ResourceSpec,
        now_ms: u64,
    ) -> Self {
        Self {
            deployment_id,
            job_addresses: Vec::new(),
            start_time_ms: now_ms,
            last_extend_ms: now_ms,
            last_heartbeat_ms: 0,
            job_definition: Some(job_definition),
            market_address: market_address.into(),
            confidential,
            strategy: LaunchStrategy::SimpleExtend,
            resources,
            user_stopped: false,
            service_url: None,
            credential_name: None,
        }
    }

    /// A deployment re-attached after a sidecar restart. The definition is
    /// unrecoverable without durable storage, so re-launch is disabled.
    pub fn recovered(deployment_id: DeploymentId, now_ms: u64) -> Self {
        Self {
            deployment_id,
            job_addresses: Vec::new(),
            start_time_ms: now_ms,
            last_extend_ms: now_ms,
            last_heartbeat_ms: 0,
            job_definition: None,
            market_address: String::new(),
            confidential: false,
            strategy: LaunchStrategy::SimpleExtend,
            resources: ResourceSpec::default(),
            user_stopped: false,
            service_url: None,
            credential_name: None,
        }
    }

    /// Whether this deployment can be re-launched after a failure.
    pub fn can_redeploy(&self) -> bool {
        self.job_definition.is_some() && !self.market_address.is_empty()
    }

    /// First known job address, if any.
    pub fn primary_job(&self) -> Option<&JobAddress> {
        self.job_addresses.first()
    }
}

#[cfg(test)]
#[path = "deployment_tests.rs"]
mod tests;
