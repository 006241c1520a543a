// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Audit events recorded against the orchestrator's audit log.

use crate::id::DeploymentId;
use serde::Serialize;

/// Actions the sidecar records. Wire spelling is SCREAMING_SNAKE_CASE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    DeploymentLaunched,
    WatchdogStarted,
    DeploymentStatusChanged,
    JobAutoExtended,
    JobAutoExtendFailed,
    WatchdogTerminated,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::DeploymentLaunched => "DEPLOYMENT_LAUNCHED",
            AuditAction::WatchdogStarted => "WATCHDOG_STARTED",
            AuditAction::DeploymentStatusChanged => "DEPLOYMENT_STATUS_CHANGED",
            AuditAction::JobAutoExtended => "JOB_AUTO_EXTENDED",
            AuditAction::JobAutoExtendFailed => "JOB_AUTO_EXTEND_FAILED",
            AuditAction::WatchdogTerminated => "WATCHDOG_TERMINATED",
        }
    }
}

impl Serialize for AuditAction {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

/// One audit record. The resource is always a deployment.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub action: AuditAction,
    pub resource_type: &'static str,
    pub resource_id: DeploymentId,
    pub details: serde_json::Value,
    pub status: AuditStatus,
}

impl AuditEvent {
    pub fn success(
        action: AuditAction,
        resource_id: &DeploymentId,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            resource_type: "deployment",
            resource_id: resource_id.clone(),
            details,
            status: AuditStatus::Success,
        }
    }

    pub fn failure(
        action: AuditAction,
        resource_id: &DeploymentId,
        details: serde_json::Value,
    ) -> Self {
        Self {
            action,
            resource_type: "deployment",
            resource_id: resource_id.clone(),
            details,
            status: AuditStatus::Failure,
        }
    }
}
