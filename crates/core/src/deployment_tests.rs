// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    draft = { DeploymentStatus::Draft, false },
    starting = { DeploymentStatus::Starting, false },
    running = { DeploymentStatus::Running, false },
    stopping = { DeploymentStatus::Stopping, false },
    stopped = { DeploymentStatus::Stopped, true },
    error = { DeploymentStatus::Error, true },
    insufficient_funds = { DeploymentStatus::InsufficientFunds, true },
    archived = { DeploymentStatus::Archived, true },
)]
fn deployment_terminality(status: DeploymentStatus, terminal: bool) {
    assert_eq!(status.is_terminal(), terminal);
}

#[parameterized(
    queued = { JobState::Queued, false },
    running = { JobState::Running, false },
    completed = { JobState::Completed, true },
    stopped = { JobState::Stopped, true },
    cancelled = { JobState::Cancelled, true },
)]
fn job_terminality(state: JobState, terminal: bool) {
    assert_eq!(state.is_terminal(), terminal);
}

#[test]
fn status_parse_round_trips() {
    for status in [
        DeploymentStatus::Draft,
        DeploymentStatus::Starting,
        DeploymentStatus::Running,
        DeploymentStatus::Stopping,
        DeploymentStatus::Stopped,
        DeploymentStatus::Error,
        DeploymentStatus::InsufficientFunds,
        DeploymentStatus::Archived,
    ] {
        assert_eq!(DeploymentStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(DeploymentStatus::parse("SOMETHING_NEW"), None);
}

#[test]
fn strategy_serde_uses_network_spelling() {
    let json = serde_json::to_string(&LaunchStrategy::SimpleExtend).unwrap();
    assert_eq!(json, "\"SIMPLE-EXTEND\"");
    let back: LaunchStrategy = serde_json::from_str(&json).unwrap();
    assert_eq!(back, LaunchStrategy::SimpleExtend);
}

#[test]
fn launched_deployment_can_redeploy() {
    let dep = WatchedDeployment::launched(
        DeploymentId::new("d1"),
        serde_json::json!({"image": "x"}),
        "M1",
        true,
        ResourceSpec::default(),
        1_000,
    );
    assert!(dep.can_redeploy());
    assert_eq!(dep.start_time_ms, 1_000);
    assert_eq!(dep.last_extend_ms, 1_000);
    assert!(!dep.user_stopped);
}

#[test]
fn recovered_deployment_cannot_redeploy() {
    let dep = WatchedDeployment::recovered(DeploymentId::new("d1"), 2_000);
    assert!(dep.job_definition.is_none());
    assert!(!dep.can_redeploy());
}
