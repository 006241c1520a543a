// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Watchdog loop and termination-policy tests, driven tick by tick against
//! scripted fakes and a fake clock.

use super::*;
use crate::test_helpers::{harness, insert_watched, running_snapshot, snapshot};
use depin_core::{DeploymentStatus, HeartbeatState, JobAddress};
use yare::parameterized;

const MIN_RUNTIME_MS: u64 = 20 * 60 * 1000;

// ── Pure decision matrix ──────────────────────────────────────────────

#[parameterized(
    user_stopped_wins = { true, 25 * 60_000, true, TerminationDecision::UserStopped },
    user_stopped_even_when_young = { true, 1_000, true, TerminationDecision::UserStopped },
    too_young_to_redeploy = { false, 5 * 60_000, true, TerminationDecision::EarlyFailure },
    one_ms_under_threshold = { false, MIN_RUNTIME_MS - 1, true, TerminationDecision::EarlyFailure },
    exactly_at_threshold = { false, MIN_RUNTIME_MS, true, TerminationDecision::Relaunch },
    old_with_definition = { false, 25 * 60_000, true, TerminationDecision::Relaunch },
    old_without_definition = { false, 25 * 60_000, false, TerminationDecision::NoDefinition },
    young_without_definition = { false, 1_000, false, TerminationDecision::EarlyFailure },
)]
fn termination_matrix(
    user_stopped: bool,
    runtime_ms: u64,
    can_redeploy: bool,
    expected: TerminationDecision,
) {
    assert_eq!(
        termination_decision(user_stopped, runtime_ms, MIN_RUNTIME_MS, can_redeploy),
        expected
    );
}

#[parameterized(
    well_inside_window = { 4 * 60_000, true },
    exactly_at_threshold = { 5 * 60_000, true },
    just_above_threshold = { 5 * 60_000 + 1, false },
    already_lapsed = { 0, false },
    negative_remaining = { -60_000, false },
)]
fn extend_window(until_timeout_ms: i64, expected: bool) {
    assert_eq!(extend_due(until_timeout_ms, 5 * 60_000), expected);
}

// ── Tick behavior ─────────────────────────────────────────────────────

#[tokio::test]
async fn running_deployment_heartbeats_on_cadence() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;

    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Continue);
    let beats = h.control.heartbeats();
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].state, HeartbeatState::Ready);
    assert_eq!(beats[0].health_score, 100);
    assert_eq!(beats[0].expose_url.as_deref(), Some("https://svc"));

    // Within the 30-second window nothing new goes out.
    tick(&inner, &id, &mut last_status).await;
    assert_eq!(h.control.heartbeats().len(), 1);

    h.clock.advance_secs(30);
    tick(&inner, &id, &mut last_status).await;
    assert_eq!(h.control.heartbeats().len(), 2);
}

#[tokio::test]
async fn heartbeat_failure_does_not_kill_the_loop() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.control.fail_heartbeats(true);

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Continue);

    // The timestamp was not advanced, so the next tick retries.
    h.control.fail_heartbeats(false);
    tick(&inner, &id, &mut last_status).await;
    assert_eq!(h.control.heartbeats().len(), 1);
}

#[tokio::test]
async fn poll_error_continues_the_loop() {
    let h = harness();
    insert_watched(&h, "D1", true);
    // No snapshot scripted: get_deployment errors.

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Continue);
    assert!(h.client.watched(&id).is_some());
}

#[tokio::test]
async fn status_change_is_audited() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Starting));
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    tick(&inner, &id, &mut last_status).await;
    tick(&inner, &id, &mut last_status).await;

    let audits = h.control.audits();
    let change = audits
        .iter()
        .find(|a| a.action == depin_core::AuditAction::DeploymentStatusChanged)
        .expect("status change audit");
    assert_eq!(change.details["old"], "STARTING");
    assert_eq!(change.details["new"], "RUNNING");
}

#[tokio::test]
async fn auto_extend_fires_inside_threshold_window() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));

    // 26 minutes since launch: 4 minutes of timeout left.
    h.clock.advance_secs(26 * 60);

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    tick(&inner, &id, &mut last_status).await;

    let calls = h.network.calls();
    assert!(calls.iter().any(|c| matches!(
        c,
        depin_gateway::NetworkCall::UpdateTimeout { minutes: 60, .. }
    )));
    let dep = h.client.watched(&id).unwrap();
    assert_eq!(dep.last_extend_ms, h.clock.epoch_ms());
    assert!(h
        .control
        .audits()
        .iter()
        .any(|a| a.action == depin_core::AuditAction::JobAutoExtended));

    // Freshly extended: the next tick does not extend again.
    tick(&inner, &id, &mut last_status).await;
    let extend_calls = h
        .network
        .calls()
        .iter()
        .filter(|c| matches!(c, depin_gateway::NetworkCall::UpdateTimeout { .. }))
        .count();
    assert_eq!(extend_calls, 1);
}

#[tokio::test]
async fn extend_falls_back_to_per_job_extend_when_unsupported() {
    let h = harness();
    insert_watched(&h, "D1", true);
    let id = depin_core::DeploymentId::new("D1");
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.network.set_jobs(&id, vec![crate::test_helpers::running_job("J1", None)]);
    h.network.push_update_timeout(Err(depin_gateway::GatewayError::Unsupported));

    h.clock.advance_secs(26 * 60);

    let inner = h.client.inner().clone();
    let mut last_status = None;
    tick(&inner, &id, &mut last_status).await;

    assert!(h.network.calls().iter().any(|c| matches!(
        c,
        depin_gateway::NetworkCall::ExtendJob { seconds: 1800, .. }
    )));
    assert!(h
        .control
        .audits()
        .iter()
        .any(|a| a.action == depin_core::AuditAction::JobAutoExtended));
}

#[tokio::test]
async fn failed_extend_is_audited_and_loop_continues() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.network.push_update_timeout(Err(depin_gateway::GatewayError::Remote {
        status: 500,
        body: "boom".into(),
    }));

    h.clock.advance_secs(26 * 60);

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Continue);
    assert!(h
        .control
        .audits()
        .iter()
        .any(|a| a.action == depin_core::AuditAction::JobAutoExtendFailed));
}

#[tokio::test]
async fn job_rotation_replaces_cached_addresses() {
    let h = harness();
    insert_watched(&h, "D1", true);
    let id = depin_core::DeploymentId::new("D1");
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.network.set_jobs(&id, vec![crate::test_helpers::running_job("J2", None)]);

    let inner = h.client.inner().clone();
    let mut last_status = None;
    tick(&inner, &id, &mut last_status).await;

    assert_eq!(h.client.watched(&id).unwrap().job_addresses, vec![JobAddress::from("J2")]);
}

// ── Termination policy ────────────────────────────────────────────────

#[tokio::test]
async fn early_failure_sends_failed_then_terminated_and_never_relaunches() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.clock.advance_secs(5 * 60); // well under the redeploy threshold
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Stopped));

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Exited);

    let beats = h.control.heartbeats();
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].state, HeartbeatState::Failed);
    assert_eq!(beats[1].state, HeartbeatState::Terminated);
    assert_eq!(beats[1].gpu_allocated, 0);

    assert!(!h
        .network
        .calls()
        .iter()
        .any(|c| matches!(c, depin_gateway::NetworkCall::Create { .. })));
    assert!(h.client.watched(&id).is_none());
}

#[tokio::test]
async fn mature_failure_relaunches_and_links_the_successor() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.clock.advance_secs(25 * 60);
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Error));

    // Script the successor launch.
    let d2 = depin_core::DeploymentId::new("D2");
    h.network.push_create(Ok(d2.clone()));
    h.network.push_start(Ok(DeploymentStatus::Starting));
    h.network.push_snapshot(running_snapshot("D2", "https://svc2"));
    h.network.set_jobs(&d2, vec![crate::test_helpers::running_job("J2", None)]);

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Exited);

    let beats = h.control.heartbeats();
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].state, HeartbeatState::Provisioning);
    assert_eq!(beats[0].provider_instance_id, "D2");
    assert_eq!(beats[0].old_provider_instance_id.as_ref().unwrap(), &id);
    assert_eq!(beats[0].health_score, 50);
    // The terminated heartbeat for the old instance comes after the
    // successor's provisioning heartbeat, and is the old id's last event.
    assert_eq!(beats[1].state, HeartbeatState::Terminated);
    assert_eq!(beats[1].provider_instance_id, "D1");

    assert!(h.client.watched(&id).is_none());
    let successor = h.client.watched(&d2).expect("successor watched");
    assert!(successor.can_redeploy());
    assert!(h
        .control
        .audits()
        .iter()
        .any(|a| a.action == depin_core::AuditAction::WatchdogTerminated));
}

#[tokio::test]
async fn relaunch_failure_degrades_to_failed_heartbeat() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.clock.advance_secs(25 * 60);
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Error));
    h.network.push_create(Err(depin_gateway::GatewayError::Remote {
        status: 500,
        body: "market full".into(),
    }));

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Exited);

    let beats = h.control.heartbeats();
    assert_eq!(beats.len(), 2);
    assert_eq!(beats[0].state, HeartbeatState::Failed);
    assert_eq!(beats[1].state, HeartbeatState::Terminated);
}

#[tokio::test]
async fn user_stop_suppresses_relaunch() {
    let h = harness();
    insert_watched(&h, "D1", true);
    h.clock.advance_secs(25 * 60); // old enough to redeploy, but user said stop
    let id = depin_core::DeploymentId::new("D1");
    assert!(h.client.mark_user_stopped(&id));
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Stopped));

    let inner = h.client.inner().clone();
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Exited);

    let beats = h.control.heartbeats();
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].state, HeartbeatState::Terminated);
    assert!(!h
        .network
        .calls()
        .iter()
        .any(|c| matches!(c, depin_gateway::NetworkCall::Create { .. })));
}

#[tokio::test]
async fn recovered_deployment_terminates_without_relaunch() {
    let h = harness();
    insert_watched(&h, "D1", false); // recovered: no definition
    h.clock.advance_secs(25 * 60);
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Stopped));

    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Exited);

    let beats = h.control.heartbeats();
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].state, HeartbeatState::Terminated);
    assert!(h.client.watched(&id).is_none());
}

#[tokio::test]
async fn vanished_entry_exits_without_heartbeats() {
    let h = harness();
    let inner = h.client.inner().clone();
    let id = depin_core::DeploymentId::new("D1");
    let mut last_status = None;
    assert_eq!(tick(&inner, &id, &mut last_status).await, TickOutcome::Exited);
    assert!(h.control.heartbeats().is_empty());
}
