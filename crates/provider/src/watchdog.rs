// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The per-deployment watchdog loop.
//!
//! One task per watched deployment: poll Network state, heartbeat the
//! orchestrator while running, extend the timeout before it lapses, and
//! apply the termination policy exactly once when a terminal status
//! appears. Errors inside an iteration are logged and the loop continues;
//! the only exits are the termination policy and the owning client being
//! dropped.

use crate::client::ClientInner;
use depin_core::{
    AuditAction, AuditEvent, Clock, ControlPlane, DeploymentId, DeploymentStatus, HeartbeatEvent,
    JobState, WatchedDeployment,
};
use depin_gateway::GatewayError;
use serde_json::json;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

/// What one iteration decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TickOutcome {
    Continue,
    Exited,
}

/// Outcome of the termination decision matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TerminationDecision {
    /// Stopped on user request; no re-launch.
    UserStopped,
    /// Died too young; re-launching would loop on a broken definition.
    EarlyFailure,
    /// Definition and market are held; launch a successor.
    Relaunch,
    /// Recovered deployment with no definition; nothing to re-launch.
    NoDefinition,
}

/// Pure decision matrix, applied once per watchdog lifetime.
pub(crate) fn termination_decision(
    user_stopped: bool,
    runtime_ms: u64,
    min_runtime_ms: u64,
    can_redeploy: bool,
) -> TerminationDecision {
    if user_stopped {
        TerminationDecision::UserStopped
    } else if runtime_ms < min_runtime_ms {
        TerminationDecision::EarlyFailure
    } else if can_redeploy {
        TerminationDecision::Relaunch
    } else {
        TerminationDecision::NoDefinition
    }
}

/// Whether the extend path should fire: the remaining timeout has entered
/// the threshold window but has not already lapsed.
pub(crate) fn extend_due(time_until_timeout_ms: i64, threshold_ms: u64) -> bool {
    time_until_timeout_ms > 0 && time_until_timeout_ms <= threshold_ms as i64
}

/// Watchdog entry point, spawned per deployment.
pub(crate) async fn run<P: ControlPlane, C: Clock>(
    client: Weak<ClientInner<P, C>>,
    id: DeploymentId,
) {
    let interval = {
        let Some(client) = client.upgrade() else { return };
        client
            .emit_audit(AuditEvent::success(AuditAction::WatchdogStarted, &id, json!({})))
            .await;
        info!(deployment_id = %id, "watchdog started");
        client.config.watchdog_interval
    };

    let mut last_status: Option<DeploymentStatus> = None;
    loop {
        tokio::time::sleep(interval).await;
        let Some(client) = client.upgrade() else { return };
        match tick(&client, &id, &mut last_status).await {
            TickOutcome::Continue => {}
            TickOutcome::Exited => return,
        }
    }
}

/// One watchdog iteration. Split from [`run`] so tests can drive
/// iterations directly against a fake clock.
pub(crate) async fn tick<P: ControlPlane, C: Clock>(
    client: &Arc<ClientInner<P, C>>,
    id: &DeploymentId,
    last_status: &mut Option<DeploymentStatus>,
) -> TickOutcome {
    // The entry can vanish underneath us (stop + manual cleanup); that ends
    // the watchdog without a termination sequence.
    if !client.watched.lock().contains_key(id.as_str()) {
        warn!(deployment_id = %id, "watched entry disappeared, watchdog exiting");
        return TickOutcome::Exited;
    }

    let snapshot = match client.network.get_deployment(id).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            warn!(deployment_id = %id, error = %e, "watchdog poll failed");
            return TickOutcome::Continue;
        }
    };

    if *last_status != Some(snapshot.status) {
        if let Some(old) = *last_status {
            client
                .emit_audit(AuditEvent::success(
                    AuditAction::DeploymentStatusChanged,
                    id,
                    json!({ "old": old.as_str(), "new": snapshot.status.as_str() }),
                ))
                .await;
        }
        *last_status = Some(snapshot.status);
    }

    // Refresh the cached service URL whenever endpoints are present.
    if let Some(url) = snapshot.service_url() {
        let mut watched = client.watched.lock();
        if let Some(dep) = watched.get_mut(id) {
            if dep.service_url.as_deref() != Some(url) {
                dep.service_url = Some(url.to_string());
            }
        }
    }

    if snapshot.status.is_terminal() {
        terminate(client, id, snapshot.status).await;
        return TickOutcome::Exited;
    }

    // Job rotation under SIMPLE-EXTEND: keep the cached addresses current.
    match client.network.list_jobs(id, Some(JobState::Running)).await {
        Ok(jobs) if !jobs.is_empty() => {
            let addresses: Vec<_> = jobs.into_iter().map(|j| j.address).collect();
            let mut watched = client.watched.lock();
            if let Some(dep) = watched.get_mut(id) {
                if dep.job_addresses != addresses {
                    info!(deployment_id = %id, jobs = addresses.len(), "job addresses rotated");
                    dep.job_addresses = addresses;
                }
            }
        }
        Ok(_) => {}
        Err(e) => warn!(deployment_id = %id, error = %e, "running-jobs listing failed"),
    }

    if snapshot.status == DeploymentStatus::Running {
        let Some(dep) = client.watched.lock().get(id.as_str()).cloned() else {
            return TickOutcome::Exited;
        };
        let now = client.clock.epoch_ms();

        if now.saturating_sub(dep.last_heartbeat_ms) >= client.config.heartbeat_interval_ms {
            let event =
                HeartbeatEvent::ready(id, dep.resources, dep.service_url.clone());
            match client.control.heartbeat(&event).await {
                Ok(()) => {
                    let mut watched = client.watched.lock();
                    if let Some(dep) = watched.get_mut(id) {
                        dep.last_heartbeat_ms = now;
                    }
                }
                Err(e) => warn!(deployment_id = %id, error = %e, "heartbeat send failed"),
            }
        }

        let until_timeout =
            client.config.job_timeout_ms as i64 - client.clock.since_ms(dep.last_extend_ms) as i64;
        if extend_due(until_timeout, client.config.extend_threshold_ms) {
            extend(client, id, &dep).await;
        }
    }

    TickOutcome::Continue
}

/// Push the timeout out: deployment-level update first, per-job extend when
/// the Network doesn't support it for this mode.
async fn extend<P: ControlPlane, C: Clock>(
    client: &Arc<ClientInner<P, C>>,
    id: &DeploymentId,
    dep: &WatchedDeployment,
) {
    let minutes = client.config.extend_timeout_minutes;
    let result = match client.network.update_timeout(id, minutes).await {
        Err(GatewayError::Unsupported) => match dep.primary_job() {
            Some(job) => client
                .network
                .extend_job(job, client.config.extend_duration_secs)
                .await
                .map(|()| client.config.extend_duration_secs / 60),
            None => Err(GatewayError::Unsupported),
        },
        other => other,
    };
    match result {
        Ok(applied) => {
            let now = client.clock.epoch_ms();
            {
                let mut watched = client.watched.lock();
                if let Some(dep) = watched.get_mut(id) {
                    dep.last_extend_ms = now;
                }
            }
            info!(deployment_id = %id, minutes = applied, "deployment timeout extended");
            client
                .emit_audit(AuditEvent::success(
                    AuditAction::JobAutoExtended,
                    id,
                    json!({ "minutes": applied }),
                ))
                .await;
        }
        Err(e) => {
            warn!(deployment_id = %id, error = %e, "auto-extend failed");
            client
                .emit_audit(AuditEvent::failure(
                    AuditAction::JobAutoExtendFailed,
                    id,
                    json!({ "error": e.to_string() }),
                ))
                .await;
        }
    }
}

/// Apply the termination policy and close out this watchdog.
async fn terminate<P: ControlPlane, C: Clock>(
    client: &Arc<ClientInner<P, C>>,
    id: &DeploymentId,
    final_status: DeploymentStatus,
) {
    // Re-read the entry so a user-stop mark set after this iteration's
    // earlier snapshot is still honored.
    let Some(dep) = client.watched.lock().get(id.as_str()).cloned() else {
        return;
    };
    let runtime_ms = client.clock.since_ms(dep.start_time_ms);
    let decision = termination_decision(
        dep.user_stopped,
        runtime_ms,
        client.config.min_runtime_for_redeploy_ms,
        dep.can_redeploy(),
    );

    info!(
        deployment_id = %id,
        status = final_status.as_str(),
        runtime_mins = runtime_ms / 60_000,
        decision = ?decision,
        "watchdog observed terminal status"
    );
    client
        .emit_audit(AuditEvent::success(
            AuditAction::WatchdogTerminated,
            id,
            json!({
                "finalStatus": final_status.as_str(),
                "runtimeMins": runtime_ms / 60_000,
                "userStopped": dep.user_stopped,
            }),
        ))
        .await;

    match decision {
        TerminationDecision::UserStopped | TerminationDecision::NoDefinition => {}
        TerminationDecision::EarlyFailure => {
            send_heartbeat(client, HeartbeatEvent::failed(id, dep.resources)).await;
        }
        TerminationDecision::Relaunch => {
            let definition = dep.job_definition.clone().unwrap_or_default();
            match client
                .launch(definition, &dep.market_address, dep.confidential, dep.resources)
                .await
            {
                Ok(outcome) => {
                    info!(
                        deployment_id = %id,
                        successor = %outcome.deployment_id,
                        "deployment re-launched"
                    );
                    // The successor's provisioning heartbeat goes out before
                    // this instance's terminated heartbeat; the
                    // old_provider_instance_id field links the two.
                    send_heartbeat(
                        client,
                        HeartbeatEvent::provisioning(&outcome.deployment_id, dep.resources, id),
                    )
                    .await;
                }
                Err(e) => {
                    warn!(deployment_id = %id, error = %e, "re-launch failed");
                    send_heartbeat(client, HeartbeatEvent::failed(id, dep.resources)).await;
                }
            }
        }
    }

    // Whatever the branch, the terminated heartbeat closes this instance's
    // record and is its final event.
    send_heartbeat(client, HeartbeatEvent::terminated(id)).await;
    client.watched.lock().remove(id.as_str());
    info!(deployment_id = %id, "watchdog exited");
}

async fn send_heartbeat<P: ControlPlane, C: Clock>(
    client: &Arc<ClientInner<P, C>>,
    event: HeartbeatEvent,
) {
    if let Err(e) = client.control.heartbeat(&event).await {
        warn!(
            instance = %event.provider_instance_id,
            error = %e,
            "heartbeat send failed"
        );
    }
}

#[cfg(test)]
#[path = "watchdog_tests.rs"]
mod tests;
