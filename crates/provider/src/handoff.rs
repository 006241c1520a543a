// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Confidential job-definition handoff.
//!
//! A confidential deployment publishes only a placeholder; once a node
//! claims the job, this detached task posts the real definition directly to
//! that node, then records any service URL the definition exposes. All
//! failure paths are logged — nothing here can fail the launch that spawned
//! it.

use crate::client::ClientInner;
use depin_core::{Clock, ControlPlane, DeploymentId, JobAddress, JobState};
use serde_json::Value;
use std::sync::Weak;
use tracing::{info, warn};

pub(crate) async fn run<P: ControlPlane, C: Clock>(
    client: Weak<ClientInner<P, C>>,
    deployment_id: DeploymentId,
    job: JobAddress,
    definition: Value,
) {
    let started = {
        let Some(client) = client.upgrade() else { return };
        client.clock.epoch_ms()
    };

    // Wait for the job to be claimed and running; the node address comes
    // from the claim.
    let node_address = loop {
        let Some(client) = client.upgrade() else { return };
        match client.network.get_job(&job).await {
            Ok(detail) => match (detail.state, detail.node_address) {
                (JobState::Running, Some(node)) => break node,
                (state, _) if state.is_terminal() => {
                    warn!(job = %job, state = %state, "job ended before confidential handoff");
                    return;
                }
                _ => {}
            },
            Err(e) => warn!(job = %job, error = %e, "handoff job poll failed"),
        }
        if client.clock.since_ms(started) >= client.config.handoff_horizon_ms {
            warn!(job = %job, "confidential handoff timed out waiting for the job to run");
            return;
        }
        let interval = client.config.handoff_poll_interval;
        drop(client);
        tokio::time::sleep(interval).await;
    };

    let Some(client) = client.upgrade() else { return };
    match client.node.post_job_definition(&node_address, &job, &definition, &client.signer).await
    {
        Ok(response) => {
            info!(job = %job, node = %node_address, "confidential job definition delivered");
            let url = response
                .get("url")
                .or_else(|| response.get("serviceUrl"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| exposed_service_url(&definition, &node_address, &client.node));
            if let Some(url) = url {
                let mut watched = client.watched.lock();
                if let Some(dep) = watched.get_mut(&deployment_id) {
                    dep.service_url = Some(url);
                }
            }
        }
        Err(e) => {
            warn!(job = %job, node = %node_address, error = %e, "confidential handoff failed");
        }
    }
}

/// If the definition exposes a service, the node serves it under its
/// ingress hostname.
fn exposed_service_url(
    definition: &Value,
    node_address: &str,
    node: &depin_gateway::NodeClient,
) -> Option<String> {
    let ops = definition.get("ops").and_then(Value::as_array)?;
    let exposes = ops.iter().any(|op| {
        op.pointer("/args/expose").map(|v| !v.is_null()).unwrap_or(false)
    });
    if exposes {
        // The WSS url is the node's ingress root; the exposed service rides
        // the https scheme on the same host.
        Some(node.ws_url(node_address).replacen("wss://", "https://", 1))
    } else {
        None
    }
}

#[cfg(test)]
#[path = "handoff_tests.rs"]
mod tests;
