// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::test_helpers::{harness, running_job, running_snapshot, snapshot};
use depin_core::{AuditAction, DeploymentStatus, JobState};
use depin_gateway::NetworkCall;

#[tokio::test]
async fn launch_returns_deployment_job_and_service_url() {
    let h = harness();
    let d1 = DeploymentId::new("D1");
    h.network.push_create(Ok(d1.clone()));
    h.network.push_start(Ok(DeploymentStatus::Starting));
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.network.set_jobs(&d1, vec![running_job("J1", Some("N1"))]);

    let outcome = h
        .client
        .launch(json!({ "image": "x" }), "M1", false, ResourceSpec::default())
        .await
        .unwrap();

    assert_eq!(outcome.deployment_id, "D1");
    assert_eq!(outcome.job_address.as_ref().unwrap(), &JobAddress::new("J1"));
    assert_eq!(outcome.service_url.as_deref(), Some("https://svc"));

    // One watchdog is now attached and the deployment is watched with its
    // definition held.
    let dep = h.client.watched(&d1).expect("watched");
    assert!(dep.can_redeploy());
    assert_eq!(dep.job_addresses, vec![JobAddress::new("J1")]);
    assert!(!dep.user_stopped);
    assert!(h.client.task_count() >= 1);

    let audits = h.control.audits();
    let launched = audits
        .iter()
        .find(|a| a.action == AuditAction::DeploymentLaunched)
        .expect("launch audit");
    assert_eq!(launched.details["deploymentId"], "D1");
    assert_eq!(launched.details["jobAddress"], "J1");
    assert_eq!(launched.details["marketAddress"], "M1");
    assert_eq!(launched.details["confidential"], false);
    assert_eq!(launched.details["serviceUrl"], "https://svc");
}

#[tokio::test]
async fn launch_waits_through_starting_states() {
    let h = harness();
    let d1 = DeploymentId::new("D1");
    h.network.push_create(Ok(d1.clone()));
    h.network.push_start(Ok(DeploymentStatus::Starting));
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Draft));
    h.network.push_snapshot(snapshot("D1", DeploymentStatus::Starting));
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.network.set_jobs(&d1, vec![running_job("J1", None)]);

    let outcome = h
        .client
        .launch(json!({ "image": "x" }), "M1", false, ResourceSpec::default())
        .await
        .unwrap();
    assert_eq!(outcome.service_url.as_deref(), Some("https://svc"));

    let gets = h
        .network
        .calls()
        .iter()
        .filter(|c| matches!(c, NetworkCall::Get(_)))
        .count();
    assert_eq!(gets, 3);
}

#[tokio::test]
async fn launch_fails_on_terminal_status_and_watches_nothing() {
    let h = harness();
    let d1 = DeploymentId::new("D1");
    h.network.push_create(Ok(d1.clone()));
    h.network.push_start(Ok(DeploymentStatus::Starting));
    let mut dead = snapshot("D1", DeploymentStatus::InsufficientFunds);
    dead.error_message = Some("top up your account".into());
    h.network.push_snapshot(dead);

    let err = h
        .client
        .launch(json!({ "image": "x" }), "M1", false, ResourceSpec::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProviderError::LaunchTerminal { status: DeploymentStatus::InsufficientFunds, .. }
    ));
    assert!(h.client.watched_ids().is_empty());
    assert_eq!(h.client.task_count(), 0);
    assert!(h.control.heartbeats().is_empty());
}

#[tokio::test]
async fn confidential_launch_publishes_a_placeholder() {
    let h = harness();
    let d1 = DeploymentId::new("D1");
    h.network.push_create(Ok(d1.clone()));
    h.network.push_start(Ok(DeploymentStatus::Starting));
    h.network.push_snapshot(running_snapshot("D1", "https://svc"));
    h.network.set_jobs(&d1, vec![running_job("J1", Some("N1"))]);

    let secret_definition = json!({ "image": "secret/model", "env": { "KEY": "v" } });
    h.client
        .launch(secret_definition.clone(), "M1", true, ResourceSpec::default())
        .await
        .unwrap();

    assert!(h
        .network
        .calls()
        .iter()
        .any(|c| matches!(c, NetworkCall::Create { confidential: true, .. })));
    // The real definition is held for the watchdog/handoff, not published.
    assert_eq!(h.client.watched(&d1).unwrap().job_definition, Some(secret_definition));
}

#[tokio::test]
async fn stop_by_deployment_id_marks_before_stopping() {
    let h = harness();
    crate::test_helpers::insert_watched(&h, "D1", true);

    let outcome = h.client.stop("D1").await.unwrap();
    assert_eq!(outcome.deployment_id.as_ref().unwrap(), &DeploymentId::new("D1"));

    let dep = h.client.watched(&DeploymentId::new("D1")).unwrap();
    assert!(dep.user_stopped);
    assert!(h
        .network
        .calls()
        .iter()
        .any(|c| matches!(c, NetworkCall::Stop(id) if id == &DeploymentId::new("D1"))));

    // Stopping twice is indistinguishable from stopping once.
    let again = h.client.stop("D1").await.unwrap();
    assert_eq!(again.deployment_id.as_ref().unwrap(), &DeploymentId::new("D1"));
    assert!(h.client.watched(&DeploymentId::new("D1")).unwrap().user_stopped);
}

#[tokio::test]
async fn stop_resolves_job_addresses_to_their_deployment() {
    let h = harness();
    crate::test_helpers::insert_watched(&h, "D1", true);
    {
        let inner = h.client.inner();
        let mut watched = inner.watched.lock();
        watched.get_mut("D1").unwrap().job_addresses = vec![JobAddress::new("J1")];
    }

    let outcome = h.client.stop("J1").await.unwrap();
    assert_eq!(outcome.deployment_id.as_ref().unwrap(), &DeploymentId::new("D1"));
    assert!(h.client.watched(&DeploymentId::new("D1")).unwrap().user_stopped);
}

#[tokio::test]
async fn stop_of_unwatched_target_stops_the_bare_job() {
    let h = harness();
    let outcome = h.client.stop("J9").await.unwrap();
    assert!(outcome.deployment_id.is_none());
    assert_eq!(outcome.job_address.as_ref().unwrap(), &JobAddress::new("J9"));
    assert!(h
        .network
        .calls()
        .iter()
        .any(|c| matches!(c, NetworkCall::StopJob(j) if j == &JobAddress::new("J9"))));
}

#[tokio::test]
async fn mark_user_stopped_is_idempotent() {
    let h = harness();
    crate::test_helpers::insert_watched(&h, "D1", true);
    let id = DeploymentId::new("D1");
    assert!(h.client.mark_user_stopped(&id));
    let first = h.client.watched(&id).unwrap();
    assert!(h.client.mark_user_stopped(&id));
    let second = h.client.watched(&id).unwrap();
    assert_eq!(first.user_stopped, second.user_stopped);
    assert!(!h.client.mark_user_stopped(&DeploymentId::new("missing")));
}

#[tokio::test]
async fn recover_attaches_watch_only_deployments() {
    let h = harness();
    h.network.set_owned(vec![
        running_snapshot("D1", "https://svc"),
        snapshot("D2", DeploymentStatus::Starting),
        snapshot("D3", DeploymentStatus::Stopped), // terminal: not recovered
    ]);

    let added = h.client.recover().await.unwrap();
    assert_eq!(added, 2);

    let d1 = h.client.watched(&DeploymentId::new("D1")).unwrap();
    assert!(d1.job_definition.is_none(), "recovered deployments hold no definition");
    assert!(!d1.can_redeploy());
    assert_eq!(d1.service_url.as_deref(), Some("https://svc"));

    // A second recovery pass finds everything already watched.
    let added_again = h.client.recover().await.unwrap();
    assert_eq!(added_again, 0);
    assert_eq!(h.client.watched_ids().len(), 2);
}

#[tokio::test]
async fn job_logs_distinguish_terminal_from_running() {
    let h = harness();
    let job = JobAddress::new("J1");
    h.network.push_job_detail(depin_gateway::JobDetail {
        address: job.clone(),
        state: JobState::Running,
        node_address: None,
        result: None,
    });
    assert!(matches!(
        h.client.job_logs(&job).await.unwrap(),
        LogsOutcome::Pending { state: JobState::Running }
    ));

    let done = JobAddress::new("J2");
    h.network.push_job_detail(depin_gateway::JobDetail {
        address: done.clone(),
        state: JobState::Completed,
        node_address: None,
        result: None,
    });
    h.network.set_job_logs(&done, json!({ "opStates": [{ "logs": ["bye"] }] }));
    match h.client.job_logs(&done).await.unwrap() {
        LogsOutcome::Completed(result) => {
            assert_eq!(result["opStates"][0]["logs"][0], "bye");
        }
        other => panic!("expected completed logs, got {other:?}"),
    }
}

#[tokio::test]
async fn mark_all_flags_every_watched_deployment() {
    let h = harness();
    crate::test_helpers::insert_watched(&h, "D1", true);
    crate::test_helpers::insert_watched(&h, "D2", false);

    let ids = h.client.mark_all_user_stopped();
    assert_eq!(ids, vec![DeploymentId::new("D1"), DeploymentId::new("D2")]);
    for id in &ids {
        assert!(h.client.watched(id).unwrap().user_stopped);
    }
}
