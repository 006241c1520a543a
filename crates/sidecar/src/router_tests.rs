// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler-level tests against fake-backed state; no live server.

use super::*;
use crate::registry::ClientRegistry;
use depin_core::{
    Credential, DeploymentStatus, Endpoint, FakeClock, FakeControlPlane, JobState, Secret,
};
use depin_gateway::{Balance, DeploymentSnapshot, FakeNetwork, JobDetail};
use depin_provider::{ProviderConfig, ProviderEndpoints};
use serde_json::json;

struct TestFixture {
    state: Arc<AppState<FakeControlPlane, FakeClock>>,
    network: FakeNetwork,
}

fn fixture_with_client() -> TestFixture {
    let registry = Arc::new(ClientRegistry::new());
    let network = FakeNetwork::new();
    let client = ProviderClient::new(
        Credential::new("a", None, Some(Secret::new("K1"))).unwrap(),
        Arc::new(network.clone()),
        FakeControlPlane::new(),
        FakeClock::new(),
        ProviderConfig::fast(),
        &ProviderEndpoints {
            api_base: "https://api.test".into(),
            ingress_domain: "ingress.test".into(),
        },
    )
    .unwrap();
    registry.insert(client);
    let state = Arc::new(AppState {
        registry,
        started: Instant::now(),
        config_source: "orchestrator",
    });
    TestFixture { state, network }
}

fn empty_state() -> Arc<AppState<FakeControlPlane, FakeClock>> {
    Arc::new(AppState {
        registry: Arc::new(ClientRegistry::new()),
        started: Instant::now(),
        config_source: "orchestrator",
    })
}

fn no_params() -> Query<HashMap<String, String>> {
    Query(HashMap::new())
}

#[tokio::test]
async fn health_reports_disabled_without_clients() {
    let Json(body) = health(State(empty_state())).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["modules"]["nosana"]["status"], "disabled");
    assert_eq!(body["config_source"], "orchestrator");
    assert!(body["modules"]["nosana"]["credentials"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn health_lists_credentials_and_default() {
    let f = fixture_with_client();
    let Json(body) = health(State(Arc::clone(&f.state))).await;
    assert_eq!(body["modules"]["nosana"]["status"], "active");
    assert_eq!(body["modules"]["nosana"]["credentials"][0], "a");
    assert_eq!(body["modules"]["nosana"]["default"], "a");
}

#[tokio::test]
async fn launch_validates_its_body() {
    let f = fixture_with_client();

    let err = launch(State(Arc::clone(&f.state)), Json(json!({ "marketAddress": "M1" })))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m.contains("jobDefinition")));

    let err = launch(
        State(Arc::clone(&f.state)),
        Json(json!({ "jobDefinition": { "image": "x" } })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m.contains("marketAddress")));

    let err = launch(
        State(Arc::clone(&f.state)),
        Json(json!({
            "jobDefinition": { "image": "x" },
            "marketAddress": "M1",
            "credentialName": 7,
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(m) if m.contains("credentialName")));
}

#[tokio::test]
async fn launch_resolves_credentials_or_503s() {
    let err = launch(
        State(empty_state()),
        Json(json!({ "jobDefinition": { "image": "x" }, "marketAddress": "M1" })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotInitialized(_)));

    let f = fixture_with_client();
    let err = launch(
        State(Arc::clone(&f.state)),
        Json(json!({
            "jobDefinition": { "image": "x" },
            "marketAddress": "M1",
            "credentialName": "other",
        })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::NotInitialized(m) if m.contains("other")));
}

#[tokio::test]
async fn launch_happy_path_shapes_the_response() {
    let f = fixture_with_client();
    let d1 = DeploymentId::new("D1");
    f.network.push_create(Ok(d1.clone()));
    f.network.push_start(Ok(DeploymentStatus::Starting));
    f.network.push_snapshot(DeploymentSnapshot {
        id: d1.clone(),
        status: DeploymentStatus::Running,
        endpoints: vec![Endpoint { url: "https://svc".into() }],
        error_message: None,
    });
    f.network.set_jobs(
        &d1,
        vec![depin_gateway::JobSummary {
            address: JobAddress::new("J1"),
            state: JobState::Running,
            node_address: None,
        }],
    );

    let Json(body) = launch(
        State(Arc::clone(&f.state)),
        Json(json!({
            "jobDefinition": { "image": "x" },
            "marketAddress": "M1",
            "isConfidential": false,
        })),
    )
    .await
    .unwrap();

    assert_eq!(body["deploymentId"], "D1");
    assert_eq!(body["jobAddress"], "J1");
    assert_eq!(body["serviceUrl"], "https://svc");
    assert_eq!(body["status"], "success");
}

#[tokio::test]
async fn stop_requires_a_target() {
    let f = fixture_with_client();
    let err = stop(State(Arc::clone(&f.state)), Json(json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::BadRequest(_)));

    let Json(body) = stop(
        State(Arc::clone(&f.state)),
        Json(json!({ "jobAddress": "J9" })),
    )
    .await
    .unwrap();
    assert_eq!(body["status"], "stopped");
    assert_eq!(body["jobAddress"], "J9");
}

#[tokio::test]
async fn describe_falls_back_to_job_lookup() {
    let f = fixture_with_client();
    // No deployment snapshot scripted: get_deployment 404s, and the job
    // lookup takes over.
    f.network.push_job_detail(JobDetail {
        address: JobAddress::new("J1"),
        state: JobState::Running,
        node_address: Some("N1".into()),
        result: None,
    });

    let Json(body) = describe(
        State(Arc::clone(&f.state)),
        Path("J1".to_string()),
        no_params(),
    )
    .await
    .unwrap();
    assert_eq!(body["jobAddress"], "J1");
    assert_eq!(body["jobState"], "RUNNING");
    assert_eq!(body["nodeAddress"], "N1");
}

#[tokio::test]
async fn job_logs_report_pending_and_completed() {
    let f = fixture_with_client();
    f.network.push_job_detail(JobDetail {
        address: JobAddress::new("J1"),
        state: JobState::Running,
        node_address: None,
        result: None,
    });
    let Json(body) = job_logs(
        State(Arc::clone(&f.state)),
        Path("J1".to_string()),
        no_params(),
    )
    .await
    .unwrap();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["jobState"], "RUNNING");

    f.network.push_job_detail(JobDetail {
        address: JobAddress::new("J2"),
        state: JobState::Completed,
        node_address: None,
        result: None,
    });
    f.network.set_job_logs(&JobAddress::new("J2"), json!({ "logs": ["done"] }));
    let Json(body) = job_logs(
        State(Arc::clone(&f.state)),
        Path("J2".to_string()),
        no_params(),
    )
    .await
    .unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"]["logs"][0], "done");
}

#[tokio::test]
async fn balance_is_tagged_with_the_mode() {
    let f = fixture_with_client();
    f.network.set_balance(Balance::Credits { assigned: 10.0, reserved: 2.0, settled: 1.0 });
    let Json(body) = balance(State(Arc::clone(&f.state)), no_params()).await.unwrap();
    assert_eq!(body["assigned"], 10.0);
    assert_eq!(body["mode"], "delegated");
}

#[tokio::test]
async fn upstream_errors_surface_the_network_body() {
    let f = fixture_with_client();
    f.network.push_create(Err(depin_gateway::GatewayError::Remote {
        status: 402,
        body: "insufficient credits".into(),
    }));
    let err = launch(
        State(Arc::clone(&f.state)),
        Json(json!({ "jobDefinition": { "image": "x" }, "marketAddress": "M1" })),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ApiError::Upstream { status: 402, ref body } if body.as_str() == "insufficient credits"));
}
