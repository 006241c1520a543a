// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface of the sidecar.
//!
//! Bodies are navigated as JSON values so malformed input maps to `400 {
//! "error": ... }` instead of the framework's default rejection. Every
//! handler resolves its provider client through the registry — by
//! `credentialName` when given, the default otherwise — and answers `503`
//! when no client fits.

use crate::registry::ClientRegistry;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use depin_core::{Clock, ControlPlane, DeploymentId, JobAddress, ResourceSpec};
use depin_gateway::GatewayError;
use depin_provider::{LogsOutcome, ProviderClient, ProviderError};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Shared state behind every handler.
pub struct AppState<P: ControlPlane, C: Clock> {
    pub registry: Arc<ClientRegistry<P, C>>,
    pub started: Instant,
    pub config_source: &'static str,
}

/// Error responses, normalized to `{ "error": message }`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotInitialized(String),
    Auth(String),
    Upstream { status: u16, body: String },
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m),
            ApiError::NotInitialized(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            ApiError::Auth(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            // Remote Network errors surface with the upstream body intact.
            ApiError::Upstream { status, body } => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Network error ({status}): {body}"),
            ),
            ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Gateway(GatewayError::Remote { status, body }) => {
                ApiError::Upstream { status, body }
            }
            ProviderError::Gateway(GatewayError::Signer(e))
            | ProviderError::Signer(e) => ApiError::Auth(e.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Assemble the full router, WebSocket log bridge included.
pub fn router<P: ControlPlane, C: Clock>(state: Arc<AppState<P, C>>) -> Router {
    Router::new()
        .route("/health", get(health::<P, C>))
        .route("/nosana/balance", get(balance::<P, C>))
        .route("/nosana/jobs/launch", post(launch::<P, C>))
        .route("/nosana/jobs/stop", post(stop::<P, C>))
        .route("/nosana/jobs/:id", get(describe::<P, C>))
        .route("/nosana/jobs/:id/logs", get(job_logs::<P, C>))
        .route("/ws", get(crate::logbridge::ws_handler::<P, C>))
        .with_state(state)
}

fn resolve<P: ControlPlane, C: Clock>(
    state: &AppState<P, C>,
    name: Option<&str>,
) -> Result<ProviderClient<P, C>, ApiError> {
    state.registry.resolve(name).ok_or_else(|| match name {
        Some(name) => {
            ApiError::NotInitialized(format!("nosana service {name:?} not initialized"))
        }
        None => ApiError::NotInitialized("nosana service not initialized".into()),
    })
}

/// Read an optional string field, rejecting non-string values.
fn optional_str<'a>(body: &'a Value, key: &str) -> Result<Option<&'a str>, ApiError> {
    match body.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.as_str())),
        Some(_) => Err(ApiError::BadRequest(format!("{key} must be a string"))),
    }
}

fn field<'a>(body: &'a Value, camel: &str, snake: &str) -> Option<&'a Value> {
    body.get(camel).or_else(|| body.get(snake))
}

fn parse_resources(body: &Value) -> ResourceSpec {
    let Some(spec) = field(body, "resourcesAllocated", "resources_allocated") else {
        return ResourceSpec::default();
    };
    let number =
        |key: &str, fallback: u32| spec.get(key).and_then(Value::as_u64).map(|n| n as u32).unwrap_or(fallback);
    let defaults = ResourceSpec::default();
    ResourceSpec {
        gpu: number("gpu", defaults.gpu),
        vcpu: number("vcpu", defaults.vcpu),
        ram_gb: number("ram_gb", defaults.ram_gb),
    }
}

pub(crate) async fn health<P: ControlPlane, C: Clock>(
    State(state): State<Arc<AppState<P, C>>>,
) -> Json<Value> {
    let names = state.registry.names();
    let clients = state.registry.clients();
    let watchdogs: usize = clients.iter().map(|c| c.task_count()).sum();
    let signer: Value = clients
        .iter()
        .map(|c| {
            (c.name().as_str().to_string(), serde_json::to_value(c.signer_stats()).unwrap_or(Value::Null))
        })
        .collect::<serde_json::Map<_, _>>()
        .into();
    Json(json!({
        "status": "ok",
        "uptime_secs": state.started.elapsed().as_secs(),
        "version": env!("CARGO_PKG_VERSION"),
        "modules": {
            "nosana": {
                "status": if names.is_empty() { "disabled" } else { "active" },
                "credentials": names,
                "default": state.registry.default_name(),
                "watchdogs": watchdogs,
                "signer": signer,
            },
        },
        "config_source": state.config_source,
    }))
}

pub(crate) async fn balance<P: ControlPlane, C: Clock>(
    State(state): State<Arc<AppState<P, C>>>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let client = resolve(&state, params.get("credentialName").map(String::as_str))?;
    let balance = client.balance().await?;
    let mut body = serde_json::to_value(&balance)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if let Some(map) = body.as_object_mut() {
        map.insert("mode".into(), json!(client.mode().as_str()));
    }
    Ok(Json(body))
}

pub(crate) async fn launch<P: ControlPlane, C: Clock>(
    State(state): State<Arc<AppState<P, C>>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let definition = field(&body, "jobDefinition", "job_definition")
        .filter(|v| v.is_object())
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("jobDefinition (object) is required".into()))?;
    let market = field(&body, "marketAddress", "market_address")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| ApiError::BadRequest("marketAddress is required".into()))?;
    let confidential = field(&body, "isConfidential", "is_confidential")
        .and_then(Value::as_bool)
        .unwrap_or(true);
    let credential_name = optional_str(&body, "credentialName")?;
    let resources = parse_resources(&body);

    let client = resolve(&state, credential_name)?;
    let outcome = client.launch(definition, market, confidential, resources).await?;
    Ok(Json(json!({
        "deploymentId": outcome.deployment_id,
        "jobAddress": outcome.job_address,
        "serviceUrl": outcome.service_url,
        "status": "success",
    })))
}

pub(crate) async fn stop<P: ControlPlane, C: Clock>(
    State(state): State<Arc<AppState<P, C>>>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let target = field(&body, "jobAddress", "job_address")
        .or_else(|| field(&body, "deploymentId", "deployment_id"))
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::BadRequest("jobAddress is required".into()))?;
    let credential_name = optional_str(&body, "credentialName")?;

    let client = resolve(&state, credential_name)?;
    let outcome = client.stop(target).await?;
    Ok(Json(json!({
        "status": "stopped",
        "deploymentId": outcome.deployment_id,
        "jobAddress": outcome.job_address,
    })))
}

pub(crate) async fn describe<P: ControlPlane, C: Clock>(
    State(state): State<Arc<AppState<P, C>>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let client = resolve(&state, params.get("credentialName").map(String::as_str))?;

    match client.describe(&DeploymentId::new(&id)).await {
        Ok(view) => {
            let watched = view.watched.as_ref();
            Ok(Json(json!({
                "deploymentId": view.snapshot.id,
                "status": view.snapshot.status.as_str(),
                "serviceUrl": watched
                    .and_then(|w| w.service_url.clone())
                    .or_else(|| view.snapshot.service_url().map(str::to_string)),
                "endpoints": view.snapshot.endpoints,
                "jobAddresses": watched.map(|w| w.job_addresses.clone()).unwrap_or_default(),
                "userStopped": watched.map(|w| w.user_stopped).unwrap_or(false),
                "watched": view.watched.is_some(),
            })))
        }
        // Not a deployment id; try it as a bare job address.
        Err(ProviderError::Gateway(GatewayError::Remote { status: 404, .. })) => {
            let detail = client.job_state(&JobAddress::new(&id)).await?;
            Ok(Json(json!({
                "jobAddress": detail.address,
                "jobState": detail.state.as_str(),
                "nodeAddress": detail.node_address,
            })))
        }
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn job_logs<P: ControlPlane, C: Clock>(
    State(state): State<Arc<AppState<P, C>>>,
    Path(id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, ApiError> {
    let client = resolve(&state, params.get("credentialName").map(String::as_str))?;
    match client.job_logs(&JobAddress::new(&id)).await? {
        LogsOutcome::Completed(result) => {
            Ok(Json(json!({ "status": "completed", "result": result })))
        }
        LogsOutcome::Pending { state } => {
            Ok(Json(json!({ "status": "pending", "jobState": state.as_str() })))
        }
    }
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
