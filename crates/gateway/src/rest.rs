// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! REST implementation of [`Network`] for delegated credentials.
//!
//! Every call carries `Authorization: Bearer <apiKey>` and a 30-second
//! timeout. Reads go through the 429 backoff; mutations are sent once (see
//! `retry.rs` for why).

use crate::error::GatewayError;
use crate::network::{
    Balance, CreateDeploymentRequest, DeploymentSnapshot, JobDetail, JobSummary, Network,
};
use crate::retry::{send_mutation, with_backoff, RetryPolicy};
use async_trait::async_trait;
use depin_core::{DeploymentId, DeploymentStatus, Endpoint, JobAddress, JobState, Secret};
use serde_json::{json, Value};
use std::time::Duration;

const REST_TIMEOUT: Duration = Duration::from_secs(30);

/// Delegated-mode Network client.
pub struct RestNetwork {
    http: reqwest::Client,
    base: String,
    api_key: Secret,
    policy: RetryPolicy,
}

impl RestNetwork {
    pub fn new(base_url: &str, api_key: Secret) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(REST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: base_url.trim_end_matches('/').to_string(),
            api_key,
            policy: RetryPolicy::default(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get_json(&self, path: &str) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .get(self.url(path))
            .bearer_auth(self.api_key.expose())
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        checked_json(resp).await
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .post(self.url(path))
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        checked_json(resp).await
    }

    async fn patch_json(&self, path: &str, body: &Value) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .patch(self.url(path))
            .bearer_auth(self.api_key.expose())
            .json(body)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        checked_json(resp).await
    }
}

/// Map a response to JSON, folding statuses into the error taxonomy.
async fn checked_json(resp: reqwest::Response) -> Result<Value, GatewayError> {
    let status = resp.status().as_u16();
    if status == 429 {
        return Err(GatewayError::RateLimited);
    }
    let body = resp.text().await.map_err(GatewayError::from_reqwest)?;
    if !(200..300).contains(&status) {
        return Err(GatewayError::Remote { status, body });
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
}

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Parse a deployment object from the REST API.
pub(crate) fn parse_deployment(value: &Value) -> Result<DeploymentSnapshot, GatewayError> {
    let id = str_field(value, "id")
        .or_else(|| str_field(value, "deployment"))
        .ok_or_else(|| GatewayError::Decode("deployment without id".into()))?;
    let status_str = str_field(value, "status")
        .ok_or_else(|| GatewayError::Decode(format!("deployment {id} without status")))?;
    let status = DeploymentStatus::parse(status_str)
        .ok_or_else(|| GatewayError::Decode(format!("unknown deployment status {status_str:?}")))?;
    let endpoints = value
        .get("endpoints")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|e| str_field(e, "url"))
                .map(|url| Endpoint { url: url.to_string() })
                .collect()
        })
        .unwrap_or_default();
    let error_message = str_field(value, "error_message").map(str::to_string);
    Ok(DeploymentSnapshot { id: DeploymentId::new(id), status, endpoints, error_message })
}

/// Parse one entry of a deployment's job listing. Entries without an
/// address are skipped rather than failing the whole listing.
pub(crate) fn parse_job_summary(value: &Value) -> Option<JobSummary> {
    let address = str_field(value, "job").or_else(|| str_field(value, "address"))?;
    let state = str_field(value, "state").and_then(JobState::parse).unwrap_or(JobState::Queued);
    let node_address = str_field(value, "node").map(str::to_string);
    Some(JobSummary { address: JobAddress::new(address), state, node_address })
}

pub(crate) fn parse_job_detail(value: &Value) -> Result<JobDetail, GatewayError> {
    let address = str_field(value, "job")
        .or_else(|| str_field(value, "address"))
        .ok_or_else(|| GatewayError::Decode("job without address".into()))?;
    let state_str = str_field(value, "state")
        .ok_or_else(|| GatewayError::Decode(format!("job {address} without state")))?;
    let state = JobState::parse(state_str)
        .ok_or_else(|| GatewayError::Decode(format!("unknown job state {state_str:?}")))?;
    Ok(JobDetail {
        address: JobAddress::new(address),
        state,
        node_address: str_field(value, "node").map(str::to_string),
        result: value.get("result").filter(|r| !r.is_null()).cloned(),
    })
}

fn num_field(value: &Value, key: &str) -> f64 {
    value.get(key).and_then(Value::as_f64).unwrap_or(0.0)
}

pub(crate) fn parse_balance_credits(value: &Value) -> Balance {
    Balance::Credits {
        assigned: num_field(value, "assignedCredits"),
        reserved: num_field(value, "reservedCredits"),
        settled: num_field(value, "settledCredits"),
    }
}

/// The jobs listing arrives either bare or under a `jobs` key.
fn job_entries(value: &Value) -> Vec<JobSummary> {
    let list = value
        .get("jobs")
        .and_then(Value::as_array)
        .or_else(|| value.as_array())
        .cloned()
        .unwrap_or_default();
    list.iter().filter_map(parse_job_summary).collect()
}

#[async_trait]
impl Network for RestNetwork {
    async fn create_deployment(
        &self,
        req: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, GatewayError> {
        let body = json!({
            "name": req.name,
            "market": req.market,
            "job_definition": req.job_definition,
            "replicas": req.replicas,
            "timeout": req.timeout_minutes,
            "strategy": req.strategy.as_str(),
            "confidential": req.confidential,
        });
        let body = &body;
        send_mutation(&self.policy, "create_deployment", move || async move {
            let value = self.post_json("/api/deployments", body).await?;
            str_field(&value, "id")
                .map(DeploymentId::new)
                .ok_or_else(|| GatewayError::Decode("create response without id".into()))
        })
        .await
    }

    async fn start_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentStatus, GatewayError> {
        send_mutation(&self.policy, "start_deployment", move || async move {
            let value =
                self.post_json(&format!("/api/deployments/{id}/start"), &Value::Null).await?;
            let status = str_field(&value, "status").unwrap_or("STARTING");
            Ok(DeploymentStatus::parse(status).unwrap_or(DeploymentStatus::Starting))
        })
        .await
    }

    async fn get_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentSnapshot, GatewayError> {
        with_backoff(&self.policy, "get_deployment", move || async move {
            let value = self.get_json(&format!("/api/deployments/{id}")).await?;
            parse_deployment(&value)
        })
        .await
    }

    async fn stop_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentStatus, GatewayError> {
        send_mutation(&self.policy, "stop_deployment", move || async move {
            let value =
                self.post_json(&format!("/api/deployments/{id}/stop"), &Value::Null).await?;
            let status = str_field(&value, "status").unwrap_or("STOPPED");
            Ok(DeploymentStatus::parse(status).unwrap_or(DeploymentStatus::Stopped))
        })
        .await
    }

    async fn update_timeout(&self, id: &DeploymentId, minutes: u64) -> Result<u64, GatewayError> {
        with_backoff(&self.policy, "update_timeout", move || async move {
            let value = self
                .patch_json(&format!("/api/deployments/{id}/timeout"), &json!({ "minutes": minutes }))
                .await
                .map_err(|e| match e {
                    // Older deployments predate the timeout endpoint.
                    GatewayError::Remote { status: 404 | 405 | 501, .. } => {
                        GatewayError::Unsupported
                    }
                    other => other,
                })?;
            Ok(value.get("timeout").and_then(Value::as_u64).unwrap_or(minutes))
        })
        .await
    }

    async fn list_jobs(
        &self,
        id: &DeploymentId,
        state: Option<JobState>,
    ) -> Result<Vec<JobSummary>, GatewayError> {
        with_backoff(&self.policy, "list_jobs", move || async move {
            let path = match state {
                Some(s) => format!("/api/deployments/{id}/jobs?state={}", s.as_str()),
                None => format!("/api/deployments/{id}/jobs"),
            };
            Ok(job_entries(&self.get_json(&path).await?))
        })
        .await
    }

    async fn get_job(&self, job: &JobAddress) -> Result<JobDetail, GatewayError> {
        with_backoff(&self.policy, "get_job", move || async move {
            parse_job_detail(&self.get_json(&format!("/api/jobs/{job}")).await?)
        })
        .await
    }

    async fn get_job_logs(&self, job: &JobAddress) -> Result<Value, GatewayError> {
        with_backoff(&self.policy, "get_job_logs", move || async move {
            self.get_json(&format!("/api/jobs/{job}/logs")).await
        })
        .await
    }

    async fn stop_job(&self, job: &JobAddress) -> Result<(), GatewayError> {
        send_mutation(&self.policy, "stop_job", move || async move {
            self.post_json(&format!("/api/jobs/{job}/stop"), &Value::Null).await?;
            Ok(())
        })
        .await
    }

    async fn extend_job(&self, job: &JobAddress, seconds: u64) -> Result<(), GatewayError> {
        send_mutation(&self.policy, "extend_job", move || async move {
            self.post_json(&format!("/api/jobs/{job}/extend"), &json!({ "seconds": seconds }))
                .await?;
            Ok(())
        })
        .await
    }

    async fn balance(&self) -> Result<Balance, GatewayError> {
        with_backoff(&self.policy, "balance", move || async move {
            Ok(parse_balance_credits(&self.get_json("/api/balance").await?))
        })
        .await
    }

    async fn list_owned(
        &self,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<DeploymentSnapshot>, GatewayError> {
        let filter =
            statuses.iter().map(DeploymentStatus::as_str).collect::<Vec<_>>().join(",");
        let filter = &filter;
        with_backoff(&self.policy, "list_owned", move || async move {
            let value = self.get_json(&format!("/api/deployments?status={filter}")).await?;
            let list = value
                .get("deployments")
                .and_then(Value::as_array)
                .or_else(|| value.as_array())
                .cloned()
                .unwrap_or_default();
            Ok(list.iter().filter_map(|d| parse_deployment(d).ok()).collect())
        })
        .await
    }
}

#[cfg(test)]
#[path = "rest_tests.rs"]
mod tests;
