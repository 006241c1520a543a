// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP client for the orchestrator and the internal API gateway.
//!
//! Three outbound flows: the credential snapshot the reconciler polls,
//! inventory heartbeats, and audit records. The latter two implement
//! [`ControlPlane`] so the provider crate never sees HTTP.

use async_trait::async_trait;
use depin_core::{AuditEvent, ControlError, ControlPlane, HeartbeatEvent, Secret};
use serde_json::{json, Value};
use std::time::Duration;

const CONFIG_TIMEOUT: Duration = Duration::from_secs(5);
const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Clone)]
pub struct OrchestratorClient {
    http: reqwest::Client,
    api_gateway_url: String,
    orchestrator_url: String,
    api_key: Secret,
}

impl OrchestratorClient {
    pub fn new(
        api_gateway_url: &str,
        orchestrator_url: &str,
        api_key: Secret,
    ) -> Result<Self, ControlError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_gateway_url: api_gateway_url.trim_end_matches('/').to_string(),
            orchestrator_url: orchestrator_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    /// The authoritative provider-credential snapshot.
    pub async fn fetch_credentials(&self) -> Result<Value, ControlError> {
        let resp = self
            .http
            .get(format!("{}/internal/config/credentials", self.api_gateway_url))
            .header("X-Internal-API-Key", self.api_key.expose())
            .timeout(CONFIG_TIMEOUT)
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| ControlError::Transport(e.to_string()))?;
        if !(200..300).contains(&status) {
            return Err(ControlError::Rejected { status, body });
        }
        serde_json::from_str(&body).map_err(|e| ControlError::Transport(e.to_string()))
    }

    async fn post_event(&self, url: String, body: Value) -> Result<(), ControlError> {
        let resp = self
            .http
            .post(url)
            .header("X-Internal-API-Key", self.api_key.expose())
            .timeout(EVENT_TIMEOUT)
            .json(&body)
            .send()
            .await
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let body = resp.text().await.unwrap_or_default();
            return Err(ControlError::Rejected { status, body });
        }
        Ok(())
    }
}

#[async_trait]
impl ControlPlane for OrchestratorClient {
    async fn heartbeat(&self, event: &HeartbeatEvent) -> Result<(), ControlError> {
        let body = serde_json::to_value(event)
            .map_err(|e| ControlError::Transport(e.to_string()))?;
        self.post_event(format!("{}/inventory/heartbeat", self.orchestrator_url), body).await
    }

    async fn audit(&self, event: &AuditEvent) -> Result<(), ControlError> {
        let body = json!({
            "action": event.action.as_str(),
            "resource_type": event.resource_type,
            "resource_id": event.resource_id.as_str(),
            "details": event.details,
            "status": event.status,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });
        self.post_event(format!("{}/audit/internal/log", self.api_gateway_url), body).await
    }
}
