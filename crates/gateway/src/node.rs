// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Direct communication with compute nodes.
//!
//! Nodes expose HTTPS/WSS under `<nodeAddress>.<ingressDomain>` and
//! authenticate callers with `MESSAGE:SIGNATURE` tokens. Two flows live
//! here: the confidential job-definition handoff (one POST, with a single
//! signature-refresh retry on 4xx) and the live log stream used by the log
//! bridge.

use crate::error::GatewayError;
use crate::signer::AuthSigner;
use depin_core::{Clock, JobAddress};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const NODE_POST_TIMEOUT: Duration = Duration::from_secs(10);
const WS_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const HANDOFF_RETRY_DELAY: Duration = Duration::from_secs(5);
const RECONNECT_DELAY: Duration = Duration::from_secs(3);
const RECONNECT_ATTEMPTS: u32 = 10;

/// Client for node-direct HTTP and WSS.
pub struct NodeClient {
    http: reqwest::Client,
    ingress_domain: String,
}

impl NodeClient {
    pub fn new(ingress_domain: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(NODE_POST_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, ingress_domain: ingress_domain.to_string() })
    }

    /// URL a node serves a job's definition endpoint on.
    pub fn job_definition_url(&self, node_address: &str, job: &JobAddress) -> String {
        format!(
            "https://{node_address}.{}/job/{job}/job-definition",
            self.ingress_domain
        )
    }

    /// WSS endpoint of a node.
    pub fn ws_url(&self, node_address: &str) -> String {
        format!("wss://{node_address}.{}", self.ingress_domain)
    }

    /// Hand the real job definition to the node that claimed a confidential
    /// job. On a 4xx the cached signature is invalidated and the POST is
    /// retried once with a fresh token after a short delay.
    pub async fn post_job_definition<C: Clock>(
        &self,
        node_address: &str,
        job: &JobAddress,
        definition: &Value,
        signer: &AuthSigner<C>,
    ) -> Result<Value, GatewayError> {
        let url = self.job_definition_url(node_address, job);
        match self.post_once(&url, job, definition, signer).await {
            Err(GatewayError::Remote { status, .. }) if (400..500).contains(&status) => {
                warn!(job = %job, status, "node rejected job definition, retrying with fresh signature");
                tokio::time::sleep(HANDOFF_RETRY_DELAY).await;
                signer.invalidate(job.as_str());
                self.post_once(&url, job, definition, signer).await
            }
            other => other,
        }
    }

    async fn post_once<C: Clock>(
        &self,
        url: &str,
        job: &JobAddress,
        definition: &Value,
        signer: &AuthSigner<C>,
    ) -> Result<Value, GatewayError> {
        let token = signer.token(job.as_str()).await?;
        let resp = self
            .http
            .post(url)
            .header("Authorization", token)
            .json(definition)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(GatewayError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Remote { status, body });
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// Everything needed to subscribe to one job's log stream.
#[derive(Debug, Clone)]
pub struct LogStreamParams {
    pub ws_url: String,
    pub job: JobAddress,
    /// `MESSAGE:SIGNATURE` token the node validates.
    pub auth_header: String,
    /// Address the token was signed by.
    pub signer_address: String,
}

/// Subscribe frame sent immediately after connecting.
fn subscribe_frame(params: &LogStreamParams) -> String {
    json!({
        "path": "/log",
        "body": { "jobAddress": params.job.as_str(), "address": params.signer_address },
        "header": params.auth_header,
    })
    .to_string()
}

/// Extract the log payload from a node frame, if it is one.
pub fn parse_log_frame(text: &str) -> Option<String> {
    let value: Value = serde_json::from_str(text).ok()?;
    if let Some(log) = value.get("log") {
        return Some(match log.as_str() {
            Some(s) => s.to_string(),
            None => log.to_string(),
        });
    }
    if value.get("type").and_then(Value::as_str) == Some("log") {
        let data = value.get("data")?;
        return Some(match data.as_str() {
            Some(s) => s.to_string(),
            None => data.to_string(),
        });
    }
    None
}

/// Whether a close code warrants a reconnect attempt. 1000 (normal) and
/// 1005 (no status) mean the node is done sending.
fn should_reconnect(close_code: Option<u16>) -> bool {
    !matches!(close_code, Some(1000) | Some(1005))
}

/// How a finished log stream ended. Callers that can degrade to polling
/// key off [`StreamOutcome::GaveUp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The node closed the stream normally.
    Ended,
    /// The reconnect budget ran out without a usable stream.
    GaveUp,
    /// The subscriber went away.
    Cancelled,
}

/// Stream log lines from a node into `tx` until the stream ends, the retry
/// budget is exhausted, or `cancel` fires.
///
/// Abnormal closes reconnect with a linear 3-second backoff up to 10
/// attempts; the counter resets whenever a connection delivers a frame.
pub async fn stream_logs(
    params: LogStreamParams,
    tx: mpsc::Sender<String>,
    cancel: CancellationToken,
) -> StreamOutcome {
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return StreamOutcome::Cancelled;
        }
        match stream_once(&params, &tx, &cancel).await {
            StreamEnd::Clean => return StreamOutcome::Ended,
            StreamEnd::Cancelled => return StreamOutcome::Cancelled,
            StreamEnd::Delivered => {
                // Made progress before dropping; start the budget over.
                attempts = 1;
            }
            StreamEnd::Failed => {
                attempts += 1;
            }
        }
        if attempts >= RECONNECT_ATTEMPTS {
            warn!(job = %params.job, attempts, "giving up on node log stream");
            return StreamOutcome::GaveUp;
        }
        tokio::select! {
            _ = tokio::time::sleep(RECONNECT_DELAY) => {}
            _ = cancel.cancelled() => return StreamOutcome::Cancelled,
        }
    }
}

enum StreamEnd {
    /// Node closed normally; no reconnect.
    Clean,
    Cancelled,
    /// Connection delivered at least one frame before dropping.
    Delivered,
    /// Connect failed or dropped without delivering anything.
    Failed,
}

async fn stream_once(
    params: &LogStreamParams,
    tx: &mpsc::Sender<String>,
    cancel: &CancellationToken,
) -> StreamEnd {
    let connect = tokio_tungstenite::connect_async(params.ws_url.as_str());
    let mut ws = match tokio::time::timeout(WS_CONNECT_TIMEOUT, connect).await {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => {
            warn!(url = %params.ws_url, error = %e, "node log stream connect failed");
            return StreamEnd::Failed;
        }
        Err(_) => {
            warn!(url = %params.ws_url, "node log stream connect timed out");
            return StreamEnd::Failed;
        }
    };

    if let Err(e) = ws.send(Message::text(subscribe_frame(params))).await {
        warn!(job = %params.job, error = %e, "failed to send log subscribe frame");
        return StreamEnd::Failed;
    }
    info!(job = %params.job, "node log stream subscribed");

    let mut delivered = false;
    loop {
        tokio::select! {
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if let Some(line) = parse_log_frame(&text) {
                        delivered = true;
                        if tx.send(line).await.is_err() {
                            // Receiver went away: the client disconnected.
                            return StreamEnd::Cancelled;
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.as_ref().map(|f| u16::from(f.code));
                    if should_reconnect(code) {
                        return if delivered { StreamEnd::Delivered } else { StreamEnd::Failed };
                    }
                    return StreamEnd::Clean;
                }
                Some(Err(e)) => {
                    warn!(job = %params.job, error = %e, "node log stream error");
                    return if delivered { StreamEnd::Delivered } else { StreamEnd::Failed };
                }
                None => {
                    return if delivered { StreamEnd::Delivered } else { StreamEnd::Failed };
                }
                _ => {} // Ping/Pong/Binary — ignore
            },
            _ = cancel.cancelled() => {
                let _ = ws.close(None).await;
                return StreamEnd::Cancelled;
            }
        }
    }
}

#[cfg(test)]
#[path = "node_tests.rs"]
mod tests;
