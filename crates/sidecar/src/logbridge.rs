// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket log bridge.
//!
//! A client subscribes with one frame naming a job; depending on the job's
//! state it gets either a live stream proxied from the compute node or a
//! replay of the historical result blob. When a delegated-mode live stream
//! cannot be opened (or exhausts its reconnect budget), the bridge degrades
//! to polling job state and replays the history once the job ends. Client
//! disconnect tears down the node stream and any polling timer.
//!
//! The bridge works on the socket's split sink/stream halves so the flows
//! here run against in-memory channels in tests.

use crate::router::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use depin_core::{Clock, ControlPlane, JobAddress, SignerMode};
use depin_gateway::{stream_logs, LogStreamParams, StreamOutcome};
use depin_provider::{LogsOutcome, ProviderClient};
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// A subscriber has this long to send its subscribe frame.
const SUBSCRIBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Fallback cadence when no live stream can be opened.
const POLL_INTERVAL: Duration = Duration::from_secs(10);

const REPLAY_HEADER: &str = "[SYSTEM] Deployment terminated - replaying historical logs";
const REPLAY_FOOTER: &str = "[SYSTEM] --- END OF HISTORICAL LOGS ---";

pub(crate) async fn ws_handler<P: ControlPlane, C: Clock>(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState<P, C>>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Parsed subscribe frame.
#[derive(Debug, PartialEq)]
pub(crate) struct SubscribeRequest {
    pub job: JobAddress,
    pub node_address: Option<String>,
    pub credential_name: Option<String>,
}

/// Validate a `subscribe_logs` frame.
pub(crate) fn parse_subscribe(value: &Value) -> Result<SubscribeRequest, String> {
    if value.get("type").and_then(Value::as_str) != Some("subscribe_logs") {
        return Err("expected a subscribe_logs message".into());
    }
    let job = value
        .get("jobId")
        .and_then(Value::as_str)
        .filter(|j| !j.is_empty())
        .ok_or_else(|| "jobId is required".to_string())?;
    let credential_name = match value.get("credentialName") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => return Err("credentialName must be a string".into()),
    };
    let node_address = value
        .get("nodeAddress")
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok(SubscribeRequest { job: JobAddress::new(job), node_address, credential_name })
}

/// Flatten a job result blob into displayable lines.
///
/// Results either carry per-operation `opStates[].logs[]`, a flat `logs[]`,
/// or something else entirely (forwarded stringified). Items may be plain
/// strings, objects carrying `log`/`message`, or objects nesting more
/// `logs`.
pub(crate) fn flatten_log_result(result: &Value) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(ops) = result.get("opStates").and_then(Value::as_array) {
        for op in ops {
            if let Some(logs) = op.get("logs").and_then(Value::as_array) {
                for item in logs {
                    flatten_item(item, &mut out);
                }
            }
        }
    } else if let Some(logs) = result.get("logs").and_then(Value::as_array) {
        for item in logs {
            flatten_item(item, &mut out);
        }
    } else {
        out.push(result.to_string());
    }
    out
}

fn flatten_item(item: &Value, out: &mut Vec<String>) {
    match item {
        Value::String(s) => out.push(s.clone()),
        Value::Object(map) => {
            if let Some(payload) = map.get("log").or_else(|| map.get("message")) {
                match payload.as_str() {
                    Some(s) => out.push(s.to_string()),
                    None => out.push(payload.to_string()),
                }
            } else if let Some(nested) = map.get("logs").and_then(Value::as_array) {
                for item in nested {
                    flatten_item(item, out);
                }
            } else {
                out.push(item.to_string());
            }
        }
        other => out.push(other.to_string()),
    }
}

async fn handle_socket<P: ControlPlane, C: Clock>(
    socket: WebSocket,
    state: Arc<AppState<P, C>>,
) {
    let (sink, stream) = socket.split();
    bridge(sink, stream, state).await;
}

async fn bridge<P, C, W, R>(mut sink: W, mut stream: R, state: Arc<AppState<P, C>>)
where
    P: ControlPlane,
    C: Clock,
    W: Sink<Message> + Unpin + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let frame = match tokio::time::timeout(SUBSCRIBE_TIMEOUT, read_text(&mut stream)).await {
        Ok(Some(frame)) => frame,
        _ => {
            let _ = send_error(&mut sink, "expected a subscribe_logs message").await;
            return;
        }
    };
    let value: Value = match serde_json::from_str(&frame) {
        Ok(value) => value,
        Err(_) => {
            let _ = send_error(&mut sink, "subscribe frame is not valid JSON").await;
            return;
        }
    };
    let request = match parse_subscribe(&value) {
        Ok(request) => request,
        Err(message) => {
            let _ = send_error(&mut sink, &message).await;
            return;
        }
    };
    let Some(client) = state.registry.resolve(request.credential_name.as_deref()) else {
        let _ = send_error(&mut sink, "nosana service not initialized").await;
        return;
    };

    serve(sink, stream, client, request).await;
}

async fn serve<P, C, W, R>(
    mut sink: W,
    stream: R,
    client: ProviderClient<P, C>,
    request: SubscribeRequest,
) where
    P: ControlPlane,
    C: Clock,
    W: Sink<Message> + Unpin + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let detail = match client.job_state(&request.job).await {
        Ok(detail) => detail,
        Err(e) => {
            let _ = send_error(&mut sink, &format!("failed to look up job: {e}")).await;
            return;
        }
    };

    if detail.state.is_terminal() {
        replay(&mut sink, &client, &request.job).await;
        return;
    }

    let node_address = request.node_address.or(detail.node_address);
    match node_address {
        Some(node) => live_stream(sink, stream, client, request.job, node).await,
        None => {
            // No node to stream from: poll until the job ends, then replay.
            info!(job = %request.job, "no node address, falling back to log polling");
            poll_until_terminal(sink, stream, client, request.job).await;
        }
    }
}

async fn live_stream<P, C, W, R>(
    mut sink: W,
    stream: R,
    client: ProviderClient<P, C>,
    job: JobAddress,
    node: String,
) where
    P: ControlPlane,
    C: Clock,
    W: Sink<Message> + Unpin + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let params: LogStreamParams = match client.log_stream_params(&node, &job).await {
        Ok(params) => params,
        Err(e) => {
            warn!(job = %job, error = %e, "could not authorize node log stream");
            if client.mode() == SignerMode::Delegated {
                // Streamer unavailable: degrade to the polling bridge so the
                // subscriber still gets the logs when the job ends.
                poll_until_terminal(sink, stream, client, job).await;
            } else {
                let _ =
                    send_error(&mut sink, &format!("failed to authorize log stream: {e}")).await;
            }
            return;
        }
    };

    let (tx, rx) = mpsc::channel::<String>(64);
    let cancel = CancellationToken::new();
    let streamer = tokio::spawn(stream_logs(params, tx, cancel.clone()));
    info!(job = %job, node = %node, "live log stream opened");

    forward_stream(sink, stream, client, job, rx, streamer, cancel).await;
}

/// Pump streamed lines to the subscriber until one side goes away. When the
/// streamer gives up without ever producing a usable stream, delegated mode
/// falls back to polling; everything else closes cleanly.
async fn forward_stream<P, C, W, R>(
    mut sink: W,
    mut stream: R,
    client: ProviderClient<P, C>,
    job: JobAddress,
    mut rx: mpsc::Receiver<String>,
    streamer: JoinHandle<StreamOutcome>,
    cancel: CancellationToken,
) where
    P: ControlPlane,
    C: Clock,
    W: Sink<Message> + Unpin + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    let client_gone = loop {
        tokio::select! {
            line = rx.recv() => match line {
                Some(line) => {
                    if !send_log(&mut sink, &line).await {
                        break true;
                    }
                }
                // Streamer finished; how it finished decides what's next.
                None => break false,
            },
            frame = stream.next() => match frame {
                Some(Ok(_)) => {} // inbound frames are ignored
                _ => break true,   // client disconnected
            },
        }
    };

    if client_gone {
        cancel.cancel();
        return;
    }

    let outcome = streamer.await.unwrap_or(StreamOutcome::GaveUp);
    if outcome == StreamOutcome::GaveUp && client.mode() == SignerMode::Delegated {
        warn!(job = %job, "node log stream unavailable, degrading to polling");
        poll_until_terminal(sink, stream, client, job).await;
    } else {
        let _ = close(&mut sink).await;
    }
}

async fn poll_until_terminal<P, C, W, R>(
    mut sink: W,
    mut stream: R,
    client: ProviderClient<P, C>,
    job: JobAddress,
) where
    P: ControlPlane,
    C: Clock,
    W: Sink<Message> + Unpin + Send,
    R: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
{
    loop {
        match client.job_state(&job).await {
            Ok(detail) if detail.state.is_terminal() => {
                replay(&mut sink, &client, &job).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(job = %job, error = %e, "log poll failed");
            }
        }
        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = wait_disconnect(&mut stream) => return, // timer dies with the client
        }
    }
}

/// Replay the historical result blob line by line.
async fn replay<P, C, W>(sink: &mut W, client: &ProviderClient<P, C>, job: &JobAddress)
where
    P: ControlPlane,
    C: Clock,
    W: Sink<Message> + Unpin + Send,
{
    if !send_log(sink, REPLAY_HEADER).await {
        return;
    }
    match client.job_logs(job).await {
        Ok(LogsOutcome::Completed(result)) => {
            for line in flatten_log_result(&result) {
                if !send_log(sink, &line).await {
                    return;
                }
            }
        }
        Ok(LogsOutcome::Pending { .. }) => {
            let _ = send_error(sink, "job is still running; no historical logs yet").await;
            return;
        }
        Err(e) => {
            let _ = send_error(sink, &format!("failed to fetch historical logs: {e}")).await;
            return;
        }
    }
    let _ = send_log(sink, REPLAY_FOOTER).await;
    let _ = close(sink).await;
}

async fn read_text<R>(stream: &mut R) -> Option<String>
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(text),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => {} // Ping/Pong/Binary — keep waiting
        }
    }
    None
}

/// Resolves once the subscriber disconnects; chatter is swallowed.
async fn wait_disconnect<R>(stream: &mut R)
where
    R: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
            Some(Ok(_)) => {}
        }
    }
}

async fn send_log<W>(sink: &mut W, line: &str) -> bool
where
    W: Sink<Message> + Unpin,
{
    sink.send(Message::Text(json!({ "type": "log", "data": line }).to_string()))
        .await
        .is_ok()
}

async fn send_error<W>(sink: &mut W, message: &str) -> bool
where
    W: Sink<Message> + Unpin,
{
    sink.send(Message::Text(json!({ "type": "error", "message": message }).to_string()))
        .await
        .is_ok()
}

async fn close<W>(sink: &mut W) -> bool
where
    W: Sink<Message> + Unpin,
{
    sink.send(Message::Close(None)).await.is_ok()
}

#[cfg(test)]
#[path = "logbridge_tests.rs"]
mod tests;
