// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One provider client per credential.
//!
//! The client owns the credential's Network gateway, its auth signer, and
//! the watched-deployment map. Watchdogs and handoff tasks hold only a weak
//! reference back; dropping the last client handle aborts them (the remote
//! deployments keep running — the sidecar holds no authority over them
//! beyond what a caller asks for).

use crate::config::ProviderConfig;
use crate::handoff;
use crate::tasks::TaskRegistry;
use crate::watchdog;
use depin_core::{
    AuditAction, AuditEvent, Clock, ControlPlane, Credential, CredentialName, DeploymentId,
    DeploymentStatus, Fingerprint, JobAddress, JobState, ResourceSpec, SignerMode,
    WatchedDeployment,
};
use depin_gateway::{
    AuthSigner, Balance, CreateDeploymentRequest, DeploymentSnapshot, EphemeralSigner,
    GatewayError, LogStreamParams, Network, NodeClient, SignerError, SignerStats,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Errors surfaced by provider operations.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The deployment reached a terminal status while waiting for `RUNNING`.
    #[error("launch failed: deployment entered {status}{}", message_suffix(.message))]
    LaunchTerminal { status: DeploymentStatus, message: Option<String> },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

fn message_suffix(message: &Option<String>) -> String {
    match message {
        Some(m) => format!(": {m}"),
        None => String::new(),
    }
}

/// Result of a successful launch.
#[derive(Debug, Clone)]
pub struct LaunchOutcome {
    pub deployment_id: DeploymentId,
    pub job_address: Option<JobAddress>,
    pub service_url: Option<String>,
}

/// Result of a stop request.
#[derive(Debug, Clone)]
pub struct StopOutcome {
    /// Set when the target resolved to a watched deployment.
    pub deployment_id: Option<DeploymentId>,
    /// Set when the target was stopped as a bare job address.
    pub job_address: Option<JobAddress>,
}

/// Point-in-time view of a deployment for the read endpoints.
#[derive(Debug, Clone)]
pub struct DeploymentView {
    pub snapshot: DeploymentSnapshot,
    pub watched: Option<WatchedDeployment>,
}

/// Result of a log fetch for a job.
#[derive(Debug, Clone)]
pub enum LogsOutcome {
    /// The job is terminal and its result blob is available.
    Completed(Value),
    /// The job is still running; logs must be streamed.
    Pending { state: JobState },
}

/// Network endpoints a client derives its signer and node client from.
#[derive(Debug, Clone)]
pub struct ProviderEndpoints {
    pub api_base: String,
    pub ingress_domain: String,
}

pub(crate) struct ClientInner<P: ControlPlane, C: Clock> {
    pub(crate) credential: Credential,
    pub(crate) network: Arc<dyn Network>,
    pub(crate) control: P,
    pub(crate) clock: C,
    pub(crate) signer: AuthSigner<C>,
    pub(crate) node: NodeClient,
    pub(crate) config: ProviderConfig,
    /// Single-writer-at-a-time map of everything this client watches.
    pub(crate) watched: Mutex<HashMap<DeploymentId, WatchedDeployment>>,
    pub(crate) tasks: TaskRegistry,
}

impl<P: ControlPlane, C: Clock> Drop for ClientInner<P, C> {
    fn drop(&mut self) {
        // Watchdogs hold weak references and would exit on their next
        // iteration anyway; aborting just reclaims them promptly.
        self.tasks.abort_all();
    }
}

/// Handle to one credential's provider client. Cheap to clone.
pub struct ProviderClient<P: ControlPlane, C: Clock> {
    inner: Arc<ClientInner<P, C>>,
}

impl<P: ControlPlane, C: Clock> Clone for ProviderClient<P, C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<P: ControlPlane, C: Clock> ProviderClient<P, C> {
    pub fn new(
        credential: Credential,
        network: Arc<dyn Network>,
        control: P,
        clock: C,
        config: ProviderConfig,
        endpoints: &ProviderEndpoints,
    ) -> Result<Self, ProviderError> {
        let signer = match credential.mode() {
            SignerMode::Delegated => {
                let api_key = credential
                    .api_key()
                    .ok_or_else(|| SignerError::InvalidKey("missing API key".into()))?;
                AuthSigner::delegated(&endpoints.api_base, api_key.clone(), clock.clone())?
            }
            SignerMode::Local => {
                let private_key = credential
                    .private_key()
                    .ok_or_else(|| SignerError::InvalidKey("missing private key".into()))?;
                AuthSigner::local(private_key, clock.clone())?
            }
        };
        let node = NodeClient::new(&endpoints.ingress_domain)?;
        Ok(Self {
            inner: Arc::new(ClientInner {
                credential,
                network,
                control,
                clock,
                signer,
                node,
                config,
                watched: Mutex::new(HashMap::new()),
                tasks: TaskRegistry::new(),
            }),
        })
    }

    pub fn name(&self) -> &CredentialName {
        self.inner.credential.name()
    }

    pub fn mode(&self) -> SignerMode {
        self.inner.credential.mode()
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.inner.credential.fingerprint()
    }

    pub fn signer_stats(&self) -> SignerStats {
        self.inner.signer.stats()
    }

    /// Live watchdog/handoff task count, for diagnostics.
    pub fn task_count(&self) -> usize {
        self.inner.tasks.live()
    }

    pub fn network(&self) -> Arc<dyn Network> {
        Arc::clone(&self.inner.network)
    }

    /// Launch a deployment and start watching it.
    pub async fn launch(
        &self,
        definition: Value,
        market: &str,
        confidential: bool,
        resources: ResourceSpec,
    ) -> Result<LaunchOutcome, ProviderError> {
        self.inner.launch(definition, market, confidential, resources).await
    }

    /// Mark the deployment user-stopped, then stop it on the Network. The
    /// target may be a deployment id, a job address under a watched
    /// deployment, or a bare job address.
    pub async fn stop(&self, target: &str) -> Result<StopOutcome, ProviderError> {
        let resolved = {
            let watched = self.inner.watched.lock();
            if watched.contains_key(target) {
                Some(DeploymentId::new(target))
            } else {
                watched
                    .values()
                    .find(|w| w.job_addresses.iter().any(|j| j == target))
                    .map(|w| w.deployment_id.clone())
            }
        };
        match resolved {
            Some(id) => {
                // The mark must land before the external stop call so the
                // watchdog cannot observe the termination first.
                self.mark_user_stopped(&id);
                self.inner.network.stop_deployment(&id).await?;
                info!(deployment_id = %id, "deployment stopped on user request");
                Ok(StopOutcome { deployment_id: Some(id), job_address: None })
            }
            None => {
                let job = JobAddress::new(target);
                self.inner.network.stop_job(&job).await?;
                info!(job = %job, "unwatched job stopped on user request");
                Ok(StopOutcome { deployment_id: None, job_address: Some(job) })
            }
        }
    }

    /// Flag a watched deployment so its watchdog never re-launches it.
    /// Idempotent. Returns whether the deployment was watched.
    pub fn mark_user_stopped(&self, id: &DeploymentId) -> bool {
        let mut watched = self.inner.watched.lock();
        match watched.get_mut(id) {
            Some(dep) => {
                dep.user_stopped = true;
                true
            }
            None => false,
        }
    }

    /// Flag every watched deployment. Used when this client's credential is
    /// being removed; returns the affected ids for logging.
    pub fn mark_all_user_stopped(&self) -> Vec<DeploymentId> {
        let mut watched = self.inner.watched.lock();
        let mut ids: Vec<DeploymentId> = watched.keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        for dep in watched.values_mut() {
            dep.user_stopped = true;
        }
        ids
    }

    /// Current snapshot of one deployment, Network state plus watch record.
    pub async fn describe(&self, id: &DeploymentId) -> Result<DeploymentView, ProviderError> {
        let snapshot = self.inner.network.get_deployment(id).await?;
        let watched = self.inner.watched.lock().get(id).cloned();
        Ok(DeploymentView { snapshot, watched })
    }

    /// Historical logs for a job, or `Pending` while it still runs.
    pub async fn job_logs(&self, job: &JobAddress) -> Result<LogsOutcome, ProviderError> {
        let detail = self.inner.network.get_job(job).await?;
        if detail.state.is_terminal() {
            let result = self.inner.network.get_job_logs(job).await?;
            Ok(LogsOutcome::Completed(result))
        } else {
            Ok(LogsOutcome::Pending { state: detail.state })
        }
    }

    pub async fn job_state(&self, job: &JobAddress) -> Result<depin_gateway::JobDetail, ProviderError> {
        Ok(self.inner.network.get_job(job).await?)
    }

    pub async fn balance(&self) -> Result<Balance, ProviderError> {
        Ok(self.inner.network.balance().await?)
    }

    /// Re-attach watchdogs to deployments that were running before a
    /// restart. Their definitions are gone, so they are watch-only.
    pub async fn recover(&self) -> Result<usize, ProviderError> {
        let owned = self
            .inner
            .network
            .list_owned(&[DeploymentStatus::Running, DeploymentStatus::Starting])
            .await?;
        let mut added = 0usize;
        for snapshot in owned {
            let now = self.inner.clock.epoch_ms();
            {
                let mut watched = self.inner.watched.lock();
                if watched.contains_key(snapshot.id.as_str()) {
                    continue;
                }
                let mut dep = WatchedDeployment::recovered(snapshot.id.clone(), now);
                dep.credential_name = Some(self.inner.credential.name().clone());
                dep.service_url = snapshot.service_url().map(str::to_string);
                watched.insert(snapshot.id.clone(), dep);
            }
            info!(
                deployment_id = %snapshot.id,
                credential = %self.inner.credential.name(),
                "recovered running deployment, re-attaching watchdog"
            );
            self.inner.spawn_watchdog(&snapshot.id);
            added += 1;
        }
        Ok(added)
    }

    /// Ids currently watched by this client.
    pub fn watched_ids(&self) -> Vec<DeploymentId> {
        let mut ids: Vec<DeploymentId> =
            self.inner.watched.lock().keys().cloned().collect();
        ids.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        ids
    }

    pub fn watched(&self, id: &DeploymentId) -> Option<WatchedDeployment> {
        self.inner.watched.lock().get(id).cloned()
    }

    /// Auth material for a live log stream to `node_address`. Local mode
    /// signs with the wallet; delegated mode uses a throwaway key.
    pub async fn log_stream_params(
        &self,
        node_address: &str,
        job: &JobAddress,
    ) -> Result<LogStreamParams, ProviderError> {
        let ws_url = self.inner.node.ws_url(node_address);
        let (auth_header, signer_address) = match self.inner.credential.mode() {
            SignerMode::Local => {
                let token = self.inner.signer.token(job.as_str()).await?;
                (token, self.inner.signer.address().unwrap_or_default())
            }
            SignerMode::Delegated => {
                let ephemeral = EphemeralSigner::generate();
                (ephemeral.token(job.as_str()), ephemeral.address().to_string())
            }
        };
        Ok(LogStreamParams { ws_url, job: job.clone(), auth_header, signer_address })
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<ClientInner<P, C>> {
        &self.inner
    }
}

impl<P: ControlPlane, C: Clock> ClientInner<P, C> {
    /// The full launch sequence: create, start, poll to `RUNNING`, record
    /// the job address, hand off the confidential definition, spawn the
    /// watchdog.
    pub(crate) async fn launch(
        self: &Arc<Self>,
        definition: Value,
        market: &str,
        confidential: bool,
        resources: ResourceSpec,
    ) -> Result<LaunchOutcome, ProviderError> {
        // Confidential deployments publish a placeholder; the real
        // definition goes straight to the claiming node.
        let published = if confidential {
            json!({ "confidential": true, "ops": [] })
        } else {
            definition.clone()
        };
        let request = CreateDeploymentRequest {
            name: format!("sidecar-{}", self.clock.epoch_ms()),
            market: market.to_string(),
            job_definition: published,
            replicas: 1,
            timeout_minutes: 60,
            strategy: depin_core::LaunchStrategy::SimpleExtend,
            confidential,
        };
        let id = self.network.create_deployment(&request).await?;
        info!(deployment_id = %id, market, confidential, "deployment created");

        self.network.start_deployment(&id).await?;

        let poll_started = self.clock.epoch_ms();
        let mut service_url: Option<String> = None;
        let mut running = false;
        loop {
            match self.network.get_deployment(&id).await {
                Ok(snapshot) => {
                    if snapshot.status == DeploymentStatus::Running {
                        service_url = snapshot.service_url().map(str::to_string);
                        running = true;
                        break;
                    }
                    if snapshot.status.is_terminal() {
                        return Err(ProviderError::LaunchTerminal {
                            status: snapshot.status,
                            message: snapshot.error_message,
                        });
                    }
                }
                Err(e) => {
                    warn!(deployment_id = %id, error = %e, "start poll failed, retrying");
                }
            }
            if self.clock.since_ms(poll_started) >= self.config.start_poll_horizon_ms {
                // Proceed with what we have; the watchdog will pick up the
                // job address once the deployment comes up.
                warn!(deployment_id = %id, "deployment not RUNNING within start horizon");
                break;
            }
            tokio::time::sleep(self.config.start_poll_interval).await;
        }

        let job = if running {
            match self.network.list_jobs(&id, Some(JobState::Running)).await {
                Ok(jobs) => jobs.into_iter().next(),
                Err(e) => {
                    warn!(deployment_id = %id, error = %e, "running-jobs listing failed");
                    None
                }
            }
        } else {
            None
        };

        let now = self.clock.epoch_ms();
        {
            let mut watched = self.watched.lock();
            let mut dep = WatchedDeployment::launched(
                id.clone(),
                definition.clone(),
                market,
                confidential,
                resources,
                now,
            );
            dep.credential_name = Some(self.credential.name().clone());
            dep.service_url = service_url.clone();
            if let Some(job) = &job {
                dep.job_addresses = vec![job.address.clone()];
            }
            watched.insert(id.clone(), dep);
        }

        if confidential {
            if let Some(job) = &job {
                let task = tokio::spawn(handoff::run(
                    Arc::downgrade(self),
                    id.clone(),
                    job.address.clone(),
                    definition,
                ));
                self.tasks.register(format!("handoff:{id}"), task);
            } else {
                warn!(deployment_id = %id, "no job address yet, skipping confidential handoff");
            }
        }

        self.emit_audit(AuditEvent::success(
            AuditAction::DeploymentLaunched,
            &id,
            json!({
                "deploymentId": id.as_str(),
                "jobAddress": job.as_ref().map(|j| j.address.as_str()),
                "marketAddress": market,
                "confidential": confidential,
                "serviceUrl": service_url,
            }),
        ))
        .await;

        self.spawn_watchdog(&id);

        Ok(LaunchOutcome {
            deployment_id: id,
            job_address: job.map(|j| j.address),
            service_url,
        })
    }

    pub(crate) fn spawn_watchdog(self: &Arc<Self>, id: &DeploymentId) {
        let handle = tokio::spawn(watchdog::run(Arc::downgrade(self), id.clone()));
        self.tasks.register(format!("watchdog:{id}"), handle);
    }

    /// Audit sends never fail the caller.
    pub(crate) async fn emit_audit(&self, event: AuditEvent) {
        if let Err(e) = self.control.audit(&event).await {
            warn!(action = event.action.as_str(), error = %e, "audit event dropped");
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
