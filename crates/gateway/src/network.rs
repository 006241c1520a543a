// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Network operation set, abstracted over credential mode.
//!
//! [`crate::RestNetwork`] (delegated) and [`crate::ChainNetwork`] (local)
//! both implement [`Network`]; provider clients and watchdogs only ever see
//! this trait, which is what lets the loop logic run against
//! [`FakeNetwork`] in tests.

use crate::error::GatewayError;
use async_trait::async_trait;
use depin_core::{
    DeploymentId, DeploymentStatus, Endpoint, JobAddress, JobState, LaunchStrategy,
};
use serde_json::Value;

/// Inputs to deployment creation.
#[derive(Debug, Clone)]
pub struct CreateDeploymentRequest {
    pub name: String,
    pub market: String,
    /// The published definition. For confidential deployments this is the
    /// placeholder; the real definition goes directly to the node.
    pub job_definition: Value,
    pub replicas: u32,
    pub timeout_minutes: u64,
    pub strategy: LaunchStrategy,
    pub confidential: bool,
}

/// One snapshot of a deployment's observable state.
#[derive(Debug, Clone)]
pub struct DeploymentSnapshot {
    pub id: DeploymentId,
    pub status: DeploymentStatus,
    pub endpoints: Vec<Endpoint>,
    pub error_message: Option<String>,
}

impl DeploymentSnapshot {
    pub fn service_url(&self) -> Option<&str> {
        self.endpoints.first().map(|e| e.url.as_str())
    }
}

/// A job as listed under a deployment.
#[derive(Debug, Clone)]
pub struct JobSummary {
    pub address: JobAddress,
    pub state: JobState,
    pub node_address: Option<String>,
}

/// Detailed job view, including the posted result once terminal.
#[derive(Debug, Clone)]
pub struct JobDetail {
    pub address: JobAddress,
    pub state: JobState,
    pub node_address: Option<String>,
    pub result: Option<Value>,
}

/// Account balance, shaped by credential mode.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum Balance {
    /// Delegated mode: credit accounting on the Network side.
    Credits { assigned: f64, reserved: f64, settled: f64 },
    /// Local mode: wallet holdings.
    Wallet { sol: f64, nos: f64 },
}

/// Typed facade over the Network.
///
/// All operations may fail with [`GatewayError::RateLimited`],
/// [`GatewayError::Transport`], or [`GatewayError::Remote`]. Implementations
/// apply the retry policy internally; callers never re-wrap these in loops.
#[async_trait]
pub trait Network: Send + Sync + 'static {
    /// Create a deployment in `DRAFT` state.
    async fn create_deployment(
        &self,
        req: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, GatewayError>;

    /// Transition a drafted deployment to `STARTING`.
    async fn start_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentStatus, GatewayError>;

    async fn get_deployment(&self, id: &DeploymentId)
        -> Result<DeploymentSnapshot, GatewayError>;

    /// Idempotent; a no-op on already-terminal deployments.
    async fn stop_deployment(&self, id: &DeploymentId)
        -> Result<DeploymentStatus, GatewayError>;

    /// Set the deployment timeout to an absolute number of minutes. Returns
    /// the applied timeout. [`GatewayError::Unsupported`] directs callers to
    /// the per-job extend fallback.
    async fn update_timeout(
        &self,
        id: &DeploymentId,
        minutes: u64,
    ) -> Result<u64, GatewayError>;

    async fn list_jobs(
        &self,
        id: &DeploymentId,
        state: Option<JobState>,
    ) -> Result<Vec<JobSummary>, GatewayError>;

    async fn get_job(&self, job: &JobAddress) -> Result<JobDetail, GatewayError>;

    /// The job's result blob (historical logs live in here). Free-form.
    async fn get_job_logs(&self, job: &JobAddress) -> Result<Value, GatewayError>;

    async fn stop_job(&self, job: &JobAddress) -> Result<(), GatewayError>;

    async fn extend_job(&self, job: &JobAddress, seconds: u64) -> Result<(), GatewayError>;

    async fn balance(&self) -> Result<Balance, GatewayError>;

    /// Deployments owned by this credential in any of `statuses`. Used for
    /// watchdog recovery after a restart.
    async fn list_owned(
        &self,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<DeploymentSnapshot>, GatewayError>;
}

#[cfg(any(test, feature = "test-support"))]
#[cfg_attr(coverage_nightly, coverage(off))]
mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::{HashMap, VecDeque};
    use std::sync::Arc;

    /// A recorded Network call.
    #[derive(Debug, Clone, PartialEq)]
    pub enum NetworkCall {
        Create { market: String, confidential: bool },
        Start(DeploymentId),
        Get(DeploymentId),
        Stop(DeploymentId),
        UpdateTimeout { id: DeploymentId, minutes: u64 },
        ListJobs { id: DeploymentId, state: Option<JobState> },
        GetJob(JobAddress),
        GetJobLogs(JobAddress),
        StopJob(JobAddress),
        ExtendJob { job: JobAddress, seconds: u64 },
        Balance,
        ListOwned,
    }

    #[derive(Default)]
    struct FakeState {
        calls: Vec<NetworkCall>,
        create_results: VecDeque<Result<DeploymentId, GatewayError>>,
        start_results: VecDeque<Result<DeploymentStatus, GatewayError>>,
        // Snapshot sequences per deployment; the last entry repeats forever.
        snapshots: HashMap<DeploymentId, VecDeque<DeploymentSnapshot>>,
        stop_results: VecDeque<Result<DeploymentStatus, GatewayError>>,
        update_timeout_results: VecDeque<Result<u64, GatewayError>>,
        jobs: HashMap<DeploymentId, Vec<JobSummary>>,
        job_details: HashMap<JobAddress, VecDeque<JobDetail>>,
        job_logs: HashMap<JobAddress, Value>,
        extend_results: VecDeque<Result<(), GatewayError>>,
        owned: Vec<DeploymentSnapshot>,
        balance: Option<Balance>,
    }

    /// Scripted Network for tests: responses are queued per operation and
    /// every call is recorded.
    #[derive(Clone, Default)]
    pub struct FakeNetwork {
        state: Arc<Mutex<FakeState>>,
    }

    impl FakeNetwork {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn calls(&self) -> Vec<NetworkCall> {
            self.state.lock().calls.clone()
        }

        pub fn push_create(&self, result: Result<DeploymentId, GatewayError>) {
            self.state.lock().create_results.push_back(result);
        }

        pub fn push_start(&self, result: Result<DeploymentStatus, GatewayError>) {
            self.state.lock().start_results.push_back(result);
        }

        /// Queue a snapshot for `get_deployment`. The final queued snapshot
        /// keeps being served once the queue drains.
        pub fn push_snapshot(&self, snapshot: DeploymentSnapshot) {
            self.state
                .lock()
                .snapshots
                .entry(snapshot.id.clone())
                .or_default()
                .push_back(snapshot);
        }

        pub fn push_stop(&self, result: Result<DeploymentStatus, GatewayError>) {
            self.state.lock().stop_results.push_back(result);
        }

        pub fn push_update_timeout(&self, result: Result<u64, GatewayError>) {
            self.state.lock().update_timeout_results.push_back(result);
        }

        pub fn set_jobs(&self, id: &DeploymentId, jobs: Vec<JobSummary>) {
            self.state.lock().jobs.insert(id.clone(), jobs);
        }

        pub fn push_job_detail(&self, detail: JobDetail) {
            self.state
                .lock()
                .job_details
                .entry(detail.address.clone())
                .or_default()
                .push_back(detail);
        }

        pub fn set_job_logs(&self, job: &JobAddress, logs: Value) {
            self.state.lock().job_logs.insert(job.clone(), logs);
        }

        pub fn push_extend(&self, result: Result<(), GatewayError>) {
            self.state.lock().extend_results.push_back(result);
        }

        pub fn set_owned(&self, owned: Vec<DeploymentSnapshot>) {
            self.state.lock().owned = owned;
        }

        pub fn set_balance(&self, balance: Balance) {
            self.state.lock().balance = Some(balance);
        }

        fn record(&self, call: NetworkCall) {
            self.state.lock().calls.push(call);
        }
    }

    fn unscripted<T>(op: &str) -> Result<T, GatewayError> {
        Err(GatewayError::Decode(format!("FakeNetwork: no scripted response for {op}")))
    }

    #[async_trait]
    impl Network for FakeNetwork {
        async fn create_deployment(
            &self,
            req: &CreateDeploymentRequest,
        ) -> Result<DeploymentId, GatewayError> {
            self.record(NetworkCall::Create {
                market: req.market.clone(),
                confidential: req.confidential,
            });
            self.state.lock().create_results.pop_front().unwrap_or_else(|| unscripted("create"))
        }

        async fn start_deployment(
            &self,
            id: &DeploymentId,
        ) -> Result<DeploymentStatus, GatewayError> {
            self.record(NetworkCall::Start(id.clone()));
            self.state.lock().start_results.pop_front().unwrap_or_else(|| unscripted("start"))
        }

        async fn get_deployment(
            &self,
            id: &DeploymentId,
        ) -> Result<DeploymentSnapshot, GatewayError> {
            self.record(NetworkCall::Get(id.clone()));
            let mut state = self.state.lock();
            let queue = state.snapshots.get_mut(id).ok_or_else(|| {
                GatewayError::Remote { status: 404, body: format!("unknown deployment {id}") }
            })?;
            if queue.len() > 1 {
                if let Some(snapshot) = queue.pop_front() {
                    return Ok(snapshot);
                }
            }
            queue.front().cloned().ok_or_else(|| GatewayError::Remote {
                status: 404,
                body: format!("unknown deployment {id}"),
            })
        }

        async fn stop_deployment(
            &self,
            id: &DeploymentId,
        ) -> Result<DeploymentStatus, GatewayError> {
            self.record(NetworkCall::Stop(id.clone()));
            self.state
                .lock()
                .stop_results
                .pop_front()
                .unwrap_or(Ok(DeploymentStatus::Stopped))
        }

        async fn update_timeout(
            &self,
            id: &DeploymentId,
            minutes: u64,
        ) -> Result<u64, GatewayError> {
            self.record(NetworkCall::UpdateTimeout { id: id.clone(), minutes });
            self.state.lock().update_timeout_results.pop_front().unwrap_or(Ok(minutes))
        }

        async fn list_jobs(
            &self,
            id: &DeploymentId,
            state: Option<JobState>,
        ) -> Result<Vec<JobSummary>, GatewayError> {
            self.record(NetworkCall::ListJobs { id: id.clone(), state });
            let jobs = self.state.lock().jobs.get(id).cloned().unwrap_or_default();
            Ok(match state {
                Some(wanted) => jobs.into_iter().filter(|j| j.state == wanted).collect(),
                None => jobs,
            })
        }

        async fn get_job(&self, job: &JobAddress) -> Result<JobDetail, GatewayError> {
            self.record(NetworkCall::GetJob(job.clone()));
            let mut state = self.state.lock();
            let queue = state.job_details.get_mut(job).ok_or_else(|| GatewayError::Remote {
                status: 404,
                body: format!("unknown job {job}"),
            })?;
            if queue.len() > 1 {
                if let Some(detail) = queue.pop_front() {
                    return Ok(detail);
                }
            }
            queue.front().cloned().ok_or_else(|| GatewayError::Remote {
                status: 404,
                body: format!("unknown job {job}"),
            })
        }

        async fn get_job_logs(&self, job: &JobAddress) -> Result<Value, GatewayError> {
            self.record(NetworkCall::GetJobLogs(job.clone()));
            self.state
                .lock()
                .job_logs
                .get(job)
                .cloned()
                .ok_or_else(|| GatewayError::Remote {
                    status: 404,
                    body: format!("no result for job {job}"),
                })
        }

        async fn stop_job(&self, job: &JobAddress) -> Result<(), GatewayError> {
            self.record(NetworkCall::StopJob(job.clone()));
            Ok(())
        }

        async fn extend_job(&self, job: &JobAddress, seconds: u64) -> Result<(), GatewayError> {
            self.record(NetworkCall::ExtendJob { job: job.clone(), seconds });
            self.state.lock().extend_results.pop_front().unwrap_or(Ok(()))
        }

        async fn balance(&self) -> Result<Balance, GatewayError> {
            self.record(NetworkCall::Balance);
            self.state
                .lock()
                .balance
                .clone()
                .ok_or_else(|| GatewayError::Decode("FakeNetwork: no scripted balance".into()))
        }

        async fn list_owned(
            &self,
            statuses: &[DeploymentStatus],
        ) -> Result<Vec<DeploymentSnapshot>, GatewayError> {
            self.record(NetworkCall::ListOwned);
            Ok(self
                .state
                .lock()
                .owned
                .iter()
                .filter(|s| statuses.contains(&s.status))
                .cloned()
                .collect())
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeNetwork, NetworkCall};
