// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! On-chain implementation of [`Network`] for local credentials.
//!
//! Local mode drives the jobs program directly over JSON-RPC: a deployment
//! is one job listing posted to a market, and polling reads the job account
//! instead of the REST deployment API. The transaction encoding here is the
//! legacy wire format (compact-u16 arrays, ed25519 over the serialized
//! message); the handful of instruction shapes the sidecar needs doesn't
//! justify a chain SDK dependency.
//!
//! Job account layout (all integers little-endian):
//!
//! ```text
//! offset   0   8  discriminator
//! offset   8  32  market
//! offset  40  32  authority (payer)
//! offset  72  32  node (zeroed until claimed)
//! offset 104   1  state: 0 queued, 1 running, 2 done, 3 stopped, 4 cancelled
//! offset 105   8  time_start (unix seconds, 0 until running)
//! offset 113   8  time_end (unix seconds, 0 until terminal)
//! offset 121   4  timeout (seconds)
//! offset 125  32  definition digest (sha2-256 of the pinned artifact)
//! offset 157  32  result digest (zeroed until posted)
//! ```

use crate::artifact::{cid_to_digest, digest_to_cid, ArtifactStore};
use crate::error::GatewayError;
use crate::network::{
    Balance, CreateDeploymentRequest, DeploymentSnapshot, JobDetail, JobSummary, Network,
};
use crate::retry::{send_mutation, with_backoff, RetryPolicy};
use async_trait::async_trait;
use depin_core::{DeploymentId, DeploymentStatus, Endpoint, JobAddress, JobState, Secret};
use ed25519_dalek::{Signer as _, SigningKey};
use serde_json::{json, Value};
use std::time::Duration;

const RPC_TIMEOUT: Duration = Duration::from_secs(30);
const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

const JOB_ACCOUNT_LEN: usize = 189;
const OFFSET_AUTHORITY: usize = 40;
const OFFSET_NODE: usize = 72;
const OFFSET_STATE: usize = 104;
const OFFSET_RESULT: usize = 157;

// Instruction tags.
const IX_POST: u8 = 0x01;
const IX_END: u8 = 0x02;
const IX_DELIST: u8 = 0x03;
const IX_EXTEND: u8 = 0x04;

type Pubkey = [u8; 32];

/// Configuration for the on-chain client. Program and mint addresses are
/// deploy-time configuration (base58).
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub jobs_program: String,
    pub nos_mint: String,
    pub ingress_domain: String,
    pub artifact_api: String,
    pub artifact_gateway: String,
}

/// Local-mode Network client: one wallet, one jobs program.
pub struct ChainNetwork {
    rpc: RpcClient,
    key: SigningKey,
    authority: Pubkey,
    jobs_program: Pubkey,
    nos_mint: Pubkey,
    ingress_domain: String,
    artifacts: ArtifactStore,
    policy: RetryPolicy,
}

impl ChainNetwork {
    pub fn new(config: &ChainConfig, private_key: &Secret) -> Result<Self, GatewayError> {
        let key = crate::signer::decode_signing_key(private_key.expose())?;
        let authority: Pubkey = key.verifying_key().to_bytes();
        Ok(Self {
            rpc: RpcClient::new(&config.rpc_url)?,
            key,
            authority,
            jobs_program: decode_pubkey("jobs program", &config.jobs_program)?,
            nos_mint: decode_pubkey("NOS mint", &config.nos_mint)?,
            ingress_domain: config.ingress_domain.clone(),
            artifacts: ArtifactStore::new(&config.artifact_api, &config.artifact_gateway)?,
            policy: RetryPolicy::default(),
        })
    }

    async fn job_account(&self, job: &JobAddress) -> Result<Option<JobAccount>, GatewayError> {
        let pubkey = job.as_str();
        let value = self
            .rpc
            .call("getAccountInfo", json!([pubkey, { "encoding": "base64" }]))
            .await?;
        let Some(account) = value.get("value").filter(|v| !v.is_null()) else {
            return Ok(None);
        };
        let data_b64 = account
            .get("data")
            .and_then(Value::as_array)
            .and_then(|d| d.first())
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Decode("account without data".into()))?;
        let bytes = base64_decode(data_b64)?;
        parse_job_account(&bytes).map(Some)
    }

    async fn send_instruction(
        &self,
        op_name: &'static str,
        job: Pubkey,
        data: Vec<u8>,
    ) -> Result<String, GatewayError> {
        let data = &data;
        send_mutation(&self.policy, op_name, move || async move {
            let blockhash = self.latest_blockhash().await?;
            // Keys: authority signs and pays; the job account is written.
            let keys = vec![self.authority, job, self.jobs_program];
            let tx = encode_legacy_tx(TxParts {
                keys: &keys,
                num_signers: 1,
                num_readonly_unsigned: 1,
                blockhash,
                program_index: 2,
                account_indices: &[0, 1],
                data,
                signers: &[&self.key],
            })?;
            self.rpc.send_transaction(&tx).await
        })
        .await
    }

    async fn latest_blockhash(&self) -> Result<Pubkey, GatewayError> {
        let value = self.rpc.call("getLatestBlockhash", json!([])).await?;
        let hash = value
            .get("value")
            .and_then(|v| v.get("blockhash"))
            .and_then(Value::as_str)
            .ok_or_else(|| GatewayError::Decode("getLatestBlockhash without blockhash".into()))?;
        decode_pubkey("blockhash", hash)
    }

    fn snapshot_from_account(&self, job: &JobAddress, account: &JobAccount) -> DeploymentSnapshot {
        let endpoints = match account.node {
            Some(node) if account.state == JobState::Running => vec![Endpoint {
                url: format!("https://{}.{}", bs58::encode(node).into_string(), self.ingress_domain),
            }],
            _ => Vec::new(),
        };
        DeploymentSnapshot {
            id: DeploymentId::new(job.as_str()),
            status: deployment_status_for(account.state),
            endpoints,
            error_message: None,
        }
    }
}

/// In local mode a deployment is a single job listing, so job state maps
/// straight onto deployment status.
fn deployment_status_for(state: JobState) -> DeploymentStatus {
    match state {
        JobState::Queued => DeploymentStatus::Starting,
        JobState::Running => DeploymentStatus::Running,
        JobState::Completed | JobState::Stopped | JobState::Cancelled => DeploymentStatus::Stopped,
    }
}

#[async_trait]
impl Network for ChainNetwork {
    async fn create_deployment(
        &self,
        req: &CreateDeploymentRequest,
    ) -> Result<DeploymentId, GatewayError> {
        let cid = self.artifacts.pin(&req.job_definition).await?;
        let digest = cid_to_digest(&cid)?;
        let market = decode_pubkey("market", &req.market)?;

        // The job account is a fresh keypair that co-signs its own creation;
        // its public key is the job (and deployment) address.
        let job_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let job: Pubkey = job_key.verifying_key().to_bytes();

        let mut data = Vec::with_capacity(1 + 4 + 32);
        data.push(IX_POST);
        data.extend_from_slice(&((req.timeout_minutes * 60) as u32).to_le_bytes());
        data.extend_from_slice(&digest);

        let data = &data;
        let job_key = &job_key;
        send_mutation(&self.policy, "post_job", move || async move {
            let blockhash = self.latest_blockhash().await?;
            // The job account leads the key table so the derived address is
            // the first account of the instruction.
            let keys = vec![job, self.authority, market, self.jobs_program];
            let tx = encode_legacy_tx(TxParts {
                keys: &keys,
                num_signers: 2,
                num_readonly_unsigned: 1,
                blockhash,
                program_index: 3,
                account_indices: &[0, 1, 2],
                data,
                signers: &[job_key, &self.key],
            })?;
            self.rpc.send_transaction(&tx).await
        })
        .await?;

        Ok(DeploymentId::new(bs58::encode(job).into_string()))
    }

    async fn start_deployment(
        &self,
        _id: &DeploymentId,
    ) -> Result<DeploymentStatus, GatewayError> {
        // Posting the listing already queues it; there is no separate start.
        Ok(DeploymentStatus::Starting)
    }

    async fn get_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentSnapshot, GatewayError> {
        with_backoff(&self.policy, "get_deployment", move || async move {
            let job = JobAddress::new(id.as_str());
            match self.job_account(&job).await? {
                Some(account) => Ok(self.snapshot_from_account(&job, &account)),
                // A delisted job's account is closed; treat it as stopped.
                None => Ok(DeploymentSnapshot {
                    id: id.clone(),
                    status: DeploymentStatus::Stopped,
                    endpoints: Vec::new(),
                    error_message: None,
                }),
            }
        })
        .await
    }

    async fn stop_deployment(
        &self,
        id: &DeploymentId,
    ) -> Result<DeploymentStatus, GatewayError> {
        self.stop_job(&JobAddress::new(id.as_str())).await?;
        Ok(DeploymentStatus::Stopped)
    }

    async fn update_timeout(&self, _id: &DeploymentId, _minutes: u64) -> Result<u64, GatewayError> {
        // No absolute-timeout instruction on-chain; callers use extend_job.
        Err(GatewayError::Unsupported)
    }

    async fn list_jobs(
        &self,
        id: &DeploymentId,
        state: Option<JobState>,
    ) -> Result<Vec<JobSummary>, GatewayError> {
        let job = JobAddress::new(id.as_str());
        let detail = self.get_job(&job).await?;
        let matches = state.map(|s| s == detail.state).unwrap_or(true);
        Ok(if matches {
            vec![JobSummary {
                address: detail.address,
                state: detail.state,
                node_address: detail.node_address,
            }]
        } else {
            Vec::new()
        })
    }

    async fn get_job(&self, job: &JobAddress) -> Result<JobDetail, GatewayError> {
        with_backoff(&self.policy, "get_job", move || async move {
            match self.job_account(job).await? {
                Some(account) => Ok(JobDetail {
                    address: job.clone(),
                    state: account.state,
                    node_address: account.node.map(|n| bs58::encode(n).into_string()),
                    result: None,
                }),
                None => Ok(JobDetail {
                    address: job.clone(),
                    state: JobState::Stopped,
                    node_address: None,
                    result: None,
                }),
            }
        })
        .await
    }

    async fn get_job_logs(&self, job: &JobAddress) -> Result<Value, GatewayError> {
        let account = self
            .job_account(job)
            .await?
            .ok_or_else(|| GatewayError::Remote { status: 404, body: "job account closed".into() })?;
        let digest = account.result.ok_or_else(|| GatewayError::Remote {
            status: 404,
            body: "no result posted yet".into(),
        })?;
        self.artifacts.fetch(&digest_to_cid(&digest)).await
    }

    async fn stop_job(&self, job: &JobAddress) -> Result<(), GatewayError> {
        let pubkey = decode_pubkey("job", job.as_str())?;
        let tag = match self.job_account(job).await? {
            // Queued listings are delisted (reclaims the deposit); running
            // jobs are ended.
            Some(account) if account.state == JobState::Queued => IX_DELIST,
            Some(account) if account.state == JobState::Running => IX_END,
            // Already terminal or closed: stop is a no-op.
            _ => return Ok(()),
        };
        self.send_instruction("stop_job", pubkey, vec![tag]).await?;
        Ok(())
    }

    async fn extend_job(&self, job: &JobAddress, seconds: u64) -> Result<(), GatewayError> {
        let pubkey = decode_pubkey("job", job.as_str())?;
        let mut data = Vec::with_capacity(5);
        data.push(IX_EXTEND);
        data.extend_from_slice(&(seconds as u32).to_le_bytes());
        self.send_instruction("extend_job", pubkey, data).await?;
        Ok(())
    }

    async fn balance(&self) -> Result<Balance, GatewayError> {
        with_backoff(&self.policy, "balance", move || async move {
            let owner = bs58::encode(self.authority).into_string();
            let lamports = self
                .rpc
                .call("getBalance", json!([owner]))
                .await?
                .get("value")
                .and_then(Value::as_u64)
                .unwrap_or(0);

            let accounts = self
                .rpc
                .call(
                    "getTokenAccountsByOwner",
                    json!([
                        owner,
                        { "mint": bs58::encode(self.nos_mint).into_string() },
                        { "encoding": "jsonParsed" },
                    ]),
                )
                .await?;
            let nos = accounts
                .get("value")
                .and_then(Value::as_array)
                .map(|list| list.iter().map(parsed_token_amount).sum())
                .unwrap_or(0.0);

            Ok(Balance::Wallet { sol: lamports as f64 / LAMPORTS_PER_SOL, nos })
        })
        .await
    }

    async fn list_owned(
        &self,
        statuses: &[DeploymentStatus],
    ) -> Result<Vec<DeploymentSnapshot>, GatewayError> {
        with_backoff(&self.policy, "list_owned", move || async move {
            let value = self
                .rpc
                .call(
                    "getProgramAccounts",
                    json!([
                        bs58::encode(self.jobs_program).into_string(),
                        {
                            "encoding": "base64",
                            "filters": [{
                                "memcmp": {
                                    "offset": OFFSET_AUTHORITY,
                                    "bytes": bs58::encode(self.authority).into_string(),
                                }
                            }],
                        },
                    ]),
                )
                .await?;
            let mut snapshots = Vec::new();
            for entry in value.as_array().into_iter().flatten() {
                let Some(pubkey) = entry.get("pubkey").and_then(Value::as_str) else {
                    continue;
                };
                let Some(data_b64) = entry
                    .get("account")
                    .and_then(|a| a.get("data"))
                    .and_then(Value::as_array)
                    .and_then(|d| d.first())
                    .and_then(Value::as_str)
                else {
                    continue;
                };
                let Ok(bytes) = base64_decode(data_b64) else { continue };
                let Ok(account) = parse_job_account(&bytes) else { continue };
                let snapshot =
                    self.snapshot_from_account(&JobAddress::new(pubkey), &account);
                if statuses.contains(&snapshot.status) {
                    snapshots.push(snapshot);
                }
            }
            Ok(snapshots)
        })
        .await
    }
}

fn parsed_token_amount(entry: &Value) -> f64 {
    entry
        .pointer("/account/data/parsed/info/tokenAmount/uiAmount")
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

/// Minimal JSON-RPC 2.0 client.
struct RpcClient {
    http: reqwest::Client,
    url: String,
}

impl RpcClient {
    fn new(url: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(RPC_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self { http, url: url.to_string() })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .post(&self.url)
            .json(&json!({ "jsonrpc": "2.0", "id": 1, "method": method, "params": params }))
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        let status = resp.status().as_u16();
        if status == 429 {
            return Err(GatewayError::RateLimited);
        }
        let body = resp.text().await.map_err(GatewayError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Remote { status, body });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        if let Some(error) = value.get("error").filter(|e| !e.is_null()) {
            return Err(GatewayError::Remote { status: 400, body: error.to_string() });
        }
        value
            .get("result")
            .cloned()
            .ok_or_else(|| GatewayError::Decode(format!("{method} response without result")))
    }

    async fn send_transaction(&self, tx_base64: &str) -> Result<String, GatewayError> {
        let value = self
            .call("sendTransaction", json!([tx_base64, { "encoding": "base64" }]))
            .await?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Decode("sendTransaction without signature".into()))
    }
}

/// Parsed job account.
#[derive(Debug, Clone, PartialEq)]
struct JobAccount {
    state: JobState,
    node: Option<Pubkey>,
    result: Option<Pubkey>,
}

fn parse_job_account(bytes: &[u8]) -> Result<JobAccount, GatewayError> {
    if bytes.len() < JOB_ACCOUNT_LEN {
        return Err(GatewayError::Decode(format!(
            "job account too short: {} bytes",
            bytes.len()
        )));
    }
    let state = match bytes[OFFSET_STATE] {
        0 => JobState::Queued,
        1 => JobState::Running,
        2 => JobState::Completed,
        3 => JobState::Stopped,
        4 => JobState::Cancelled,
        other => {
            return Err(GatewayError::Decode(format!("unknown job state byte {other}")));
        }
    };
    Ok(JobAccount {
        state,
        node: read_optional_pubkey(&bytes[OFFSET_NODE..OFFSET_NODE + 32]),
        result: read_optional_pubkey(&bytes[OFFSET_RESULT..OFFSET_RESULT + 32]),
    })
}

/// An all-zero field means "not set".
fn read_optional_pubkey(slice: &[u8]) -> Option<Pubkey> {
    let bytes: Pubkey = slice.try_into().ok()?;
    if bytes == [0u8; 32] {
        None
    } else {
        Some(bytes)
    }
}

fn decode_pubkey(what: &str, encoded: &str) -> Result<Pubkey, GatewayError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| GatewayError::Decode(format!("bad {what} address: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| GatewayError::Decode(format!("{what} address is not 32 bytes")))
}

fn base64_decode(data: &str) -> Result<Vec<u8>, GatewayError> {
    use base64::Engine as _;
    base64::engine::general_purpose::STANDARD
        .decode(data)
        .map_err(|e| GatewayError::Decode(format!("bad base64 account data: {e}")))
}

/// Compact-u16 length prefix used throughout the legacy wire format.
fn compact_len(mut n: u16) -> Vec<u8> {
    let mut out = Vec::with_capacity(3);
    loop {
        let mut byte = (n & 0x7f) as u8;
        n >>= 7;
        if n != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if n == 0 {
            return out;
        }
    }
}

struct TxParts<'a> {
    keys: &'a [Pubkey],
    num_signers: u8,
    num_readonly_unsigned: u8,
    blockhash: Pubkey,
    program_index: u8,
    account_indices: &'a [u8],
    data: &'a [u8],
    signers: &'a [&'a SigningKey],
}

/// Serialize and sign a single-instruction legacy transaction, returning it
/// base64-encoded for `sendTransaction`.
fn encode_legacy_tx(parts: TxParts<'_>) -> Result<String, GatewayError> {
    if parts.signers.len() != parts.num_signers as usize {
        return Err(GatewayError::Decode(format!(
            "{} signers provided for a header requiring {}",
            parts.signers.len(),
            parts.num_signers
        )));
    }

    let mut message = Vec::with_capacity(128);
    message.push(parts.num_signers);
    message.push(0); // no readonly signed accounts in any of our shapes
    message.push(parts.num_readonly_unsigned);
    message.extend_from_slice(&compact_len(parts.keys.len() as u16));
    for key in parts.keys {
        message.extend_from_slice(key);
    }
    message.extend_from_slice(&parts.blockhash);
    message.extend_from_slice(&compact_len(1));
    message.push(parts.program_index);
    message.extend_from_slice(&compact_len(parts.account_indices.len() as u16));
    message.extend_from_slice(parts.account_indices);
    message.extend_from_slice(&compact_len(parts.data.len() as u16));
    message.extend_from_slice(parts.data);

    let mut tx = Vec::with_capacity(64 * parts.signers.len() + message.len() + 1);
    tx.extend_from_slice(&compact_len(parts.signers.len() as u16));
    for signer in parts.signers {
        let signature = signer.sign(&message);
        tx.extend_from_slice(&signature.to_bytes());
    }
    tx.extend_from_slice(&message);

    use base64::Engine as _;
    Ok(base64::engine::general_purpose::STANDARD.encode(tx))
}

#[cfg(test)]
#[path = "chain_tests.rs"]
mod tests;
