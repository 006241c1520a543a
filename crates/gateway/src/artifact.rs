// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Content-addressed artifact storage, used by local mode to publish job
//! definitions and fetch job results.

use crate::error::GatewayError;
use serde_json::Value;
use std::time::Duration;

const ARTIFACT_TIMEOUT: Duration = Duration::from_secs(30);

/// Multihash prefix of a CIDv0: sha2-256, 32 bytes.
const CIDV0_PREFIX: [u8; 2] = [0x12, 0x20];

/// Client for the pinning API and its read gateway.
pub struct ArtifactStore {
    http: reqwest::Client,
    api_base: String,
    gateway_base: String,
}

impl ArtifactStore {
    pub fn new(api_base: &str, gateway_base: &str) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(ARTIFACT_TIMEOUT)
            .build()
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            gateway_base: gateway_base.trim_end_matches('/').to_string(),
        })
    }

    /// Pin a job definition; returns its content hash (base58 CIDv0).
    pub async fn pin(&self, definition: &Value) -> Result<String, GatewayError> {
        let resp = self
            .http
            .post(format!("{}/pin", self.api_base))
            .json(definition)
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(GatewayError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Remote { status, body });
        }
        let value: Value =
            serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))?;
        value
            .get("hash")
            .or_else(|| value.get("cid"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| GatewayError::Decode("pin response without hash".into()))
    }

    /// Fetch a pinned artifact by content hash.
    pub async fn fetch(&self, hash: &str) -> Result<Value, GatewayError> {
        let resp = self
            .http
            .get(format!("{}/{hash}", self.gateway_base))
            .send()
            .await
            .map_err(GatewayError::from_reqwest)?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(GatewayError::from_reqwest)?;
        if !(200..300).contains(&status) {
            return Err(GatewayError::Remote { status, body });
        }
        serde_json::from_str(&body).map_err(|e| GatewayError::Decode(e.to_string()))
    }
}

/// Strip the multihash prefix from a base58 CIDv0 to get the raw digest the
/// jobs program stores on-chain.
pub(crate) fn cid_to_digest(cid: &str) -> Result<[u8; 32], GatewayError> {
    let bytes = bs58::decode(cid)
        .into_vec()
        .map_err(|e| GatewayError::Decode(format!("bad content hash: {e}")))?;
    if bytes.len() != 34 || bytes[..2] != CIDV0_PREFIX {
        return Err(GatewayError::Decode(format!(
            "content hash is not a sha2-256 CIDv0 ({} bytes)",
            bytes.len()
        )));
    }
    bytes[2..]
        .try_into()
        .map_err(|_| GatewayError::Decode("content hash digest truncated".into()))
}

/// Rebuild the base58 CIDv0 from an on-chain digest.
pub(crate) fn digest_to_cid(digest: &[u8; 32]) -> String {
    let mut bytes = Vec::with_capacity(34);
    bytes.extend_from_slice(&CIDV0_PREFIX);
    bytes.extend_from_slice(digest);
    bs58::encode(bytes).into_string()
}

#[cfg(test)]
#[path = "artifact_tests.rs"]
mod tests;
