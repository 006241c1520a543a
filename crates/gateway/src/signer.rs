// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth token production for compute-node requests.
//!
//! Nodes authenticate callers with an `Authorization: MESSAGE:SIGNATURE`
//! header. Local credentials sign with the wallet key and need no I/O.
//! Delegated credentials fetch signatures from the Network's signing
//! endpoint and cache them per message for five minutes; on a node-side
//! 4xx, callers invalidate the cached entry and retry once with a fresh
//! signature.

use crate::error::SignerError;
use depin_core::{Clock, Secret};
use ed25519_dalek::{Signer as _, SigningKey};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lifetime of a delegated signature.
pub(crate) const TOKEN_TTL_MS: u64 = 5 * 60 * 1000;

const SIGN_TIMEOUT: Duration = Duration::from_secs(10);

/// A signature obtained from the delegated signing endpoint.
#[derive(Debug, Clone)]
struct SignedToken {
    signature: String,
    user_address: String,
    issued_at_ms: u64,
}

/// Cache hit/miss counters, surfaced through `/health`.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct SignerStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

enum Mode {
    Local { key: SigningKey, address: String },
    Delegated { http: reqwest::Client, base: String, api_key: Secret },
}

/// Produces `MESSAGE:SIGNATURE` tokens. Mode is fixed at construction.
pub struct AuthSigner<C: Clock> {
    mode: Mode,
    cache: Mutex<HashMap<String, SignedToken>>,
    counters: Counters,
    clock: C,
}

impl<C: Clock> AuthSigner<C> {
    /// Local signer from a base58 private key (64-byte keypair or 32-byte
    /// seed).
    pub fn local(private_key: &Secret, clock: C) -> Result<Self, SignerError> {
        let key = decode_signing_key(private_key.expose())?;
        let address = bs58::encode(key.verifying_key().to_bytes()).into_string();
        Ok(Self {
            mode: Mode::Local { key, address },
            cache: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            clock,
        })
    }

    /// Delegated signer against the Network's signing endpoint.
    pub fn delegated(base_url: &str, api_key: Secret, clock: C) -> Result<Self, SignerError> {
        let http = reqwest::Client::builder()
            .timeout(SIGN_TIMEOUT)
            .build()
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;
        Ok(Self {
            mode: Mode::Delegated {
                http,
                base: base_url.trim_end_matches('/').to_string(),
                api_key,
            },
            cache: Mutex::new(HashMap::new()),
            counters: Counters::default(),
            clock,
        })
    }

    /// The address requests are authenticated as: the wallet public key in
    /// local mode, the Network-reported user address in delegated mode
    /// (known once at least one signature was issued).
    pub fn address(&self) -> Option<String> {
        match &self.mode {
            Mode::Local { address, .. } => Some(address.clone()),
            Mode::Delegated { .. } => {
                let cache = self.cache.lock();
                cache.values().next().map(|t| t.user_address.clone())
            }
        }
    }

    /// Produce an auth token for `message`.
    pub async fn token(&self, message: &str) -> Result<String, SignerError> {
        match &self.mode {
            Mode::Local { key, .. } => {
                let signature = key.sign(message.as_bytes());
                Ok(format!("{message}:{}", bs58::encode(signature.to_bytes()).into_string()))
            }
            Mode::Delegated { http, base, api_key } => {
                let now = self.clock.epoch_ms();
                if let Some(signature) = lookup(&self.cache.lock(), message, now) {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(format!("{message}:{signature}"));
                }
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                let token = fetch_signature(http, base, api_key, message).await?;
                let header = format!("{message}:{}", token.signature);
                self.cache.lock().insert(
                    message.to_string(),
                    SignedToken { issued_at_ms: now, ..token },
                );
                Ok(header)
            }
        }
    }

    /// Drop the cached signature for `message`, forcing a refetch on the
    /// next call. No-op in local mode.
    pub fn invalidate(&self, message: &str) {
        if self.cache.lock().remove(message).is_some() {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> SignerStats {
        SignerStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }
}

/// A cache entry is usable only on an exact message match within the TTL.
fn lookup(cache: &HashMap<String, SignedToken>, message: &str, now_ms: u64) -> Option<String> {
    cache
        .get(message)
        .filter(|t| now_ms.saturating_sub(t.issued_at_ms) < TOKEN_TTL_MS)
        .map(|t| t.signature.clone())
}

async fn fetch_signature(
    http: &reqwest::Client,
    base: &str,
    api_key: &Secret,
    message: &str,
) -> Result<SignedToken, SignerError> {
    let resp = http
        .post(format!("{base}/auth/sign-message/external"))
        .bearer_auth(api_key.expose())
        .json(&json!({ "message": message }))
        .send()
        .await
        .map_err(|e| SignerError::Unavailable(e.to_string()))?;
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(|e| SignerError::Unavailable(e.to_string()))?;
    if !(200..300).contains(&status) {
        return Err(SignerError::Rejected { status, body });
    }
    let value: Value =
        serde_json::from_str(&body).map_err(|e| SignerError::Unavailable(e.to_string()))?;
    let signature = value
        .get("signature")
        .and_then(Value::as_str)
        .ok_or_else(|| SignerError::Unavailable("sign response without signature".into()))?;
    let user_address =
        value.get("userAddress").and_then(Value::as_str).unwrap_or_default();
    Ok(SignedToken {
        signature: signature.to_string(),
        user_address: user_address.to_string(),
        issued_at_ms: 0,
    })
}

pub(crate) fn decode_signing_key(encoded: &str) -> Result<SigningKey, SignerError> {
    let bytes = bs58::decode(encoded)
        .into_vec()
        .map_err(|e| SignerError::InvalidKey(e.to_string()))?;
    match bytes.len() {
        // Full keypair: seed followed by the public key.
        64 => {
            let seed: [u8; 32] = bytes[..32]
                .try_into()
                .map_err(|_| SignerError::InvalidKey("truncated keypair".into()))?;
            Ok(SigningKey::from_bytes(&seed))
        }
        32 => {
            let seed: [u8; 32] = bytes[..]
                .try_into()
                .map_err(|_| SignerError::InvalidKey("truncated seed".into()))?;
            Ok(SigningKey::from_bytes(&seed))
        }
        n => Err(SignerError::InvalidKey(format!("expected 32 or 64 bytes, got {n}"))),
    }
}

/// Throwaway identity for delegated-mode log streaming, where the node only
/// checks that the header signature matches the address in the subscribe
/// frame.
pub struct EphemeralSigner {
    key: SigningKey,
    address: String,
}

impl EphemeralSigner {
    pub fn generate() -> Self {
        let key = SigningKey::generate(&mut rand::rngs::OsRng);
        let address = bs58::encode(key.verifying_key().to_bytes()).into_string();
        Self { key, address }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn token(&self, message: &str) -> String {
        let signature = self.key.sign(message.as_bytes());
        format!("{message}:{}", bs58::encode(signature.to_bytes()).into_string())
    }
}

#[cfg(test)]
#[path = "signer_tests.rs"]
mod tests;
