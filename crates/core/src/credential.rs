// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential records and their fingerprints.
//!
//! A credential is identified by its name; equivalence between two
//! credentials with the same name is decided by the fingerprint of the
//! secret pair. The reconciler never mutates a credential in place — a
//! changed fingerprint means the old provider client is decommissioned and
//! a new one built.

use crate::id::CredentialName;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// A secret value (private key or API key). Redacted from `Debug` output so
/// credential material never lands in logs.
#[derive(Clone, PartialEq, Eq, serde::Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Which signing path a provider client uses. Fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignerMode {
    /// Holds a wallet private key and signs locally.
    Local,
    /// Holds an API key and signs through the Network's signing endpoint.
    Delegated,
}

impl SignerMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignerMode::Local => "local",
            SignerMode::Delegated => "delegated",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error("credential {0:?} has neither a private key nor an API key")]
    NoSecret(String),

    #[error("credential name is empty")]
    EmptyName,
}

/// Named authentication material granting access to the Network under one
/// identity.
#[derive(Debug, Clone)]
pub struct Credential {
    name: CredentialName,
    private_key: Option<Secret>,
    api_key: Option<Secret>,
}

impl Credential {
    /// Build a credential, enforcing the at-least-one-secret invariant.
    /// Names are trimmed; an empty trimmed name is rejected.
    pub fn new(
        name: &str,
        private_key: Option<Secret>,
        api_key: Option<Secret>,
    ) -> Result<Self, CredentialError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CredentialError::EmptyName);
        }
        let private_key = private_key.filter(|s| !s.is_empty());
        let api_key = api_key.filter(|s| !s.is_empty());
        if private_key.is_none() && api_key.is_none() {
            return Err(CredentialError::NoSecret(name.to_string()));
        }
        Ok(Self { name: CredentialName::new(name), private_key, api_key })
    }

    pub fn name(&self) -> &CredentialName {
        &self.name
    }

    pub fn private_key(&self) -> Option<&Secret> {
        self.private_key.as_ref()
    }

    pub fn api_key(&self) -> Option<&Secret> {
        self.api_key.as_ref()
    }

    /// An API key selects the delegated path even when a private key is also
    /// present; the private key alone selects local signing.
    pub fn mode(&self) -> SignerMode {
        if self.api_key.is_some() {
            SignerMode::Delegated
        } else {
            SignerMode::Local
        }
    }

    /// Hash of the secret pair. Two credentials with the same name but a
    /// different fingerprint are different credentials.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut hasher = Sha256::new();
        hasher.update(self.private_key.as_ref().map(Secret::expose).unwrap_or(""));
        hasher.update([0u8]);
        hasher.update(self.api_key.as_ref().map(Secret::expose).unwrap_or(""));
        Fingerprint(hasher.finalize().into())
    }
}

/// Opaque digest of a credential's secret pair.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint([u8; 32]);

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // First four bytes are enough to correlate log lines without
        // leaking a meaningful amount of the digest.
        write!(f, "Fingerprint({:02x}{:02x}{:02x}{:02x}…)", self.0[0], self.0[1], self.0[2], self.0[3])
    }
}

#[cfg(test)]
#[path = "credential_tests.rs"]
mod tests;
