// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential reconciliation.
//!
//! Every ten seconds the reconciler fetches the authoritative credential
//! set from the orchestrator and converges the registry: new or changed
//! credentials get fresh provider clients (which then recover their running
//! deployments), removed credentials have their watched deployments flagged
//! user-stopped before the client goes away. Identical snapshots are
//! no-ops.

use crate::orchestrator::OrchestratorClient;
use crate::registry::ClientRegistry;
use async_trait::async_trait;
use depin_core::{Clock, ControlError, ControlPlane, Credential};
use depin_provider::{ProviderClient, ProviderError};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Reconciliation cadence.
pub const RECONCILE_INTERVAL: Duration = Duration::from_secs(10);

/// Connectivity warnings are throttled to once a minute.
const WARN_THROTTLE_MS: u64 = 60_000;

/// Where the credential snapshot comes from.
#[async_trait]
pub trait CredentialSource: Send + Sync + 'static {
    async fn fetch_credentials(&self) -> Result<Value, ControlError>;
}

#[async_trait]
impl CredentialSource for OrchestratorClient {
    async fn fetch_credentials(&self) -> Result<Value, ControlError> {
        OrchestratorClient::fetch_credentials(self).await
    }
}

/// Builds a provider client for one credential. The production factory
/// chooses the REST or on-chain gateway by credential mode.
pub trait ClientFactory<P: ControlPlane, C: Clock>: Send + Sync + 'static {
    fn build(&self, credential: &Credential) -> Result<ProviderClient<P, C>, ProviderError>;
}

impl<F, P, C> ClientFactory<P, C> for F
where
    F: Fn(&Credential) -> Result<ProviderClient<P, C>, ProviderError> + Send + Sync + 'static,
    P: ControlPlane,
    C: Clock,
{
    fn build(&self, credential: &Credential) -> Result<ProviderClient<P, C>, ProviderError> {
        self(credential)
    }
}

impl<P: ControlPlane, C: Clock> ClientFactory<P, C> for Box<dyn ClientFactory<P, C>> {
    fn build(&self, credential: &Credential) -> Result<ProviderClient<P, C>, ProviderError> {
        (**self).build(credential)
    }
}

pub struct Reconciler<S, F, P: ControlPlane, C: Clock> {
    source: S,
    factory: F,
    registry: Arc<ClientRegistry<P, C>>,
    legacy: Option<Credential>,
    clock: C,
    last_warn_ms: Mutex<u64>,
}

impl<S, F, P, C> Reconciler<S, F, P, C>
where
    S: CredentialSource,
    F: ClientFactory<P, C>,
    P: ControlPlane,
    C: Clock,
{
    pub fn new(
        source: S,
        factory: F,
        registry: Arc<ClientRegistry<P, C>>,
        legacy: Option<Credential>,
        clock: C,
    ) -> Self {
        Self { source, factory, registry, legacy, clock, last_warn_ms: Mutex::new(0) }
    }

    /// Poll-and-converge forever.
    pub async fn run(self) {
        loop {
            self.tick().await;
            tokio::time::sleep(RECONCILE_INTERVAL).await;
        }
    }

    /// One reconciliation pass. Safe to call repeatedly: identical
    /// snapshots produce zero side effects.
    pub async fn tick(&self) {
        let config = match self.source.fetch_credentials().await {
            Ok(config) => config,
            Err(e) => {
                // An unreachable orchestrator is not an emergency; keep the
                // current client set and try again next tick.
                self.throttled_warn(&e);
                return;
            }
        };
        let desired = desired_credentials(&config, self.legacy.as_ref());
        self.converge(desired).await;
    }

    async fn converge(&self, desired: Vec<Credential>) {
        let desired_names: HashSet<&str> =
            desired.iter().map(|c| c.name().as_str()).collect();

        // Retiring credentials: flag their deployments first so an
        // in-flight watchdog cannot re-launch under a revoked credential.
        // The deployments themselves keep running on the Network — the
        // sidecar does not stop work it was never asked to stop.
        for name in self.registry.names() {
            if desired_names.contains(name.as_str()) {
                continue;
            }
            if let Some(client) = self.registry.resolve(Some(name.as_str())) {
                let affected = client.mark_all_user_stopped();
                if !affected.is_empty() {
                    warn!(
                        credential = %name,
                        deployments = ?affected,
                        "credential removed with deployments in flight; they will not be redeployed"
                    );
                }
            }
            self.registry.remove(name.as_str());
            info!(credential = %name, "credential removed");
        }

        // New or changed credentials.
        for credential in desired {
            let name = credential.name().clone();
            let fingerprint = credential.fingerprint();
            if self.registry.fingerprint(name.as_str()) == Some(fingerprint) {
                continue;
            }
            match self.factory.build(&credential) {
                Ok(client) => {
                    let replaced = self.registry.fingerprint(name.as_str()).is_some();
                    self.registry.insert(client.clone());
                    info!(
                        credential = %name,
                        mode = client.mode().as_str(),
                        replaced,
                        "provider client ready"
                    );
                    match client.recover().await {
                        Ok(0) => {}
                        Ok(recovered) => {
                            info!(credential = %name, recovered, "re-attached running deployments")
                        }
                        Err(e) => {
                            warn!(credential = %name, error = %e, "deployment recovery failed")
                        }
                    }
                }
                Err(e) => {
                    // Keep whatever client the name had before; a broken
                    // rotation must not take down a working credential.
                    warn!(
                        credential = %name,
                        error = %e,
                        "failed to build provider client, retaining previous"
                    );
                }
            }
        }
    }

    fn throttled_warn(&self, error: &ControlError) {
        let now = self.clock.epoch_ms();
        let mut last = self.last_warn_ms.lock();
        if now.saturating_sub(*last) >= WARN_THROTTLE_MS {
            *last = now;
            warn!(error = %error, "credential poll failed, keeping current client set");
        }
    }
}

/// Compute the desired credential list from an orchestrator snapshot.
///
/// The legacy env-provided credential (named `default`) comes first; named
/// entries follow. Inactive, unnamed, duplicate-named, and secretless
/// entries are skipped with a warning — including a named `default` that
/// collides with the legacy entry (legacy wins).
pub fn desired_credentials(config: &Value, legacy: Option<&Credential>) -> Vec<Credential> {
    let mut out: Vec<Credential> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    if let Some(legacy) = legacy {
        seen.insert(legacy.name().as_str().to_string());
        out.push(legacy.clone());
    }

    for entry in credential_entries(config) {
        if !entry.get("active").and_then(Value::as_bool).unwrap_or(true) {
            continue;
        }
        let Some(name) = entry.get("name").and_then(Value::as_str) else {
            warn!("skipping credential entry without a name");
            continue;
        };
        let name = name.trim();
        if name.is_empty() {
            warn!("skipping credential entry with an empty name");
            continue;
        }
        if seen.contains(name) {
            warn!(credential = name, "skipping duplicate credential entry");
            continue;
        }
        let private_key = entry
            .get("privateKey")
            .and_then(Value::as_str)
            .map(depin_core::Secret::new);
        let api_key =
            entry.get("apiKey").and_then(Value::as_str).map(depin_core::Secret::new);
        match Credential::new(name, private_key, api_key) {
            Ok(credential) => {
                seen.insert(name.to_string());
                out.push(credential);
            }
            Err(e) => warn!(credential = name, error = %e, "skipping invalid credential"),
        }
    }

    out
}

/// The snapshot nests the list under `providerCredentials.nosana`; accept a
/// couple of flatter shapes for older gateways.
fn credential_entries(config: &Value) -> Vec<Value> {
    config
        .pointer("/providerCredentials/nosana")
        .or_else(|| config.get("credentials"))
        .or(Some(config))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "reconciler_tests.rs"]
mod tests;
