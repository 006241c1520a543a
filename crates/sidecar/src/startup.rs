// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process assembly: registry, reconciler, HTTP server.
//!
//! The listener binds before the reconciler spawns so `/health` answers
//! immediately; credential convergence happens in the background. The only
//! fatal errors are configuration and port binding — everything after that
//! is retried forever by the loops that own it.

use crate::env::{SidecarEnv, StartupError};
use crate::orchestrator::OrchestratorClient;
use crate::reconciler::Reconciler;
use crate::registry::ClientRegistry;
use crate::router::{router, AppState};
use depin_core::{Credential, SignerMode, SystemClock};
use depin_gateway::{ChainConfig, ChainNetwork, Network, RestNetwork, SignerError};
use depin_provider::{ProviderClient, ProviderConfig, ProviderEndpoints, ProviderError};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// The concrete client type this process runs.
pub type SidecarClient = ProviderClient<OrchestratorClient, SystemClock>;

/// Build the per-credential client factory: REST gateway for delegated
/// credentials, the on-chain gateway for local ones.
fn factory(
    env: SidecarEnv,
    control: OrchestratorClient,
) -> impl Fn(&Credential) -> Result<SidecarClient, ProviderError> + Send + Sync + 'static {
    move |credential| {
        let network: Arc<dyn Network> = match credential.mode() {
            SignerMode::Delegated => {
                let api_key = credential
                    .api_key()
                    .cloned()
                    .ok_or_else(|| SignerError::InvalidKey("missing API key".into()))
                    .map_err(depin_gateway::GatewayError::from)?;
                Arc::new(RestNetwork::new(&env.nosana_api_url, api_key)?)
            }
            SignerMode::Local => {
                let private_key = credential
                    .private_key()
                    .ok_or_else(|| SignerError::InvalidKey("missing private key".into()))
                    .map_err(depin_gateway::GatewayError::from)?;
                let config = ChainConfig {
                    rpc_url: env.solana_rpc_url.clone(),
                    jobs_program: env.jobs_program.clone(),
                    nos_mint: env.nos_mint.clone(),
                    ingress_domain: env.ingress_domain.clone(),
                    artifact_api: env.artifact_api.clone(),
                    artifact_gateway: env.artifact_gateway.clone(),
                };
                Arc::new(ChainNetwork::new(&config, private_key)?)
            }
        };
        ProviderClient::new(
            credential.clone(),
            network,
            control.clone(),
            SystemClock,
            ProviderConfig::default(),
            &ProviderEndpoints {
                api_base: env.nosana_api_url.clone(),
                ingress_domain: env.ingress_domain.clone(),
            },
        )
    }
}

/// The legacy env-configured credential, when present. Always named
/// `default`; named orchestrator entries with the same name are skipped.
fn legacy_credential(env: &SidecarEnv) -> Option<Credential> {
    if env.legacy_api_key.is_none() && env.legacy_private_key.is_none() {
        return None;
    }
    match Credential::new(
        "default",
        env.legacy_private_key.clone(),
        env.legacy_api_key.clone(),
    ) {
        Ok(credential) => {
            info!(mode = credential.mode().as_str(), "legacy default credential configured");
            Some(credential)
        }
        Err(e) => {
            warn!(error = %e, "ignoring invalid legacy credential from environment");
            None
        }
    }
}

/// Run the sidecar until the process dies. There is no graceful drain:
/// watchdogs re-attach from Network state on the next start.
pub async fn run(env: SidecarEnv) -> Result<(), StartupError> {
    let orchestrator = OrchestratorClient::new(
        &env.api_gateway_url,
        &env.orchestrator_url,
        env.internal_api_key.clone(),
    )
    .map_err(|e| StartupError::Init { what: "orchestrator client", reason: e.to_string() })?;

    let registry = Arc::new(ClientRegistry::new());
    let state = Arc::new(AppState {
        registry: Arc::clone(&registry),
        started: Instant::now(),
        config_source: env.config_source(),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", env.port))
        .await
        .map_err(|e| StartupError::Bind { port: env.port, source: e })?;
    info!(port = env.port, "sidecar listening");

    let legacy = legacy_credential(&env);
    let reconciler = Reconciler::new(
        orchestrator.clone(),
        factory(env, orchestrator),
        registry,
        legacy,
        SystemClock,
    );
    tokio::spawn(reconciler.run());

    axum::serve(listener, router(state)).await?;
    Ok(())
}
