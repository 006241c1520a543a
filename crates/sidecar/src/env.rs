// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the sidecar.

use depin_core::Secret;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("required environment variable {0} is not set")]
    MissingEnv(&'static str),

    #[error("environment variable {name} is invalid: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: std::io::Error },

    #[error("failed to initialize {what}: {reason}")]
    Init { what: &'static str, reason: String },

    #[error("server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Resolved process configuration. Everything outbound the sidecar talks
/// to is addressed here.
#[derive(Debug, Clone)]
pub struct SidecarEnv {
    /// Internal API gateway (credential config + audit log).
    pub api_gateway_url: String,
    /// Orchestrator inventory endpoint (heartbeats).
    pub orchestrator_url: String,
    /// Key for the `X-Internal-API-Key` header.
    pub internal_api_key: Secret,
    /// Network REST base.
    pub nosana_api_url: String,
    /// DNS suffix compute nodes expose HTTPS/WSS under.
    pub ingress_domain: String,
    /// JSON-RPC endpoint for local-mode credentials.
    pub solana_rpc_url: String,
    /// Jobs program address (base58). Deploy-time configuration.
    pub jobs_program: String,
    /// NOS token mint (base58).
    pub nos_mint: String,
    /// Pinning API for local-mode job definitions.
    pub artifact_api: String,
    /// Read gateway for pinned artifacts.
    pub artifact_gateway: String,
    /// HTTP listen port.
    pub port: u16,
    /// When set, logs go to rolling files here instead of stderr.
    pub log_dir: Option<PathBuf>,
    /// Legacy single-credential material (pre-dates named credentials).
    pub legacy_api_key: Option<Secret>,
    pub legacy_private_key: Option<Secret>,
}

fn required(name: &'static str) -> Result<String, StartupError> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(StartupError::MissingEnv(name))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn with_default(name: &str, default: &str) -> String {
    optional(name).unwrap_or_else(|| default.to_string())
}

impl SidecarEnv {
    pub fn load() -> Result<Self, StartupError> {
        let port = match optional("PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|e| StartupError::InvalidEnv {
                name: "PORT",
                reason: e.to_string(),
            })?,
            None => 8080,
        };
        Ok(Self {
            api_gateway_url: required("API_GATEWAY_URL")?,
            orchestrator_url: required("ORCHESTRATOR_URL")?,
            internal_api_key: Secret::new(required("INTERNAL_API_KEY")?),
            nosana_api_url: with_default("NOSANA_API_URL", "https://dashboard.nosana.com/api"),
            ingress_domain: with_default("NOSANA_INGRESS_DOMAIN", "node.k8s.prd.nos.ci"),
            solana_rpc_url: with_default(
                "SOLANA_RPC_URL",
                "https://api.mainnet-beta.solana.com",
            ),
            jobs_program: with_default(
                "NOSANA_JOBS_ADDRESS",
                "nosJhNRqr2bc9g1hfsoQKfZP99iMwQV2LqhNBKxyF1t",
            ),
            nos_mint: with_default(
                "NOSANA_NOS_MINT",
                "nosXBVoaCTtYdLvKY6Csb4AC8JCdQKKAaWYtx2ZMoo7",
            ),
            artifact_api: with_default("NOSANA_IPFS_API", "https://api.nosana.io/ipfs"),
            artifact_gateway: with_default(
                "NOSANA_IPFS_GATEWAY",
                "https://nosana.mypinata.cloud/ipfs",
            ),
            port,
            log_dir: optional("DEPIN_LOG_DIR").map(PathBuf::from),
            legacy_api_key: optional("NOSANA_API_KEY").map(Secret::new),
            legacy_private_key: optional("NOSANA_PRIVATE_KEY").map(Secret::new),
        })
    }

    /// Where the credential set came from, reported by `/health`.
    pub fn config_source(&self) -> &'static str {
        if self.legacy_api_key.is_some() || self.legacy_private_key.is_some() {
            "env+orchestrator"
        } else {
            "orchestrator"
        }
    }
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
