// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for Network-bound calls.

use thiserror::Error;

/// Errors from Network operations (REST or on-chain).
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 429 from the Network. Idempotent calls retry these with backoff.
    #[error("rate limited by the Network")]
    RateLimited,

    /// The request never reached the server (DNS, refused connection).
    /// Safe to retry even for mutations.
    #[error("connection failed before the request was sent: {0}")]
    Connect(String),

    /// The request may have reached the server; the outcome is unknown.
    #[error("transport error: {0}")]
    Transport(String),

    /// The Network answered with a non-2xx status.
    #[error("Network rejected the call: {status} {body}")]
    Remote { status: u16, body: String },

    /// The endpoint does not exist for this credential mode; callers fall
    /// back to the per-job path.
    #[error("operation not supported by this credential mode")]
    Unsupported,

    /// 2xx with a body we could not interpret.
    #[error("malformed Network response: {0}")]
    Decode(String),

    #[error(transparent)]
    Signer(#[from] SignerError),
}

impl GatewayError {
    /// Map a reqwest error, distinguishing never-sent connection failures
    /// from in-flight transport failures.
    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            GatewayError::Connect(err.to_string())
        } else {
            GatewayError::Transport(err.to_string())
        }
    }

    /// Whether surfacing this error should include upstream details.
    pub fn remote_body(&self) -> Option<(u16, &str)> {
        match self {
            GatewayError::Remote { status, body } => Some((*status, body.as_str())),
            _ => None,
        }
    }
}

/// Errors from the auth signer.
#[derive(Debug, Error)]
pub enum SignerError {
    /// The delegated signing endpoint could not be reached.
    #[error("signing service unavailable: {0}")]
    Unavailable(String),

    /// The delegated signing endpoint answered non-2xx.
    #[error("signing request rejected: {status} {body}")]
    Rejected { status: u16, body: String },

    /// The local private key could not be decoded.
    #[error("invalid private key: {0}")]
    InvalidKey(String),
}
