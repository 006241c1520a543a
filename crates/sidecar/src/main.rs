// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `depind` — the DePIN sidecar daemon.

use depin_sidecar::env::SidecarEnv;
use std::path::Path;
use tracing_subscriber::EnvFilter;

fn init_tracing(log_dir: Option<&Path>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_env("DEPIN_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "depind.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() {
    let env = match SidecarEnv::load() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("depind: {e}");
            std::process::exit(1);
        }
    };
    let _guard = init_tracing(env.log_dir.as_deref());
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "depind starting");

    if let Err(e) = depin_sidecar::startup::run(env).await {
        tracing::error!(error = %e, "startup failed");
        eprintln!("depind: {e}");
        std::process::exit(1);
    }
}
