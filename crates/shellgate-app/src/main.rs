// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shellgate host process.
//
// Reads wire commands from stdin, one per line, and writes the resulting
// script statements to stdout. Logs go to stderr so they never mix with
// statements.

mod services;

use std::process::ExitCode;

use services::app_services::AppServices;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Shellgate starting");

    let services = match AppServices::init() {
        Ok(services) => services,
        Err(e) => {
            tracing::error!(error = %e, "backend services failed to start");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(path = %services.data_dir().display(), "reading commands from stdin");
    let served = services.serve(tokio::io::stdin()).await;
    let shutdown = tokio::task::spawn_blocking(move || services.shutdown()).await;

    let mut code = ExitCode::SUCCESS;
    match served {
        Ok(count) => tracing::info!(commands = count, "input finished"),
        Err(e) => {
            tracing::error!(error = %e, "reading commands failed");
            code = ExitCode::FAILURE;
        }
    }
    match shutdown {
        Ok(Ok(report)) => tracing::info!(delivered = report.delivered, "Shellgate stopped"),
        Ok(Err(e)) => {
            tracing::error!(error = %e, "shutdown failed");
            code = ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(error = %e, "shutdown task panicked");
            code = ExitCode::FAILURE;
        }
    }
    code
}
