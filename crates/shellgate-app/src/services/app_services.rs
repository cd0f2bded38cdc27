// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Central service layer: owns the registry, the callback channel, the
// script-host thread and the application lifecycle.
//
// Commands are dispatched on tokio's blocking pool, so a slow handler never
// stalls the reader. All statements still reach the script environment
// through the single `script-host` thread.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::JoinHandle;

use shellgate_bridge::{PlatformBridge, platform_bridge};
use shellgate_core::{BridgeConfig, BridgeError, Result};
use shellgate_exec::{
    AppLifecycle, CallbackSender, Command, DispatchOutcome, LifecycleEvent, ModuleRegistry, PumpReport, ScriptHost,
    callback_channel,
};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::data_dir;
use super::host::LineHost;

pub struct AppServices {
    registry: Arc<ModuleRegistry>,
    callbacks: CallbackSender,
    lifecycle: AppLifecycle,
    pump: Option<JoinHandle<PumpReport>>,
    config: Arc<BridgeConfig>,
    data_dir: PathBuf,
}

impl AppServices {
    /// Initialise against the platform data directory, writing statements to
    /// stdout.
    pub fn init() -> Result<Self> {
        let dir = data_dir::data_dir();
        let config = data_dir::load_or_init_config(&dir);
        let module_dir = config.data_dir.clone().unwrap_or(dir);
        info!(path = %module_dir.display(), "initialising app services");
        Self::start(config, &module_dir, Arc::from(platform_bridge()), LineHost::stdout)
    }

    /// Register the default modules, start the script host built by
    /// `make_host` and fire `deviceready`.
    pub fn start<H, F>(config: BridgeConfig, data_dir: &Path, bridge: Arc<dyn PlatformBridge>, make_host: F) -> Result<Self>
    where
        H: ScriptHost,
        F: FnOnce() -> H + Send + 'static,
    {
        std::fs::create_dir_all(data_dir)?;
        let config = Arc::new(config);
        let (callbacks, pump) = callback_channel(&config);

        let mut registry = ModuleRegistry::new(callbacks.clone(), Arc::clone(&config), data_dir.to_path_buf());
        info!(platform = bridge.platform_name(), "platform bridge selected");
        shellgate_modules::register_defaults(&mut registry, bridge)?;

        let pump = pump.spawn(make_host)?;
        let mut lifecycle = AppLifecycle::new(callbacks.clone());
        lifecycle.fire(LifecycleEvent::DeviceReady)?;

        Ok(Self {
            registry: Arc::new(registry),
            callbacks,
            lifecycle,
            pump: Some(pump),
            config,
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Read wire commands, one per line, until EOF or Ctrl-C, then wait for
    /// in-flight dispatches. Returns the number of commands dispatched.
    pub async fn serve<R>(&self, input: R) -> Result<u64>
    where
        R: AsyncRead + Unpin,
    {
        let mut lines = BufReader::new(input).lines();
        let mut tasks = JoinSet::new();
        let mut dispatched = 0u64;
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                _ = &mut ctrl_c => {
                    info!("interrupted, shutting down");
                    break;
                }
            };
            let Some(line) = line else {
                debug!("input closed");
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let command = match Command::from_wire(line, self.config.parse_options()) {
                Ok(command) => command,
                Err(e) => {
                    warn!(error = %e, "undecodable command line ignored");
                    continue;
                }
            };
            let registry = Arc::clone(&self.registry);
            tasks.spawn_blocking(move || {
                let outcome = registry.dispatch_command(&command);
                log_outcome(&command, &outcome);
                outcome
            });
            dispatched += 1;

            while let Some(joined) = tasks.try_join_next() {
                report_join(joined);
            }
        }

        while let Some(joined) = tasks.join_next().await {
            report_join(joined);
        }
        Ok(dispatched)
    }

    /// Fire `destroy`, run every module's shutdown hook, stop the pump and
    /// join the script-host thread.
    pub fn shutdown(mut self) -> Result<PumpReport> {
        if let Err(e) = self.lifecycle.fire(LifecycleEvent::Destroy) {
            warn!(error = %e, "destroy event not delivered");
        }

        let report = self.registry.shutdown();
        for (module, e) in &report.failures {
            warn!(%module, error = %e, "module did not shut down cleanly");
        }
        info!(closed = report.closed.len(), failures = report.failures.len(), "modules shut down");

        self.callbacks.shutdown()?;
        let pump = self
            .pump
            .take()
            .ok_or_else(|| BridgeError::NotRunning("script host".into()))?;
        let report = pump
            .join()
            .map_err(|_| BridgeError::HandlerPanicked("script host thread".into()))?;
        if !report.violations.is_empty() {
            error!(count = report.violations.len(), "deliveries arrived after their callback closed");
        }
        Ok(report)
    }
}

fn log_outcome(command: &Command, outcome: &DispatchOutcome) {
    match outcome {
        DispatchOutcome::Delivered | DispatchOutcome::Pending => {
            debug!(callback_id = %command.callback_id, ?outcome, "command dispatched");
        }
        DispatchOutcome::UnknownCommand(module) => {
            warn!(callback_id = %command.callback_id, %module, "command for unknown module dropped");
        }
        DispatchOutcome::ModuleClosed(module) => {
            warn!(callback_id = %command.callback_id, %module, "command for closed module dropped");
        }
        DispatchOutcome::Rejected { status, message } => {
            info!(callback_id = %command.callback_id, %status, %message, "command rejected");
        }
    }
}

fn report_join(joined: std::result::Result<DispatchOutcome, tokio::task::JoinError>) {
    if let Err(e) = joined {
        error!(error = %e, "dispatch task failed");
    }
}
