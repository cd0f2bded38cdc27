// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Bridge configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shellgate_args::ParseOptions;

/// Persistent bridge settings. Missing fields fall back to the defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Script expression naming the bridge object that receives callbacks.
    pub bridge_object: String,
    /// Polling period for sensor streams, in milliseconds.
    pub sample_interval_ms: u64,
    /// Accept whitespace between wire tokens.
    pub tolerate_whitespace: bool,
    /// Closed callback ids remembered for protocol-violation detection.
    pub closed_callback_history: usize,
    /// Device resource used by capture sessions.
    pub capture_device: String,
    /// Version string reported by `Device.getDeviceInfo`.
    pub bridge_version: String,
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_object: "window.shellgate".into(),
            sample_interval_ms: 20,
            tolerate_whitespace: false,
            closed_callback_history: 1024,
            capture_device: "default".into(),
            bridge_version: env!("CARGO_PKG_VERSION").into(),
            data_dir: None,
        }
    }
}

impl BridgeConfig {
    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            tolerate_whitespace: self.tolerate_whitespace,
        }
    }

    /// Never zero, so a polling loop cannot spin.
    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms.max(1))
    }
}
