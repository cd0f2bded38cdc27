// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Data directory resolution and the persisted bridge configuration.

use std::path::{Path, PathBuf};

use shellgate_core::{BridgeConfig, Result};
use tracing::{debug, warn};

const APP_DIR: &str = "shellgate";
const CONFIG_FILE: &str = "config.json";

/// Return the application data directory, creating it if needed.
pub fn data_dir() -> PathBuf {
    let dir = data_dir_from(|name| std::env::var(name).ok());
    if let Err(e) = std::fs::create_dir_all(&dir) {
        warn!(path = %dir.display(), error = %e, "could not create data directory");
    }
    dir
}

/// `SHELLGATE_DATA_DIR`, then the XDG data dir, then `~/.local/share`, then
/// the working directory.
fn data_dir_from(var: impl Fn(&str) -> Option<String>) -> PathBuf {
    let set = |name: &str| var(name).filter(|v| !v.is_empty()).map(PathBuf::from);
    if let Some(dir) = set("SHELLGATE_DATA_DIR") {
        return dir;
    }
    if let Some(xdg) = set("XDG_DATA_HOME") {
        return xdg.join(APP_DIR);
    }
    if let Some(home) = set("HOME") {
        return home.join(".local").join("share").join(APP_DIR);
    }
    PathBuf::from("shellgate-data")
}

/// Load `config.json` from `dir`. A missing or unreadable file yields the
/// defaults, which are written back so the file can be edited.
pub fn load_or_init_config(dir: &Path) -> BridgeConfig {
    let path = dir.join(CONFIG_FILE);
    match std::fs::read_to_string(&path) {
        Ok(text) => match serde_json::from_str(&text) {
            Ok(config) => {
                debug!(path = %path.display(), "configuration loaded");
                return config;
            }
            Err(e) => warn!(path = %path.display(), error = %e, "invalid configuration, using defaults"),
        },
        Err(_) => {
            let config = BridgeConfig::default();
            if let Err(e) = persist_config(dir, &config) {
                warn!(error = %e, "could not write default configuration");
            }
            return config;
        }
    }
    BridgeConfig::default()
}

pub fn persist_config(dir: &Path, config: &BridgeConfig) -> Result<()> {
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(dir.join(CONFIG_FILE), json)?;
    Ok(())
}
