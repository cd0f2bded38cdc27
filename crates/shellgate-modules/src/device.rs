// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Device module: identity of this installation and the host it runs on.

use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use shellgate_args::Object;
use shellgate_bridge::PlatformBridge;
use shellgate_core::{BridgeError, DeviceId, Result};
use shellgate_exec::{CommandHandler, Invocation, ModuleContext, Reply};
use tracing::info;

const DEVICE_ID_FILE: &str = "device-id";

struct Identity {
    uuid: DeviceId,
    bridge_version: String,
}

pub struct Device {
    bridge: Arc<dyn PlatformBridge>,
    identity: OnceLock<Identity>,
}

impl Device {
    pub fn new(bridge: Arc<dyn PlatformBridge>) -> Self {
        Self {
            bridge,
            identity: OnceLock::new(),
        }
    }
}

/// Read the persisted id, or generate and persist a fresh one.
fn load_or_create_id(data_dir: &Path) -> Result<DeviceId> {
    let path = data_dir.join(DEVICE_ID_FILE);
    if let Ok(text) = fs::read_to_string(&path) {
        if let Some(id) = DeviceId::parse(&text) {
            return Ok(id);
        }
        tracing::warn!(path = %path.display(), "unreadable device id, generating a new one");
    }

    fs::create_dir_all(data_dir)
        .map_err(|e| BridgeError::FileSystem(format!("create {}: {e}", data_dir.display())))?;
    let id = DeviceId::new();
    fs::write(&path, id.to_string())
        .map_err(|e| BridgeError::FileSystem(format!("write {}: {e}", path.display())))?;
    info!(%id, "device id created");
    Ok(id)
}

impl CommandHandler for Device {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        let uuid = load_or_create_id(&ctx.data_dir)?;
        let _ = self.identity.set(Identity {
            uuid,
            bridge_version: ctx.config.bridge_version.clone(),
        });
        Ok(())
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "getDeviceInfo" => {
                invocation.args(&[])?;
                let identity = self
                    .identity
                    .get()
                    .ok_or_else(|| BridgeError::Bridge("device identity not loaded".into()))?;
                let info = self.bridge.device_info()?;
                let reply = Object::new()
                    .with("uuid", identity.uuid.to_string())
                    .with("name", info.name)
                    .with("platform", info.platform)
                    .with("version", info.version)
                    .with("bridge", identity.bridge_version.as_str());
                Ok(Reply::success(reply))
            }
            _ => Err(invocation.invalid_action()),
        }
    }
}
