// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Built-in feature modules: device identity, sensors, network state, SQL
// storage, the sandboxed file system and media capture.

pub mod accelerometer;
pub mod capture;
pub mod compass;
pub mod device;
pub mod file;
pub mod network;
pub mod storage;

mod sensor;
#[cfg(test)]
pub(crate) mod testing;

use std::sync::Arc;

use shellgate_bridge::PlatformBridge;
use shellgate_core::Result;
use shellgate_exec::ModuleRegistry;

pub use accelerometer::Accelerometer;
pub use capture::{Camera, Capture, CaptureService};
pub use compass::Compass;
pub use device::Device;
pub use file::{FileErrorCode, Files};
pub use network::Network;
pub use storage::Storage;

/// Register every built-in module under its script-facing identifier.
pub fn register_defaults(registry: &mut ModuleRegistry, bridge: Arc<dyn PlatformBridge>) -> Result<()> {
    registry.register("Device", Device::new(Arc::clone(&bridge)))?;
    registry.register("Accelerometer", Accelerometer::new(Arc::clone(&bridge)))?;
    registry.register("Compass", Compass::new(Arc::clone(&bridge)))?;
    registry.register("Network", Network::new(Arc::clone(&bridge)))?;
    registry.register("Storage", Storage::new())?;
    registry.register("File", Files::new())?;

    let capture = Arc::new(CaptureService::new(bridge));
    registry.register("Camera", Camera::new(Arc::clone(&capture)))?;
    registry.register("Capture", Capture::new(capture))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use shellgate_core::{BridgeError, CallbackId};
    use shellgate_exec::{Command, DispatchOutcome, ModuleState};

    use super::*;
    use crate::testing::{FakeBridge, Harness};

    #[test]
    fn defaults_register_in_order() {
        let mut h = Harness::new();
        register_defaults(&mut h.registry, Arc::new(FakeBridge::default())).expect("defaults");
        let ids: Vec<&str> = h.registry.identifiers().collect();
        assert_eq!(
            ids,
            ["Device", "Accelerometer", "Compass", "Network", "Storage", "File", "Camera", "Capture"]
        );
        assert!(h.dir.path().join("device-id").exists());
        assert!(h.dir.path().join("databases").is_dir());
        assert!(h.registry.shutdown().is_clean());
        assert_eq!(h.registry.state("Storage"), ModuleState::Closed);
    }

    #[test]
    fn registering_storage_twice_fails_before_dispatch() {
        let mut h = Harness::new();
        register_defaults(&mut h.registry, Arc::new(FakeBridge::default())).expect("defaults");
        let err = h.registry.register("Storage", Storage::new()).expect_err("duplicate");
        assert!(matches!(err, BridgeError::DuplicateModule(ref id) if id == "Storage"));
        assert!(h.drain().is_empty());
    }

    #[test]
    fn unknown_module_produces_no_statement() {
        let mut h = Harness::new();
        let command = Command::new(CallbackId::from("cb1"), "getX", "Device", "");
        assert_eq!(
            h.registry.dispatch_command(&command),
            DispatchOutcome::UnknownCommand("Device".into())
        );
        assert!(h.drain().is_empty());
    }

    #[test]
    fn dispatch_through_the_wire_envelope() {
        let mut h = Harness::new();
        register_defaults(&mut h.registry, Arc::new(FakeBridge::default())).expect("defaults");
        let command = Command::from_wire(
            "[\"Network1\",\"getConnectionInfo\",\"Network\",\"[]\"]",
            h.registry.config().parse_options(),
        )
        .expect("decode");
        assert_eq!(h.registry.dispatch_command(&command), DispatchOutcome::Delivered);
        let statements = h.drain();
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("window.shellgate.callbackSuccess('Network1'"));
        assert!(statements[0].ends_with("message:\"wifi\"});"));
    }
}
