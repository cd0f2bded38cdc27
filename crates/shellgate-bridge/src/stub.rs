// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Desktop bridge for builds without mobile sensor APIs.
//
// Sensors and cameras return `PlatformUnavailable`. Device info and
// connectivity are answered from what the host OS exposes.

use std::io;
use std::path::Path;

use shellgate_core::{BridgeError, Result};
use shellgate_worker::{CapturePipeline, SyntheticPipeline};

use crate::traits::*;

/// Capture device name that opens a synthetic test-pattern camera.
pub const SYNTHETIC_CAMERA: &str = "synthetic";

/// Bridge returned on desktop platforms.
pub struct StubBridge;

impl PlatformBridge for StubBridge {
    fn platform_name(&self) -> &str {
        "Desktop (stub)"
    }
}

impl NativeAccelerometer for StubBridge {
    fn read_acceleration(&self) -> Result<Acceleration> {
        tracing::warn!("NativeAccelerometer::read_acceleration called on stub bridge");
        Err(BridgeError::PlatformUnavailable)
    }
}

impl NativeCompass for StubBridge {
    fn read_heading(&self) -> Result<Heading> {
        tracing::warn!("NativeCompass::read_heading called on stub bridge");
        Err(BridgeError::PlatformUnavailable)
    }
}

impl NativeCamera for StubBridge {
    fn open_camera(&self, device: &str) -> Result<Box<dyn CapturePipeline>> {
        if device == SYNTHETIC_CAMERA {
            return Ok(Box::new(SyntheticPipeline::default()));
        }
        tracing::warn!(device, "NativeCamera::open_camera called on stub bridge");
        Err(BridgeError::PlatformUnavailable)
    }
}

impl NativeDeviceInfo for StubBridge {
    fn device_info(&self) -> Result<DeviceInfo> {
        let name = hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|e| {
                tracing::debug!(error = %e, "hostname unavailable");
                "localhost".to_string()
            });
        Ok(DeviceInfo {
            name,
            platform: std::env::consts::OS.to_string(),
            version: os_version(),
        })
    }
}

impl NativeConnectivity for StubBridge {
    fn connection_type(&self) -> Result<ConnectionType> {
        #[cfg(target_os = "linux")]
        {
            Ok(scan_interfaces(Path::new("/sys/class/net"))?)
        }
        #[cfg(not(target_os = "linux"))]
        {
            Ok(ConnectionType::Unknown)
        }
    }
}

fn os_version() -> String {
    #[cfg(target_os = "linux")]
    {
        if let Ok(release) = std::fs::read_to_string("/proc/sys/kernel/osrelease") {
            return release.trim().to_string();
        }
    }
    std::env::consts::ARCH.to_string()
}

/// Classify the interfaces under a sysfs `class/net` directory. Wired
/// interfaces win over wireless ones; loopback is ignored.
pub(crate) fn scan_interfaces(root: &Path) -> io::Result<ConnectionType> {
    let mut wireless_up = false;
    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if entry.file_name() == "lo" {
            continue;
        }
        let dir = entry.path();
        let state = std::fs::read_to_string(dir.join("operstate")).unwrap_or_default();
        if state.trim() != "up" {
            continue;
        }
        if dir.join("wireless").exists() || dir.join("phy80211").exists() {
            wireless_up = true;
        } else {
            return Ok(ConnectionType::Ethernet);
        }
    }
    Ok(if wireless_up {
        ConnectionType::Wifi
    } else {
        ConnectionType::None
    })
}
