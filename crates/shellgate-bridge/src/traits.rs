// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Platform-agnostic trait definitions for native capabilities.

use shellgate_core::Result;
use shellgate_worker::CapturePipeline;

/// Unified bridge that groups all native capabilities.
///
/// Platforms that lack a capability return
/// `BridgeError::PlatformUnavailable` from it.
pub trait PlatformBridge:
    NativeAccelerometer + NativeCompass + NativeConnectivity + NativeDeviceInfo + NativeCamera + Send + Sync
{
    /// Human-readable platform name (e.g. "Linux (desktop)").
    fn platform_name(&self) -> &str;
}

/// Motion sensor.
pub trait NativeAccelerometer {
    /// One reading, in m/s^2.
    fn read_acceleration(&self) -> Result<Acceleration>;
}

/// Magnetometer heading.
pub trait NativeCompass {
    fn read_heading(&self) -> Result<Heading>;
}

/// Network connectivity information.
pub trait NativeConnectivity {
    fn connection_type(&self) -> Result<ConnectionType>;
}

/// Static facts about the device.
pub trait NativeDeviceInfo {
    fn device_info(&self) -> Result<DeviceInfo>;
}

/// Capture from a camera.
pub trait NativeCamera {
    /// Open a pipeline for the named capture device. The session controller
    /// drives it from there.
    fn open_camera(&self, device: &str) -> Result<Box<dyn CapturePipeline>>;
}

// ---------------------------------------------------------------------------
// Readings
// ---------------------------------------------------------------------------

/// Acceleration on three axes. Timestamps are added by the caller so that
/// identical readings compare equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acceleration {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Heading {
    /// Degrees from magnetic north, 0..360.
    pub magnetic: f64,
    /// Degrees from geographic north, 0..360.
    pub true_heading: f64,
    /// Deviation in degrees between the two.
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionType {
    None,
    Ethernet,
    Wifi,
    Cellular,
    Unknown,
}

impl ConnectionType {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionType::None => "none",
            ConnectionType::Ethernet => "ethernet",
            ConnectionType::Wifi => "wifi",
            ConnectionType::Cellular => "cellular",
            ConnectionType::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ConnectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Host or model name.
    pub name: String,
    /// Operating system family, e.g. "linux".
    pub platform: String,
    /// Operating system version.
    pub version: String,
}
