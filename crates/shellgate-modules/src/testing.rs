// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shared fixtures for module tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use shellgate_args::{ParseOptions, Value, parse_value};
use shellgate_bridge::{
    Acceleration, ConnectionType, DeviceInfo, Heading, NativeAccelerometer, NativeCamera, NativeCompass,
    NativeConnectivity, NativeDeviceInfo, PlatformBridge,
};
use shellgate_core::{BridgeConfig, BridgeError, CallbackId, Result};
use shellgate_exec::{DispatchOutcome, ModuleRegistry, RecordingHost, ScriptPump, callback_channel};
use shellgate_worker::{CapturePipeline, CaptureRequest, PipelineEvent, SyntheticPipeline};
use tempfile::TempDir;

const WAIT: Duration = Duration::from_secs(5);

/// A registry wired to a recording script host and a scratch data dir.
pub(crate) struct Harness {
    pub registry: ModuleRegistry,
    pub pump: ScriptPump,
    pub host: RecordingHost,
    pub dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig {
            sample_interval_ms: 2,
            ..BridgeConfig::default()
        })
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let (sender, pump) = callback_channel(&config);
        let registry = ModuleRegistry::new(sender, Arc::new(config), dir.path().to_path_buf());
        Self {
            registry,
            pump,
            host: RecordingHost::new(),
            dir,
        }
    }

    pub fn call(&self, module: &str, callback_id: &str, action: &str, args: &str) -> DispatchOutcome {
        self.registry
            .dispatch(module, &CallbackId::from(callback_id), action, args)
    }

    /// Evaluate everything queued; returns every statement so far.
    pub fn drain(&mut self) -> Vec<String> {
        self.pump.pump_pending(&mut self.host);
        self.host.statements()
    }

    /// Pump until at least `count` statements were evaluated.
    pub fn wait_for_statements(&mut self, count: usize) -> Vec<String> {
        let deadline = Instant::now() + WAIT;
        while self.host.len() < count {
            assert!(Instant::now() < deadline, "timed out waiting for {count} statements");
            self.pump.pump_timeout(&mut self.host, Duration::from_millis(10));
        }
        self.host.statements()
    }

    /// Call and return the single statement the call produced.
    pub fn reply(&mut self, module: &str, callback_id: &str, action: &str, args: &str) -> String {
        let before = self.host.len();
        self.call(module, callback_id, action, args);
        let statements = self.wait_for_statements(before + 1);
        statements[before].clone()
    }
}

/// The `message` part of a delivery statement, parsed back into a value.
pub(crate) fn payload(statement: &str) -> Value {
    let start = statement.find(",message:").expect("message field") + ",message:".len();
    let end = statement.len() - "});".len();
    parse_value(&statement[start..end], ParseOptions::STRICT).expect("payload is wire text")
}

pub(crate) fn is_success(statement: &str, callback_id: &str) -> bool {
    statement.starts_with(&format!("window.shellgate.callbackSuccess('{callback_id}'"))
}

pub(crate) fn is_error(statement: &str, callback_id: &str) -> bool {
    statement.starts_with(&format!("window.shellgate.callbackError('{callback_id}'"))
}

/// Scripted platform.
#[derive(Default)]
pub(crate) struct FakeBridge {
    readings: Mutex<(Vec<Acceleration>, usize)>,
    fail_sensors: bool,
    broken_cameras: AtomicUsize,
}

impl FakeBridge {
    /// Plays back `readings`, then repeats the last one.
    pub fn with_readings(readings: &[(f64, f64, f64)]) -> Self {
        let readings = readings.iter().map(|&(x, y, z)| Acceleration { x, y, z }).collect();
        Self {
            readings: Mutex::new((readings, 0)),
            ..Self::default()
        }
    }

    /// The next `count` cameras opened fail a few frames after starting.
    pub fn with_broken_cameras(count: usize) -> Self {
        Self {
            broken_cameras: AtomicUsize::new(count),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_sensors: true,
            ..Self::default()
        }
    }
}

impl PlatformBridge for FakeBridge {
    fn platform_name(&self) -> &str {
        "test"
    }
}

impl NativeAccelerometer for FakeBridge {
    fn read_acceleration(&self) -> Result<Acceleration> {
        if self.fail_sensors {
            return Err(BridgeError::PlatformUnavailable);
        }
        let mut guard = self.readings.lock().expect("lock");
        let (readings, next) = &mut *guard;
        let reading = readings
            .get((*next).min(readings.len().saturating_sub(1)))
            .copied()
            .unwrap_or(Acceleration { x: 0.0, y: 0.0, z: 9.81 });
        *next += 1;
        Ok(reading)
    }
}

impl NativeCompass for FakeBridge {
    fn read_heading(&self) -> Result<Heading> {
        if self.fail_sensors {
            return Err(BridgeError::PlatformUnavailable);
        }
        Ok(Heading {
            magnetic: 90.0,
            true_heading: 92.5,
            accuracy: 2.5,
        })
    }
}

impl NativeConnectivity for FakeBridge {
    fn connection_type(&self) -> Result<ConnectionType> {
        Ok(ConnectionType::Wifi)
    }
}

impl NativeDeviceInfo for FakeBridge {
    fn device_info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            name: "bench-rig".into(),
            platform: "testos".into(),
            version: "1.2".into(),
        })
    }
}

impl NativeCamera for FakeBridge {
    fn open_camera(&self, _device: &str) -> Result<Box<dyn CapturePipeline>> {
        if self.fail_sensors {
            return Err(BridgeError::PlatformUnavailable);
        }
        let pipeline = SyntheticPipeline::new(16, 12, 200);
        let broken = self
            .broken_cameras
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if broken {
            return Ok(Box::new(BreakingPipeline {
                inner: pipeline,
                frames_left: 3,
            }));
        }
        Ok(Box::new(pipeline))
    }
}

/// Runs like the synthetic camera, then reports a failure once
/// `frames_left` frames have gone by.
struct BreakingPipeline {
    inner: SyntheticPipeline,
    frames_left: u32,
}

impl CapturePipeline for BreakingPipeline {
    fn build(&mut self, request: &CaptureRequest) -> Result<()> {
        self.inner.build(request)
    }

    fn start(&mut self) -> Result<()> {
        self.inner.start()
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<PipelineEvent> {
        let event = self.inner.poll_event(timeout)?;
        if matches!(event, PipelineEvent::Frame(_)) {
            if self.frames_left == 0 {
                return Some(PipelineEvent::Failed("camera unplugged".into()));
            }
            self.frames_left -= 1;
        }
        Some(event)
    }

    fn stop(&mut self) -> Result<()> {
        self.inner.stop()
    }

    fn close(&mut self) {
        self.inner.close();
    }
}
