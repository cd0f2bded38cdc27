// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Accelerometer module: a polling stream of acceleration readings.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use shellgate_args::Object;
use shellgate_bridge::{Acceleration, PlatformBridge};
use shellgate_core::{Result, timestamp_millis};
use shellgate_exec::{CommandHandler, Invocation, ModuleContext, Payload, Reply};

use crate::sensor::SensorWatch;

pub struct Accelerometer {
    bridge: Arc<dyn PlatformBridge>,
    interval: OnceLock<Duration>,
    watch: SensorWatch,
}

impl Accelerometer {
    pub fn new(bridge: Arc<dyn PlatformBridge>) -> Self {
        Self {
            bridge,
            interval: OnceLock::new(),
            watch: SensorWatch::new("accelerometer"),
        }
    }
}

fn render(reading: Acceleration) -> Payload {
    Object::new()
        .with("x", reading.x)
        .with("y", reading.y)
        .with("z", reading.z)
        .with("timestamp", timestamp_millis())
        .into()
}

impl CommandHandler for Accelerometer {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        let _ = self.interval.set(ctx.config.sample_interval());
        Ok(())
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "start" => {
                invocation.args(&[])?;
                let bridge = Arc::clone(&self.bridge);
                let interval = self.interval.get().copied().unwrap_or(Duration::from_millis(20));
                self.watch.start(
                    invocation.responder,
                    move || bridge.read_acceleration(),
                    interval,
                    render,
                )
            }
            "stop" => {
                invocation.args(&[])?;
                self.watch.stop()
            }
            _ => Err(invocation.invalid_action()),
        }
    }

    fn on_shutdown(&self) -> Result<()> {
        self.watch.shutdown()
    }
}
