// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Compass module: one-shot heading reads and a heading watch.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use shellgate_args::Object;
use shellgate_bridge::{Heading, PlatformBridge};
use shellgate_core::{Result, timestamp_millis};
use shellgate_exec::{CommandHandler, Invocation, ModuleContext, Payload, Reply};

use crate::sensor::SensorWatch;

pub struct Compass {
    bridge: Arc<dyn PlatformBridge>,
    interval: OnceLock<Duration>,
    watch: SensorWatch,
}

impl Compass {
    pub fn new(bridge: Arc<dyn PlatformBridge>) -> Self {
        Self {
            bridge,
            interval: OnceLock::new(),
            watch: SensorWatch::new("compass"),
        }
    }
}

fn render(heading: Heading) -> Payload {
    Object::new()
        .with("magneticHeading", heading.magnetic)
        .with("trueHeading", heading.true_heading)
        .with("headingAccuracy", heading.accuracy)
        .with("timestamp", timestamp_millis())
        .into()
}

impl CommandHandler for Compass {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        let _ = self.interval.set(ctx.config.sample_interval());
        Ok(())
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "getHeading" => {
                invocation.args(&[])?;
                let heading = self.bridge.read_heading()?;
                Ok(Reply::success(render(heading)))
            }
            "watchHeading" => {
                invocation.args(&[])?;
                let bridge = Arc::clone(&self.bridge);
                let interval = self.interval.get().copied().unwrap_or(Duration::from_millis(20));
                self.watch
                    .start(invocation.responder, move || bridge.read_heading(), interval, render)
            }
            "clearWatch" => {
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
