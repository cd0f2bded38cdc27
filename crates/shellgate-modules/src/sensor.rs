// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// A polling stream bound to the callback that started it. Shared by the
// accelerometer and compass modules.

use std::sync::Mutex;
use std::time::Duration;

use shellgate_core::{BridgeError, Result};
use shellgate_exec::{Payload, Reply, Responder};
use shellgate_worker::{PollingStream, Sampler, StreamEvent};
use tracing::warn;

struct WatchState {
    stream: PollingStream,
    /// Callback of the running stream, closed on stop.
    active: Option<Responder>,
}

pub(crate) struct SensorWatch {
    state: Mutex<WatchState>,
}

impl SensorWatch {
    pub(crate) fn new(name: &str) -> Self {
        Self {
            state: Mutex::new(WatchState {
                stream: PollingStream::new(name),
                active: None,
            }),
        }
    }

    /// Start streaming samples to `responder` with `keepCallback:true`. A
    /// sampler failure closes the callback with a failure delivery.
    pub(crate) fn start<S, R>(&self, responder: Responder, sampler: S, interval: Duration, render: R) -> Result<Reply>
    where
        S: Sampler,
        R: Fn(S::Sample) -> Payload + Send + 'static,
    {
        let mut state = self.state.lock().expect("sensor watch lock poisoned");
        let delivery = responder.clone();
        state.stream.start(sampler, interval, move |event| {
            let sent = match event {
                StreamEvent::Sample(sample) => delivery.success(render(sample), true),
                StreamEvent::Failed(e) => delivery.error(&e, false),
            };
            if let Err(e) = sent {
                warn!(callback_id = %delivery.callback_id(), error = %e, "sensor delivery dropped");
            }
        })?;
        state.active = Some(responder);
        Ok(Reply::Pending)
    }

    /// Stop the stream, wait for its thread, then close the stream callback
    /// with `NoResult`.
    pub(crate) fn stop(&self) -> Result<Reply> {
        let mut state = self.state.lock().expect("sensor watch lock poisoned");
        let stopped = state.stream.stop();
        let active = state.active.take();
        stopped?;
        if let Some(responder) = active {
            responder.no_result(false)?;
        }
        Ok(Reply::no_result())
    }

    pub(crate) fn shutdown(&self) -> Result<()> {
        match self.stop() {
            Ok(_) | Err(BridgeError::NotRunning(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }
}
