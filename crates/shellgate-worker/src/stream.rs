// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Polling stream: a dedicated thread samples a resource at a fixed interval
// and reports only samples that differ from the previous one.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use shellgate_core::{BridgeError, Result};
use tracing::{debug, info, warn};

/// A resource read once per tick.
pub trait Sampler: Send + 'static {
    type Sample: PartialEq + Clone + Send + 'static;

    fn sample(&mut self) -> Result<Self::Sample>;
}

impl<F, S> Sampler for F
where
    F: FnMut() -> Result<S> + Send + 'static,
    S: PartialEq + Clone + Send + 'static,
{
    type Sample = S;

    fn sample(&mut self) -> Result<S> {
        self()
    }
}

/// What the stream thread reports.
#[derive(Debug)]
pub enum StreamEvent<S> {
    /// A sample that differs from the previous one.
    Sample(S),
    /// The sampler failed; the thread has ended.
    Failed(BridgeError),
}

struct Worker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Owns at most one sampling thread.
pub struct PollingStream {
    name: String,
    worker: Option<Worker>,
}

impl std::fmt::Debug for PollingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollingStream")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl PollingStream {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            worker: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether a sampling thread is alive. A thread that ended on a sampler
    /// failure no longer counts.
    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Start sampling every `interval`. Fails with `AlreadyRunning` while a
    /// previous thread is alive.
    pub fn start<S, F>(&mut self, mut sampler: S, interval: Duration, mut on_event: F) -> Result<()>
    where
        S: Sampler,
        F: FnMut(StreamEvent<S::Sample>) + Send + 'static,
    {
        if self.is_running() {
            return Err(BridgeError::AlreadyRunning(self.name.clone()));
        }
        self.reap();

        let (stop_tx, stop_rx) = bounded::<()>(1);
        let name = self.name.clone();
        let handle = thread::Builder::new()
            .name(format!("{}-stream", self.name))
            .spawn(move || {
                let mut last: Option<S::Sample> = None;
                loop {
                    match sampler.sample() {
                        Ok(sample) => {
                            if last.as_ref() != Some(&sample) {
                                on_event(StreamEvent::Sample(sample.clone()));
                                last = Some(sample);
                            }
                        }
                        Err(e) => {
                            warn!(stream = %name, error = %e, "sampler failed, stream ending");
                            on_event(StreamEvent::Failed(e));
                            break;
                        }
                    }
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => continue,
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!(stream = %name, "stream thread exiting");
            })?;

        info!(stream = %self.name, ?interval, "stream started");
        self.worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Stop the thread and wait for it to exit. Fails with `NotRunning`
    /// when there is no live thread.
    pub fn stop(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Err(BridgeError::NotRunning(self.name.clone()));
        };
        if worker.handle.is_finished() {
            join(&self.name, worker.handle)?;
            return Err(BridgeError::NotRunning(self.name.clone()));
        }
        let _ = worker.stop_tx.send(());
        join(&self.name, worker.handle)?;
        info!(stream = %self.name, "stream stopped");
        Ok(())
    }

    /// Join a thread that ended on its own.
    fn reap(&mut self) {
        if let Some(worker) = self.worker.take() {
            if let Err(e) = join(&self.name, worker.handle) {
                warn!(stream = %self.name, error = %e, "reaped stream thread had panicked");
            }
        }
    }
}

fn join(name: &str, handle: JoinHandle<()>) -> Result<()> {
    handle
        .join()
        .map_err(|_| BridgeError::HandlerPanicked(format!("{name} stream thread")))
}

impl Drop for PollingStream {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            let _ = worker.stop_tx.send(());
            let _ = worker.handle.join();
        }
    }
}
