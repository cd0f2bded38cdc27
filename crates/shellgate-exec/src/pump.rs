// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Consumer side of the callback channel.
//
// The pump is the only code that calls `ScriptHost::evaluate`. It owns the
// bookkeeping for closed callback ids, because it is the one place that sees
// the true order of every delivery.

use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, TryRecvError};
use shellgate_core::{CallbackId, Result};
use tracing::{debug, error, info, warn};

use crate::callback::{Delivery, Message};

/// Something that can evaluate a statement in the script environment.
pub trait ScriptHost {
    fn evaluate(&mut self, statement: &str) -> Result<()>;
}

impl<F> ScriptHost for F
where
    F: FnMut(&str) -> Result<()>,
{
    fn evaluate(&mut self, statement: &str) -> Result<()> {
        self(statement)
    }
}

/// Host that records every statement. Clones share the same record, so a
/// test can keep one clone while the pump thread owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingHost {
    statements: Arc<Mutex<Vec<String>>>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements
            .lock()
            .expect("recording host lock poisoned")
            .clone()
    }

    pub fn len(&self) -> usize {
        self.statements
            .lock()
            .expect("recording host lock poisoned")
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ScriptHost for RecordingHost {
    fn evaluate(&mut self, statement: &str) -> Result<()> {
        self.statements
            .lock()
            .expect("recording host lock poisoned")
            .push(statement.to_string());
        Ok(())
    }
}

/// A delivery that arrived after its id was closed. It was not evaluated.
#[derive(Debug, Clone, PartialEq)]
pub struct ProtocolViolation {
    pub delivery: Delivery,
}

/// Summary returned when a pump stops.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PumpReport {
    /// Deliveries evaluated.
    pub delivered: u64,
    pub violations: Vec<ProtocolViolation>,
}

/// Bounded memory of recently closed ids.
#[derive(Debug)]
struct ClosedIds {
    order: VecDeque<CallbackId>,
    members: HashSet<CallbackId>,
    capacity: usize,
}

impl ClosedIds {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            members: HashSet::new(),
            capacity,
        }
    }

    fn contains(&self, id: &CallbackId) -> bool {
        self.members.contains(id)
    }

    fn insert(&mut self, id: CallbackId) {
        if self.capacity == 0 || !self.members.insert(id.clone()) {
            return;
        }
        self.order.push_back(id);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.members.remove(&oldest);
            }
        }
    }

    fn remove(&mut self, id: &CallbackId) {
        if self.members.remove(id) {
            self.order.retain(|closed| closed != id);
        }
    }
}

/// Drains the callback queue into a [`ScriptHost`].
#[derive(Debug)]
pub struct ScriptPump {
    rx: Receiver<Message>,
    bridge: Arc<str>,
    closed: ClosedIds,
    delivered: u64,
    violations: Vec<ProtocolViolation>,
    stopped: bool,
}

impl ScriptPump {
    pub(crate) fn new(rx: Receiver<Message>, bridge: Arc<str>, history: usize) -> Self {
        Self {
            rx,
            bridge,
            closed: ClosedIds::new(history),
            delivered: 0,
            violations: Vec::new(),
            stopped: false,
        }
    }

    pub fn violations(&self) -> &[ProtocolViolation] {
        &self.violations
    }

    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Whether a shutdown message has been processed.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    fn handle<H: ScriptHost + ?Sized>(&mut self, message: Message, host: &mut H) {
        match message {
            Message::Open(id) => self.closed.remove(&id),
            Message::Deliver(delivery) => {
                if self.closed.contains(&delivery.callback_id) {
                    warn!(
                        callback_id = %delivery.callback_id,
                        status = %delivery.outcome.status(),
                        "delivery after keepCallback=false; dropped"
                    );
                    self.violations.push(ProtocolViolation { delivery });
                    return;
                }
                let statement = delivery.statement(&self.bridge);
                if let Err(e) = host.evaluate(&statement) {
                    error!(callback_id = %delivery.callback_id, error = %e, "script evaluation failed");
                }
                self.delivered += 1;
                if !delivery.keep_alive {
                    self.closed.insert(delivery.callback_id);
                }
            }
            Message::Eval(statement) => {
                if let Err(e) = host.evaluate(&statement) {
                    error!(error = %e, "script evaluation failed");
                }
            }
            Message::Shutdown => {
                debug!("pump received shutdown");
                self.stopped = true;
            }
        }
    }

    /// Handle everything already queued without blocking. Returns the number
    /// of messages handled; stops early at a shutdown message.
    pub fn pump_pending<H: ScriptHost + ?Sized>(&mut self, host: &mut H) -> usize {
        let mut handled = 0;
        while !self.stopped {
            match self.rx.try_recv() {
                Ok(message) => {
                    self.handle(message, host);
                    handled += 1;
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }
        handled
    }

    /// Wait up to `timeout` for one message, then drain whatever else is
    /// queued. Returns the number of messages handled.
    pub fn pump_timeout<H: ScriptHost + ?Sized>(&mut self, host: &mut H, timeout: Duration) -> usize {
        if self.stopped {
            return 0;
        }
        match self.rx.recv_timeout(timeout) {
            Ok(message) => {
                self.handle(message, host);
                1 + self.pump_pending(host)
            }
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// Block until a shutdown message arrives or every sender is gone.
    pub fn run<H: ScriptHost + ?Sized>(mut self, host: &mut H) -> PumpReport {
        while !self.stopped {
            match self.rx.recv() {
                Ok(message) => self.handle(message, host),
                Err(_) => {
                    debug!("all callback senders dropped");
                    break;
                }
            }
        }
        info!(
            delivered = self.delivered,
            violations = self.violations.len(),
            "script pump stopped"
        );
        PumpReport {
            delivered: self.delivered,
            violations: self.violations,
        }
    }

    /// Run the pump on a dedicated `script-host` thread. The host is built
    /// on that thread and never leaves it.
    pub fn spawn<H, F>(self, make_host: F) -> io::Result<JoinHandle<PumpReport>>
    where
        H: ScriptHost,
        F: FnOnce() -> H + Send + 'static,
    {
        thread::Builder::new()
            .name("script-host".into())
            .spawn(move || {
                let mut host = make_host();
                self.run(&mut host)
            })
    }
}
