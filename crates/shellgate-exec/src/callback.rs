// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Callback channel: the asynchronous half of the protocol.
//
// Any thread may enqueue a delivery through a `CallbackSender`. The matching
// `ScriptPump` (see pump.rs) drains the queue on the one thread that owns the
// script environment, so per-id order is the enqueue order.

use std::fmt::Write;
use std::sync::Arc;

use crossbeam_channel::{Sender, unbounded};
use shellgate_args::{Object, Value, write_quoted};
use shellgate_core::{BridgeConfig, BridgeError, CallbackId, CallbackStatus, Result, classify};
use tracing::trace;

use crate::pump::ScriptPump;

// ---------------------------------------------------------------------------
// Payload / Outcome / Delivery
// ---------------------------------------------------------------------------

/// The `message` part of a delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Int(i64),
    Double(f64),
    Bool(bool),
    /// Rendered as an escaped string literal.
    Text(String),
    /// Pre-serialized script fragment, inserted verbatim.
    Raw(String),
    /// Serialized with the wire writer.
    Value(Value),
}

impl Payload {
    pub fn text(text: impl Into<String>) -> Self {
        Payload::Text(text.into())
    }

    pub fn raw(fragment: impl Into<String>) -> Self {
        Payload::Raw(fragment.into())
    }

    fn render(&self, out: &mut String) {
        match self {
            Payload::None => out.push_str("null"),
            Payload::Int(n) => {
                let _ = write!(out, "{n}");
            }
            Payload::Double(d) => {
                let _ = write!(out, "{}", Value::Double(*d));
            }
            Payload::Bool(b) => {
                let _ = write!(out, "{b}");
            }
            Payload::Text(text) => {
                let _ = write_quoted(out, text, '"');
            }
            Payload::Raw(fragment) => out.push_str(fragment),
            Payload::Value(value) => {
                let _ = write!(out, "{value}");
            }
        }
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Value(value)
    }
}

impl From<Object> for Payload {
    fn from(obj: Object) -> Self {
        Payload::Value(Value::Object(obj))
    }
}

impl From<Vec<Value>> for Payload {
    fn from(items: Vec<Value>) -> Self {
        Payload::Value(Value::Array(items))
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<i32> for Payload {
    fn from(n: i32) -> Self {
        Payload::Int(i64::from(n))
    }
}

impl From<i64> for Payload {
    fn from(n: i64) -> Self {
        Payload::Int(n)
    }
}

impl From<u64> for Payload {
    fn from(n: u64) -> Self {
        i64::try_from(n).map_or(Payload::Double(n as f64), Payload::Int)
    }
}

impl From<f64> for Payload {
    fn from(d: f64) -> Self {
        Payload::Double(d)
    }
}

impl From<bool> for Payload {
    fn from(b: bool) -> Self {
        Payload::Bool(b)
    }
}

/// What a delivery reports.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Payload),
    /// Success with no value.
    NoResult,
    Failure {
        status: CallbackStatus,
        message: Payload,
    },
}

impl Outcome {
    pub fn success(payload: impl Into<Payload>) -> Self {
        Outcome::Success(payload.into())
    }

    pub fn failure(status: CallbackStatus, message: impl Into<Payload>) -> Self {
        Outcome::Failure {
            status,
            message: message.into(),
        }
    }

    /// Failure classified from an error, with the error text as message.
    pub fn from_error(err: &BridgeError) -> Self {
        Outcome::failure(classify(err), err.to_string())
    }

    pub fn status(&self) -> CallbackStatus {
        match self {
            Outcome::Success(_) => CallbackStatus::Ok,
            Outcome::NoResult => CallbackStatus::NoResult,
            Outcome::Failure { status, .. } => *status,
        }
    }
}

/// One result travelling to the script thread.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub callback_id: CallbackId,
    pub outcome: Outcome,
    /// More deliveries follow under the same id.
    pub keep_alive: bool,
}

impl Delivery {
    /// Render the statement the script environment evaluates, e.g.
    /// `window.shellgate.callbackSuccess('cb1',{status:window.shellgate.callbackStatus.OK,keepCallback:false,message:42});`
    pub fn statement(&self, bridge: &str) -> String {
        let (function, message) = match &self.outcome {
            Outcome::Success(payload) => ("callbackSuccess", payload),
            Outcome::NoResult => ("callbackSuccess", &Payload::None),
            Outcome::Failure { message, .. } => ("callbackError", message),
        };

        let mut out = String::with_capacity(96 + bridge.len() * 2);
        let _ = write!(out, "{bridge}.{function}(");
        let _ = write_quoted(&mut out, self.callback_id.as_str(), '\'');
        let _ = write!(
            out,
            ",{{status:{bridge}.callbackStatus.{},keepCallback:{},message:",
            self.outcome.status().script_name(),
            self.keep_alive
        );
        message.render(&mut out);
        out.push_str("});");
        out
    }
}

// ---------------------------------------------------------------------------
// Queue
// ---------------------------------------------------------------------------

/// Messages carried by the queue to the pump.
#[derive(Debug)]
pub(crate) enum Message {
    /// A new invocation is (re)using this id.
    Open(CallbackId),
    Deliver(Delivery),
    /// Evaluate a statement verbatim.
    Eval(String),
    Shutdown,
}

/// Build a connected sender/pump pair.
pub fn callback_channel(config: &BridgeConfig) -> (CallbackSender, ScriptPump) {
    let (tx, rx) = unbounded();
    let bridge: Arc<str> = Arc::from(config.bridge_object.as_str());
    let sender = CallbackSender {
        tx,
        bridge: Arc::clone(&bridge),
    };
    let pump = ScriptPump::new(rx, bridge, config.closed_callback_history);
    (sender, pump)
}

/// Producer side of the callback channel. Cheap to clone; usable from any thread.
#[derive(Clone)]
pub struct CallbackSender {
    tx: Sender<Message>,
    bridge: Arc<str>,
}

impl std::fmt::Debug for CallbackSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackSender")
            .field("bridge", &self.bridge)
            .field("queued", &self.tx.len())
            .finish()
    }
}

impl CallbackSender {
    fn send(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| BridgeError::ChannelClosed)
    }

    pub fn deliver(&self, callback_id: &CallbackId, outcome: Outcome, keep_alive: bool) -> Result<()> {
        trace!(callback_id = %callback_id, status = %outcome.status(), keep_alive, "delivery enqueued");
        self.send(Message::Deliver(Delivery {
            callback_id: callback_id.clone(),
            outcome,
            keep_alive,
        }))
    }

    /// Mark `callback_id` as open for a new invocation.
    pub fn open(&self, callback_id: &CallbackId) -> Result<()> {
        self.send(Message::Open(callback_id.clone()))
    }

    /// Evaluate `statement` on the script thread, in queue order.
    pub fn eval(&self, statement: impl Into<String>) -> Result<()> {
        self.send(Message::Eval(statement.into()))
    }

    /// Ask the pump to stop once it reaches this point in the queue.
    pub fn shutdown(&self) -> Result<()> {
        self.send(Message::Shutdown)
    }

    pub fn responder(&self, callback_id: CallbackId) -> Responder {
        Responder {
            callback_id,
            sender: self.clone(),
        }
    }

    pub fn bridge_object(&self) -> &str {
        &self.bridge
    }
}

/// A sender bound to one callback id; handlers move it into worker threads.
#[derive(Debug, Clone)]
pub struct Responder {
    callback_id: CallbackId,
    sender: CallbackSender,
}

impl Responder {
    pub fn callback_id(&self) -> &CallbackId {
        &self.callback_id
    }

    pub fn outcome(&self, outcome: Outcome, keep_alive: bool) -> Result<()> {
        self.sender.deliver(&self.callback_id, outcome, keep_alive)
    }

    pub fn success(&self, payload: impl Into<Payload>, keep_alive: bool) -> Result<()> {
        self.outcome(Outcome::success(payload), keep_alive)
    }

    pub fn no_result(&self, keep_alive: bool) -> Result<()> {
        self.outcome(Outcome::NoResult, keep_alive)
    }

    pub fn failure(&self, status: CallbackStatus, message: impl Into<Payload>, keep_alive: bool) -> Result<()> {
        self.outcome(Outcome::failure(status, message), keep_alive)
    }

    pub fn error(&self, err: &BridgeError, keep_alive: bool) -> Result<()> {
        self.outcome(Outcome::from_error(err), keep_alive)
    }
}
