// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// The contract every native feature module implements.

use std::path::PathBuf;
use std::sync::Arc;

use shellgate_args::{ArgumentList, KindSet, ParseOptions, parse_and_validate};
use shellgate_core::{BridgeConfig, BridgeError, CallbackId, CallbackStatus, Result};

use crate::callback::{Outcome, Payload, Responder};

/// What a module sees when it is registered.
#[derive(Debug, Clone)]
pub struct ModuleContext {
    /// The identifier the module was registered under.
    pub module: String,
    pub config: Arc<BridgeConfig>,
    /// Directory the module may persist state in.
    pub data_dir: PathBuf,
}

/// One command routed to a handler.
#[derive(Debug)]
pub struct Invocation<'a> {
    pub module: &'a str,
    pub callback_id: &'a CallbackId,
    pub action: &'a str,
    /// Unparsed wire-format arguments.
    pub raw_args: &'a str,
    /// Delivers results for `callback_id`, now or later, from any thread.
    pub responder: Responder,
    pub options: ParseOptions,
}

impl Invocation<'_> {
    /// Parse the raw arguments and check them against `shape`.
    pub fn args(&self, shape: &[KindSet]) -> Result<ArgumentList> {
        Ok(parse_and_validate(self.raw_args, shape, self.options)?)
    }

    /// The error for an action this module does not implement.
    pub fn invalid_action(&self) -> BridgeError {
        BridgeError::InvalidAction {
            module: self.module.to_string(),
            action: self.action.to_string(),
        }
    }
}

/// A handler's immediate answer.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// Terminal result, delivered with `keepCallback:false`.
    Done(Outcome),
    /// The responder has been handed off; deliveries arrive later.
    Pending,
}

impl Reply {
    pub fn success(payload: impl Into<Payload>) -> Self {
        Reply::Done(Outcome::success(payload))
    }

    pub fn no_result() -> Self {
        Reply::Done(Outcome::NoResult)
    }

    pub fn failure(status: CallbackStatus, message: impl Into<Payload>) -> Self {
        Reply::Done(Outcome::failure(status, message))
    }
}

/// A native module reachable by a string identifier.
///
/// `execute` runs on whatever thread dispatched the command, never
/// necessarily the script thread. An `Err` is reported to the script as a
/// failure delivery with a classified status.
pub trait CommandHandler: Send + Sync {
    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply>;

    /// Called once, before the module becomes dispatchable. An error aborts
    /// registration.
    fn on_register(&self, _ctx: &ModuleContext) -> Result<()> {
        Ok(())
    }

    /// Called once during registry shutdown, in reverse registration order.
    fn on_shutdown(&self) -> Result<()> {
        Ok(())
    }
}
