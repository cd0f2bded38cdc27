// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shellgate execution layer: the handler contract, the module registry, the
// callback channel and the pump that evaluates statements on the thread that
// owns the script environment.

pub mod callback;
pub mod envelope;
pub mod handler;
pub mod lifecycle;
pub mod pump;
pub mod registry;

pub use callback::{CallbackSender, Delivery, Outcome, Payload, Responder, callback_channel};
pub use envelope::Command;
pub use handler::{CommandHandler, Invocation, ModuleContext, Reply};
pub use lifecycle::{AppLifecycle, AppState, LifecycleEvent};
pub use pump::{ProtocolViolation, PumpReport, RecordingHost, ScriptHost, ScriptPump};
pub use registry::{DispatchOutcome, ModuleRegistry, ModuleState, ShutdownReport};
