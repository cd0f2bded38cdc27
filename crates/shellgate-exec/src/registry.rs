// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Module registry and command dispatch.
//
// Registration happens once, single-threaded, before the registry is shared.
// After that, concurrent `dispatch` calls only read the table; the per-module
// lifecycle state is the only thing that changes, and only at shutdown.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use shellgate_core::{BridgeConfig, BridgeError, CallbackId, CallbackStatus, Result, classify};
use tracing::{debug, info, instrument, warn};

use crate::callback::{CallbackSender, Payload};
use crate::envelope::Command;
use crate::handler::{CommandHandler, Invocation, ModuleContext, Reply};

/// Lifecycle of one registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    Unregistered,
    /// The only state in which commands are routed to the module.
    Registered,
    ShuttingDown,
    Closed,
}

/// What happened to a dispatched command.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The handler answered immediately; the result is queued.
    Delivered,
    /// The handler kept the callback; results follow later.
    Pending,
    /// No module with that identifier. Nothing was evaluated.
    UnknownCommand(String),
    /// The module is shutting down or closed. Nothing was evaluated.
    ModuleClosed(String),
    /// Arguments, action or handler failed. A failure delivery was queued.
    Rejected {
        status: CallbackStatus,
        message: String,
    },
}

/// Result of [`ModuleRegistry::shutdown`].
#[derive(Debug, Default)]
pub struct ShutdownReport {
    /// Modules closed, in the order their hooks ran.
    pub closed: Vec<String>,
    pub failures: Vec<(String, BridgeError)>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

struct RegisteredModule {
    identifier: String,
    handler: Arc<dyn CommandHandler>,
    state: Mutex<ModuleState>,
}

impl RegisteredModule {
    fn state(&self) -> ModuleState {
        *self.state.lock().expect("module state lock poisoned")
    }

    fn set_state(&self, next: ModuleState) {
        *self.state.lock().expect("module state lock poisoned") = next;
    }
}

/// Table from module identifier to handler, in registration order.
pub struct ModuleRegistry {
    modules: Vec<RegisteredModule>,
    index: HashMap<String, usize>,
    callbacks: CallbackSender,
    config: Arc<BridgeConfig>,
    data_dir: PathBuf,
    shut_down: AtomicBool,
}

impl ModuleRegistry {
    pub fn new(callbacks: CallbackSender, config: Arc<BridgeConfig>, data_dir: PathBuf) -> Self {
        Self {
            modules: Vec::new(),
            index: HashMap::new(),
            callbacks,
            config,
            data_dir,
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn callbacks(&self) -> &CallbackSender {
        &self.callbacks
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Register `handler` under `identifier` and run its `on_register` hook.
    ///
    /// A duplicate identifier is a programming error and fails; so does a
    /// failing hook, in which case the module is not registered.
    pub fn register(&mut self, identifier: impl Into<String>, handler: impl CommandHandler + 'static) -> Result<()> {
        self.register_shared(identifier, Arc::new(handler))
    }

    pub fn register_shared(
        &mut self,
        identifier: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<()> {
        let identifier = identifier.into();
        if self.index.contains_key(&identifier) {
            return Err(BridgeError::DuplicateModule(identifier));
        }

        let ctx = ModuleContext {
            module: identifier.clone(),
            config: Arc::clone(&self.config),
            data_dir: self.data_dir.clone(),
        };
        handler.on_register(&ctx).map_err(|e| BridgeError::ModuleInit {
            module: identifier.clone(),
            reason: e.to_string(),
        })?;

        let order = self.modules.len();
        self.index.insert(identifier.clone(), order);
        info!(module = %identifier, order, "module registered");
        self.modules.push(RegisteredModule {
            identifier,
            handler,
            state: Mutex::new(ModuleState::Registered),
        });
        Ok(())
    }

    pub fn state(&self, identifier: &str) -> ModuleState {
        self.index
            .get(identifier)
            .map_or(ModuleState::Unregistered, |&i| self.modules[i].state())
    }

    /// Identifiers in registration order.
    pub fn identifiers(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(|m| m.identifier.as_str())
    }

    pub fn dispatch_command(&self, command: &Command) -> DispatchOutcome {
        self.dispatch(
            &command.module,
            &command.callback_id,
            &command.action,
            &command.args,
        )
    }

    /// Route one command to its handler. Never blocks on asynchronous
    /// results and never panics, whatever the handler does.
    #[instrument(skip_all, fields(module = %identifier, callback_id = %callback_id, action = %action))]
    pub fn dispatch(
        &self,
        identifier: &str,
        callback_id: &CallbackId,
        action: &str,
        raw_args: &str,
    ) -> DispatchOutcome {
        let Some(&position) = self.index.get(identifier) else {
            warn!("no module registered under this identifier");
            return DispatchOutcome::UnknownCommand(identifier.to_string());
        };
        let module = &self.modules[position];
        if module.state() != ModuleState::Registered {
            debug!(state = ?module.state(), "module not accepting commands");
            return DispatchOutcome::ModuleClosed(identifier.to_string());
        }

        let responder = self.callbacks.responder(callback_id.clone());
        if let Err(e) = self.callbacks.open(callback_id) {
            warn!(error = %e, "callback channel closed; command dropped");
            return DispatchOutcome::Rejected {
                status: classify(&e),
                message: e.to_string(),
            };
        }

        let invocation = Invocation {
            module: identifier,
            callback_id,
            action,
            raw_args,
            responder: responder.clone(),
            options: self.config.parse_options(),
        };
        let result = panic::catch_unwind(AssertUnwindSafe(|| module.handler.execute(invocation)));

        let err = match result {
            Ok(Ok(Reply::Done(outcome))) => {
                debug!(status = %outcome.status(), "handler answered immediately");
                if let Err(e) = responder.outcome(outcome, false) {
                    warn!(error = %e, "could not queue handler result");
                }
                return DispatchOutcome::Delivered;
            }
            Ok(Ok(Reply::Pending)) => {
                debug!("handler kept the callback");
                return DispatchOutcome::Pending;
            }
            Ok(Err(err)) => err,
            Err(payload) => BridgeError::HandlerPanicked(panic_message(payload.as_ref())),
        };

        let status = classify(&err);
        let message = err.to_string();
        warn!(%status, error = %message, "command rejected");
        if let Err(e) = responder.failure(status, Payload::text(message.clone()), false) {
            warn!(error = %e, "could not queue failure delivery");
        }
        DispatchOutcome::Rejected { status, message }
    }

    /// Run every shutdown hook in reverse registration order.
    ///
    /// Best-effort: a failing or panicking hook is recorded and the next one
    /// still runs. Calling this twice is a no-op the second time.
    pub fn shutdown(&self) -> ShutdownReport {
        let mut report = ShutdownReport::default();
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return report;
        }

        for module in self.modules.iter().rev() {
            module.set_state(ModuleState::ShuttingDown);
            let result = panic::catch_unwind(AssertUnwindSafe(|| module.handler.on_shutdown()));
            let failure = match result {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e),
                Err(payload) => Some(BridgeError::HandlerPanicked(panic_message(payload.as_ref()))),
            };
            if let Some(e) = failure {
                warn!(module = %module.identifier, error = %e, "shutdown hook failed");
                report.failures.push((module.identifier.clone(), e));
            }
            module.set_state(ModuleState::Closed);
            report.closed.push(module.identifier.clone());
        }

        info!(
            closed = report.closed.len(),
            failed = report.failures.len(),
            "module registry shut down"
        );
        report
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use shellgate_args::KindSet;

    use super::*;
    use crate::callback::{Outcome, callback_channel};
    use crate::pump::{RecordingHost, ScriptPump};

    /// Counts invocations and answers according to the action name.
    #[derive(Default)]
    struct Probe {
        calls: Arc<AtomicUsize>,
        shutdown_log: Option<Arc<Mutex<Vec<&'static str>>>>,
        name: &'static str,
        fail_shutdown: bool,
    }

    impl CommandHandler for Probe {
        fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match invocation.action {
                "sum" => {
                    let args = invocation.args(&[KindSet::INT32, KindSet::INT32])?;
                    Ok(Reply::success(args.int32(0)? + args.int32(1)?))
                }
                "fail" => Err(BridgeError::Io(std::io::Error::other("disk full"))),
                "later" => {
                    let responder = invocation.responder.clone();
                    std::thread::spawn(move || responder.success("done", false))
                        .join()
                        .expect("worker")?;
                    Ok(Reply::Pending)
                }
                "panic" => panic!("handler exploded"),
                _ => Err(invocation.invalid_action()),
            }
        }

        fn on_shutdown(&self) -> Result<()> {
            if let Some(log) = &self.shutdown_log {
                log.lock().expect("log lock").push(self.name);
            }
            if self.fail_shutdown {
                return Err(BridgeError::Bridge(format!("{} refused to stop", self.name)));
            }
            Ok(())
        }
    }

    struct FailingInit;

    impl CommandHandler for FailingInit {
        fn execute(&self, _invocation: Invocation<'_>) -> Result<Reply> {
            Ok(Reply::no_result())
        }

        fn on_register(&self, _ctx: &ModuleContext) -> Result<()> {
            Err(BridgeError::PlatformUnavailable)
        }
    }

    fn registry() -> (ModuleRegistry, ScriptPump) {
        let config = Arc::new(BridgeConfig {
            bridge_object: "b".into(),
            ..BridgeConfig::default()
        });
        let (sender, pump) = callback_channel(&config);
        (ModuleRegistry::new(sender, config, PathBuf::new()), pump)
    }

    fn drain(pump: &mut ScriptPump) -> Vec<String> {
        let mut host = RecordingHost::new();
        pump.pump_pending(&mut host);
        host.statements()
    }

    #[test]
    fn unknown_module_evaluates_nothing() {
        let (registry, mut pump) = registry();
        let outcome = registry.dispatch("Device", &CallbackId::from("cb1"), "getX", "");
        assert_eq!(outcome, DispatchOutcome::UnknownCommand("Device".into()));
        assert!(drain(&mut pump).is_empty());
    }

    #[test]
    fn duplicate_registration_fails() {
        let (mut registry, _pump) = registry();
        registry.register("Storage", Probe::default()).expect("first");
        let err = registry
            .register("Storage", Probe::default())
            .expect_err("second must fail");
        assert!(matches!(err, BridgeError::DuplicateModule(ref id) if id == "Storage"));
        assert_eq!(registry.identifiers().count(), 1);
    }

    #[test]
    fn identifiers_are_case_sensitive() {
        let (mut registry, _pump) = registry();
        registry.register("Device", Probe::default()).expect("register");
        assert_eq!(
            registry.dispatch("device", &CallbackId::from("cb"), "sum", "[1,2]"),
            DispatchOutcome::UnknownCommand("device".into())
        );
    }

    #[test]
    fn immediate_reply_is_delivered_once() {
        let (mut registry, mut pump) = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register("Math", Probe { calls: Arc::clone(&calls), ..Probe::default() })
            .expect("register");

        let outcome = registry.dispatch("Math", &CallbackId::from("cb7"), "sum", "[40,2]");
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            drain(&mut pump),
            vec!["b.callbackSuccess('cb7',{status:b.callbackStatus.OK,keepCallback:false,message:42});"]
        );
    }

    #[test]
    fn malformed_arguments_are_rejected_and_reported() {
        let (mut registry, mut pump) = registry();
        registry.register("Math", Probe::default()).expect("register");

        let outcome = registry.dispatch("Math", &CallbackId::from("cb8"), "sum", r#"["a",2]"#);
        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected { status: CallbackStatus::MalformedArguments, .. }
        ));
        let statements = drain(&mut pump);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].starts_with("b.callbackError('cb8',{status:b.callbackStatus.MALFORMED_ARGUMENTS"));

        let syntax = registry.dispatch("Math", &CallbackId::from("cb9"), "sum", "[1,2");
        assert!(matches!(
            syntax,
            DispatchOutcome::Rejected { status: CallbackStatus::MalformedArguments, .. }
        ));
    }

    #[test]
    fn handler_failure_goes_through_failure_path() {
        let (mut registry, mut pump) = registry();
        registry.register("Disk", Probe::default()).expect("register");
        registry.dispatch("Disk", &CallbackId::from("cb3"), "fail", "[]");
        assert_eq!(
            drain(&mut pump),
            vec!["b.callbackError('cb3',{status:b.callbackStatus.IO_FAILURE,keepCallback:false,message:\"file I/O error: disk full\"});"]
        );
    }

    #[test]
    fn unknown_action_is_invalid_action() {
        let (mut registry, mut pump) = registry();
        registry.register("Math", Probe::default()).expect("register");
        let outcome = registry.dispatch("Math", &CallbackId::from("cb"), "divide", "[]");
        assert!(matches!(
            outcome,
            DispatchOutcome::Rejected { status: CallbackStatus::InvalidAction, .. }
        ));
        assert_eq!(drain(&mut pump).len(), 1);
    }

    #[test]
    fn panicking_handler_does_not_escape_dispatch() {
        let (mut registry, mut pump) = registry();
        registry.register("Bad", Probe::default()).expect("register");
        let outcome = registry.dispatch("Bad", &CallbackId::from("cb"), "panic", "[]");
        match outcome {
            DispatchOutcome::Rejected { status, message } => {
                assert_eq!(status, CallbackStatus::Error);
                assert!(message.contains("handler exploded"));
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(drain(&mut pump).len(), 1);
        // Still dispatchable afterwards.
        assert_eq!(registry.state("Bad"), ModuleState::Registered);
    }

    #[test]
    fn pending_reply_delivers_from_worker() {
        let (mut registry, mut pump) = registry();
        registry.register("Slow", Probe::default()).expect("register");
        let outcome = registry.dispatch("Slow", &CallbackId::from("cb"), "later", "[]");
        assert_eq!(outcome, DispatchOutcome::Pending);
        let statements = drain(&mut pump);
        assert_eq!(statements.len(), 1);
        assert!(statements[0].contains("message:\"done\""));
    }

    #[test]
    fn reused_callback_id_is_not_a_violation() {
        let (mut registry, mut pump) = registry();
        registry.register("Math", Probe::default()).expect("register");
        let id = CallbackId::from("same");
        registry.dispatch("Math", &id, "sum", "[1,1]");
        registry.dispatch("Math", &id, "sum", "[2,2]");
        assert_eq!(drain(&mut pump).len(), 2);
        assert!(pump.violations().is_empty());

        // A stray delivery after the second close is caught.
        registry
            .callbacks()
            .deliver(&id, Outcome::success(0), false)
            .expect("send");
        drain(&mut pump);
        assert_eq!(pump.violations().len(), 1);
    }

    #[test]
    fn failing_on_register_is_an_init_error() {
        let (mut registry, _pump) = registry();
        let err = registry.register("Camera", FailingInit).expect_err("init fails");
        assert!(matches!(err, BridgeError::ModuleInit { ref module, .. } if module == "Camera"));
        assert_eq!(registry.state("Camera"), ModuleState::Unregistered);
    }

    #[test]
    fn shutdown_runs_in_reverse_order_and_collects_failures() {
        let (mut registry, _pump) = registry();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (name, fail) in [("First", false), ("Second", true), ("Third", false)] {
            registry
                .register(
                    name,
                    Probe {
                        name,
                        fail_shutdown: fail,
                        shutdown_log: Some(Arc::clone(&log)),
                        ..Probe::default()
                    },
                )
                .expect("register");
        }

        let report = registry.shutdown();
        assert_eq!(*log.lock().expect("log lock"), vec!["Third", "Second", "First"]);
        assert_eq!(report.closed, vec!["Third", "Second", "First"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "Second");
        assert!(!report.is_clean());

        for name in ["First", "Second", "Third"] {
            assert_eq!(registry.state(name), ModuleState::Closed);
        }
        assert_eq!(
            registry.dispatch("First", &CallbackId::from("cb"), "sum", "[1,2]"),
            DispatchOutcome::ModuleClosed("First".into())
        );

        // Second call does nothing.
        let again = registry.shutdown();
        assert!(again.closed.is_empty());
        assert_eq!(log.lock().expect("log lock").len(), 3);
    }

    #[test]
    fn concurrent_dispatch_reads_shared_registry() {
        let (mut registry, mut pump) = registry();
        let calls = Arc::new(AtomicUsize::new(0));
        registry
            .register("Math", Probe { calls: Arc::clone(&calls), ..Probe::default() })
            .expect("register");
        let registry = Arc::new(registry);

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        let id = CallbackId::new(format!("t{t}-{i}"));
                        assert_eq!(
                            registry.dispatch("Math", &id, "sum", "[1,2]"),
                            DispatchOutcome::Delivered
                        );
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().expect("dispatch thread");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 200);
        assert_eq!(drain(&mut pump).len(), 200);
    }
}
