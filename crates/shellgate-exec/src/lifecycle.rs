// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application lifecycle events fired into the script environment.
//
//   Starting --deviceready--> Ready <--pause/resume--> Paused
//   Ready --backbutton--> Ready
//   any state except Ending --destroy--> Ending

use shellgate_core::{BridgeError, Result};
use tracing::{debug, info};

use crate::callback::CallbackSender;

/// Document events the host raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    DeviceReady,
    Pause,
    Resume,
    BackButton,
    Destroy,
}

impl LifecycleEvent {
    /// Event name as the script side listens for it.
    pub fn name(self) -> &'static str {
        match self {
            LifecycleEvent::DeviceReady => "deviceready",
            LifecycleEvent::Pause => "pause",
            LifecycleEvent::Resume => "resume",
            LifecycleEvent::BackButton => "backbutton",
            LifecycleEvent::Destroy => "destroy",
        }
    }

    pub fn statement(self, bridge: &str) -> String {
        format!("{bridge}.fireDocumentEvent('{}');", self.name())
    }
}

impl std::fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    Starting,
    Ready,
    Paused,
    Ending,
}

impl std::fmt::Display for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AppState::Starting => "Starting",
            AppState::Ready => "Ready",
            AppState::Paused => "Paused",
            AppState::Ending => "Ending",
        };
        f.write_str(name)
    }
}

/// Tracks the application state and forwards legal events to the script
/// thread through the callback queue, so they stay ordered with deliveries.
#[derive(Debug)]
pub struct AppLifecycle {
    state: AppState,
    sender: CallbackSender,
}

impl AppLifecycle {
    pub fn new(sender: CallbackSender) -> Self {
        Self {
            state: AppState::Starting,
            sender,
        }
    }

    pub fn state(&self) -> AppState {
        self.state
    }

    fn next(&self, event: LifecycleEvent) -> Option<AppState> {
        use AppState::*;
        use LifecycleEvent::*;
        match (self.state, event) {
            (Starting, DeviceReady) => Some(Ready),
            (Ready, Pause) => Some(Paused),
            (Paused, Resume) => Some(Ready),
            (Ready, BackButton) => Some(Ready),
            (Ending, _) => None,
            (_, Destroy) => Some(Ending),
            _ => None,
        }
    }

    /// Apply `event` and enqueue its statement. Illegal events leave the
    /// state untouched and nothing is sent.
    pub fn fire(&mut self, event: LifecycleEvent) -> Result<AppState> {
        let Some(next) = self.next(event) else {
            debug!(state = %self.state, event = %event, "lifecycle event rejected");
            return Err(BridgeError::InvalidTransition {
                from: self.state.to_string(),
                to: event.to_string(),
            });
        };
        self.sender
            .eval(event.statement(self.sender.bridge_object()))?;
        info!(from = %self.state, to = %next, event = %event, "lifecycle transition");
        self.state = next;
        Ok(next)
    }
}
