// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for shellgate.

use shellgate_args::{ArgsError, ParseError, ValidationError};
use thiserror::Error;

/// Top-level error type for all bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    // -- Dispatch --
    #[error("no module registered as {0:?}")]
    UnknownCommand(String),

    #[error("module {module:?} has no action {action:?}")]
    InvalidAction { module: String, action: String },

    #[error("module {0:?} is shut down")]
    ModuleClosed(String),

    #[error("module {0:?} is already registered")]
    DuplicateModule(String),

    #[error("module {module:?} failed to initialise: {reason}")]
    ModuleInit { module: String, reason: String },

    #[error("handler panicked: {0}")]
    HandlerPanicked(String),

    // -- Arguments --
    #[error("malformed arguments: {0}")]
    MalformedArguments(#[from] ArgsError),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- Worker contexts --
    #[error("{0} is already running")]
    AlreadyRunning(String),

    #[error("{0} is not running")]
    NotRunning(String),

    #[error("invalid session transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("capture device {0:?} is busy")]
    DeviceBusy(String),

    #[error("capture failed: {0}")]
    Capture(String),

    // -- Callback channel --
    #[error("callback {0} is already closed")]
    CallbackClosed(String),

    #[error("callback channel is closed")]
    ChannelClosed,

    #[error("script evaluation failed: {0}")]
    Script(String),

    // -- Storage / persistence --
    #[error("database error: {0}")]
    Database(String),

    #[error("file system error: {0}")]
    FileSystem(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Platform bridge --
    #[error("platform bridge error: {0}")]
    Bridge(String),

    #[error("feature not available on this platform")]
    PlatformUnavailable,

    #[error("not supported: {0}")]
    NotSupported(String),
}

impl From<ParseError> for BridgeError {
    fn from(err: ParseError) -> Self {
        BridgeError::MalformedArguments(err.into())
    }
}

impl From<ValidationError> for BridgeError {
    fn from(err: ValidationError) -> Self {
        BridgeError::MalformedArguments(err.into())
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BridgeError>;
