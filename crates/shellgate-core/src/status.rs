// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Callback status codes and the mapping from errors to codes.
//
// Every failure that reaches the script side carries one of these codes. The
// script decides from the code whether retrying makes sense.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Status attached to every callback delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CallbackStatus {
    /// The operation produced no value (yet).
    NoResult,
    Ok,
    /// No module registered under the requested name.
    ClassNotFound,
    /// The module does not implement the requested action.
    InvalidAction,
    /// Parse or shape validation failure.
    MalformedArguments,
    /// File system, storage or other I/O failure.
    IoFailure,
    /// The capability does not exist on this platform.
    NotSupported,
    /// Catch-all; the message carries the detail.
    Error,
}

impl CallbackStatus {
    /// Member name under `<bridge>.callbackStatus` in the script environment.
    pub fn script_name(self) -> &'static str {
        match self {
            CallbackStatus::NoResult => "NO_RESULT",
            CallbackStatus::Ok => "OK",
            CallbackStatus::ClassNotFound => "CLASS_NOT_FOUND",
            CallbackStatus::InvalidAction => "INVALID_ACTION",
            CallbackStatus::MalformedArguments => "MALFORMED_ARGUMENTS",
            CallbackStatus::IoFailure => "IO_FAILURE",
            CallbackStatus::NotSupported => "NOT_SUPPORTED",
            CallbackStatus::Error => "ERROR",
        }
    }

    /// Stable numeric code, in declaration order.
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn is_success(self) -> bool {
        matches!(self, CallbackStatus::Ok | CallbackStatus::NoResult)
    }
}

impl std::fmt::Display for CallbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.script_name())
    }
}

/// Pick the status a failure delivery should carry for `err`.
pub fn classify(err: &BridgeError) -> CallbackStatus {
    match err {
        // -- Dispatch --
        BridgeError::UnknownCommand(_) => CallbackStatus::ClassNotFound,
        BridgeError::InvalidAction { .. } => CallbackStatus::InvalidAction,

        // -- Arguments --
        BridgeError::MalformedArguments(_) | BridgeError::InvalidArgument(_) => {
            CallbackStatus::MalformedArguments
        }

        // -- Storage / persistence --
        BridgeError::Io(_) | BridgeError::FileSystem(_) | BridgeError::Database(_) => {
            CallbackStatus::IoFailure
        }

        // -- Platform bridge --
        BridgeError::PlatformUnavailable | BridgeError::NotSupported(_) => {
            CallbackStatus::NotSupported
        }

        BridgeError::ModuleClosed(_)
        | BridgeError::DuplicateModule(_)
        | BridgeError::ModuleInit { .. }
        | BridgeError::HandlerPanicked(_)
        | BridgeError::AlreadyRunning(_)
        | BridgeError::NotRunning(_)
        | BridgeError::InvalidTransition { .. }
        | BridgeError::DeviceBusy(_)
        | BridgeError::Capture(_)
        | BridgeError::CallbackClosed(_)
        | BridgeError::ChannelClosed
        | BridgeError::Script(_)
        | BridgeError::Serialization(_)
        | BridgeError::Bridge(_) => CallbackStatus::Error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shellgate_args::{ParseError, ValidationError};

    #[test]
    fn parse_and_validation_errors_are_malformed_arguments() {
        let parse: BridgeError = ParseError::TrailingCharacters { offset: 3 }.into();
        let shape: BridgeError = ValidationError::Length {
            expected: 2,
            actual: 1,
        }
        .into();
        assert_eq!(classify(&parse), CallbackStatus::MalformedArguments);
        assert_eq!(classify(&shape), CallbackStatus::MalformedArguments);
    }

    #[test]
    fn io_is_io_failure() {
        let err = BridgeError::Io(std::io::Error::other("disk full"));
        assert_eq!(classify(&err), CallbackStatus::IoFailure);
    }

    #[test]
    fn missing_platform_is_not_supported() {
        assert_eq!(
            classify(&BridgeError::PlatformUnavailable),
            CallbackStatus::NotSupported
        );
    }

    #[test]
    fn unknown_action_is_invalid_action() {
        let err = BridgeError::InvalidAction {
            module: "Device".into(),
            action: "explode".into(),
        };
        assert_eq!(classify(&err), CallbackStatus::InvalidAction);
        assert_eq!(err.to_string(), r#"module "Device" has no action "explode""#);
    }

    #[test]
    fn worker_errors_fall_back_to_error() {
        assert_eq!(
            classify(&BridgeError::AlreadyRunning("accelerometer".into())),
            CallbackStatus::Error
        );
    }

    #[test]
    fn script_names_and_codes() {
        assert_eq!(CallbackStatus::NoResult.code(), 0);
        assert_eq!(CallbackStatus::Ok.code(), 1);
        assert_eq!(CallbackStatus::IoFailure.script_name(), "IO_FAILURE");
        assert!(CallbackStatus::NoResult.is_success());
        assert!(!CallbackStatus::Error.is_success());
    }
}
