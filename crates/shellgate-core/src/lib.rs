// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Shellgate core types and error definitions shared across all crates.

pub mod config;
pub mod error;
pub mod status;
pub mod types;

pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use status::{CallbackStatus, classify};
pub use types::*;
