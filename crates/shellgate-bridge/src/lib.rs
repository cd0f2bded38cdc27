// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Native platform bridge: the capabilities feature modules call into, and
// the selection of an implementation for the build target.

pub mod stub;
pub mod traits;

pub use stub::{SYNTHETIC_CAMERA, StubBridge};
pub use traits::*;

/// The bridge implementation for the target operating system.
///
/// Only the desktop bridge exists today; mobile targets get it too and
/// report their sensors as unavailable.
pub fn platform_bridge() -> Box<dyn PlatformBridge> {
    Box::new(StubBridge)
}
