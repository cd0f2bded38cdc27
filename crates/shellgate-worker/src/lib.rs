// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Worker contexts used by modules whose results arrive after `execute`
// returns: polling streams (sensors) and capture sessions (camera).

pub mod session;
pub mod stream;

pub use session::{
    CaptureDevices, CaptureMode, CapturePipeline, CaptureRequest, CaptureSession, DeviceClaim, Frame,
    PipelineEvent, SessionEvent, SessionReport, SessionState, SyntheticPipeline,
};
pub use stream::{PollingStream, Sampler, StreamEvent};
