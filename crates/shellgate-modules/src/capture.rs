// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Camera and Capture modules: still pictures and recordings on the
// configured capture device.
//
// Both modules share one `CaptureService`, so a recording on the device
// makes a still capture fail with `DeviceBusy` and the other way round.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::Utc;
use crossbeam_channel::{Receiver, bounded};
use image::{ImageFormat, RgbImage};
use shellgate_args::{Object, Value};
use shellgate_bridge::PlatformBridge;
use shellgate_core::{BridgeError, CallbackStatus, Result};
use shellgate_exec::{CommandHandler, Invocation, ModuleContext, Outcome, Reply, Responder};
use shellgate_worker::{
    CaptureDevices, CaptureMode, CaptureRequest, CaptureSession, Frame, SessionEvent, SessionState,
};
use tracing::{debug, info, warn};

use crate::file::path_to_uri;

const START_TIMEOUT: Duration = Duration::from_secs(5);
const GRAB_TIMEOUT: Duration = Duration::from_secs(5);

struct Settings {
    device: String,
    captures: PathBuf,
}

/// The recording callback. The `recording` announcement always precedes any
/// other delivery, and only one terminal delivery is ever sent.
struct RecordingCallback {
    responder: Responder,
    announced: bool,
    closed: bool,
    early_failure: Option<String>,
}

impl RecordingCallback {
    fn announce(&mut self) {
        if self.closed {
            return;
        }
        self.announced = true;
        let status = Object::new().with("status", "recording");
        if let Err(e) = self.responder.success(status, true) {
            warn!(error = %e, "recording announcement dropped");
        }
        if let Some(message) = self.early_failure.take() {
            self.close(Outcome::failure(CallbackStatus::Error, message));
        }
    }

    fn fail(&mut self, message: String) {
        if self.announced {
            self.close(Outcome::failure(CallbackStatus::Error, message));
        } else if !self.closed {
            self.early_failure.get_or_insert(message);
        }
    }

    fn close(&mut self, outcome: Outcome) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.responder.outcome(outcome, false) {
            warn!(error = %e, "recording result dropped");
        }
    }
}

struct Recording {
    session: CaptureSession,
    callback: Arc<Mutex<RecordingCallback>>,
}

impl Recording {
    /// The script already received the terminal result, so only the session
    /// is left to reap.
    fn is_over(&self) -> bool {
        self.callback.lock().expect("recording callback lock poisoned").closed
    }
}

/// State shared by the Camera and Capture modules.
pub struct CaptureService {
    bridge: Arc<dyn PlatformBridge>,
    devices: CaptureDevices,
    settings: OnceLock<Settings>,
    recording: Mutex<Option<Recording>>,
    stills: Mutex<Vec<JoinHandle<()>>>,
    sequence: AtomicU64,
}

impl CaptureService {
    pub fn new(bridge: Arc<dyn PlatformBridge>) -> Self {
        Self {
            bridge,
            devices: CaptureDevices::new(),
            settings: OnceLock::new(),
            recording: Mutex::new(None),
            stills: Mutex::new(Vec::new()),
            sequence: AtomicU64::new(0),
        }
    }

    fn init(&self, ctx: &ModuleContext) -> Result<()> {
        if self.settings.get().is_some() {
            return Ok(());
        }
        let captures = ctx.data_dir.join("captures");
        fs::create_dir_all(&captures)
            .map_err(|e| BridgeError::FileSystem(format!("create {}: {e}", captures.display())))?;
        let _ = self.settings.set(Settings {
            device: ctx.config.capture_device.clone(),
            captures,
        });
        Ok(())
    }

    fn settings(&self) -> Result<&Settings> {
        self.settings
            .get()
            .ok_or_else(|| BridgeError::Bridge("capture service not initialised".into()))
    }

    fn artifact_path(&self, dir: &Path, prefix: &str, extension: &str) -> PathBuf {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stamp = Utc::now().format("%Y%m%d-%H%M%S");
        dir.join(format!("{prefix}_{stamp}_{n}.{extension}"))
    }

    /// Grab one frame, save it as JPEG and reply `[{fullPath}]`. The device
    /// is claimed before this returns; the rest happens on a worker thread.
    fn capture_still(&self, responder: Responder) -> Result<Reply> {
        let settings = self.settings()?;
        let pipeline = self.bridge.open_camera(&settings.device)?;
        let request = CaptureRequest {
            device: settings.device.clone(),
            mode: CaptureMode::Still,
        };

        let (frames_tx, frames_rx) = bounded(1);
        let session = CaptureSession::spawn(request, pipeline, &self.devices, move |event| {
            let message = match event {
                SessionEvent::Grabbed(frame) => Ok(frame),
                SessionEvent::Failed(message) => Err(message),
                SessionEvent::State(_) => return,
            };
            let _ = frames_tx.try_send(message);
        })?;

        let output = self.artifact_path(&settings.captures, "IMG", "jpg");
        let worker = thread::Builder::new()
            .name("still-capture".into())
            .spawn(move || {
                let result = grab_still(&session, &frames_rx).and_then(|frame| save_jpeg(frame, &output));
                if let Err(e) = session.stop() {
                    warn!(error = %e, "still session did not stop cleanly");
                }
                let sent = match result {
                    Ok(path) => {
                        info!(path = %path.display(), "picture saved");
                        let media = Object::new().with("fullPath", path_to_uri(&path));
                        responder.success(vec![Value::Object(media)], false)
                    }
                    Err(e) => responder.error(&e, false),
                };
                if let Err(e) = sent {
                    warn!(error = %e, "picture result dropped");
                }
            })?;

        let mut stills = self.stills.lock().expect("still capture list lock poisoned");
        stills.retain(|handle| !handle.is_finished());
        stills.push(worker);
        Ok(Reply::Pending)
    }

    fn start_recording(&self, responder: Responder) -> Result<Reply> {
        let settings = self.settings()?;
        let mut recording = self.recording.lock().expect("recording lock poisoned");
        if recording.as_ref().is_some_and(Recording::is_over) {
            if let Some(failed) = recording.take() {
                debug!(device = %settings.device, "reaping failed recording");
                finish_recording(failed)?;
            }
        }
        if recording.is_some() || self.devices.is_claimed(&settings.device) {
            return Err(BridgeError::DeviceBusy(settings.device.clone()));
        }

        let pipeline = self.bridge.open_camera(&settings.device)?;
        let request = CaptureRequest {
            device: settings.device.clone(),
            mode: CaptureMode::Recording {
                output: self.artifact_path(&settings.captures, "VID", "rgb"),
            },
        };
        let callback = Arc::new(Mutex::new(RecordingCallback {
            responder,
            announced: false,
            closed: false,
            early_failure: None,
        }));
        let observer_callback = Arc::clone(&callback);
        let session = CaptureSession::spawn(request, pipeline, &self.devices, move |event| {
            if let SessionEvent::Failed(message) = event {
                observer_callback
                    .lock()
                    .expect("recording callback lock poisoned")
                    .fail(message);
            }
        })?;

        callback.lock().expect("recording callback lock poisoned").announce();
        *recording = Some(Recording { session, callback });
        Ok(Reply::Pending)
    }

    fn stop_recording(&self) -> Result<Reply> {
        let active = self.recording.lock().expect("recording lock poisoned").take();
        let recording = active.ok_or_else(|| BridgeError::NotRunning("recording".into()))?;
        let was_over = recording.is_over();
        finish_recording(recording)?;
        if was_over {
            return Err(BridgeError::NotRunning("recording".into()));
        }
        Ok(Reply::no_result())
    }

    fn shutdown(&self) -> Result<()> {
        let active = self.recording.lock().expect("recording lock poisoned").take();
        let stopped = active.map_or(Ok(()), finish_recording);
        let stills = std::mem::take(&mut *self.stills.lock().expect("still capture list lock poisoned"));
        for handle in stills {
            if handle.join().is_err() {
                warn!("still capture worker panicked");
            }
        }
        stopped
    }
}

fn grab_still(session: &CaptureSession, frames: &Receiver<std::result::Result<Frame, String>>) -> Result<Frame> {
    session.wait_for(SessionState::Running, START_TIMEOUT)?;
    session.request_grab()?;
    match frames.recv_timeout(GRAB_TIMEOUT) {
        Ok(Ok(frame)) => Ok(frame),
        Ok(Err(message)) => Err(BridgeError::Capture(message)),
        Err(_) => Err(BridgeError::Capture(format!("no frame from {}", session.device()))),
    }
}

fn save_jpeg(frame: Frame, path: &Path) -> Result<PathBuf> {
    let Frame { width, height, rgb } = frame;
    let image = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| BridgeError::Capture(format!("frame buffer does not match {width}x{height}")))?;
    image
        .save_with_format(path, ImageFormat::Jpeg)
        .map_err(|e| BridgeError::Capture(format!("encode {}: {e}", path.display())))?;
    Ok(path.to_path_buf())
}

/// Stop the session and send the recording callback its terminal result.
fn finish_recording(recording: Recording) -> Result<()> {
    let Recording { session, callback } = recording;
    let report = session.stop()?;
    debug!(frames = report.frames_seen, recorded = ?report.recorded, "recording finished");

    let outcome = match (&report.artifact, &report.failure) {
        (Some(path), None) => {
            let media = Object::new()
                .with("fullPath", path_to_uri(path))
                .with("duration", report.recorded.as_secs_f64());
            Outcome::success(vec![Value::Object(media)])
        }
        (_, Some(message)) => Outcome::failure(CallbackStatus::Error, message.clone()),
        (None, None) => Outcome::failure(CallbackStatus::Error, "recording never started"),
    };
    callback.lock().expect("recording callback lock poisoned").close(outcome);
    Ok(())
}

/// `Camera`: still pictures.
pub struct Camera {
    service: Arc<CaptureService>,
}

impl Camera {
    pub fn new(service: Arc<CaptureService>) -> Self {
        Self { service }
    }
}

impl CommandHandler for Camera {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        self.service.init(ctx)
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "getPicture" => {
                invocation.args(&[])?;
                self.service.capture_still(invocation.responder)
            }
            _ => Err(invocation.invalid_action()),
        }
    }
}

/// `Capture`: still images, recordings and their stop command.
pub struct Capture {
    service: Arc<CaptureService>,
}

impl Capture {
    pub fn new(service: Arc<CaptureService>) -> Self {
        Self { service }
    }
}

impl CommandHandler for Capture {
    fn on_register(&self, ctx: &ModuleContext) -> Result<()> {
        self.service.init(ctx)
    }

    fn execute(&self, invocation: Invocation<'_>) -> Result<Reply> {
        match invocation.action {
            "captureImage" => {
                invocation.args(&[])?;
                self.service.capture_still(invocation.responder)
            }
            "captureVideo" => {
                invocation.args(&[])?;
                self.service.start_recording(invocation.responder)
            }
            "stopCapture" => {
                invocation.args(&[])?;
                self.service.stop_recording()
            }
            "captureAudio" => Err(BridgeError::NotSupported("audio capture".into())),
            _ => Err(invocation.invalid_action()),
        }
    }

    fn on_shutdown(&self) -> Result<()> {
        self.service.shutdown()
    }
}
