// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Capture session controller.
//
// A controller thread drives one capture pipeline through
//
//   Building -> Ready -> Running -> Stopping -> Closed
//
// reacting to pipeline events. It is the only writer of the session state;
// other threads observe the state and send requests (grab a frame, stop).
// Each device can be held by one session at a time.

use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use shellgate_core::{BridgeError, Result};
use tracing::{debug, error, info, warn};

/// How long one pipeline poll may block.
const POLL: Duration = Duration::from_millis(10);
/// How long a stopping pipeline gets to confirm before it is closed anyway.
const STOP_GRACE: Duration = Duration::from_secs(2);

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Building,
    Ready,
    Running,
    Stopping,
    Closed,
}

impl SessionState {
    pub const ALL: [SessionState; 5] = [
        SessionState::Building,
        SessionState::Ready,
        SessionState::Running,
        SessionState::Stopping,
        SessionState::Closed,
    ];

    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Building, Ready)
                | (Building, Closed)
                | (Ready, Running)
                | (Ready, Stopping)
                | (Running, Stopping)
                | (Stopping, Closed)
        )
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionState::Building => "Building",
            SessionState::Ready => "Ready",
            SessionState::Running => "Running",
            SessionState::Stopping => "Stopping",
            SessionState::Closed => "Closed",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Pipeline contract
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureMode {
    /// Frames are only delivered on request.
    Still,
    /// The pipeline records to `output` while running.
    Recording { output: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureRequest {
    pub device: String,
    pub mode: CaptureMode,
}

/// One RGB8 frame, row-major.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    TopologyReady,
    Started,
    Frame(Frame),
    /// The source ran out (end of stream).
    Ended,
    Stopped,
    /// The pipeline closed itself.
    Closed,
    Failed(String),
}

/// The platform side of a capture session.
pub trait CapturePipeline: Send {
    /// Resolve the device and assemble the pipeline. Completion is
    /// signalled by `TopologyReady`.
    fn build(&mut self, request: &CaptureRequest) -> Result<()>;
    /// Begin producing frames. Completion is signalled by `Started`.
    fn start(&mut self) -> Result<()>;
    /// Next event, or `None` when nothing arrived within `timeout`.
    fn poll_event(&mut self, timeout: Duration) -> Option<PipelineEvent>;
    /// Completion is signalled by `Stopped`.
    fn stop(&mut self) -> Result<()>;
    /// Release everything. Called exactly once, last.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// Device claims
// ---------------------------------------------------------------------------

/// Devices currently held by a session. Clones share the same set.
#[derive(Debug, Clone, Default)]
pub struct CaptureDevices {
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl CaptureDevices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn claim(&self, device: &str) -> Result<DeviceClaim> {
        let mut claimed = self.claimed.lock().expect("capture devices lock poisoned");
        if !claimed.insert(device.to_string()) {
            return Err(BridgeError::DeviceBusy(device.to_string()));
        }
        Ok(DeviceClaim {
            device: device.to_string(),
            claimed: Arc::clone(&self.claimed),
        })
    }

    pub fn is_claimed(&self, device: &str) -> bool {
        self.claimed
            .lock()
            .expect("capture devices lock poisoned")
            .contains(device)
    }
}

/// Exclusive hold on a device, released on drop.
#[derive(Debug)]
pub struct DeviceClaim {
    device: String,
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl DeviceClaim {
    pub fn device(&self) -> &str {
        &self.device
    }
}

impl Drop for DeviceClaim {
    fn drop(&mut self) {
        if let Ok(mut claimed) = self.claimed.lock() {
            claimed.remove(&self.device);
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Reported to the observer, on the controller thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    State(SessionState),
    /// A frame answering `request_grab`.
    Grabbed(Frame),
    Failed(String),
}

/// Summary returned by `CaptureSession::stop`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub device: String,
    pub final_state: SessionState,
    pub frames_seen: u64,
    pub frames_grabbed: u64,
    /// Time spent in `Running`.
    pub recorded: Duration,
    /// Recording output, when the session recorded anything.
    pub artifact: Option<PathBuf>,
    pub failure: Option<String>,
}

#[derive(Debug)]
enum Control {
    Grab,
    Stop,
}

struct Shared {
    state: Mutex<SessionState>,
    changed: Condvar,
}

/// Handle to a running capture session.
pub struct CaptureSession {
    device: String,
    shared: Arc<Shared>,
    control: Sender<Control>,
    handle: Option<JoinHandle<SessionReport>>,
}

impl std::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("device", &self.device)
            .field("state", &self.state())
            .finish()
    }
}

impl CaptureSession {
    /// Claim `request.device` and start a controller thread for `pipeline`.
    /// Fails with `DeviceBusy` if another session holds the device.
    pub fn spawn<O>(
        request: CaptureRequest,
        pipeline: Box<dyn CapturePipeline>,
        devices: &CaptureDevices,
        observer: O,
    ) -> Result<Self>
    where
        O: FnMut(SessionEvent) + Send + 'static,
    {
        let claim = devices.claim(&request.device)?;
        let shared = Arc::new(Shared {
            state: Mutex::new(SessionState::Building),
            changed: Condvar::new(),
        });
        let (control_tx, control_rx) = unbounded();
        let device = request.device.clone();

        let controller = Controller {
            request,
            pipeline,
            shared: Arc::clone(&shared),
            control: control_rx,
            observer: Box::new(observer),
            state: SessionState::Building,
            pending_grabs: 0,
            frames_seen: 0,
            frames_grabbed: 0,
            running_since: None,
            recorded: Duration::ZERO,
            reached_running: false,
            stop_requested: false,
            stopping_since: None,
            failure: None,
            _claim: claim,
        };
        let handle = thread::Builder::new()
            .name(format!("capture-{device}"))
            .spawn(move || controller.run())?;

        info!(device = %device, "capture session started");
        Ok(Self {
            device,
            shared,
            control: control_tx,
            handle: Some(handle),
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.lock().expect("session state lock poisoned")
    }

    /// Block until the session reaches `target`. Fails if the session
    /// closes first or `timeout` passes.
    pub fn wait_for(&self, target: SessionState, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock().expect("session state lock poisoned");
        loop {
            if *state == target {
                return Ok(());
            }
            if *state == SessionState::Closed {
                return Err(BridgeError::Capture(format!(
                    "session on {} closed before reaching {target}",
                    self.device
                )));
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(BridgeError::Capture(format!(
                    "timed out waiting for {target}, session on {} is {}",
                    self.device, *state
                )));
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, deadline - now)
                .expect("session state lock poisoned")
                .0;
        }
    }

    /// Ask for the next frame. It arrives as `SessionEvent::Grabbed`.
    pub fn request_grab(&self) -> Result<()> {
        self.control
            .send(Control::Grab)
            .map_err(|_| BridgeError::NotRunning(format!("capture session on {}", self.device)))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Signal the controller, wait for it to close the pipeline and exit.
    pub fn stop(mut self) -> Result<SessionReport> {
        let _ = self.control.send(Control::Stop);
        let handle = self
            .handle
            .take()
            .ok_or_else(|| BridgeError::NotRunning(format!("capture session on {}", self.device)))?;
        let report = handle.join().map_err(|_| {
            BridgeError::HandlerPanicked(format!("capture controller for {}", self.device))
        })?;
        info!(
            device = %report.device,
            frames = report.frames_seen,
            recorded = ?report.recorded,
            "capture session stopped"
        );
        Ok(report)
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = self.control.send(Control::Stop);
            let _ = handle.join();
        }
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

struct Controller {
    request: CaptureRequest,
    pipeline: Box<dyn CapturePipeline>,
    shared: Arc<Shared>,
    control: Receiver<Control>,
    observer: Box<dyn FnMut(SessionEvent) + Send>,
    state: SessionState,
    pending_grabs: u32,
    frames_seen: u64,
    frames_grabbed: u64,
    running_since: Option<Instant>,
    recorded: Duration,
    reached_running: bool,
    stop_requested: bool,
    stopping_since: Option<Instant>,
    failure: Option<String>,
    _claim: DeviceClaim,
}

impl Controller {
    fn run(mut self) -> SessionReport {
        if let Err(e) = self.pipeline.build(&self.request) {
            self.fail(e.to_string());
            self.pipeline.close();
            self.enter(SessionState::Closed);
            return self.report();
        }

        while self.state != SessionState::Closed {
            self.drain_control();
            if self.stop_requested {
                self.begin_stop();
            }
            if self.state == SessionState::Stopping
                && self.stopping_since.is_some_and(|since| since.elapsed() > STOP_GRACE)
            {
                warn!(device = %self.request.device, "pipeline did not confirm stop, closing");
                self.finish();
                continue;
            }
            if let Some(event) = self.pipeline.poll_event(POLL) {
                self.on_event(event);
            }
        }
        self.report()
    }

    fn drain_control(&mut self) {
        loop {
            match self.control.try_recv() {
                Ok(Control::Grab) => self.pending_grabs += 1,
                Ok(Control::Stop) | Err(TryRecvError::Disconnected) => {
                    self.stop_requested = true;
                    break;
                }
                Err(TryRecvError::Empty) => break,
            }
        }
    }

    fn on_event(&mut self, event: PipelineEvent) {
        use SessionState::*;
        match (self.state, event) {
            (Building, PipelineEvent::TopologyReady) => {
                self.enter(Ready);
                if let Err(e) = self.pipeline.start() {
                    self.fail(e.to_string());
                    self.begin_stop();
                }
            }
            (Ready, PipelineEvent::Started) => self.enter(Running),
            (Running, PipelineEvent::Frame(frame)) => {
                self.frames_seen += 1;
                if self.pending_grabs > 0 {
                    self.pending_grabs -= 1;
                    self.frames_grabbed += 1;
                    (self.observer)(SessionEvent::Grabbed(frame));
                }
            }
            (Ready | Running, PipelineEvent::Ended) => self.begin_stop(),
            (Stopping, PipelineEvent::Stopped) => self.finish(),
            (Building | Stopping, PipelineEvent::Closed) => self.enter(Closed),
            (Ready | Running, PipelineEvent::Closed) => {
                self.enter(Stopping);
                self.enter(Closed);
            }
            (state, PipelineEvent::Failed(message)) => {
                self.fail(message);
                if state == Building {
                    self.pipeline.close();
                    self.enter(Closed);
                } else {
                    self.begin_stop();
                }
            }
            (state, event) => debug!(state = %state, ?event, "pipeline event ignored"),
        }
    }

    fn begin_stop(&mut self) {
        match self.state {
            SessionState::Building => {
                self.pipeline.close();
                self.enter(SessionState::Closed);
            }
            SessionState::Ready | SessionState::Running => {
                self.enter(SessionState::Stopping);
                self.stopping_since = Some(Instant::now());
                if let Err(e) = self.pipeline.stop() {
                    warn!(device = %self.request.device, error = %e, "pipeline stop failed");
                    self.finish();
                }
            }
            SessionState::Stopping | SessionState::Closed => {}
        }
    }

    fn finish(&mut self) {
        self.pipeline.close();
        self.enter(SessionState::Closed);
    }

    fn fail(&mut self, message: String) {
        error!(device = %self.request.device, error = %message, "capture pipeline failed");
        (self.observer)(SessionEvent::Failed(message.clone()));
        self.failure.get_or_insert(message);
    }

    fn enter(&mut self, next: SessionState) {
        if !self.state.can_transition_to(next) {
            error!(from = %self.state, to = %next, "illegal session transition skipped");
            return;
        }
        debug!(device = %self.request.device, from = %self.state, to = %next, "session transition");
        if let Some(since) = self.running_since.take() {
            self.recorded += since.elapsed();
        }
        if next == SessionState::Running {
            self.running_since = Some(Instant::now());
            self.reached_running = true;
        }
        self.state = next;
        *self.shared.state.lock().expect("session state lock poisoned") = next;
        self.shared.changed.notify_all();
        (self.observer)(SessionEvent::State(next));
    }

    fn report(&self) -> SessionReport {
        let artifact = match &self.request.mode {
            CaptureMode::Recording { output } if self.reached_running => Some(output.clone()),
            _ => None,
        };
        SessionReport {
            device: self.request.device.clone(),
            final_state: self.state,
            frames_seen: self.frames_seen,
            frames_grabbed: self.frames_grabbed,
            recorded: self.recorded,
            artifact,
            failure: self.failure.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Synthetic pipeline
// ---------------------------------------------------------------------------

/// A pipeline with no hardware behind it. It produces a moving gradient at a
/// fixed frame rate; recording sessions append raw RGB8 frames to the output.
#[derive(Debug)]
pub struct SyntheticPipeline {
    width: u32,
    height: u32,
    frame_interval: Duration,
    queue: VecDeque<PipelineEvent>,
    running: bool,
    next_frame: Instant,
    tick: u32,
    output: Option<PathBuf>,
    sink: Option<File>,
}

impl SyntheticPipeline {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            frame_interval: Duration::from_secs(1) / fps.max(1),
            queue: VecDeque::new(),
            running: false,
            next_frame: Instant::now(),
            tick: 0,
            output: None,
            sink: None,
        }
    }

    /// Bytes in one frame.
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }

    fn render(&self) -> Frame {
        let mut rgb = Vec::with_capacity(self.frame_len());
        for y in 0..self.height {
            for x in 0..self.width {
                rgb.push(x.wrapping_add(self.tick) as u8);
                rgb.push(y as u8);
                rgb.push(self.tick.wrapping_mul(4) as u8);
            }
        }
        Frame {
            width: self.width,
            height: self.height,
            rgb,
        }
    }
}

impl Default for SyntheticPipeline {
    fn default() -> Self {
        Self::new(64, 48, 30)
    }
}

impl CapturePipeline for SyntheticPipeline {
    fn build(&mut self, request: &CaptureRequest) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(BridgeError::Capture("synthetic frame size is empty".into()));
        }
        if let CaptureMode::Recording { output } = &request.mode {
            self.output = Some(output.clone());
        }
        self.queue.push_back(PipelineEvent::TopologyReady);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        if let Some(output) = &self.output {
            self.sink = Some(File::create(output)?);
        }
        self.running = true;
        self.next_frame = Instant::now();
        self.queue.push_back(PipelineEvent::Started);
        Ok(())
    }

    fn poll_event(&mut self, timeout: Duration) -> Option<PipelineEvent> {
        if let Some(event) = self.queue.pop_front() {
            return Some(event);
        }
        if !self.running {
            thread::sleep(timeout);
            return None;
        }
        let now = Instant::now();
        if now < self.next_frame {
            let wait = self.next_frame - now;
            if wait > timeout {
                thread::sleep(timeout);
                return None;
            }
            thread::sleep(wait);
        }
        self.next_frame += self.frame_interval;
        self.tick = self.tick.wrapping_add(1);
        let frame = self.render();
        if let Some(sink) = &mut self.sink {
            if let Err(e) = sink.write_all(&frame.rgb) {
                self.running = false;
                return Some(PipelineEvent::Failed(format!("recording write failed: {e}")));
            }
        }
        Some(PipelineEvent::Frame(frame))
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
        }
        self.queue.push_back(PipelineEvent::Stopped);
        Ok(())
    }

    fn close(&mut self) {
        self.running = false;
        self.sink = None;
        self.queue.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WAIT: Duration = Duration::from_secs(5);

    fn still(device: &str) -> CaptureRequest {
        CaptureRequest {
            device: device.into(),
            mode: CaptureMode::Still,
        }
    }

    fn observer() -> (impl FnMut(SessionEvent) + Send + 'static, Receiver<SessionEvent>) {
        let (tx, rx) = unbounded::<SessionEvent>();
        (move |event: SessionEvent| drop(tx.send(event)), rx)
    }

    fn states(rx: &Receiver<SessionEvent>) -> Vec<SessionState> {
        rx.try_iter()
            .filter_map(|event| match event {
                SessionEvent::State(state) => Some(state),
                _ => None,
            })
            .collect()
    }

    /// Plays a fixed event script; `stop` queues `Stopped` unless told not to.
    struct Scripted {
        events: VecDeque<PipelineEvent>,
        fail_build: bool,
        closed: Arc<Mutex<bool>>,
    }

    impl Scripted {
        fn new(events: Vec<PipelineEvent>) -> (Self, Arc<Mutex<bool>>) {
            let closed = Arc::new(Mutex::new(false));
            let pipeline = Self {
                events: events.into(),
                fail_build: false,
                closed: Arc::clone(&closed),
            };
            (pipeline, closed)
        }
    }

    impl CapturePipeline for Scripted {
        fn build(&mut self, _request: &CaptureRequest) -> Result<()> {
            if self.fail_build {
                Err(BridgeError::Capture("no such camera".into()))
            } else {
                Ok(())
            }
        }

        fn start(&mut self) -> Result<()> {
            Ok(())
        }

        fn poll_event(&mut self, timeout: Duration) -> Option<PipelineEvent> {
            let event = self.events.pop_front();
            if event.is_none() {
                thread::sleep(timeout);
            }
            event
        }

        fn stop(&mut self) -> Result<()> {
            self.events.push_back(PipelineEvent::Stopped);
            Ok(())
        }

        fn close(&mut self) {
            *self.closed.lock().expect("lock") = true;
        }
    }

    #[test]
    fn transition_table() {
        use SessionState::*;
        let legal = [
            (Building, Ready),
            (Building, Closed),
            (Ready, Running),
            (Ready, Stopping),
            (Running, Stopping),
            (Stopping, Closed),
        ];
        for from in SessionState::ALL {
            for to in SessionState::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn still_capture_grabs_one_frame() {
        let devices = CaptureDevices::new();
        let (on_event, rx) = observer();
        let session = CaptureSession::spawn(
            still("cam0"),
            Box::new(SyntheticPipeline::new(8, 4, 200)),
            &devices,
            on_event,
        )
        .expect("spawn");

        session.wait_for(SessionState::Running, WAIT).expect("running");
        session.request_grab().expect("grab");

        let frame = loop {
            match rx.recv_timeout(WAIT).expect("event") {
                SessionEvent::Grabbed(frame) => break frame,
                SessionEvent::Failed(message) => panic!("failed: {message}"),
                SessionEvent::State(_) => {}
            }
        };
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.rgb.len(), 8 * 4 * 3);

        let report = session.stop().expect("stop");
        assert_eq!(report.final_state, SessionState::Closed);
        assert_eq!(report.frames_grabbed, 1);
        assert!(report.frames_seen >= 1);
        assert_eq!(report.artifact, None);
        assert_eq!(report.failure, None);
        assert_eq!(
            states(&rx),
            [SessionState::Stopping, SessionState::Closed]
        );
        assert!(!devices.is_claimed("cam0"));
    }

    #[test]
    fn one_session_per_device() {
        let devices = CaptureDevices::new();
        let first = CaptureSession::spawn(
            still("cam0"),
            Box::new(SyntheticPipeline::default()),
            &devices,
            |_| {},
        )
        .expect("first");

        let err = CaptureSession::spawn(
            still("cam0"),
            Box::new(SyntheticPipeline::default()),
            &devices,
            |_| {},
        )
        .expect_err("busy");
        assert!(matches!(err, BridgeError::DeviceBusy(device) if device == "cam0"));

        let other = CaptureSession::spawn(
            still("cam1"),
            Box::new(SyntheticPipeline::default()),
            &devices,
            |_| {},
        )
        .expect("different device");

        first.stop().expect("stop first");
        other.stop().expect("stop other");
        let again = CaptureSession::spawn(
            still("cam0"),
            Box::new(SyntheticPipeline::default()),
            &devices,
            |_| {},
        )
        .expect("device released");
        again.stop().expect("stop again");
    }

    #[test]
    fn recording_writes_the_artifact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let output = dir.path().join("clip.rgb");
        let pipeline = SyntheticPipeline::new(4, 4, 500);
        let frame_len = pipeline.frame_len() as u64;

        let session = CaptureSession::spawn(
            CaptureRequest {
                device: "cam0".into(),
                mode: CaptureMode::Recording {
                    output: output.clone(),
                },
            },
            Box::new(pipeline),
            &CaptureDevices::new(),
            |_| {},
        )
        .expect("spawn");
        session.wait_for(SessionState::Running, WAIT).expect("running");
        thread::sleep(Duration::from_millis(50));

        let report = session.stop().expect("stop");
        assert_eq!(report.artifact.as_deref(), Some(output.as_path()));
        assert!(report.recorded >= Duration::from_millis(50));
        assert!(report.frames_seen > 0);
        let written = std::fs::metadata(&output).expect("artifact").len();
        assert_eq!(written, report.frames_seen * frame_len);
    }

    #[test]
    fn build_failure_closes_the_session() {
        let (mut pipeline, closed) = Scripted::new(vec![]);
        pipeline.fail_build = true;
        let devices = CaptureDevices::new();
        let (on_event, rx) = observer();
        let session =
            CaptureSession::spawn(still("cam0"), Box::new(pipeline), &devices, on_event).expect("spawn");

        let err = session
            .wait_for(SessionState::Running, WAIT)
            .expect_err("never runs");
        assert!(matches!(err, BridgeError::Capture(_)));

        let report = session.stop().expect("stop");
        assert_eq!(report.final_state, SessionState::Closed);
        assert!(report.failure.as_deref().is_some_and(|m| m.contains("no such camera")));
        assert!(*closed.lock().expect("lock"));
        assert!(!devices.is_claimed("cam0"));
        assert!(rx.try_iter().any(|e| matches!(e, SessionEvent::Failed(_))));
    }

    #[test]
    fn failure_while_running_stops_then_closes() {
        let (pipeline, closed) = Scripted::new(vec![
            PipelineEvent::TopologyReady,
            PipelineEvent::Started,
            PipelineEvent::Failed("sensor unplugged".into()),
        ]);
        let (on_event, rx) = observer();
        let session = CaptureSession::spawn(still("cam0"), Box::new(pipeline), &CaptureDevices::new(), on_event)
            .expect("spawn");
        session.wait_for(SessionState::Closed, WAIT).expect("closed");

        let report = session.stop().expect("stop");
        assert_eq!(report.failure.as_deref(), Some("sensor unplugged"));
        assert!(*closed.lock().expect("lock"));
        assert_eq!(
            states(&rx),
            [
                SessionState::Ready,
                SessionState::Running,
                SessionState::Stopping,
                SessionState::Closed
            ]
        );
    }

    #[test]
    fn stop_while_building_goes_straight_to_closed() {
        let (pipeline, closed) = Scripted::new(vec![]);
        let (on_event, rx) = observer();
        let session = CaptureSession::spawn(still("cam0"), Box::new(pipeline), &CaptureDevices::new(), on_event)
            .expect("spawn");
        assert_eq!(session.state(), SessionState::Building);

        let report = session.stop().expect("stop");
        assert_eq!(report.final_state, SessionState::Closed);
        assert!(*closed.lock().expect("lock"));
        assert_eq!(states(&rx), [SessionState::Closed]);
    }

    #[test]
    fn end_of_stream_stops_the_session() {
        let (pipeline, _closed) = Scripted::new(vec![
            PipelineEvent::TopologyReady,
            PipelineEvent::Started,
            PipelineEvent::Ended,
        ]);
        let session = CaptureSession::spawn(still("cam0"), Box::new(pipeline), &CaptureDevices::new(), |_| {})
            .expect("spawn");
        session.wait_for(SessionState::Closed, WAIT).expect("closed");
        assert!(session.stop().expect("stop").failure.is_none());
    }

    #[test]
    fn dropping_the_handle_releases_the_device() {
        let devices = CaptureDevices::new();
        let session = CaptureSession::spawn(
            still("cam0"),
            Box::new(SyntheticPipeline::default()),
            &devices,
            |_| {},
        )
        .expect("spawn");
        assert!(devices.is_claimed("cam0"));
        drop(session);
        assert!(!devices.is_claimed("cam0"));
    }
}
