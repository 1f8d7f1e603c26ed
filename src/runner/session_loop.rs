//! Single event loop that owns the calibration state machine.
//!
//! Operator commands, push messages and request completions arrive on
//! channels and are applied one at a time. Requests run as spawned tasks and
//! report back through the completion channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, watch};

use super::command::CalibrationCommand;
use crate::backend::{BackendError, CalibrationBackend, CaptureAck, GeneratedFile};
use crate::calibration::{
    CalibrationStateMachine, ClickOutcome, ImagePoint, RequestTicket, SessionSnapshot,
};
use crate::events::PluginMessage;
use crate::notice::Notice;

/// Configuration for the session runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Capacity of the command channel.
    pub command_buffer: usize,
    /// Capacity of the push message channel.
    pub message_buffer: usize,
    /// Request a picture right away when running in first-run setup.
    pub startup_capture: bool,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command_buffer: 32,
            message_buffer: 64,
            startup_capture: true,
        }
    }
}

impl RunnerConfig {
    pub fn with_command_buffer(mut self, size: usize) -> Self {
        self.command_buffer = size.max(1);
        self
    }

    pub fn with_message_buffer(mut self, size: usize) -> Self {
        self.message_buffer = size.max(1);
        self
    }

    pub fn with_startup_capture(mut self, enabled: bool) -> Self {
        self.startup_capture = enabled;
        self
    }
}

/// Errors from the session runner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("Channel closed")]
    ChannelClosed,
}

/// Control commands for the loop.
#[derive(Debug, Clone)]
enum ControlCommand {
    Stop,
}

/// Finished background request.
enum Completion {
    Capture(RequestTicket, Result<CaptureAck, BackendError>),
    Submit(RequestTicket, Result<(), BackendError>),
    GenerateMarkers(RequestTicket, Result<GeneratedFile, BackendError>),
    EngraveMarkers(RequestTicket, Result<(), BackendError>),
}

/// Handle for driving a running session from outside.
#[derive(Clone)]
pub struct CalibrationHandle {
    command_tx: mpsc::Sender<CalibrationCommand>,
    message_tx: mpsc::Sender<PluginMessage>,
    control_tx: mpsc::Sender<ControlCommand>,
    snapshot_rx: watch::Receiver<SessionSnapshot>,
    running: Arc<AtomicBool>,
}

impl CalibrationHandle {
    pub async fn send_command(&self, command: CalibrationCommand) -> Result<(), RunnerError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }

    /// Send a command (non-async version).
    pub fn send_command_blocking(&self, command: CalibrationCommand) -> Result<(), RunnerError> {
        self.command_tx
            .blocking_send(command)
            .map_err(|_| RunnerError::ChannelClosed)
    }

    /// Forward a decoded push message.
    pub async fn send_message(&self, message: PluginMessage) -> Result<(), RunnerError> {
        self.message_tx
            .send(message)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }

    pub async fn stop(&self) -> Result<(), RunnerError> {
        self.running.store(false, Ordering::SeqCst);
        self.control_tx
            .send(ControlCommand::Stop)
            .await
            .map_err(|_| RunnerError::ChannelClosed)
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Latest published session state.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Wait until the published state satisfies `predicate`.
    pub async fn wait_for<F>(&self, mut predicate: F) -> Result<SessionSnapshot, RunnerError>
    where
        F: FnMut(&SessionSnapshot) -> bool,
    {
        let mut rx = self.snapshot_rx.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| RunnerError::ChannelClosed)?;
        Ok(snapshot.clone())
    }
}

/// Callback for notices raised by the session.
pub type NoticeCallback = Box<dyn Fn(&Notice) + Send + Sync>;

/// Runs a calibration session against a backend.
pub struct CalibrationRunner<B: CalibrationBackend> {
    machine: CalibrationStateMachine,
    backend: Arc<B>,
    config: RunnerConfig,
    running: Arc<AtomicBool>,
    notice_callback: Option<NoticeCallback>,
}

impl<B: CalibrationBackend> CalibrationRunner<B> {
    pub fn new(machine: CalibrationStateMachine, backend: B, config: RunnerConfig) -> Self {
        Self {
            machine,
            backend: Arc::new(backend),
            config,
            running: Arc::new(AtomicBool::new(false)),
            notice_callback: None,
        }
    }

    /// Set a callback for notices.
    pub fn with_notice_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Notice) + Send + Sync + 'static,
    {
        self.notice_callback = Some(Box::new(callback));
        self
    }

    /// Start the loop. Returns a handle for external control.
    pub fn run(mut self) -> CalibrationHandle {
        let (command_tx, mut command_rx) = mpsc::channel(self.config.command_buffer);
        let (message_tx, mut message_rx) = mpsc::channel(self.config.message_buffer);
        let (control_tx, mut control_rx) = mpsc::channel(4);
        let (completion_tx, mut completion_rx) = mpsc::channel(16);
        let (snapshot_tx, snapshot_rx) = watch::channel(self.machine.snapshot());

        let handle = CalibrationHandle {
            command_tx,
            message_tx,
            control_tx,
            snapshot_rx,
            running: self.running.clone(),
        };

        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Calibration session loop started");
            if self.config.startup_capture {
                if let Some(ticket) = self.machine.startup_capture() {
                    self.spawn_capture(ticket, &completion_tx);
                }
            }

            loop {
                tokio::select! {
                    biased;

                    Some(cmd) = control_rx.recv() => {
                        match cmd {
                            ControlCommand::Stop => {
                                tracing::info!("Calibration session loop stopping...");
                                break;
                            }
                        }
                    }

                    Some(completion) = completion_rx.recv() => {
                        self.handle_completion(completion);
                    }

                    cmd = command_rx.recv() => {
                        match cmd {
                            Some(cmd) => self.handle_command(cmd, &completion_tx),
                            None => {
                                tracing::info!("All handles dropped, stopping session loop");
                                break;
                            }
                        }
                    }

                    Some(message) = message_rx.recv() => {
                        if let Some(outcome) = self.machine.handle_message(message) {
                            tracing::debug!("Image update: {:?}", outcome);
                        }
                    }
                }

                self.emit_notices();
                snapshot_tx.send_replace(self.machine.snapshot());
            }

            self.running.store(false, Ordering::SeqCst);
        });

        handle
    }

    fn emit_notices(&mut self) {
        for notice in self.machine.drain_notices() {
            tracing::debug!("Notice: {}", notice.format_display());
            if let Some(ref callback) = self.notice_callback {
                callback(&notice);
            }
        }
    }

    fn handle_command(&mut self, cmd: CalibrationCommand, completions: &mpsc::Sender<Completion>) {
        tracing::debug!("Command: {:?}", cmd);
        let result = match cmd {
            CalibrationCommand::Start => self.machine.start(),
            CalibrationCommand::Advance(direction) => self.machine.advance(direction).map(|_| ()),
            CalibrationCommand::Click { x_rel, y_rel } => {
                let outcome = self.machine.record_pointer(x_rel, y_rel);
                self.log_click(&outcome);
                Ok(())
            }
            CalibrationCommand::ClickImage { x, y } => {
                let outcome = self.machine.record_click(ImagePoint::new(x, y));
                self.log_click(&outcome);
                Ok(())
            }
            CalibrationCommand::ZoomIn => {
                self.machine.zoom_in();
                Ok(())
            }
            CalibrationCommand::ZoomOut => {
                self.machine.zoom_out();
                Ok(())
            }
            CalibrationCommand::Pan { dx, dy } => {
                self.machine.pan_by(dx, dy);
                Ok(())
            }
            CalibrationCommand::ResetPan => {
                self.machine.reset_pan();
                Ok(())
            }
            CalibrationCommand::Picture(variant) => {
                self.machine.set_picture(variant);
                Ok(())
            }
            CalibrationCommand::Capture => {
                let ticket = self.machine.begin_capture(false);
                self.spawn_capture(ticket, completions);
                Ok(())
            }
            CalibrationCommand::ContinueToCalibration => {
                let ticket = self.machine.begin_capture(true);
                self.spawn_capture(ticket, completions);
                Ok(())
            }
            CalibrationCommand::Submit => self
                .machine
                .begin_submit()
                .map(|(ticket, payload)| {
                    let backend = self.backend.clone();
                    let tx = completions.clone();
                    tokio::spawn(async move {
                        let outcome = backend.send_calibration_markers(ticket.route, &payload).await;
                        let _ = tx.send(Completion::Submit(ticket, outcome)).await;
                    });
                }),
            CalibrationCommand::Abort => {
                self.machine.abort();
                Ok(())
            }
            CalibrationCommand::GenerateMarkers => {
                let ticket = self.machine.begin_generate_markers();
                let backend = self.backend.clone();
                let tx = completions.clone();
                tokio::spawn(async move {
                    let outcome = backend.generate_markers_svg().await;
                    let _ = tx.send(Completion::GenerateMarkers(ticket, outcome)).await;
                });
                Ok(())
            }
            CalibrationCommand::EngraveMarkers {
                intensity,
                feedrate,
            } => {
                let ticket = self.machine.begin_engrave_markers();
                let backend = self.backend.clone();
                let tx = completions.clone();
                tokio::spawn(async move {
                    let outcome = backend.engrave_markers(intensity, feedrate).await;
                    let _ = tx.send(Completion::EngraveMarkers(ticket, outcome)).await;
                });
                Ok(())
            }
            CalibrationCommand::SettingsShown => {
                self.machine.on_settings_shown();
                Ok(())
            }
        };

        if let Err(e) = result {
            tracing::warn!("Command rejected: {}", e);
            self.notify(Notice::warning("Calibration", e.to_string()));
        }
    }

    fn log_click(&self, outcome: &ClickOutcome) {
        match outcome {
            ClickOutcome::Recorded { complete: true, .. } => {
                tracing::info!("All corners recorded, review and submit")
            }
            ClickOutcome::Recorded { .. } => {}
            other => tracing::debug!("Click ignored: {:?}", other),
        }
    }

    fn notify(&self, notice: Notice) {
        if let Some(ref callback) = self.notice_callback {
            callback(&notice);
        }
    }

    fn spawn_capture(&self, ticket: RequestTicket, completions: &mpsc::Sender<Completion>) {
        let backend = self.backend.clone();
        let tx = completions.clone();
        tokio::spawn(async move {
            let outcome = backend.take_undistorted_picture(ticket.route).await;
            let _ = tx.send(Completion::Capture(ticket, outcome)).await;
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        let applied = match completion {
            Completion::Capture(ticket, outcome) => self.machine.finish_capture(ticket, outcome),
            Completion::Submit(ticket, outcome) => self.machine.finish_submit(ticket, outcome),
            Completion::GenerateMarkers(ticket, outcome) => {
                self.machine.finish_generate_markers(ticket, outcome)
            }
            Completion::EngraveMarkers(ticket, outcome) => {
                self.machine.finish_engrave_markers(ticket, outcome)
            }
        };
        if applied {
            tracing::info!("Request completed, session state: {}", self.machine.state());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use tokio::sync::{Notify, Semaphore};
    use tokio::time::timeout;

    use crate::backend::{CalibrationPayload, RequestRoute};
    use crate::calibration::{
        DetectedMarkerSet, Direction, Marker, SessionConfig, SessionState,
    };
    use crate::events::NewImageEvent;
    use crate::notice::NoticeLevel;

    #[derive(Default)]
    struct MockBackend {
        calls: Mutex<Vec<String>>,
        submitted: Mutex<Vec<CalibrationPayload>>,
        submit_gate: Option<Arc<Notify>>,
        /// Holds capture, generate and engrave until permits are added.
        request_gate: Option<Arc<Semaphore>>,
        completed: Mutex<Vec<&'static str>>,
        capture_error: Option<String>,
    }

    impl MockBackend {
        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }

        async fn pass_gate(&self, kind: &'static str) {
            if let Some(gate) = &self.request_gate {
                gate.acquire().await.unwrap().forget();
            }
            self.completed.lock().unwrap().push(kind);
        }
    }

    impl CalibrationBackend for Arc<MockBackend> {
        async fn take_undistorted_picture(
            &self,
            route: RequestRoute,
        ) -> Result<CaptureAck, BackendError> {
            self.record(format!("capture:{:?}", route));
            self.pass_gate("capture").await;
            match &self.capture_error {
                Some(body) => Err(BackendError::Rejected {
                    status: 500,
                    body: body.clone(),
                }),
                None => Ok(CaptureAck::new("picture on its way")),
            }
        }

        async fn send_calibration_markers(
            &self,
            route: RequestRoute,
            payload: &CalibrationPayload,
        ) -> Result<(), BackendError> {
            self.record(format!("submit:{:?}", route));
            if let Some(gate) = &self.submit_gate {
                gate.notified().await;
            }
            self.submitted.lock().unwrap().push(payload.clone());
            Ok(())
        }

        async fn generate_markers_svg(&self) -> Result<GeneratedFile, BackendError> {
            self.record("generate".to_string());
            self.pass_gate("generate").await;
            Ok(GeneratedFile::calibration_markers(0, 10))
        }

        async fn engrave_markers(&self, intensity: u32, feedrate: u32) -> Result<(), BackendError> {
            self.record(format!("engrave:{}/{}", intensity, feedrate));
            self.pass_gate("engrave").await;
            Ok(())
        }
    }

    const WAIT: Duration = Duration::from_secs(2);

    fn detection() -> PluginMessage {
        let markers = DetectedMarkerSet::new()
            .with(Marker::NW, ImagePoint::new(20.0, 10.0))
            .with(Marker::NE, ImagePoint::new(500.0, 10.0))
            .with(Marker::SE, ImagePoint::new(500.0, 400.0))
            .with(Marker::SW, ImagePoint::new(20.0, 400.0));
        PluginMessage {
            machine_state: None,
            new_image: Some(NewImageEvent::new(true, markers)),
        }
    }

    fn spawn(
        backend: Arc<MockBackend>,
        config: SessionConfig,
    ) -> (CalibrationHandle, mpsc::UnboundedReceiver<Notice>) {
        let (notice_tx, notice_rx) = mpsc::unbounded_channel();
        let machine = CalibrationStateMachine::new(config);
        let handle = CalibrationRunner::new(machine, backend, RunnerConfig::default())
            .with_notice_callback(move |notice| {
                let _ = notice_tx.send(notice.clone());
            })
            .run();
        (handle, notice_rx)
    }

    async fn record_all_corners(handle: &CalibrationHandle) {
        handle.send_command(CalibrationCommand::Start).await.unwrap();
        for i in 0..4 {
            let x = 100.0 + i as f64;
            handle
                .send_command(CalibrationCommand::ClickImage { x, y: 50.0 })
                .await
                .unwrap();
            handle
                .send_command(CalibrationCommand::Advance(Direction::Next))
                .await
                .unwrap();
        }
        timeout(WAIT, handle.wait_for(|s| s.state == SessionState::Complete))
            .await
            .unwrap()
            .unwrap();
    }

    async fn next_notice(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Notice {
        timeout(WAIT, rx.recv()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_full_session_submits_markers() {
        let backend = Arc::new(MockBackend::default());
        let (handle, mut notices) =
            spawn(backend.clone(), SessionConfig::default().with_lid_gating(false));

        handle.send_message(detection()).await.unwrap();
        timeout(WAIT, handle.wait_for(|s| s.detected.is_some()))
            .await
            .unwrap()
            .unwrap();
        record_all_corners(&handle).await;
        handle.send_command(CalibrationCommand::Submit).await.unwrap();

        let done = timeout(WAIT, handle.wait_for(|s| s.state == SessionState::Done))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(done.step_index, 0);

        let notice = next_notice(&mut notices).await;
        assert_eq!(notice.title, "Camera Calibrated.");
        assert_eq!(backend.calls.lock().unwrap().as_slice(), ["submit:Authenticated"]);
        let submitted = backend.submitted.lock().unwrap();
        assert_eq!(submitted[0].result.new_corners.len(), 4);
        assert!(submitted[0].result.new_markers.is_complete());
    }

    #[tokio::test]
    async fn test_stale_submit_after_abort_is_dropped() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend {
            submit_gate: Some(gate.clone()),
            ..Default::default()
        });
        let (handle, mut notices) =
            spawn(backend.clone(), SessionConfig::default().with_lid_gating(false));

        record_all_corners(&handle).await;
        handle.send_command(CalibrationCommand::Submit).await.unwrap();
        timeout(WAIT, handle.wait_for(|s| s.state == SessionState::Submitting))
            .await
            .unwrap()
            .unwrap();

        handle.send_command(CalibrationCommand::Abort).await.unwrap();
        let aborted = timeout(WAIT, handle.wait_for(|s| s.generation == 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(aborted.state, SessionState::Idle);
        assert!(aborted.results.is_empty());
        assert_eq!(next_notice(&mut notices).await.title, "Calibration cancelled.");

        gate.notify_one();
        timeout(WAIT, async {
            while backend.submitted.lock().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(handle.snapshot().state, SessionState::Idle);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_requests_after_abort_are_dropped() {
        let gate = Arc::new(Semaphore::new(0));
        let backend = Arc::new(MockBackend {
            request_gate: Some(gate.clone()),
            ..Default::default()
        });
        let (handle, mut notices) = spawn(backend.clone(), SessionConfig::default());

        handle
            .send_command(CalibrationCommand::ContinueToCalibration)
            .await
            .unwrap();
        handle
            .send_command(CalibrationCommand::GenerateMarkers)
            .await
            .unwrap();
        handle
            .send_command(CalibrationCommand::EngraveMarkers {
                intensity: 70,
                feedrate: 300,
            })
            .await
            .unwrap();
        timeout(WAIT, async {
            while backend.calls.lock().unwrap().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        handle.send_command(CalibrationCommand::Abort).await.unwrap();
        let before = timeout(WAIT, handle.wait_for(|s| s.generation == 1))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(next_notice(&mut notices).await.title, "Calibration cancelled.");

        gate.add_permits(3);
        timeout(WAIT, async {
            while backend.completed.lock().unwrap().len() < 3 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let after = handle.snapshot();
        assert_eq!(after.workflow_page, 0);
        assert_eq!(after.state, SessionState::Idle);
        assert_eq!(after.generation, before.generation);
        assert!(notices.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_submit_without_returning_to_review_step() {
        let backend = Arc::new(MockBackend::default());
        let (handle, _notices) =
            spawn(backend.clone(), SessionConfig::default().with_lid_gating(false));

        handle.send_command(CalibrationCommand::Start).await.unwrap();
        for i in 0..4 {
            handle
                .send_command(CalibrationCommand::ClickImage {
                    x: 100.0 + i as f64,
                    y: 50.0,
                })
                .await
                .unwrap();
            if i < 3 {
                handle
                    .send_command(CalibrationCommand::Advance(Direction::Next))
                    .await
                    .unwrap();
            }
        }
        handle.send_command(CalibrationCommand::Submit).await.unwrap();

        timeout(WAIT, handle.wait_for(|s| s.state == SessionState::Done))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backend.submitted.lock().unwrap()[0].result.new_corners.len(), 4);
    }

    #[tokio::test]
    async fn test_incomplete_submit_dispatches_nothing() {
        let backend = Arc::new(MockBackend::default());
        let (handle, mut notices) =
            spawn(backend.clone(), SessionConfig::default().with_lid_gating(false));

        handle.send_command(CalibrationCommand::Start).await.unwrap();
        handle
            .send_command(CalibrationCommand::ClickImage { x: 1.0, y: 1.0 })
            .await
            .unwrap();
        handle.send_command(CalibrationCommand::Submit).await.unwrap();

        let notice = next_notice(&mut notices).await;
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert!(notice.text.contains("missing"));
        assert!(backend.calls.lock().unwrap().is_empty());
        assert_eq!(handle.snapshot().state, SessionState::Active);
    }

    #[tokio::test]
    async fn test_start_blocked_until_lid_open() {
        let backend = Arc::new(MockBackend::default());
        let (handle, mut notices) = spawn(backend, SessionConfig::default());

        handle.send_command(CalibrationCommand::Start).await.unwrap();
        let notice = next_notice(&mut notices).await;
        assert!(notice.text.contains("lid"));

        let open = PluginMessage::from_json(r#"{"mrb_state": {"lid_fully_open": true}}"#).unwrap();
        handle.send_message(open).await.unwrap();
        timeout(WAIT, handle.wait_for(|s| s.machine.lid_fully_open))
            .await
            .unwrap()
            .unwrap();
        handle.send_command(CalibrationCommand::Start).await.unwrap();
        timeout(WAIT, handle.wait_for(|s| s.state == SessionState::Active))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_first_run_captures_on_startup() {
        let backend = Arc::new(MockBackend::default());
        let config = SessionConfig::default().with_initial_calibration(true);
        let (_handle, mut notices) = spawn(backend.clone(), config);

        let notice = next_notice(&mut notices).await;
        assert_eq!(notice.title, "Picture requested");
        assert_eq!(notice.text, "picture on its way");
        assert_eq!(backend.calls.lock().unwrap().as_slice(), ["capture:FirstRun"]);
    }

    #[tokio::test]
    async fn test_continue_moves_workflow_forward() {
        let backend = Arc::new(MockBackend::default());
        let (handle, _notices) = spawn(backend, SessionConfig::default());

        handle
            .send_command(CalibrationCommand::ContinueToCalibration)
            .await
            .unwrap();
        timeout(WAIT, handle.wait_for(|s| s.workflow_page == 1))
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_failed_capture_shows_server_text() {
        let backend = Arc::new(MockBackend {
            capture_error: Some("Camera busy".to_string()),
            ..Default::default()
        });
        let (handle, mut notices) = spawn(backend, SessionConfig::default());

        handle.send_command(CalibrationCommand::Capture).await.unwrap();
        let notice = next_notice(&mut notices).await;
        assert_eq!(notice.level, NoticeLevel::Warning);
        assert_eq!(notice.text, "Camera busy");
    }

    #[tokio::test]
    async fn test_marker_requests() {
        let backend = Arc::new(MockBackend::default());
        let (handle, mut notices) = spawn(backend.clone(), SessionConfig::default());

        handle
            .send_command(CalibrationCommand::GenerateMarkers)
            .await
            .unwrap();
        assert_eq!(next_notice(&mut notices).await.title, "Markers generated");
        handle
            .send_command(CalibrationCommand::EngraveMarkers {
                intensity: 70,
                feedrate: 300,
            })
            .await
            .unwrap();
        assert_eq!(next_notice(&mut notices).await.title, "Engraving markers");
        assert_eq!(
            backend.calls.lock().unwrap().as_slice(),
            ["generate", "engrave:70/300"]
        );
    }

    #[tokio::test]
    async fn test_stop_ends_loop() {
        let backend = Arc::new(MockBackend::default());
        let (handle, _notices) = spawn(backend, SessionConfig::default());
        assert!(handle.is_running());

        handle.stop().await.unwrap();
        assert!(!handle.is_running());
        timeout(WAIT, async {
            while handle.send_command(CalibrationCommand::ZoomIn).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }
}
