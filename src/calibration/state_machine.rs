//! Guided calibration session: steps, clicks, detections and requests.

use std::collections::{BTreeMap, VecDeque};
use std::fmt;

use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::marker::{CalibrationResultSet, DetectedMarkerSet, ImagePoint, Marker, PixelPoint};
use super::picture::{CameraUrls, OverlayVisibility, PictureVariant, FULL_FRAME};
use super::steps::{step_after, CalibrationStep, Direction, StepTarget};
use crate::backend::{BackendError, CalibrationPayload, CaptureAck, GeneratedFile, RequestRoute};
use crate::events::{MachineState, NewImageEvent, PluginMessage};
use crate::notice::Notice;
use crate::viewport::{ViewBox, Viewport};
use crate::workspace::zoom_out_factor;

/// Default number of pages in the surrounding setup workflow.
pub const DEFAULT_WORKFLOW_PAGES: usize = 3;

/// Lifecycle state of a calibration session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    /// Operator is clicking through the corner steps.
    Active,
    /// All four corners recorded and the review step is shown.
    Complete,
    /// Results are being sent.
    Submitting,
    Done,
    /// The last submit failed; results are kept for a retry.
    Failed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Complete => "complete",
            SessionState::Submitting => "submitting",
            SessionState::Done => "done",
            SessionState::Failed => "failed",
        }
    }

    /// Whether the operator is working through a session.
    pub fn in_session(&self) -> bool {
        matches!(
            self,
            SessionState::Active | SessionState::Complete | SessionState::Failed
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Calibration errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CalibrationError {
    #[error("A calibration session is already running")]
    AlreadyActive,
    #[error("Machine not ready: open the lid fully before calibrating")]
    MachineNotReady,
    #[error("Calibration incomplete, missing: {}", format_markers(.missing))]
    Incomplete { missing: Vec<Marker> },
    #[error("Cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
}

fn format_markers(markers: &[Marker]) -> String {
    markers
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Configuration for a [`CalibrationStateMachine`].
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Running as part of the first-run setup (unauthenticated endpoints).
    pub initial_calibration: bool,
    /// Refuse to start unless the lid is fully open.
    pub require_lid_open: bool,
    pub camera_urls: CameraUrls,
    /// Ratio between the margin of the cropped picture and its size.
    pub crop_ratio: f64,
    /// Number of pages of the surrounding setup workflow.
    pub workflow_pages: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            initial_calibration: false,
            require_lid_open: true,
            camera_urls: CameraUrls::default(),
            crop_ratio: zoom_out_factor(),
            workflow_pages: DEFAULT_WORKFLOW_PAGES,
        }
    }
}

impl SessionConfig {
    pub fn with_initial_calibration(mut self, initial: bool) -> Self {
        self.initial_calibration = initial;
        self
    }

    pub fn with_lid_gating(mut self, require_lid_open: bool) -> Self {
        self.require_lid_open = require_lid_open;
        self
    }

    pub fn with_camera_urls(mut self, urls: CameraUrls) -> Self {
        self.camera_urls = urls;
        self
    }

    pub fn with_crop_ratio(mut self, crop_ratio: f64) -> Self {
        self.crop_ratio = crop_ratio;
        self
    }

    pub fn with_workflow_pages(mut self, pages: usize) -> Self {
        self.workflow_pages = pages.max(1);
        self
    }

    /// Route used for capture and submit requests.
    pub fn request_route(&self) -> RequestRoute {
        RequestRoute::for_first_run(self.initial_calibration)
    }
}

/// Result of a click on the picture.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
    /// The click was stored as the marker's corner.
    Recorded {
        marker: Marker,
        point: PixelPoint,
        complete: bool,
    },
    /// No camera picture loaded yet.
    IgnoredPlaceholder,
    /// The current step has no marker.
    IgnoredStartStep,
    /// Results are being sent.
    IgnoredWhileSubmitting,
}

/// Result of a new-image event.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageUpdateOutcome {
    /// The corrected picture was not saved; nothing changed.
    NotSaved,
    Updated {
        picture: PictureVariant,
        /// All four markers were found and stored.
        detection_complete: bool,
        missing: Vec<Marker>,
    },
}

/// Kind of background request a ticket belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Capture { advance_workflow: bool },
    Submit,
    GenerateMarkers,
    EngraveMarkers,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Capture { .. } => "capture",
            RequestKind::Submit => "submit",
            RequestKind::GenerateMarkers => "generate_markers",
            RequestKind::EngraveMarkers => "engrave_markers",
        }
    }
}

/// Handle of a dispatched request, tagged with the session generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub generation: u64,
    pub kind: RequestKind,
    pub route: RequestRoute,
}

/// Read-only view of the session for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub step_index: usize,
    pub step_name: &'static str,
    pub step_description: &'static str,
    pub results: CalibrationResultSet,
    pub detected: Option<DetectedMarkerSet>,
    pub latest_detection: DetectedMarkerSet,
    pub picture: PictureVariant,
    pub image_url: String,
    pub overlays: OverlayVisibility,
    pub overlay_transform: String,
    pub view_box: ViewBox,
    pub zoom: u32,
    pub machine: MachineState,
    pub workflow_page: usize,
    pub debug_urls: BTreeMap<Marker, String>,
    pub generation: u64,
}

/// State machine of one calibration workflow.
pub struct CalibrationStateMachine {
    config: SessionConfig,
    steps: Vec<CalibrationStep>,
    index: usize,
    state: SessionState,
    results: CalibrationResultSet,
    detected: Option<DetectedMarkerSet>,
    latest_detection: DetectedMarkerSet,
    machine: MachineState,
    picture: PictureVariant,
    image_url: String,
    viewport: Viewport,
    debug_urls: BTreeMap<Marker, String>,
    workflow_page: usize,
    generation: u64,
    last_token: i64,
    notices: VecDeque<Notice>,
}

impl CalibrationStateMachine {
    pub fn new(config: SessionConfig) -> Self {
        let picture = PictureVariant::Placeholder;
        Self {
            image_url: config.camera_urls.url_for(picture, 0),
            steps: CalibrationStep::sequence(FULL_FRAME),
            index: 0,
            state: SessionState::Idle,
            results: CalibrationResultSet::new(),
            detected: None,
            latest_detection: DetectedMarkerSet::new(),
            machine: MachineState::default(),
            picture,
            viewport: Viewport::new(picture.dimensions()),
            debug_urls: BTreeMap::new(),
            workflow_page: 0,
            generation: 0,
            last_token: 0,
            notices: VecDeque::new(),
            config,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn step_index(&self) -> usize {
        self.index
    }

    pub fn current_step(&self) -> &CalibrationStep {
        &self.steps[self.index]
    }

    pub fn results(&self) -> &CalibrationResultSet {
        &self.results
    }

    /// Last complete detection, in image `x/y` order.
    pub fn detected(&self) -> Option<&DetectedMarkerSet> {
        self.detected.as_ref()
    }

    /// Most recent detection, possibly partial.
    pub fn latest_detection(&self) -> &DetectedMarkerSet {
        &self.latest_detection
    }

    pub fn machine_state(&self) -> MachineState {
        self.machine
    }

    pub fn picture(&self) -> PictureVariant {
        self.picture
    }

    pub fn image_url(&self) -> &str {
        &self.image_url
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn debug_urls(&self) -> &BTreeMap<Marker, String> {
        &self.debug_urls
    }

    pub fn workflow_page(&self) -> usize {
        self.workflow_page
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_complete(&self) -> bool {
        self.results.is_complete()
    }

    /// Take all queued notices.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let step = self.current_step();
        SessionSnapshot {
            state: self.state,
            step_index: self.index,
            step_name: step.name(),
            step_description: step.description,
            results: self.results.clone(),
            detected: self.detected.clone(),
            latest_detection: self.latest_detection.clone(),
            picture: self.picture,
            image_url: self.image_url.clone(),
            overlays: self.picture.overlays(),
            overlay_transform: self
                .picture
                .overlay_transform(self.config.crop_ratio)
                .to_string(),
            view_box: self.viewport.view_box(),
            zoom: self.viewport.zoom(),
            machine: self.machine,
            workflow_page: self.workflow_page,
            debug_urls: self.debug_urls.clone(),
            generation: self.generation,
        }
    }

    // ---- session lifecycle ----

    /// Begin a session and move to the first corner step.
    pub fn start(&mut self) -> Result<(), CalibrationError> {
        match self.state {
            SessionState::Active | SessionState::Complete | SessionState::Submitting => {
                return Err(CalibrationError::AlreadyActive);
            }
            SessionState::Idle | SessionState::Done | SessionState::Failed => {}
        }
        if self.config.require_lid_open && !self.machine.camera_has_view() {
            return Err(CalibrationError::MachineNotReady);
        }
        if self.state == SessionState::Done {
            self.results.clear();
        }

        tracing::info!("Calibration started (previous state: {})", self.state);
        self.state = SessionState::Active;
        self.set_picture(PictureVariant::LensCorrected);
        self.index = 0;
        self.move_step(Direction::Next);
        Ok(())
    }

    /// Move to the next or previous step.
    pub fn advance(&mut self, direction: Direction) -> Result<usize, CalibrationError> {
        if !self.state.in_session() {
            return Err(CalibrationError::InvalidState {
                operation: "change step",
                state: self.state,
            });
        }
        self.move_step(direction);
        Ok(self.index)
    }

    fn move_step(&mut self, direction: Direction) {
        self.index = step_after(self.index, direction, self.results.is_complete());
        let step = self.steps[self.index];
        self.viewport.reframe(step.focus);
        tracing::debug!("Step {} ({})", self.index, step.name());
        self.refresh_completion();
    }

    fn refresh_completion(&mut self) {
        if matches!(self.state, SessionState::Active | SessionState::Complete) {
            self.state = if self.results.is_complete() && self.index == 0 {
                SessionState::Complete
            } else {
                SessionState::Active
            };
        }
    }

    /// Record a click at an image position for the current step.
    pub fn record_click(&mut self, point: ImagePoint) -> ClickOutcome {
        if self.picture.is_placeholder() {
            tracing::debug!("Click ignored: camera picture not loaded yet");
            return ClickOutcome::IgnoredPlaceholder;
        }
        if self.state == SessionState::Submitting {
            return ClickOutcome::IgnoredWhileSubmitting;
        }
        let marker = match self.current_step().target {
            StepTarget::Start => return ClickOutcome::IgnoredStartStep,
            StepTarget::Corner(marker) => marker,
        };

        let rounded = point.rounded();
        self.results.record(marker, rounded);
        tracing::info!("{} corner set to ({}, {})", marker, rounded.x, rounded.y);
        self.refresh_completion();
        ClickOutcome::Recorded {
            marker,
            point: rounded,
            complete: self.results.is_complete(),
        }
    }

    /// Record a click given as a fractional position in the picture element.
    pub fn record_pointer(&mut self, x_rel: f64, y_rel: f64) -> ClickOutcome {
        let point = self.viewport.image_point_at(x_rel, y_rel);
        self.record_click(point)
    }

    /// Cancel the session without sending anything.
    pub fn abort(&mut self) {
        tracing::info!("Calibration aborted in state {}", self.state);
        self.generation += 1;
        self.state = SessionState::Idle;
        self.results.clear();
        self.detected = None;
        self.latest_detection = DetectedMarkerSet::new();
        self.reset_view();
        if !self.config.initial_calibration {
            self.workflow_page = 0;
        }
        self.notices
            .push_back(Notice::info("Calibration cancelled.", "Feel free to restart"));
    }

    fn reset_view(&mut self) {
        self.set_picture(PictureVariant::LensCorrected);
        self.viewport.reset();
        self.index = 0;
    }

    // ---- view ----

    /// Show another picture variant.
    pub fn set_picture(&mut self, variant: PictureVariant) {
        self.picture = variant;
        let token = self.next_token();
        self.image_url = self.config.camera_urls.url_for(variant, token);
        self.viewport.set_image_size(variant.dimensions());
    }

    pub fn zoom_in(&mut self) {
        self.viewport.zoom_in();
    }

    pub fn zoom_out(&mut self) {
        self.viewport.zoom_out();
    }

    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.viewport.pan_by(dx, dy);
    }

    pub fn reset_pan(&mut self) {
        self.viewport.reset_pan();
    }

    /// Monotonic cache-busting token based on the wall clock.
    fn next_token(&mut self) -> i64 {
        let now = Local::now().timestamp_millis();
        self.last_token = now.max(self.last_token + 1);
        self.last_token
    }

    // ---- inbound events ----

    pub fn on_machine_state(&mut self, state: MachineState) {
        if state != self.machine {
            tracing::debug!(
                "Machine state: interlocks_closed={}, lid_fully_open={}",
                state.interlocks_closed,
                state.lid_fully_open
            );
        }
        self.machine = state;
    }

    /// Apply a new-image notification.
    pub fn on_image_update(&mut self, event: NewImageEvent) -> ImageUpdateOutcome {
        if !event.undistorted_saved {
            return ImageUpdateOutcome::NotSaved;
        }

        if self.picture.is_placeholder() {
            self.set_picture(PictureVariant::LensCorrected);
        } else {
            let token = self.next_token();
            self.image_url = self.config.camera_urls.url_for(self.picture, token);
        }

        if self.config.initial_calibration {
            let token = self.last_token;
            for marker in Marker::ALL {
                let url = self.config.camera_urls.debug_url(marker, token);
                self.debug_urls.insert(marker, url);
            }
        }

        let markers = event.markers;
        let missing = markers.missing();
        let detection_complete = markers.is_complete();
        if detection_complete {
            self.detected = Some(markers.clone());
        } else if self.state.in_session() {
            tracing::warn!("Not all markers found, missing: {}", format_markers(&missing));
            self.notices.push_back(Notice::warning(
                "Not all markers found",
                format!(
                    "Missing {}. Check that all markers are visible and take a new picture.",
                    format_markers(&missing)
                ),
            ));
        }
        self.latest_detection = markers;

        ImageUpdateOutcome::Updated {
            picture: self.picture,
            detection_complete,
            missing,
        }
    }

    /// Dispatch a decoded push message.
    pub fn handle_message(&mut self, message: PluginMessage) -> Option<ImageUpdateOutcome> {
        if let Some(state) = message.machine_state {
            self.on_machine_state(state);
        }
        message.new_image.map(|event| self.on_image_update(event))
    }

    // ---- outer workflow ----

    /// The settings page was opened: back to the first workflow page.
    pub fn on_settings_shown(&mut self) {
        self.workflow_page = 0;
    }

    /// Move the outer workflow forward, wrapping to the first page.
    pub fn next_workflow_page(&mut self) -> usize {
        let pages = self.config.workflow_pages.max(1);
        self.workflow_page = (self.workflow_page + 1) % pages;
        self.workflow_page
    }

    /// Capture to request when the runner starts, if any.
    pub fn startup_capture(&mut self) -> Option<RequestTicket> {
        if !self.config.initial_calibration {
            return None;
        }
        Some(self.begin_capture(false))
    }

    // ---- requests ----

    fn ticket(&self, kind: RequestKind) -> RequestTicket {
        RequestTicket {
            generation: self.generation,
            kind,
            route: self.config.request_route(),
        }
    }

    fn accepts(&self, ticket: &RequestTicket) -> bool {
        if ticket.generation != self.generation {
            tracing::debug!(
                "Dropping stale {} completion (generation {} != {})",
                ticket.kind.as_str(),
                ticket.generation,
                self.generation
            );
            return false;
        }
        true
    }

    /// Prepare a request for a new lens-corrected picture.
    ///
    /// Outside first-run setup the request always takes the authenticated
    /// command path; a missing login is reported by the server.
    pub fn begin_capture(&mut self, advance_workflow: bool) -> RequestTicket {
        let ticket = self.ticket(RequestKind::Capture { advance_workflow });
        tracing::info!("Requesting new picture via {:?}", ticket.route);
        ticket
    }

    /// Apply the outcome of a capture request. Returns false for stale tickets.
    pub fn finish_capture(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<CaptureAck, BackendError>,
    ) -> bool {
        if !self.accepts(&ticket) {
            return false;
        }
        match outcome {
            Ok(ack) => {
                self.notices
                    .push_back(Notice::info("Picture requested", ack.message));
                if let RequestKind::Capture {
                    advance_workflow: true,
                } = ticket.kind
                {
                    self.next_workflow_page();
                }
            }
            Err(e) => {
                tracing::warn!("Capture request failed: {}", e);
                self.notices.push_back(Notice::warning(
                    "Something went wrong. It's not you, it's us.",
                    e.server_text(),
                ));
            }
        }
        true
    }

    /// Prepare the submit request with the recorded results.
    ///
    /// Allowed from any step once all four corners are recorded, and again
    /// after a failed submit.
    pub fn begin_submit(&mut self) -> Result<(RequestTicket, CalibrationPayload), CalibrationError> {
        if !self.state.in_session() {
            return Err(CalibrationError::InvalidState {
                operation: "submit",
                state: self.state,
            });
        }
        if !self.results.is_complete() {
            return Err(CalibrationError::Incomplete {
                missing: self.results.missing(),
            });
        }

        let markers = self
            .detected
            .clone()
            .unwrap_or_else(|| self.latest_detection.clone());
        let payload = CalibrationPayload::new(markers, self.results.clone());
        self.state = SessionState::Submitting;
        tracing::info!("Submitting calibration");
        Ok((self.ticket(RequestKind::Submit), payload))
    }

    /// Apply the outcome of the submit request. Returns false for stale tickets.
    pub fn finish_submit(&mut self, ticket: RequestTicket, outcome: Result<(), BackendError>) -> bool {
        if !self.accepts(&ticket) {
            return false;
        }
        match outcome {
            Ok(()) => {
                tracing::info!("Calibration saved");
                self.state = SessionState::Done;
                self.reset_view();
                if !self.config.initial_calibration {
                    self.workflow_page = 0;
                }
                self.notices.push_back(Notice::success(
                    "Camera Calibrated.",
                    "Camera calibration was successful.",
                ));
            }
            Err(e) => {
                tracing::error!("Calibration upload failed: {}", e);
                self.state = SessionState::Failed;
                self.reset_view();
                self.notices.push_back(Notice::error(
                    "Couldn't send calibration data.",
                    e.server_text(),
                ));
            }
        }
        true
    }

    pub fn begin_generate_markers(&mut self) -> RequestTicket {
        self.ticket(RequestKind::GenerateMarkers)
    }

    pub fn finish_generate_markers(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<GeneratedFile, BackendError>,
    ) -> bool {
        if !self.accepts(&ticket) {
            return false;
        }
        match outcome {
            Ok(file) => self.notices.push_back(Notice::success(
                "Markers generated",
                format!("{} is ready to engrave.", file.name),
            )),
            Err(e) => self.notices.push_back(Notice::error(
                "Marker generation failed",
                e.server_text(),
            )),
        }
        true
    }

    pub fn begin_engrave_markers(&mut self) -> RequestTicket {
        self.ticket(RequestKind::EngraveMarkers)
    }

    pub fn finish_engrave_markers(
        &mut self,
        ticket: RequestTicket,
        outcome: Result<(), BackendError>,
    ) -> bool {
        if !self.accepts(&ticket) {
            return false;
        }
        match outcome {
            Ok(()) => self
                .notices
                .push_back(Notice::info("Engraving markers", "Marker job started.")),
            Err(e) => self.notices.push_back(Notice::error(
                "Marker engraving failed",
                e.server_text(),
            )),
        }
        true
    }
}
