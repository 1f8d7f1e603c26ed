//! Camera calibration: markers, steps, picture variants and the session
//! state machine.

mod marker;
mod picture;
mod state_machine;
mod steps;

pub use marker::{
    CalibrationResultSet, DetectedMarkerSet, ImagePoint, Marker, PixelPoint, UnknownMarker,
};
pub use picture::{
    timestamped_url, CameraUrls, OverlayVisibility, PictureVariant, UnknownPictureVariant,
    CROPPED_FRAME, FULL_FRAME, PLACEHOLDER_FRAME,
};
pub use state_machine::{
    CalibrationError, CalibrationStateMachine, ClickOutcome, ImageUpdateOutcome, RequestKind,
    RequestTicket, SessionConfig, SessionSnapshot, SessionState, DEFAULT_WORKFLOW_PAGES,
};
pub use steps::{
    step_after, CalibrationStep, Direction, StepTarget, CORNER_ZOOM, OVERVIEW_ZOOM, STEP_COUNT,
};
