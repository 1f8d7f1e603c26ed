//! Mapping detected markers to the work area of the machine.

mod corners;
mod perspective;

pub use corners::{
    workspace_corners, CornerDetection, ReferenceCalibration, WorkspaceCorners, WorkspaceError,
};
pub use perspective::{
    plan_warp, zoom_out_factor, PerspectiveTransform, WarpPlan, CAMERA_HEIGHT_MM,
    MAX_OBJECT_HEIGHT_MM,
};
