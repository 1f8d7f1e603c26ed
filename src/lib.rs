// Copyright 2025 Mr Beam Lasers GmbH (Original OctoPrint plugin)
// Copyright 2025 Mr Beam Lasers GmbH (Rust implementation)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! # BeamCam Calibration
//!
//! Guided camera calibration for a laser cutter with an overhead camera.
//!
//! The operator clicks the four work-area corners next to four engraved
//! reference markers in a lens-corrected picture. Together with the marker
//! positions reported by the machine, those clicks form the mapping later
//! used to straighten camera pictures onto the work area.
//!
//! ## Example
//!
//! ```rust,no_run
//! use beamcam_calibration::{
//!     BackendConfig, CalibrationCommand, CalibrationRunner, CalibrationStateMachine,
//!     HttpBackend, RunnerConfig, SessionConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let machine = CalibrationStateMachine::new(SessionConfig::default().with_lid_gating(false));
//!     let backend = HttpBackend::new(BackendConfig::default().with_base_url("http://mrbeam.local"));
//!
//!     let handle = CalibrationRunner::new(machine, backend, RunnerConfig::default())
//!         .with_notice_callback(|notice| println!("{}", notice.format_display()))
//!         .run();
//!
//!     handle.send_command(CalibrationCommand::Start).await?;
//!     handle.send_command(CalibrationCommand::ClickImage { x: 124.0, y: 80.0 }).await?;
//!     println!("{:?}", handle.snapshot().results);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod calibration;
pub mod events;
pub mod notice;
pub mod runner;
pub mod settings;
pub mod viewport;
pub mod workspace;

pub use backend::{
    BackendConfig, BackendError, CalibrationBackend, CalibrationPayload, CaptureAck,
    GeneratedFile, HttpBackend, RequestRoute,
};
pub use calibration::{
    CalibrationError, CalibrationResultSet, CalibrationStateMachine, DetectedMarkerSet,
    Direction, ImagePoint, Marker, PictureVariant, PixelPoint, SessionConfig, SessionSnapshot,
    SessionState,
};
pub use events::{MachineState, NewImageEvent, PluginMessage};
pub use notice::{Notice, NoticeLevel};
pub use runner::{CalibrationCommand, CalibrationHandle, CalibrationRunner, RunnerConfig};
pub use settings::CalibrationSettings;
pub use viewport::Viewport;
pub use workspace::{plan_warp, workspace_corners, ReferenceCalibration, WarpPlan};
