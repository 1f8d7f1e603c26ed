//! Request and response types exchanged with the machine.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::calibration::{CalibrationResultSet, DetectedMarkerSet};

/// Which request path a call goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestRoute {
    /// Unauthenticated endpoint, only served during first-run setup.
    FirstRun,
    /// Authenticated plugin command.
    Authenticated,
}

impl RequestRoute {
    pub fn for_first_run(initial_calibration: bool) -> Self {
        if initial_calibration {
            RequestRoute::FirstRun
        } else {
            RequestRoute::Authenticated
        }
    }
}

/// Acknowledgement of a capture request.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CaptureAck {
    pub message: String,
}

impl CaptureAck {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Parse a response body: `{"msg": "..."}` or plain text.
    pub fn from_body(body: &str) -> Self {
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|v| v.get("msg").and_then(|m| m.as_str()).map(str::to_string))
            .unwrap_or_else(|| body.trim().to_string());
        Self { message }
    }
}

/// Results sent to the machine when calibration is finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPayload {
    pub result: CalibrationData,
}

/// Detected markers and confirmed corners of one calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalibrationData {
    pub new_markers: DetectedMarkerSet,
    pub new_corners: CalibrationResultSet,
}

impl CalibrationPayload {
    pub fn new(markers: DetectedMarkerSet, corners: CalibrationResultSet) -> Self {
        Self {
            result: CalibrationData {
                new_markers: markers,
                new_corners: corners,
            },
        }
    }
}

/// File descriptor of the generated marker design.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub name: String,
    pub path: String,
    pub origin: String,
    /// Unix timestamp in seconds.
    pub date: i64,
    pub size: u64,
    pub download_url: String,
    pub resource_url: String,
    pub type_path: Vec<String>,
}

impl GeneratedFile {
    /// Name under which the marker design is stored.
    pub const MARKERS_FILE_NAME: &'static str = "CalibrationMarkers.svg";

    /// Descriptor of the marker design in local storage.
    pub fn calibration_markers(date: i64, size: u64) -> Self {
        let name = Self::MARKERS_FILE_NAME;
        Self {
            name: name.to_string(),
            path: name.to_string(),
            origin: "local".to_string(),
            date,
            size,
            download_url: format!("/downloads/files/local/{}", name),
            resource_url: format!("/api/files/local/{}", name),
            type_path: vec!["model".to_string(), "svg".to_string()],
        }
    }
}
