//! Decoding of push messages sent by the machine's plugin.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::calibration::{DetectedMarkerSet, Marker};

/// Name of the plugin whose messages are handled.
pub const PLUGIN_NAME: &str = "mrbeam";

/// Message decoding errors.
#[derive(Error, Debug)]
pub enum MessageError {
    #[error("Invalid message payload: {0}")]
    InvalidPayload(#[from] serde_json::Error),
}

/// Interlock and lid flags reported by the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MachineState {
    #[serde(default)]
    pub interlocks_closed: bool,
    #[serde(default)]
    pub lid_fully_open: bool,
}

impl MachineState {
    /// Whether the camera has a view of the work area.
    pub fn camera_has_view(&self) -> bool {
        self.lid_fully_open
    }
}

/// "A new camera picture was processed" notification.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewImageEvent {
    /// The lens-corrected picture was written and can be fetched.
    pub undistorted_saved: bool,
    /// Detected marker positions, already in image `x/y` order.
    pub markers: DetectedMarkerSet,
}

impl NewImageEvent {
    pub fn new(undistorted_saved: bool, markers: DetectedMarkerSet) -> Self {
        Self {
            undistorted_saved,
            markers,
        }
    }
}

/// Wire form of the new-image payload. Positions are `[row, col]`.
#[derive(Debug, Deserialize)]
struct RawNewImage {
    #[serde(default)]
    undistorted_saved: bool,
    /// Absent and `null` both mean nothing was detected.
    #[serde(default)]
    markers_pos: Option<BTreeMap<String, Value>>,
}

impl From<RawNewImage> for NewImageEvent {
    fn from(raw: RawNewImage) -> Self {
        let mut positions = BTreeMap::new();
        for (key, value) in &raw.markers_pos.unwrap_or_default() {
            let marker: Marker = match key.parse() {
                Ok(m) => m,
                Err(_) => {
                    tracing::debug!("Ignoring unknown marker key: {}", key);
                    continue;
                }
            };
            positions.insert(marker, parse_row_col(value));
        }
        NewImageEvent {
            undistorted_saved: raw.undistorted_saved,
            markers: DetectedMarkerSet::from_row_col(&positions),
        }
    }
}

/// A `[row, col]` pair; anything else counts as not detected.
fn parse_row_col(value: &Value) -> Option<[f64; 2]> {
    let arr = value.as_array()?;
    if arr.len() != 2 {
        return None;
    }
    let row = arr[0].as_f64()?;
    let col = arr[1].as_f64()?;
    Some([row, col])
}

#[derive(Debug, Deserialize)]
struct RawPluginMessage {
    #[serde(default)]
    mrb_state: Option<MachineState>,
    #[serde(default)]
    beam_cam_new_image: Option<RawNewImage>,
}

/// Payload of a push message relevant to calibration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PluginMessage {
    pub machine_state: Option<MachineState>,
    pub new_image: Option<NewImageEvent>,
}

impl PluginMessage {
    /// Decode a push message.
    ///
    /// Returns `Ok(None)` for messages from other plugins or without data.
    pub fn decode(plugin: &str, data: &Value) -> Result<Option<Self>, MessageError> {
        if plugin != PLUGIN_NAME || data.is_null() {
            return Ok(None);
        }
        let raw: RawPluginMessage = serde_json::from_value(data.clone())?;
        Ok(Some(Self {
            machine_state: raw.mrb_state,
            new_image: raw.beam_cam_new_image.map(NewImageEvent::from),
        }))
    }

    /// Decode a message from its JSON text (`data` only, plugin implied).
    pub fn from_json(text: &str) -> Result<Self, MessageError> {
        let data: Value = serde_json::from_str(text)?;
        Ok(Self::decode(PLUGIN_NAME, &data)?.unwrap_or_default())
    }

    pub fn is_empty(&self) -> bool {
        self.machine_state.is_none() && self.new_image.is_none()
    }
}
