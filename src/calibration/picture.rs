//! Which processing stage of the camera picture is on display.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::marker::Marker;
use crate::viewport::{ImageSize, OverlayTransform};

/// Resolution of the raw and lens-corrected pictures.
pub const FULL_FRAME: ImageSize = ImageSize::new(2048.0, 1536.0);

/// Resolution of the cropped preview picture.
pub const CROPPED_FRAME: ImageSize = ImageSize::new(500.0, 390.0);

/// Resolution of the placeholder shown while waiting for a picture.
pub const PLACEHOLDER_FRAME: ImageSize = ImageSize::new(512.0, 384.0);

/// Picture variant on display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PictureVariant {
    /// Static "please wait" image.
    #[default]
    Placeholder,
    /// Unprocessed camera frame.
    Raw,
    /// Lens distortion removed.
    #[serde(rename = "lens_correction")]
    LensCorrected,
    /// Corrected, warped and cropped to the work area.
    Cropped,
}

impl PictureVariant {
    pub fn as_str(&self) -> &'static str {
        match self {
            PictureVariant::Placeholder => "placeholder",
            PictureVariant::Raw => "raw",
            PictureVariant::LensCorrected => "lens_correction",
            PictureVariant::Cropped => "cropped",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, PictureVariant::Placeholder)
    }

    pub fn dimensions(&self) -> ImageSize {
        match self {
            PictureVariant::Placeholder => PLACEHOLDER_FRAME,
            PictureVariant::Raw | PictureVariant::LensCorrected => FULL_FRAME,
            PictureVariant::Cropped => CROPPED_FRAME,
        }
    }

    /// Which marker overlays are drawn over this variant.
    pub fn overlays(&self) -> OverlayVisibility {
        match self {
            PictureVariant::LensCorrected => OverlayVisibility {
                corrected_markers: true,
                cropped_markers: false,
            },
            PictureVariant::Cropped => OverlayVisibility {
                corrected_markers: false,
                cropped_markers: true,
            },
            PictureVariant::Placeholder | PictureVariant::Raw => OverlayVisibility::default(),
        }
    }

    /// Transform applied to marker overlays drawn over this variant.
    pub fn overlay_transform(&self, crop_ratio: f64) -> OverlayTransform {
        match self {
            PictureVariant::Cropped => OverlayTransform::for_cropped(self.dimensions(), crop_ratio),
            PictureVariant::Placeholder | PictureVariant::Raw | PictureVariant::LensCorrected => {
                OverlayTransform::IDENTITY
            }
        }
    }
}

impl fmt::Display for PictureVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown picture variant: {0}")]
pub struct UnknownPictureVariant(pub String);

impl FromStr for PictureVariant {
    type Err = UnknownPictureVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "placeholder" | "" => Ok(PictureVariant::Placeholder),
            "raw" => Ok(PictureVariant::Raw),
            "lens" | "lens_correction" | "corrected" => Ok(PictureVariant::LensCorrected),
            "cropped" | "crop" => Ok(PictureVariant::Cropped),
            _ => Err(UnknownPictureVariant(s.to_string())),
        }
    }
}

/// Visibility of the two marker overlay layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct OverlayVisibility {
    pub corrected_markers: bool,
    pub cropped_markers: bool,
}

/// Where each picture variant is served from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraUrls {
    pub placeholder: String,
    pub raw: String,
    pub undistorted: String,
    pub cropped: String,
    /// Directory holding the per-marker debug crops (`NW.jpg`, ...).
    pub debug_dir: String,
}

impl Default for CameraUrls {
    fn default() -> Self {
        Self {
            placeholder: "/plugin/mrbeam/static/img/cam_calibration/calpic_wait.svg".to_string(),
            raw: "/downloads/files/local/cam/debug/raw.jpg".to_string(),
            undistorted: "/downloads/files/local/cam/debug/undistorted.jpg".to_string(),
            cropped: "/downloads/files/local/cam/beam-cam.jpg".to_string(),
            debug_dir: "/downloads/files/local/cam/debug".to_string(),
        }
    }
}

impl CameraUrls {
    /// URL of a variant. Camera pictures get a cache-busting token, the
    /// static placeholder does not.
    pub fn url_for(&self, variant: PictureVariant, token: i64) -> String {
        match variant {
            PictureVariant::Placeholder => self.placeholder.clone(),
            PictureVariant::Raw => timestamped_url(&self.raw, token),
            PictureVariant::LensCorrected => timestamped_url(&self.undistorted, token),
            PictureVariant::Cropped => timestamped_url(&self.cropped, token),
        }
    }

    /// URL of the debug crop around one marker.
    pub fn debug_url(&self, marker: Marker, token: i64) -> String {
        let base = format!("{}/{}.jpg", self.debug_dir.trim_end_matches('/'), marker);
        timestamped_url(&base, token)
    }
}

/// Replace any query string of `url` with a fresh cache-busting token.
pub fn timestamped_url(url: &str, token: i64) -> String {
    let base = url.split('?').next().unwrap_or(url);
    format!("{}?{}", base, token)
}
