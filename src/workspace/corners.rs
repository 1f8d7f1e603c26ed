//! Work-area corners from a saved reference and fresh marker detections.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::CalibrationPayload;
use crate::calibration::{CalibrationResultSet, DetectedMarkerSet, ImagePoint, Marker};

/// Workspace mapping errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkspaceError {
    #[error("Camera needs calibration: reference markers or corners incomplete")]
    NeedsCalibration,
    #[error("Missed marker(s) {missed:?}, no history to guess their positions")]
    MissingMarkers { missed: Vec<Marker> },
    #[error("Workspace corners do not span an area")]
    Degenerate,
}

/// Saved calibration: where the markers were seen and where the operator
/// put the work-area corners in the same picture.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReferenceCalibration {
    #[serde(rename = "calibMarkers")]
    pub markers: DetectedMarkerSet,
    #[serde(rename = "cornersFromImage")]
    pub corners: CalibrationResultSet,
}

impl ReferenceCalibration {
    pub fn new(markers: DetectedMarkerSet, corners: CalibrationResultSet) -> Self {
        Self { markers, corners }
    }

    /// Reference built from submitted results.
    pub fn from_payload(payload: &CalibrationPayload) -> Self {
        Self::new(
            payload.result.new_markers.clone(),
            payload.result.new_corners.clone(),
        )
    }

    pub fn is_valid(&self) -> bool {
        self.markers.is_complete() && self.corners.is_complete()
    }

    /// Offset from a marker to its corner, in image pixels.
    fn offset(&self, marker: Marker) -> Option<(f64, f64)> {
        let seen = self.markers.get(marker)?;
        let corner = self.corners.get(marker)?.to_image_point();
        Some((corner.x - seen.x, corner.y - seen.y))
    }
}

/// The four corners of the work area in a picture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkspaceCorners(BTreeMap<Marker, ImagePoint>);

impl WorkspaceCorners {
    /// Corners from explicit points in `[NW, NE, SE, SW]` order.
    pub fn from_points(points: [ImagePoint; 4]) -> Self {
        Self(Marker::ALL.into_iter().zip(points).collect())
    }

    pub fn get(&self, marker: Marker) -> Option<ImagePoint> {
        self.0.get(&marker).copied()
    }

    /// Corners in `[NW, NE, SE, SW]` order.
    pub fn points(&self) -> Option<[ImagePoint; 4]> {
        Some([
            self.get(Marker::NW)?,
            self.get(Marker::NE)?,
            self.get(Marker::SE)?,
            self.get(Marker::SW)?,
        ])
    }

    pub fn iter(&self) -> impl Iterator<Item = (Marker, ImagePoint)> + '_ {
        self.0.iter().map(|(m, p)| (*m, *p))
    }
}

/// Corners located in one picture.
#[derive(Debug, Clone, PartialEq)]
pub struct CornerDetection {
    pub corners: WorkspaceCorners,
    /// Marker positions used, including ones filled from history.
    pub markers: DetectedMarkerSet,
    /// Markers not found in this picture.
    pub missed: Vec<Marker>,
}

/// Locate the work-area corners: each corner keeps its saved offset from its
/// marker. Markers missing from `detected` are taken from `last` if possible.
pub fn workspace_corners(
    reference: &ReferenceCalibration,
    detected: &DetectedMarkerSet,
    last: Option<&DetectedMarkerSet>,
) -> Result<CornerDetection, WorkspaceError> {
    let (markers, missed) = detected.with_fallback(last);
    if !markers.is_complete() {
        tracing::warn!("Missed marker(s) {:?}, no history to guess them", missed);
        return Err(WorkspaceError::MissingMarkers { missed });
    }
    if missed.len() > 1 {
        tracing::warn!("Missed marker(s) {:?}, using last known positions", missed);
    }
    if !reference.is_valid() {
        return Err(WorkspaceError::NeedsCalibration);
    }

    let mut corners = BTreeMap::new();
    for marker in Marker::ALL {
        let seen = markers.get(marker).ok_or(WorkspaceError::MissingMarkers {
            missed: vec![marker],
        })?;
        let (dx, dy) = reference
            .offset(marker)
            .ok_or(WorkspaceError::NeedsCalibration)?;
        corners.insert(marker, ImagePoint::new(seen.x + dx, seen.y + dy));
    }
    tracing::debug!("Workspace corners: {:?}", corners);

    Ok(CornerDetection {
        corners: WorkspaceCorners(corners),
        markers,
        missed,
    })
}
