//! Marker identities and the point sets keyed by them.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One of the four reference markers engraved into the work area.
///
/// The markers sit at a fixed, asymmetric layout so that their positions
/// identify the orientation of the machine unambiguously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Marker {
    NW,
    NE,
    SE,
    SW,
}

impl Marker {
    /// All markers in wire order.
    pub const ALL: [Marker; 4] = [Marker::NW, Marker::NE, Marker::SE, Marker::SW];

    /// Short name as used on the wire ("NW", "NE", ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Marker::NW => "NW",
            Marker::NE => "NE",
            Marker::SE => "SE",
            Marker::SW => "SW",
        }
    }

    /// Compass description of the marker position.
    pub fn compass_name(&self) -> &'static str {
        match self {
            Marker::NW => "North West",
            Marker::NE => "North East",
            Marker::SE => "South East",
            Marker::SW => "South West",
        }
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown marker: {0}")]
pub struct UnknownMarker(pub String);

impl FromStr for Marker {
    type Err = UnknownMarker;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "NW" => Ok(Marker::NW),
            "NE" => Ok(Marker::NE),
            "SE" => Ok(Marker::SE),
            "SW" => Ok(Marker::SW),
            _ => Err(UnknownMarker(s.to_string())),
        }
    }
}

/// A point in image pixel space. Fractional values are allowed.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ImagePoint {
    pub x: f64,
    pub y: f64,
}

impl ImagePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build a point from the detector's matrix order `[row, col]`.
    ///
    /// This is the only place where axis order is swapped on the way in.
    pub fn from_row_col(row_col: [f64; 2]) -> Self {
        let [row, col] = row_col;
        Self { x: col, y: row }
    }

    /// Inverse of [`ImagePoint::from_row_col`].
    pub fn to_row_col(&self) -> [f64; 2] {
        [self.y, self.x]
    }

    /// Round to the nearest whole pixel (half away from zero).
    pub fn rounded(&self) -> PixelPoint {
        PixelPoint {
            x: self.x.round() as i64,
            y: self.y.round() as i64,
        }
    }

    pub fn distance_to(&self, other: &ImagePoint) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// A whole-pixel image position, as recorded from an operator click.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelPoint {
    pub x: i64,
    pub y: i64,
}

impl PixelPoint {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn to_image_point(&self) -> ImagePoint {
        ImagePoint::new(self.x as f64, self.y as f64)
    }
}

/// Marker positions reported by server-side detection on the latest image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DetectedMarkerSet(BTreeMap<Marker, Option<ImagePoint>>);

impl DetectedMarkerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize raw detector output (`[row, col]` per marker) into image
    /// `x/y` order. Markers absent from `raw` are recorded as not found.
    pub fn from_row_col(raw: &BTreeMap<Marker, Option<[f64; 2]>>) -> Self {
        let positions = Marker::ALL
            .iter()
            .map(|m| {
                let pos = raw
                    .get(m)
                    .copied()
                    .flatten()
                    .map(ImagePoint::from_row_col);
                (*m, pos)
            })
            .collect();
        Self(positions)
    }

    /// Back to the detector's `[row, col]` order.
    pub fn to_row_col(&self) -> BTreeMap<Marker, Option<[f64; 2]>> {
        self.0
            .iter()
            .map(|(m, p)| (*m, p.map(|p| p.to_row_col())))
            .collect()
    }

    pub fn with(mut self, marker: Marker, position: ImagePoint) -> Self {
        self.0.insert(marker, Some(position));
        self
    }

    pub fn get(&self, marker: Marker) -> Option<ImagePoint> {
        self.0.get(&marker).copied().flatten()
    }

    pub fn set(&mut self, marker: Marker, position: Option<ImagePoint>) {
        self.0.insert(marker, position);
    }

    /// True when every marker has a position.
    pub fn is_complete(&self) -> bool {
        Marker::ALL.iter().all(|m| self.get(*m).is_some())
    }

    pub fn is_empty(&self) -> bool {
        Marker::ALL.iter().all(|m| self.get(*m).is_none())
    }

    pub fn found_count(&self) -> usize {
        Marker::ALL.iter().filter(|m| self.get(**m).is_some()).count()
    }

    pub fn missing(&self) -> Vec<Marker> {
        Marker::ALL
            .iter()
            .copied()
            .filter(|m| self.get(*m).is_none())
            .collect()
    }

    /// Fill missing markers from an earlier detection.
    ///
    /// Returns the merged set and the markers that were missing in `self`,
    /// whether or not `last` could supply them.
    pub fn with_fallback(&self, last: Option<&DetectedMarkerSet>) -> (DetectedMarkerSet, Vec<Marker>) {
        let missed = self.missing();
        let mut merged = self.clone();
        if let Some(last) = last {
            for m in &missed {
                if let Some(pos) = last.get(*m) {
                    merged.set(*m, Some(pos));
                }
            }
        }
        (merged, missed)
    }

    pub fn iter(&self) -> impl Iterator<Item = (Marker, Option<ImagePoint>)> + '_ {
        self.0.iter().map(|(m, p)| (*m, *p))
    }
}

/// Operator-confirmed corner positions, one per marker step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationResultSet(BTreeMap<Marker, PixelPoint>);

impl CalibrationResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, marker: Marker, point: PixelPoint) {
        self.0.insert(marker, point);
    }

    pub fn get(&self, marker: Marker) -> Option<PixelPoint> {
        self.0.get(&marker).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Complete once all four markers have a confirmed position.
    pub fn is_complete(&self) -> bool {
        Marker::ALL.iter().all(|m| self.0.contains_key(m))
    }

    pub fn missing(&self) -> Vec<Marker> {
        Marker::ALL
            .iter()
            .copied()
            .filter(|m| !self.0.contains_key(m))
            .collect()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (Marker, PixelPoint)> + '_ {
        self.0.iter().map(|(m, p)| (*m, *p))
    }
}
