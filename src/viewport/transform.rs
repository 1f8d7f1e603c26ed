//! Mapping between image pixels and the rendered view box.
//!
//! The view box is what the display element shows of the current picture:
//! an origin and a size in image pixels, derived from a focus point, an
//! integer zoom level and a pan offset.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::calibration::ImagePoint;

/// Smallest zoom level.
pub const MIN_ZOOM: u32 = 1;

/// Largest zoom level.
pub const MAX_ZOOM: u32 = 10;

/// Dimensions of the displayed picture in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSize {
    pub width: f64,
    pub height: f64,
}

impl ImageSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Point the viewport is framed on, together with the zoom to use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FocusPoint {
    pub x: f64,
    pub y: f64,
    pub zoom: u32,
}

impl FocusPoint {
    pub const fn new(x: f64, y: f64, zoom: u32) -> Self {
        Self { x, y, zoom }
    }
}

/// Visible region of the picture, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl fmt::Display for ViewBox {
    /// Formats as an SVG `viewBox` attribute value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {}", self.x, self.y, self.width, self.height)
    }
}

/// Bounding box of the rendering element in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ElementBounds {
    pub left: f64,
    pub top: f64,
    pub width: f64,
    pub height: f64,
}

impl ElementBounds {
    pub fn new(left: f64, top: f64, width: f64, height: f64) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Fractional position of a screen point inside the element.
    ///
    /// Returns `None` for a degenerate (zero-sized) element.
    pub fn relative_position(&self, client_x: f64, client_y: f64) -> Option<(f64, f64)> {
        if self.width <= 0.0 || self.height <= 0.0 {
            return None;
        }
        Some((
            (client_x - self.left) / self.width,
            (client_y - self.top) / self.height,
        ))
    }
}

/// Pan/zoom state over a picture and the transforms it implies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    focus_x: f64,
    focus_y: f64,
    zoom: u32,
    pan_x: f64,
    pan_y: f64,
    image: ImageSize,
}

impl Viewport {
    /// Create a neutral viewport (focus at origin, zoom 1, no pan).
    pub fn new(image: ImageSize) -> Self {
        Self {
            focus_x: 0.0,
            focus_y: 0.0,
            zoom: MIN_ZOOM,
            pan_x: 0.0,
            pan_y: 0.0,
            image,
        }
    }

    pub fn zoom(&self) -> u32 {
        self.zoom
    }

    pub fn focus(&self) -> (f64, f64) {
        (self.focus_x, self.focus_y)
    }

    pub fn pan(&self) -> (f64, f64) {
        (self.pan_x, self.pan_y)
    }

    pub fn image_size(&self) -> ImageSize {
        self.image
    }

    /// Change the picture dimensions (the picture variant changed).
    pub fn set_image_size(&mut self, image: ImageSize) {
        self.image = image;
    }

    /// Size of the visible region in image pixels.
    pub fn visible_size(&self) -> (f64, f64) {
        let z = self.zoom as f64;
        (self.image.width / z, self.image.height / z)
    }

    /// View box origin before the pan offset is added.
    ///
    /// The focus offset is divided by the zoom a second time on purpose;
    /// existing overlays depend on this framing.
    pub fn clamped_origin(&self) -> (f64, f64) {
        let z = self.zoom as f64;
        let (w, h) = self.visible_size();
        let x = (self.focus_x - w / z).max(0.0).min(self.image.width - w);
        let y = (self.focus_y - h / z).max(0.0).min(self.image.height - h);
        (x, y)
    }

    /// Forward mapping: the region of the picture currently on screen.
    pub fn view_box(&self) -> ViewBox {
        let (w, h) = self.visible_size();
        let (x, y) = self.clamped_origin();
        ViewBox {
            x: x + self.pan_x,
            y: y + self.pan_y,
            width: w,
            height: h,
        }
    }

    /// Inverse mapping: image point under a pointer at a fractional position
    /// (`0.0..=1.0` on each axis) of the rendering element.
    pub fn image_point_at(&self, x_rel: f64, y_rel: f64) -> ImagePoint {
        let view = self.view_box();
        ImagePoint::new(view.x + x_rel * view.width, view.y + y_rel * view.height)
    }

    /// Fractional element position at which an image point is displayed.
    pub fn relative_position_of(&self, point: ImagePoint) -> (f64, f64) {
        let view = self.view_box();
        ((point.x - view.x) / view.width, (point.y - view.y) / view.height)
    }

    /// Image point under a pointer given in screen coordinates.
    pub fn pointer_to_image(
        &self,
        client_x: f64,
        client_y: f64,
        bounds: &ElementBounds,
    ) -> Option<ImagePoint> {
        let (x_rel, y_rel) = bounds.relative_position(client_x, client_y)?;
        Some(self.image_point_at(x_rel, y_rel))
    }

    /// Set the zoom level, clamped to `[MIN_ZOOM, MAX_ZOOM]`.
    pub fn set_zoom(&mut self, zoom: u32) {
        self.zoom = zoom.clamp(MIN_ZOOM, MAX_ZOOM);
    }

    pub fn zoom_in(&mut self) {
        self.set_zoom(self.zoom.saturating_add(1));
    }

    pub fn zoom_out(&mut self) {
        self.set_zoom(self.zoom.saturating_sub(1));
    }

    /// Shift the view by `(dx, dy)` image pixels. Pans accumulate.
    pub fn pan_by(&mut self, dx: f64, dy: f64) {
        self.pan_x += dx;
        self.pan_y += dy;
    }

    pub fn reset_pan(&mut self) {
        self.pan_x = 0.0;
        self.pan_y = 0.0;
    }

    /// Frame a step: move the focus, apply its zoom and drop any pan.
    pub fn reframe(&mut self, focus: FocusPoint) {
        self.focus_x = focus.x;
        self.focus_y = focus.y;
        self.set_zoom(focus.zoom);
        self.reset_pan();
    }

    /// Back to focus at origin, zoom 1, no pan.
    pub fn reset(&mut self) {
        self.reframe(FocusPoint::new(0.0, 0.0, MIN_ZOOM));
    }
}

/// Scale-then-translate transform applied to marker overlays.
///
/// Follows SVG semantics for `scale(s) translate(tx ty)`: a point `p` is
/// drawn at `s * (p + t)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OverlayTransform {
    pub scale: f64,
    pub translate_x: f64,
    pub translate_y: f64,
}

impl OverlayTransform {
    pub const IDENTITY: OverlayTransform = OverlayTransform {
        scale: 1.0,
        translate_x: 0.0,
        translate_y: 0.0,
    };

    /// Overlay transform for the cropped picture.
    ///
    /// Marker coordinates refer to the uncropped frame, which extends by
    /// `crop_ratio` of the picture on every side.
    pub fn for_cropped(image: ImageSize, crop_ratio: f64) -> Self {
        Self {
            scale: 1.0 / (1.0 + 2.0 * crop_ratio),
            translate_x: image.width * crop_ratio,
            translate_y: image.height * crop_ratio,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    pub fn apply(&self, point: ImagePoint) -> ImagePoint {
        ImagePoint::new(
            self.scale * (point.x + self.translate_x),
            self.scale * (point.y + self.translate_y),
        )
    }
}

impl fmt::Display for OverlayTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_identity() {
            write!(f, "scale(1)")
        } else {
            write!(
                f,
                "scale({}) translate({} {})",
                self.scale, self.translate_x, self.translate_y
            )
        }
    }
}
