//! Coordinate transforms between image pixels and the on-screen view.

mod transform;

pub use transform::{
    ElementBounds, FocusPoint, ImageSize, OverlayTransform, ViewBox, Viewport, MAX_ZOOM,
    MIN_ZOOM,
};
