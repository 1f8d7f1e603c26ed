//! Perspective transform that straightens the work area in a camera picture.

use nalgebra::{Matrix3, SMatrix, SVector, Vector3};

use super::corners::{WorkspaceCorners, WorkspaceError};
use crate::calibration::ImagePoint;

/// Height of the camera above the work area, in mm.
pub const CAMERA_HEIGHT_MM: f64 = 582.0;

/// Tallest object expected on the work area, in mm.
pub const MAX_OBJECT_HEIGHT_MM: f64 = 38.0;

/// Margin added on each side of a zoomed-out picture, relative to its size.
pub fn zoom_out_factor() -> f64 {
    MAX_OBJECT_HEIGHT_MM / CAMERA_HEIGHT_MM / 2.0
}

/// Move the centroid to the origin and scale the mean distance to sqrt(2).
fn normalize(points: &[ImagePoint; 4]) -> ([ImagePoint; 4], Matrix3<f64>) {
    let cx = points.iter().map(|p| p.x).sum::<f64>() / 4.0;
    let cy = points.iter().map(|p| p.y).sum::<f64>() / 4.0;
    let mean_dist = points
        .iter()
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / 4.0;
    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let out = points.map(|p| ImagePoint::new(s * (p.x - cx), s * (p.y - cy)));
    (out, t)
}

/// 3x3 projective transform between two image planes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerspectiveTransform {
    matrix: Matrix3<f64>,
}

impl PerspectiveTransform {
    /// Exact transform mapping each `src[i]` onto `dst[i]`.
    ///
    /// Returns `None` when the points are degenerate (three of them collinear).
    pub fn from_points(src: &[ImagePoint; 4], dst: &[ImagePoint; 4]) -> Option<Self> {
        let (src, t_src) = normalize(src);
        let (dst, t_dst) = normalize(dst);

        // Unknowns h11..h32 with h33 = 1. For (x, y) -> (u, v):
        // h11 x + h12 y + h13 - u h31 x - u h32 y = u
        // h21 x + h22 y + h23 - v h31 x - v h32 y = v
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();

        for k in 0..4 {
            let (x, y) = (src[k].x, src[k].y);
            let (u, v) = (dst[k].x, dst[k].y);

            let r0 = 2 * k;
            a[(r0, 0)] = x;
            a[(r0, 1)] = y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -u * x;
            a[(r0, 7)] = -u * y;
            b[r0] = u;

            let r1 = 2 * k + 1;
            a[(r1, 3)] = x;
            a[(r1, 4)] = y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -v * x;
            a[(r1, 7)] = -v * y;
            b[r1] = v;
        }

        let h = a.lu().solve(&b)?;
        if h.iter().any(|v| !v.is_finite()) {
            return None;
        }
        let hn = Matrix3::new(h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0);
        let m = t_dst.try_inverse()? * hn * t_src;
        let scale = m[(2, 2)];
        if scale.abs() < 1e-12 {
            return None;
        }
        Some(Self { matrix: m / scale })
    }

    pub fn apply(&self, p: ImagePoint) -> ImagePoint {
        let v = self.matrix * Vector3::new(p.x, p.y, 1.0);
        ImagePoint::new(v[0] / v[2], v[1] / v[2])
    }

    pub fn inverse(&self) -> Option<Self> {
        self.matrix
            .try_inverse()
            .map(|m| Self { matrix: m / m[(2, 2)] })
    }

    /// Row-major coefficients.
    pub fn to_array(&self) -> [[f64; 3]; 3] {
        let m = &self.matrix;
        [
            [m[(0, 0)], m[(0, 1)], m[(0, 2)]],
            [m[(1, 0)], m[(1, 1)], m[(1, 2)]],
            [m[(2, 0)], m[(2, 1)], m[(2, 2)]],
        ]
    }
}

/// How to warp a picture so the work area becomes a rectangle.
#[derive(Debug, Clone, PartialEq)]
pub struct WarpPlan {
    /// Output picture size in pixels.
    pub width: u32,
    pub height: u32,
    /// Work-area corners in the camera picture, `[NW, NE, SE, SW]`.
    pub source: [ImagePoint; 4],
    /// Where those corners land in the output.
    pub destination: [ImagePoint; 4],
    pub transform: PerspectiveTransform,
}

/// Plan the warp of the work area given its corners.
///
/// The output is as large as the longer of each pair of opposite edges.
/// With `zoomed_out`, a margin of [`zoom_out_factor`] is kept on every side
/// so objects standing on the work area stay in the picture.
pub fn plan_warp(corners: &WorkspaceCorners, zoomed_out: bool) -> Result<WarpPlan, WorkspaceError> {
    let source = corners.points().ok_or(WorkspaceError::NeedsCalibration)?;
    let [nw, ne, se, sw] = source;

    let max_width = (se.distance_to(&sw) as u32).max(ne.distance_to(&nw) as u32);
    let max_height = (ne.distance_to(&se) as u32).max(nw.distance_to(&sw) as u32);
    if max_width == 0 || max_height == 0 {
        return Err(WorkspaceError::Degenerate);
    }
    let (w, h) = (max_width as f64, max_height as f64);

    let (min_x, max_x, min_y, max_y, width, height) = if zoomed_out {
        let f = zoom_out_factor();
        (
            f * w,
            (1.0 + f) * w,
            f * h,
            (1.0 + f) * h,
            ((1.0 + 2.0 * f) * w) as u32,
            ((1.0 + 2.0 * f) * h) as u32,
        )
    } else {
        (0.0, w - 1.0, 0.0, h - 1.0, max_width, max_height)
    };

    let destination = [
        ImagePoint::new(min_x, min_y),
        ImagePoint::new(max_x, min_y),
        ImagePoint::new(max_x, max_y),
        ImagePoint::new(min_x, max_y),
    ];
    let transform =
        PerspectiveTransform::from_points(&source, &destination).ok_or(WorkspaceError::Degenerate)?;

    Ok(WarpPlan {
        width,
        height,
        source,
        destination,
        transform,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn skewed_corners() -> WorkspaceCorners {
        WorkspaceCorners::from_points([
            ImagePoint::new(150.0, 120.0),
            ImagePoint::new(1850.0, 125.0),
            ImagePoint::new(1860.0, 1350.0),
            ImagePoint::new(140.0, 1345.0),
        ])
    }

    #[test]
    fn test_zoom_out_factor() {
        assert_relative_eq!(zoom_out_factor(), 38.0 / 582.0 / 2.0);
    }

    #[test]
    fn test_transform_maps_corners_onto_rectangle() {
        let plan = plan_warp(&skewed_corners(), false).unwrap();
        for (src, dst) in plan.source.iter().zip(plan.destination.iter()) {
            let mapped = plan.transform.apply(*src);
            assert_relative_eq!(mapped.x, dst.x, epsilon = 1e-4);
            assert_relative_eq!(mapped.y, dst.y, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_output_size_uses_longest_edges() {
        let plan = plan_warp(&skewed_corners(), false).unwrap();
        // SE-SW spans 1720 px, NE-NW 1700 px; both side edges about 1225 px.
        assert_eq!(plan.width, 1720);
        assert_eq!(plan.height, 1225);
        assert_eq!(plan.destination[2], ImagePoint::new(1719.0, 1224.0));
    }

    #[test]
    fn test_zoomed_out_adds_margin() {
        let plan = plan_warp(&skewed_corners(), true).unwrap();
        let f = zoom_out_factor();
        assert_eq!(plan.width, ((1.0 + 2.0 * f) * 1720.0) as u32);
        assert_relative_eq!(plan.destination[0].x, f * 1720.0);
        assert_relative_eq!(plan.destination[2].y, (1.0 + f) * 1225.0);
    }

    #[test]
    fn test_inverse_round_trip() {
        let plan = plan_warp(&skewed_corners(), false).unwrap();
        let inverse = plan.transform.inverse().unwrap();
        let p = ImagePoint::new(900.0, 700.0);
        let back = inverse.apply(plan.transform.apply(p));
        assert_relative_eq!(back.x, p.x, epsilon = 1e-4);
        assert_relative_eq!(back.y, p.y, epsilon = 1e-4);
    }

    #[test]
    fn test_collapsed_corners_are_degenerate() {
        let p = ImagePoint::new(10.0, 10.0);
        let corners = WorkspaceCorners::from_points([p, p, p, p]);
        assert_eq!(plan_warp(&corners, false), Err(WorkspaceError::Degenerate));
    }
}
