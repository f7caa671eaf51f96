//! # Depth from disparity
//!
//! Converts disparity into depth with the pinhole stereo relation
//! `depth = fx * baseline / (disparity + (cx1 - cx2))`, where the principal point offset accounts
//! for cameras whose principal points differ along x.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;

use crate::calibrate::CalibrationResult;
use crate::disparity::DisparityMap;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Camera quantities needed to turn disparity into depth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DepthParams {
    /// Focal length along x in pixels.
    pub fx: f64,

    /// Principal point x of the left camera.
    pub cx1: f64,

    /// Principal point x of the right camera.
    pub cx2: f64,

    /// Distance between the camera centres, in output depth units.
    pub baseline: f64
}

/// Depth of every pixel, `None` where the disparity gave no depth.
#[derive(Debug, Clone)]
pub struct DepthMap {
    data: Vec<Option<f32>>,
    width: usize,
    height: usize
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DepthParams {
    /// Parameters from the calibrated camera matrices, with the baseline in board units scaled
    /// down by `baseline_divisor`.
    pub fn from_calibration(cal: &CalibrationResult, baseline_divisor: f64) -> Self {
        Self {
            fx: cal.camera_matrix1.fx(),
            cx1: cal.camera_matrix1.cx(),
            cx2: cal.camera_matrix2.cx(),
            baseline: cal.baseline() / baseline_divisor
        }
    }

    /// Depth of a single disparity, `None` if the denominator is not positive.
    pub fn depth(&self, disparity: f32) -> Option<f32> {
        let denom = disparity as f64 + (self.cx1 - self.cx2);
        if denom <= 0.0 {
            return None;
        }

        let depth = self.fx * self.baseline / denom;
        if depth.is_finite() {
            Some(depth as f32)
        }
        else {
            None
        }
    }
}

impl DepthMap {
    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> Option<f32> {
        self.data[y * self.width + x]
    }

    /// Number of pixels with a depth.
    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|d| d.is_some()).count()
    }

    /// Smallest and largest depth, if any pixel has one.
    pub fn range(&self) -> Option<(f32, f32)> {
        self.data.iter().flatten().fold(None, |acc, &d| match acc {
            None => Some((d, d)),
            Some((lo, hi)) => Some((lo.min(d), hi.max(d)))
        })
    }

    /// Min-max normalise the negated depth into 0..=255, so nearer points are brighter. Pixels
    /// without depth are 0, as is every pixel when all depths are equal.
    pub fn to_luma(&self) -> GrayImage {
        let (near, far) = match self.range() {
            Some(r) => r,
            None => return GrayImage::new(self.width as u32, self.height as u32)
        };
        let span = far - near;

        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let val = match self.get(x as usize, y as usize) {
                Some(d) if span > 0.0 => ((far - d) / span * 255.0).round().max(0.0).min(255.0),
                _ => 0.0
            };
            image::Luma([val as u8])
        })
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Compute the depth of every pixel with a valid disparity.
pub fn depth_from_disparity(disp: &DisparityMap, params: &DepthParams) -> DepthMap {
    let (width, height) = (disp.width(), disp.height());
    let mut data = Vec::with_capacity(width * height);

    for y in 0..height {
        for x in 0..width {
            data.push(if disp.is_valid(x, y) { params.depth(disp.get(x, y)) } else { None });
        }
    }

    DepthMap { data, width, height }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraMatrix, Distortion};
    use nalgebra::{Matrix3, Vector3};

    fn params() -> DepthParams {
        DepthParams {
            fx: 500.0,
            cx1: 320.0,
            cx2: 318.0,
            baseline: 0.6
        }
    }

    #[test]
    fn depth_decreases_with_disparity() {
        let p = params();
        let mut last = f32::INFINITY;

        for d in 1..100 {
            let depth = p.depth(d as f32).unwrap();
            assert!(depth < last);
            last = depth;
        }

        assert_eq!(p.depth(8.0), Some((500.0 * 0.6 / 10.0) as f32));
    }

    #[test]
    fn non_positive_denominator_has_no_depth() {
        let p = params();
        assert_eq!(p.depth(-2.0), None);
        assert_eq!(p.depth(-5.0), None);
    }

    #[test]
    fn invalid_disparity_has_no_depth() {
        let fixed = [-16, 16 * 10, 16 * 20, 16 * 40];
        let disp = DisparityMap::from_fixed(&fixed, 4, 1, 0);
        let depth = depth_from_disparity(&disp, &params());

        assert_eq!(depth.get(0, 0), None);
        assert_eq!(depth.valid_count(), 3);
    }

    #[test]
    fn luma_spans_full_range_with_near_brightest() {
        let fixed = [-16, 16 * 10, 16 * 20, 16 * 40];
        let disp = DisparityMap::from_fixed(&fixed, 4, 1, 0);
        let luma = depth_from_disparity(&disp, &params()).to_luma();

        assert_eq!(luma.get_pixel(0, 0)[0], 0);
        assert_eq!(luma.get_pixel(1, 0)[0], 0);
        assert_eq!(luma.get_pixel(3, 0)[0], 255);
        assert!(luma.get_pixel(2, 0)[0] > 0 && luma.get_pixel(2, 0)[0] < 255);
    }

    #[test]
    fn constant_depth_is_black() {
        let fixed = [16 * 10; 6];
        let disp = DisparityMap::from_fixed(&fixed, 3, 2, 0);
        let luma = depth_from_disparity(&disp, &params()).to_luma();

        assert!(luma.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn params_from_calibration() {
        let cal = CalibrationResult {
            rms: 0.0,
            camera_matrix1: CameraMatrix::new(500.0, 500.0, 320.0, 240.0),
            camera_matrix2: CameraMatrix::new(500.0, 500.0, 310.0, 240.0),
            dist_coeffs1: Distortion::default(),
            dist_coeffs2: Distortion::default(),
            r: Matrix3::identity(),
            t: Vector3::new(-60.0, 0.0, 0.0),
            e: Matrix3::zeros(),
            f: Matrix3::zeros()
        };

        let p = DepthParams::from_calibration(&cal, 100.0);
        assert_eq!(p.fx, 500.0);
        assert_eq!(p.cx1 - p.cx2, 10.0);
        assert!((p.baseline - 0.6).abs() < 1e-12);
    }
}
