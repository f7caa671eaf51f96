//! # General disparity objects
//!
//! This module provides generic disparity traits and structures for use by different algorithms.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;

use crate::error::*;
use crate::frame::{GrayFloatImage, StereoFrame};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Fixed-point scale of sub-pixel disparities.
pub const DISP_SCALE: i32 = 16;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A generic floating point disparity map.
///
/// Pixels without a disparity hold [`DisparityMap::invalid_value`], which is below every valid
/// disparity.
#[derive(Debug, Clone)]
pub struct DisparityMap {
    data: GrayFloatImage,
    invalid: f32,
    pub max_disp: Option<f32>,
    pub min_disp: Option<f32>
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityAlgorithm {
    /// Compute the disparity map of the given stereo frame.
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DisparityMap {
    /// Create a map with every pixel invalid.
    pub fn new(width: usize, height: usize, invalid: f32) -> Self {
        DisparityMap {
            data: GrayFloatImage::filled(width, height, invalid),
            invalid,
            min_disp: None,
            max_disp: None
        }
    }

    /// Build a map from fixed-point disparities scaled by [`DISP_SCALE`].
    ///
    /// `min_disparity` is the smallest searched disparity; fixed-point values at or below
    /// `(min_disparity - 1) * DISP_SCALE` are invalid.
    pub fn from_fixed(fixed: &[i16], width: usize, height: usize, min_disparity: i32) -> Self {
        let invalid_fixed = (min_disparity - 1) * DISP_SCALE;
        let mut map = Self::new(width, height, (min_disparity - 1) as f32);

        for y in 0..height {
            for x in 0..width {
                let d = fixed[y * width + x] as i32;
                if d > invalid_fixed {
                    map.put(x, y, d as f32 / DISP_SCALE as f32);
                }
            }
        }

        map
    }

    pub fn width(&self) -> usize {
        self.data.width()
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data.get(x, y)
    }

    /// Set a valid disparity and update the observed range.
    pub fn put(&mut self, x: usize, y: usize, val: f32) {
        self.data.put(x, y, val);

        self.max_disp = Some(self.max_disp.map_or(val, |m| m.max(val)));
        self.min_disp = Some(self.min_disp.map_or(val, |m| m.min(val)));
    }

    /// The value held by pixels without a disparity.
    pub fn invalid_value(&self) -> f32 {
        self.invalid
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.data.get(x, y) > self.invalid
    }

    /// Number of pixels with a disparity.
    pub fn valid_count(&self) -> usize {
        self.data.as_slice().iter().filter(|&&d| d > self.invalid).count()
    }

    /// Converts the image into a Luma8 image, clamping disparities into 0..=255.
    pub fn to_luma(&self) -> GrayImage {
        self.luma_scaled(1.0)
    }

    /// Converts the image to a normalised GrayImage.
    ///
    /// Normalises by the maximum observed disparity in the map. If the maximum disparity is not
    /// set then the function is equivalent to `.to_luma()`.
    pub fn to_luma_normalised(&self) -> GrayImage {
        let mult = match self.max_disp {
            Some(d) if d > 0.0 => 255.0 / d,
            _ => 1.0
        };

        self.luma_scaled(mult)
    }

    fn luma_scaled(&self, mult: f32) -> GrayImage {
        let mut new = image::GrayImage::new(
            self.data.width() as u32,
            self.data.height() as u32
        );

        for y in 0..new.height() {
            for x in 0..new.width() {
                let mut val = self.data.get(x as usize, y as usize) * mult;

                if val < 0.0 {
                    val = 0.0;
                }
                else if val > 255.0 {
                    val = 255.0;
                }

                *new.get_pixel_mut(x, y) = image::Luma([val as u8]);
            }
        }

        new
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_fixed_marks_invalid_pixels() {
        let fixed = [-16, 0, 24, 16 * 300];
        let map = DisparityMap::from_fixed(&fixed, 4, 1, 0);

        assert!(!map.is_valid(0, 0));
        assert!(map.is_valid(1, 0));
        assert_eq!(map.get(2, 0), 1.5);
        assert_eq!(map.valid_count(), 3);
        assert_eq!(map.min_disp, Some(0.0));
        assert_eq!(map.max_disp, Some(300.0));
    }

    #[test]
    fn to_luma_clamps() {
        let fixed = [-16, 0, 24, 16 * 300];
        let luma = DisparityMap::from_fixed(&fixed, 4, 1, 0).to_luma();

        assert_eq!(luma.as_raw(), &vec![0, 0, 1, 255]);
    }

    #[test]
    fn to_luma_normalised_scales_by_max() {
        let fixed = [-16, 16 * 10, 16 * 20];
        let luma = DisparityMap::from_fixed(&fixed, 3, 1, 0).to_luma_normalised();

        assert_eq!(luma.as_raw(), &vec![0, 127, 255]);
    }

    #[test]
    fn negative_min_disparity_keeps_negative_values() {
        let fixed = [-16 * 3, -16 * 2, 8];
        let map = DisparityMap::from_fixed(&fixed, 3, 1, -2);

        assert!(!map.is_valid(0, 0));
        assert!(map.is_valid(1, 0));
        assert_eq!(map.get(1, 0), -2.0);
        assert_eq!(map.invalid_value(), -3.0);
    }
}
