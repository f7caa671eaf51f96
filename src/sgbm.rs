//! # Semi-global block matching
//!
//! This module wraps OpenCV's `StereoSGBM`, Hirschmuller's semi-global matching
//! ("Stereo Processing by Semiglobal Matching and Mutual Information")[https://core.ac.uk/download/pdf/11134866.pdf]
//! with block matching costs, behind the [`DisparityAlgorithm`] trait.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;
use opencv::calib3d::StereoSGBM;
use opencv::core::{Mat, Ptr, CV_16SC1};
use opencv::prelude::*;

use crate::config::SgbmConfig;
use crate::disparity::{DisparityAlgorithm, DisparityMap};
use crate::error::*;
use crate::frame::{to_mat, StereoFrame};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct Sgbm {
    params: SgbmConfig,
    matcher: Ptr<StereoSGBM>
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Sgbm {
    /// Create a new instance of the algorithm with the given parameters.
    pub fn new(params: SgbmConfig) -> Result<Self> {
        params.validate()?;

        let matcher = StereoSGBM::create(
            params.min_disparity,
            params.num_disparities as i32,
            params.block_size as i32,
            params.p1 as i32,
            params.p2 as i32,
            params.disp12_max_diff,
            params.pre_filter_cap as i32,
            params.uniqueness_ratio as i32,
            params.speckle_window_size as i32,
            params.speckle_range as i32,
            params.mode.to_cv()
        )?;

        Ok(Self { params, matcher })
    }

    pub fn params(&self) -> &SgbmConfig {
        &self.params
    }

    /// Compute the fixed-point disparity map of the frame, row-major with the left image's
    /// dimensions. Values are disparities scaled by 16; invalid pixels hold
    /// `(min_disparity - 1) * 16`.
    pub fn compute_fixed(&mut self, frame: &StereoFrame) -> Result<Vec<i16>> {
        if frame.left.dimensions() != frame.right.dimensions() {
            return Err(Error::ImageSizeMismatch {
                left: (frame.width(), frame.height()),
                right: (frame.right.width() as usize, frame.right.height() as usize)
            });
        }

        let left = to_mat(&frame.left)?;
        let right = to_mat(&frame.right)?;
        let mut disp = Mat::default();
        self.matcher.compute(&left, &right, &mut disp)?;

        if disp.typ() != CV_16SC1 {
            return Err(Error::ImageType(disp.typ()));
        }

        Ok(disp.data_typed::<i16>()?.to_vec())
    }
}

impl DisparityAlgorithm for Sgbm {
    fn compute(&mut self, frame: &StereoFrame) -> Result<DisparityMap> {
        let fixed = self.compute_fixed(frame)?;
        let map = DisparityMap::from_fixed(
            &fixed, frame.width(), frame.height(), self.params.min_disparity
        );

        debug!(
            "sgbm: {} of {} pixels matched",
            map.valid_count(), frame.width() * frame.height()
        );

        Ok(map)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SgbmMode;
    use crate::disparity::DISP_SCALE;
    use image::GrayImage;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    /// A random texture and the same texture moved `shift` pixels to the left.
    fn shifted_pair(width: u32, height: u32, shift: u32) -> StereoFrame {
        let mut rng = StdRng::seed_from_u64(3);
        let left = GrayImage::from_fn(width, height, |_, _| image::Luma([rng.gen_range(0u8..=255)]));
        let right = GrayImage::from_fn(width, height, |x, y| {
            *left.get_pixel((x + shift).min(width - 1), y)
        });

        StereoFrame::new(left, right).unwrap()
    }

    fn small_params(mode: SgbmMode) -> SgbmConfig {
        SgbmConfig {
            num_disparities: 16,
            mode,
            ..SgbmConfig::default()
        }
    }

    #[test]
    fn recovers_constant_shift() {
        let frame = shifted_pair(96, 64, 7);

        for &mode in &[SgbmMode::Sgbm, SgbmMode::Sgbm3Way, SgbmMode::Hh, SgbmMode::Hh4] {
            let mut sgbm = Sgbm::new(small_params(mode)).unwrap();
            let map = sgbm.compute(&frame).unwrap();

            let mut good = 0;
            let mut total = 0;
            for y in 8..56 {
                for x in 24..88 {
                    total += 1;
                    if map.is_valid(x, y) && (map.get(x, y) - 7.0).abs() < 0.5 {
                        good += 1;
                    }
                }
            }

            assert!(good * 10 >= total * 9, "{:?}: {} of {} pixels", mode, good, total);
        }
    }

    #[test]
    fn columns_without_full_range_are_invalid() {
        let frame = shifted_pair(96, 64, 3);
        let mut sgbm = Sgbm::new(small_params(SgbmMode::Sgbm)).unwrap();
        let fixed = sgbm.compute_fixed(&frame).unwrap();

        // The leftmost num_disparities columns cannot see their whole range in the right image
        let invalid = -DISP_SCALE as i16;
        assert!((0..64).all(|y| fixed[y * 96 + 2] == invalid));
        assert_eq!(fixed.len(), 96 * 64);
    }

    #[test]
    fn size_mismatch_is_an_error() {
        let frame = StereoFrame {
            left: GrayImage::new(32, 16),
            right: GrayImage::new(16, 16)
        };
        let mut sgbm = Sgbm::new(small_params(SgbmMode::Sgbm)).unwrap();

        assert!(matches!(sgbm.compute(&frame), Err(Error::ImageSizeMismatch { .. })));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let params = SgbmConfig {
            num_disparities: 24,
            ..SgbmConfig::default()
        };

        assert!(matches!(Sgbm::new(params), Err(Error::Config(_))));
    }
}
