//! # Depth pipeline
//!
//! Runs the full chain from a pair of images to a depth image: load, equalise, calibrate,
//! undistort, remap, match, convert to depth.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;
use log::info;

use crate::calibrate::{calibrate, CalibrationResult};
use crate::config::GlobalConfig;
use crate::depth::{depth_from_disparity, DepthMap, DepthParams};
use crate::disparity::{DisparityAlgorithm, DisparityMap};
use crate::error::*;
use crate::frame::{equalize, load_gray, StereoFrame};
use crate::rectify::{remap_to_camera, undistort};
use crate::sgbm::Sgbm;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Everything the pipeline produces.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub calibration: CalibrationResult,

    /// The corrected images the disparity was computed from.
    pub frame: StereoFrame,

    pub disparity: DisparityMap,
    pub depth: DepthMap,

    /// Disparity clamped into 0..=255.
    pub disparity_image: GrayImage,

    /// Normalised depth, nearer is brighter.
    pub depth_image: GrayImage
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Run the pipeline on the configured images and calibration source.
pub fn run(cfg: &GlobalConfig) -> Result<PipelineOutput> {
    cfg.validate()?;

    let left = load_gray(&cfg.left_image)?;
    let right = load_gray(&cfg.right_image)?;
    info!(
        "loaded {} and {} ({}x{})",
        cfg.left_image.display(), cfg.right_image.display(), left.width(), left.height()
    );

    let frame = StereoFrame::new(left, right)?;
    let frame = if cfg.equalization {
        StereoFrame::new(equalize(&frame.left), equalize(&frame.right))?
    }
    else {
        frame
    };

    let calibration = calibrate(&cfg.camera, &cfg.calibration)?;

    process(cfg, frame, calibration)
}

/// Run the pipeline from an already loaded (and equalised) frame with a known calibration.
pub fn process(
    cfg: &GlobalConfig,
    frame: StereoFrame,
    calibration: CalibrationResult
) -> Result<PipelineOutput> {
    let frame = correct(cfg, &calibration, frame)?;

    // ---- DISPARITY ----

    let mut sgbm = Sgbm::new(cfg.sgbm.clone())?;
    let disparity = sgbm.compute(&frame)?;
    info!(
        "disparity: {} valid pixels, range {:?}..{:?}",
        disparity.valid_count(), disparity.min_disp, disparity.max_disp
    );

    // ---- DEPTH ----

    let params = DepthParams::from_calibration(&calibration, cfg.baseline_divisor);
    let depth = depth_from_disparity(&disparity, &params);
    info!("depth: {} valid pixels, range {:?}", depth.valid_count(), depth.range());

    let disparity_image = disparity.to_luma();
    let depth_image = depth.to_luma();

    Ok(PipelineOutput {
        calibration,
        frame,
        disparity,
        depth,
        disparity_image,
        depth_image
    })
}

/// Apply the enabled corrections in order: undistortion, then remapping through each camera's
/// undistortion maps.
pub fn correct(
    cfg: &GlobalConfig,
    cal: &CalibrationResult,
    frame: StereoFrame
) -> Result<StereoFrame> {
    let frame = if cfg.undistort {
        info!("undistorting images");
        StereoFrame::new(
            undistort(&frame.left, &cal.camera_matrix1, &cal.dist_coeffs1)?,
            undistort(&frame.right, &cal.camera_matrix2, &cal.dist_coeffs2)?
        )?
    }
    else {
        frame
    };

    if cfg.remap {
        info!("remapping images");
        Ok(StereoFrame::new(
            remap_to_camera(&frame.left, &cal.camera_matrix1, &cal.dist_coeffs1)?,
            remap_to_camera(&frame.right, &cal.camera_matrix2, &cal.dist_coeffs2)?
        )?)
    }
    else {
        Ok(frame)
    }
}

/// Write the disparity and depth images to the configured paths.
pub fn write_outputs(output: &PipelineOutput, cfg: &GlobalConfig) -> Result<()> {
    output.disparity_image.save(&cfg.disparity_output)?;
    info!("wrote {}", cfg.disparity_output.display());

    output.depth_image.save(&cfg.depth_output)?;
    info!("wrote {}", cfg.depth_output.display());

    Ok(())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraMatrix, Distortion};
    use crate::config::SgbmConfig;
    use nalgebra::{Matrix3, Vector3};
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn calibration(dist: Distortion) -> CalibrationResult {
        CalibrationResult {
            rms: 0.0,
            camera_matrix1: CameraMatrix::new(100.0, 100.0, 47.5, 31.5),
            camera_matrix2: CameraMatrix::new(100.0, 100.0, 47.5, 31.5),
            dist_coeffs1: dist,
            dist_coeffs2: dist,
            r: Matrix3::identity(),
            t: Vector3::new(-60.0, 0.0, 0.0),
            e: Matrix3::zeros(),
            f: Matrix3::zeros()
        }
    }

    fn barrel() -> Distortion {
        Distortion { k1: -0.2, k2: 0.05, ..Distortion::default() }
    }

    fn textured_pair(shift: u32) -> StereoFrame {
        let mut rng = StdRng::seed_from_u64(11);
        let left = GrayImage::from_fn(96, 64, |_, _| image::Luma([rng.gen_range(0u8..=255)]));
        let right = GrayImage::from_fn(96, 64, |x, y| {
            *left.get_pixel((x + shift).min(95), y)
        });
        StereoFrame::new(left, right).unwrap()
    }

    fn config(remap: bool, undistort: bool) -> GlobalConfig {
        GlobalConfig {
            remap,
            undistort,
            sgbm: SgbmConfig {
                num_disparities: 16,
                ..SgbmConfig::default()
            },
            ..GlobalConfig::default()
        }
    }

    #[test]
    fn depth_follows_disparity_without_correction() {
        let out = process(&config(false, false), textured_pair(5), calibration(barrel())).unwrap();

        // 100 px focal length, 0.6 baseline, 5 px shift
        let depth = out.depth.get(50, 32).unwrap();
        assert!((depth - 12.0).abs() < 2.5, "depth {}", depth);
        assert_eq!(out.depth_image.dimensions(), (96, 64));
        assert_eq!(out.frame.left, textured_pair(5).left);
    }

    #[test]
    fn undistort_then_remap_applies_both_steps() {
        let cal = calibration(barrel());
        let input = textured_pair(5);
        let k = &cal.camera_matrix1;
        let d = &cal.dist_coeffs1;

        let both = correct(&config(true, true), &cal, input.clone()).unwrap();
        let undistorted = undistort(&input.left, k, d).unwrap();
        let remapped = remap_to_camera(&input.left, k, d).unwrap();

        assert_eq!(both.left, remap_to_camera(&undistorted, k, d).unwrap());
        assert_ne!(both.left, undistorted);
        assert_ne!(both.left, remapped);
    }

    #[test]
    fn each_correction_can_run_alone() {
        let cal = calibration(barrel());
        let input = textured_pair(5);
        let k = &cal.camera_matrix2;
        let d = &cal.dist_coeffs2;

        let undistorted = correct(&config(false, true), &cal, input.clone()).unwrap();
        assert_eq!(undistorted.right, undistort(&input.right, k, d).unwrap());

        let remapped = correct(&config(true, false), &cal, input.clone()).unwrap();
        assert_eq!(remapped.right, remap_to_camera(&input.right, k, d).unwrap());
    }

    #[test]
    fn ideal_rig_keeps_disparity_through_corrections() {
        let cal = calibration(Distortion::default());
        let out = process(&config(true, true), textured_pair(5), cal).unwrap();

        assert!((out.disparity.get(50, 32) - 5.0).abs() < 1.0);
        assert_eq!(out.calibration.camera_matrix1.fx(), 100.0);
    }

    #[test]
    fn outputs_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(false, true);
        cfg.disparity_output = dir.path().join("disparity.png");
        cfg.depth_output = dir.path().join("output.png");

        let out = process(&cfg, textured_pair(4), calibration(Distortion::default())).unwrap();
        write_outputs(&out, &cfg).unwrap();

        let depth = image::open(&cfg.depth_output).unwrap().to_luma8();
        assert_eq!(depth, out.depth_image);
        assert!(cfg.disparity_output.exists());
    }

    #[test]
    fn missing_input_image_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = GlobalConfig {
            left_image: dir.path().join("left.png"),
            right_image: dir.path().join("right.png"),
            ..GlobalConfig::default()
        };

        assert!(run(&cfg).is_err());
    }
}
