//! # Stereo calibration
//!
//! Produces the [`CalibrationResult`] of a stereo pair, either by detecting chessboards in two
//! directories of paired images or by loading a precomputed calibration file.
//!
//! Corner detection, sub-pixel refinement and the camera solves are OpenCV's. Each camera is
//! calibrated on its own first, then the stereo solve holds both cameras' intrinsics fixed and
//! estimates the relative pose.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use nalgebra::{Matrix3, Vector3};
use opencv::calib3d;
use opencv::core::{Mat, Point2f, Point3f, Size, TermCriteria, Vector};
use opencv::imgproc;
use serde::{Deserialize, Serialize};

use crate::calib_file;
use crate::camera::{matrix3_from_mat, vector3_from_mat, CameraMatrix, Distortion};
use crate::config::{CalibrationSource, CameraConfig};
use crate::error::*;
use crate::frame::{is_image_file, load_gray, to_mat};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Calibration of a stereo pair. Camera 1 is the left camera; `r` and `t` map points from the
/// left camera frame into the right camera frame.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CalibrationResult {
    /// RMS reprojection error in pixels, zero for loaded calibrations.
    pub rms: f64,
    pub camera_matrix1: CameraMatrix,
    pub camera_matrix2: CameraMatrix,
    pub dist_coeffs1: Distortion,
    pub dist_coeffs2: Distortion,
    pub r: Matrix3<f64>,
    pub t: Vector3<f64>,
    pub e: Matrix3<f64>,
    pub f: Matrix3<f64>
}

/// Corner detections of every image pair in which both views found the board.
pub struct StereoViews {
    /// The board corners in board coordinates, once per view.
    pub object_points: Vector<Vector<Point3f>>,
    pub left: Vector<Vector<Point2f>>,
    pub right: Vector<Vector<Point2f>>,
    pub image_size: (u32, u32)
}

/// Intrinsics of a single camera.
struct MonoCalibration {
    rms: f64,
    camera_matrix: Mat,
    dist_coeffs: Mat
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl CalibrationResult {
    /// Distance between the two camera centres, in the units of the board squares.
    pub fn baseline(&self) -> f64 {
        self.t.norm()
    }

    /// Write the calibration as JSON.
    pub fn save_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), text).map_err(|e| Error::io(path.as_ref(), e))
    }

    /// Read a calibration previously written with [`CalibrationResult::save_json`].
    pub fn load_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::io(path.as_ref(), e))?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl StereoViews {
    /// Number of image pairs with a board in both views.
    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    fn cv_size(&self) -> Size {
        Size::new(self.image_size.0 as i32, self.image_size.1 as i32)
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Calibrate the stereo pair from the configured source.
pub fn calibrate(cfg: &CameraConfig, source: &CalibrationSource) -> Result<CalibrationResult> {
    match source {
        CalibrationSource::Chessboard { left_dir, right_dir } => {
            calibrate_from_dirs(cfg, left_dir, right_dir)
        }
        CalibrationSource::File { path } => calib_file::load(path)
    }
}

/// Detect chessboards in two directories of paired images and calibrate from them.
pub fn calibrate_from_dirs<P: AsRef<Path>>(
    cfg: &CameraConfig,
    left_dir: P,
    right_dir: P
) -> Result<CalibrationResult> {
    cfg.validate()?;

    let views = collect_views(cfg, left_dir.as_ref(), right_dir.as_ref())?;
    info!("valid image pairs: {}", views.len());

    let mut left = calibrate_camera(&views.object_points, &views.left, views.cv_size())?;
    debug!("left camera rms {:.4}", left.rms);
    let mut right = calibrate_camera(&views.object_points, &views.right, views.cv_size())?;
    debug!("right camera rms {:.4}", right.rms);

    // ---- STEREO ----

    let mut r = Mat::default();
    let mut t = Mat::default();
    let mut e = Mat::default();
    let mut f = Mat::default();

    let rms = calib3d::stereo_calibrate_def(
        &views.object_points,
        &views.left,
        &views.right,
        &mut left.camera_matrix,
        &mut left.dist_coeffs,
        &mut right.camera_matrix,
        &mut right.dist_coeffs,
        views.cv_size(),
        &mut r,
        &mut t,
        &mut e,
        &mut f
    )?;
    info!("stereo calibration rms {:.4}", rms);

    Ok(CalibrationResult {
        rms,
        camera_matrix1: CameraMatrix::from_mat(&left.camera_matrix)?,
        camera_matrix2: CameraMatrix::from_mat(&right.camera_matrix)?,
        dist_coeffs1: Distortion::from_mat(&left.dist_coeffs)?,
        dist_coeffs2: Distortion::from_mat(&right.dist_coeffs)?,
        r: matrix3_from_mat(&r)?,
        t: vector3_from_mat(&t)?,
        e: matrix3_from_mat(&e)?,
        f: matrix3_from_mat(&f)?
    })
}

/// Board corners in board coordinates, row-major with `pattern_size.0` corners per row.
pub fn object_points(pattern_size: (usize, usize), square_size: (f64, f64)) -> Vector<Point3f> {
    let mut points = Vector::with_capacity(pattern_size.0 * pattern_size.1);

    for j in 0..pattern_size.1 {
        for i in 0..pattern_size.0 {
            points.push(Point3f::new(
                (i as f64 * square_size.0) as f32,
                (j as f64 * square_size.1) as f32,
                0.0
            ));
        }
    }

    points
}

/// Pair the sorted images of both directories and keep the pairs with a board in both views.
pub fn collect_views(cfg: &CameraConfig, left_dir: &Path, right_dir: &Path) -> Result<StereoViews> {
    let left_files = list_images(left_dir)?;
    let right_files = list_images(right_dir)?;

    if left_files.len() != right_files.len() {
        warn!(
            "{} has {} images but {} has {}, extra images are ignored",
            left_dir.display(), left_files.len(), right_dir.display(), right_files.len()
        );
    }

    let object = object_points(cfg.pattern_size, cfg.square_size);
    let mut views = StereoViews {
        object_points: Vector::new(),
        left: Vector::new(),
        right: Vector::new(),
        image_size: (0, 0)
    };

    for (l, r) in left_files.iter().zip(right_files.iter()) {
        let gray_l = load_gray(l)?;
        let gray_r = load_gray(r)?;

        let corners_l = find_corners(cfg, &to_mat(&gray_l)?)?;
        let corners_r = find_corners(cfg, &to_mat(&gray_r)?)?;
        debug!(
            "{} / {}: board found {} / {}",
            l.display(), r.display(), corners_l.is_some(), corners_r.is_some()
        );

        let (corners_l, corners_r) = match (corners_l, corners_r) {
            (Some(a), Some(b)) => (a, b),
            _ => continue
        };

        if views.is_empty() {
            views.image_size = gray_l.dimensions();
        }
        if gray_l.dimensions() != views.image_size || gray_r.dimensions() != views.image_size {
            return Err(Error::Calibration(format!(
                "image pair {} / {} differs from the calibration image size {:?}",
                l.display(), r.display(), views.image_size
            )));
        }

        views.object_points.push(object.clone());
        views.left.push(corners_l);
        views.right.push(corners_r);
    }

    if views.is_empty() {
        return Err(Error::NoValidImagePairs);
    }

    Ok(views)
}

/// Detect the board and refine its corners to sub-pixel accuracy, `None` if there is no board.
fn find_corners(cfg: &CameraConfig, gray: &Mat) -> Result<Option<Vector<Point2f>>> {
    let pattern = Size::new(cfg.pattern_size.0 as i32, cfg.pattern_size.1 as i32);
    let mut corners = Vector::<Point2f>::new();

    let found = calib3d::find_chessboard_corners(
        gray,
        pattern,
        &mut corners,
        calib3d::CALIB_CB_ADAPTIVE_THRESH | calib3d::CALIB_CB_NORMALIZE_IMAGE
    )?;
    if !found {
        return Ok(None);
    }

    let criteria = TermCriteria::new(
        opencv::core::TermCriteria_COUNT + opencv::core::TermCriteria_EPS,
        cfg.criteria.max_iter as i32,
        cfg.criteria.epsilon
    )?;
    imgproc::corner_sub_pix(
        gray,
        &mut corners,
        Size::new(cfg.subpix_window.0 as i32, cfg.subpix_window.1 as i32),
        Size::new(-1, -1),
        criteria
    )?;

    Ok(Some(corners))
}

fn calibrate_camera(
    object: &Vector<Vector<Point3f>>,
    image: &Vector<Vector<Point2f>>,
    size: Size
) -> Result<MonoCalibration> {
    let mut camera_matrix = Mat::default();
    let mut dist_coeffs = Mat::default();
    let mut rvecs = Vector::<Mat>::new();
    let mut tvecs = Vector::<Mat>::new();

    let rms = calib3d::calibrate_camera_def(
        object, image, size, &mut camera_matrix, &mut dist_coeffs, &mut rvecs, &mut tvecs
    )?;

    Ok(MonoCalibration {
        rms,
        camera_matrix,
        dist_coeffs
    })
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir).map_err(|e| Error::io(dir, e))? {
        let path = entry.map_err(|e| Error::io(dir, e))?.path();
        if path.is_file() && is_image_file(&path) {
            files.push(path);
        }
    }

    files.sort();
    Ok(files)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
