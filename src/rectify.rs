//! # Undistortion and remapping
//!
//! Distortion correction of grayscale images through OpenCV. [`undistort`] corrects an image in
//! one call; [`remap_to_camera`] builds explicit undistortion lookup maps with an identity
//! rectifying rotation and the camera's own matrix as the new projection, then remaps through
//! them.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;
use opencv::core::{no_array, Mat, Size, CV_16SC2};
use opencv::{calib3d, imgproc};

use crate::camera::{CameraMatrix, Distortion};
use crate::error::*;
use crate::frame::{from_mat, to_mat};

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Remove lens distortion from an image, keeping the camera matrix.
pub fn undistort(img: &GrayImage, k: &CameraMatrix, d: &Distortion) -> Result<GrayImage> {
    let src = to_mat(img)?;
    let mut dst = Mat::default();

    calib3d::undistort_def(&src, &mut dst, &k.to_mat()?, &d.to_mat()?)?;

    from_mat(&dst)
}

/// Build the undistortion maps of a camera and remap the image through them.
///
/// Areas that map from outside the source image are black.
pub fn remap_to_camera(img: &GrayImage, k: &CameraMatrix, d: &Distortion) -> Result<GrayImage> {
    let src = to_mat(img)?;
    let size = Size::new(img.width() as i32, img.height() as i32);
    let k = k.to_mat()?;

    let mut map1 = Mat::default();
    let mut map2 = Mat::default();
    calib3d::init_undistort_rectify_map(
        &k, &d.to_mat()?, &no_array(), &k, size, CV_16SC2, &mut map1, &mut map2
    )?;

    // Area interpolation is not defined for remap, bilinear is what OpenCV falls back to
    let mut dst = Mat::default();
    imgproc::remap_def(&src, &mut dst, &map1, &map2, imgproc::INTER_LINEAR)?;

    from_mat(&dst)
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
