//! # Image frames
//!
//! Stereo frames of 8-bit grayscale images, the floating point image disparities are stored in,
//! and the conversions between `image` buffers and OpenCV `Mat`s.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;

use image::GrayImage;
use opencv::core::{Mat, CV_8UC1};
use opencv::prelude::*;

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A single channel image with `f32` pixels stored row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct GrayFloatImage {
    buffer: Vec<f32>,
    width: usize,
    height: usize
}

/// A left/right image pair from a stereo camera.
#[derive(Debug, Clone)]
pub struct StereoFrame {
    pub left: GrayImage,
    pub right: GrayImage
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl GrayFloatImage {
    /// Create an image with every pixel set to `val`.
    pub fn filled(width: usize, height: usize, val: f32) -> Self {
        Self {
            buffer: vec![val; width * height],
            width,
            height
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.buffer[y * self.width + x]
    }

    pub fn put(&mut self, x: usize, y: usize, val: f32) {
        self.buffer[y * self.width + x] = val;
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.buffer
    }
}

impl StereoFrame {
    /// Build a frame from two images of equal size.
    pub fn new(left: GrayImage, right: GrayImage) -> Result<Self> {
        if left.dimensions() != right.dimensions() {
            return Err(Error::ImageSizeMismatch {
                left: (left.width() as usize, left.height() as usize),
                right: (right.width() as usize, right.height() as usize)
            });
        }

        Ok(Self { left, right })
    }

    pub fn width(&self) -> usize {
        self.left.width() as usize
    }

    pub fn height(&self) -> usize {
        self.left.height() as usize
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Load an image from disk and convert it to 8-bit grayscale.
pub fn load_gray<P: AsRef<Path>>(path: P) -> Result<GrayImage> {
    Ok(image::open(path)?.to_luma8())
}

/// Histogram-equalise an 8-bit grayscale image.
pub fn equalize(img: &GrayImage) -> GrayImage {
    imageproc::contrast::equalize_histogram(img)
}

/// Copy a grayscale image into a `CV_8UC1` matrix.
pub fn to_mat(img: &GrayImage) -> Result<Mat> {
    let mat = Mat::new_rows_cols_with_data(img.height() as i32, img.width() as i32, img.as_raw())?;
    Ok(mat.clone_pointee())
}

/// Copy a `CV_8UC1` matrix into a grayscale image.
pub fn from_mat(mat: &Mat) -> Result<GrayImage> {
    if mat.typ() != CV_8UC1 {
        return Err(Error::ImageType(mat.typ()));
    }

    let (width, height) = (mat.cols() as u32, mat.rows() as u32);
    let data = if mat.is_continuous() {
        mat.data_bytes()?.to_vec()
    }
    else {
        mat.try_clone()?.data_bytes()?.to_vec()
    };

    GrayImage::from_raw(width, height, data).ok_or(Error::ImageType(mat.typ()))
}

/// Returns true if the path has an extension the image loader understands.
pub fn is_image_file(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_ascii_lowercase().as_str(),
            "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff" | "pgm" | "ppm"
        ),
        None => false
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_mismatched_sizes() {
        let left = GrayImage::new(4, 4);
        let right = GrayImage::new(5, 4);

        match StereoFrame::new(left, right) {
            Err(Error::ImageSizeMismatch { left, right }) => {
                assert_eq!(left, (4, 4));
                assert_eq!(right, (5, 4));
            }
            other => panic!("unexpected result {:?}", other.map(|_| ()))
        }
    }

    #[test]
    fn mat_conversion_keeps_pixel_layout() {
        let img = GrayImage::from_fn(5, 3, |x, y| image::Luma([(10 * y + x) as u8]));
        let mat = to_mat(&img).unwrap();

        assert_eq!((mat.cols(), mat.rows()), (5, 3));
        assert_eq!(*mat.at_2d::<u8>(2, 4).unwrap(), 24);
        assert_eq!(from_mat(&mat).unwrap(), img);
    }

    #[test]
    fn non_byte_mat_is_rejected() {
        let mat = Mat::from_slice(&[1.0f64, 2.0]).unwrap().clone_pointee();
        assert!(matches!(from_mat(&mat), Err(Error::ImageType(_))));
    }

    #[test]
    fn equalize_stretches_histogram() {
        let img = GrayImage::from_fn(16, 16, |x, _| image::Luma([100 + (x as u8 % 4)]));
        let eq = equalize(&img);

        let max = eq.pixels().map(|p| p[0]).max().unwrap();
        assert_eq!(max, 255);
    }

    #[test]
    fn image_extensions() {
        assert!(is_image_file(Path::new("a/left_017.png")));
        assert!(is_image_file(Path::new("b.JPG")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("noext")));
    }
}
