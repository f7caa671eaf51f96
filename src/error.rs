//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the stereo depth crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error
    },

    #[error("Could not read or write image: {0}")]
    Image(#[from] image::ImageError),

    #[error("OpenCV error: {0}")]
    OpenCv(#[from] opencv::Error),

    #[error("Expected an 8-bit single channel image, got OpenCV type {0}")]
    ImageType(i32),

    #[error("Could not parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("No valid image pair found, the chessboard was not detected in both views")]
    NoValidImagePairs,

    #[error("Calibration failed: {0}")]
    Calibration(String),

    #[error("Unsupported calibration file {0}, expected a .mat or .json file")]
    UnsupportedCalibrationFile(String),

    #[error("Could not parse MAT file: {0}")]
    MatFile(String),

    #[error("Variable {0} is missing from the MAT file")]
    MissingVariable(String),

    #[error("Variable {name} has shape {found:?}, expected {expected}")]
    BadShape {
        name: String,
        found: Vec<usize>,
        expected: &'static str
    },

    #[error("Image sizes differ: left is {left:?}, right is {right:?}")]
    ImageSizeMismatch {
        left: (usize, usize),
        right: (usize, usize)
    }
}

impl Error {
    /// Wrap an I/O error with the path it occurred on.
    pub fn io<P: AsRef<std::path::Path>>(path: P, source: std::io::Error) -> Self {
        Error::Io {
            path: path.as_ref().display().to_string(),
            source
        }
    }
}
