//! # Calibration files
//!
//! Loads a precomputed [`CalibrationResult`] instead of calibrating from chessboards. Two formats
//! are understood, chosen by extension:
//!
//! - `.mat`: MATLAB v5 files exported from the MATLAB stereo calibrator, holding `cameraMatrix1`,
//!   `cameraMatrix2`, `RadialDistortion1`, `RadialDistortion2`, `TangentialDistortion1`,
//!   `TangentialDistortion2`, `R`, `T`, `E` and `F`. MATLAB uses the transposed (row vector)
//!   convention, so every matrix is transposed on load.
//! - `.json`: a [`CalibrationResult`] written by [`CalibrationResult::save_json`].

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use log::info;
use nalgebra::{Matrix3, Vector3};

use crate::calibrate::CalibrationResult;
use crate::camera::{CameraMatrix, Distortion};
use crate::error::*;
use crate::mat5::MatFile;

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Load a calibration file, dispatching on its extension.
pub fn load<P: AsRef<Path>>(path: P) -> Result<CalibrationResult> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    let result = match ext.as_deref() {
        Some("mat") => load_mat(path)?,
        Some("json") => CalibrationResult::load_json(path)?,
        _ => return Err(Error::UnsupportedCalibrationFile(path.display().to_string()))
    };

    info!("loaded calibration from {}", path.display());
    Ok(result)
}

/// Load a MATLAB v5 stereo calibration.
pub fn load_mat<P: AsRef<Path>>(path: P) -> Result<CalibrationResult> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    let mat = MatFile::parse(BufReader::new(file))?;

    Ok(CalibrationResult {
        rms: 0.0,
        camera_matrix1: CameraMatrix(matrix3(&mat, "cameraMatrix1")?),
        camera_matrix2: CameraMatrix(matrix3(&mat, "cameraMatrix2")?),
        dist_coeffs1: distortion(&mat, "RadialDistortion1", "TangentialDistortion1")?,
        dist_coeffs2: distortion(&mat, "RadialDistortion2", "TangentialDistortion2")?,
        r: matrix3(&mat, "R")?,
        t: vector3(&mat, "T")?,
        e: matrix3(&mat, "E")?,
        f: matrix3(&mat, "F")?
    })
}

/// Column-major values and dimensions of a real numeric variable.
fn variable(mat: &MatFile, name: &str) -> Result<(Vec<f64>, Vec<usize>)> {
    let array = mat
        .find_by_name(name)
        .ok_or_else(|| Error::MissingVariable(name.to_string()))?;

    Ok((array.real.clone(), array.dims.clone()))
}

/// A 3x3 variable, transposed into the column vector convention.
fn matrix3(mat: &MatFile, name: &str) -> Result<Matrix3<f64>> {
    let (values, size) = variable(mat, name)?;
    if size != [3, 3] || values.len() != 9 {
        return Err(Error::BadShape {
            name: name.to_string(),
            found: size,
            expected: "3x3"
        });
    }

    Ok(Matrix3::from_column_slice(&values).transpose())
}

/// A 3-element row or column vector.
fn vector3(mat: &MatFile, name: &str) -> Result<Vector3<f64>> {
    let (values, size) = variable(mat, name)?;
    if !is_vector(&size, 3) || values.len() != 3 {
        return Err(Error::BadShape {
            name: name.to_string(),
            found: size,
            expected: "1x3 or 3x1"
        });
    }

    Ok(Vector3::from_column_slice(&values))
}

fn distortion(mat: &MatFile, radial: &str, tangential: &str) -> Result<Distortion> {
    let (rad, rad_size) = variable(mat, radial)?;
    if !(is_vector(&rad_size, 2) || is_vector(&rad_size, 3)) {
        return Err(Error::BadShape {
            name: radial.to_string(),
            found: rad_size,
            expected: "2 or 3 element vector"
        });
    }

    let (tan, tan_size) = variable(mat, tangential)?;
    if !is_vector(&tan_size, 2) {
        return Err(Error::BadShape {
            name: tangential.to_string(),
            found: tan_size,
            expected: "2 element vector"
        });
    }

    Ok(Distortion {
        k1: rad[0],
        k2: rad[1],
        p1: tan[0],
        p2: tan[1],
        k3: rad.get(2).cloned().unwrap_or(0.0)
    })
}

fn is_vector(size: &[usize], len: usize) -> bool {
    size == [1, len] || size == [len, 1]
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_extension_is_rejected() {
        let res = load("stereoParams.yaml");
        assert!(matches!(res, Err(Error::UnsupportedCalibrationFile(_))));
    }

    #[test]
    fn missing_mat_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = load(dir.path().join("missing.mat"));
        assert!(matches!(res, Err(Error::Io { .. })));
    }

    #[test]
    fn garbage_mat_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.mat");
        std::fs::write(&path, b"not a mat file").unwrap();

        assert!(matches!(load(&path), Err(Error::MatFile(_))));
    }

    #[test]
    fn vector_shapes() {
        assert!(is_vector(&[1, 3], 3));
        assert!(is_vector(&[3, 1], 3));
        assert!(!is_vector(&[3, 3], 3));
        assert!(!is_vector(&[1, 2], 3));
    }
}
