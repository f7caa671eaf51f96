//! # Pinhole camera model
//!
//! Camera matrices and the five coefficient distortion model, stored as `nalgebra` types so
//! calibrations serialise cleanly, with conversions to and from the OpenCV `Mat`s the vision
//! calls consume.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use nalgebra::{Matrix3, Vector3};
use opencv::core::Mat;
use opencv::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Intrinsic camera matrix `[fx s cx; 0 fy cy; 0 0 1]`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CameraMatrix(pub Matrix3<f64>);

/// Lens distortion coefficients. Radial terms `k1, k2, k3`, tangential terms `p1, p2`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Default)]
pub struct Distortion {
    pub k1: f64,
    pub k2: f64,
    pub p1: f64,
    pub p2: f64,
    pub k3: f64
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl CameraMatrix {
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        CameraMatrix(Matrix3::new(
            fx, 0.0, cx,
            0.0, fy, cy,
            0.0, 0.0, 1.0
        ))
    }

    pub fn fx(&self) -> f64 {
        self.0[(0, 0)]
    }

    pub fn fy(&self) -> f64 {
        self.0[(1, 1)]
    }

    pub fn cx(&self) -> f64 {
        self.0[(0, 2)]
    }

    pub fn cy(&self) -> f64 {
        self.0[(1, 2)]
    }

    pub fn skew(&self) -> f64 {
        self.0[(0, 1)]
    }

    pub fn to_mat(&self) -> Result<Mat> {
        matrix3_to_mat(&self.0)
    }

    pub fn from_mat(mat: &Mat) -> Result<Self> {
        Ok(CameraMatrix(matrix3_from_mat(mat)?))
    }
}

impl Distortion {
    /// Coefficients in OpenCV order, `[k1, k2, p1, p2, k3]`.
    pub fn to_array(&self) -> [f64; 5] {
        [self.k1, self.k2, self.p1, self.p2, self.k3]
    }

    pub fn to_mat(&self) -> Result<Mat> {
        Ok(Mat::from_slice(&self.to_array())?.clone_pointee())
    }

    /// Read four or more coefficients in OpenCV order. Terms past `k3` are not modelled and must
    /// be zero.
    pub fn from_mat(mat: &Mat) -> Result<Self> {
        let c = f64_values(mat)?;
        if c.len() < 4 {
            return Err(Error::Calibration(format!(
                "expected at least 4 distortion coefficients, got {}", c.len()
            )));
        }
        if c.iter().skip(5).any(|&v| v != 0.0) {
            return Err(Error::Calibration(
                "rational or thin prism distortion terms are not supported".into()
            ));
        }

        Ok(Distortion {
            k1: c[0],
            k2: c[1],
            p1: c[2],
            p2: c[3],
            k3: c.get(4).cloned().unwrap_or(0.0)
        })
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

pub fn matrix3_to_mat(m: &Matrix3<f64>) -> Result<Mat> {
    let rows: Vec<[f64; 3]> = (0..3)
        .map(|r| [m[(r, 0)], m[(r, 1)], m[(r, 2)]])
        .collect();

    Ok(Mat::from_slice_2d(&rows)?)
}

pub fn matrix3_from_mat(mat: &Mat) -> Result<Matrix3<f64>> {
    let values = f64_values(mat)?;
    if mat.rows() != 3 || mat.cols() != 3 || values.len() != 9 {
        return Err(Error::Calibration(format!(
            "expected a 3x3 matrix, got {}x{}", mat.rows(), mat.cols()
        )));
    }

    Ok(Matrix3::from_row_slice(&values))
}

pub fn vector3_from_mat(mat: &Mat) -> Result<Vector3<f64>> {
    let values = f64_values(mat)?;
    if values.len() != 3 {
        return Err(Error::Calibration(format!(
            "expected a 3 element vector, got {} elements", values.len()
        )));
    }

    Ok(Vector3::from_column_slice(&values))
}

/// Every element of a continuous single channel `CV_64F` matrix, row-major.
fn f64_values(mat: &Mat) -> Result<Vec<f64>> {
    Ok(mat.data_typed::<f64>()?.to_vec())
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
