//! # Stereo Depth Estimation
//!
//! This crate provides offline binocular stereo depth estimation. Calibration, undistortion,
//! remapping and semi-global block matching are delegated to OpenCV; this crate supplies the
//! configuration, calibration file loading, the disparity to depth conversion and the pipeline
//! that chains them together.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod calib_file;
pub mod calibrate;
pub mod camera;
pub mod config;
pub mod depth;
pub mod disparity;
mod error;
pub mod frame;
mod mat5;
pub mod pipeline;
pub mod rectify;
pub mod sgbm;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use error::{Error, Result};

pub mod prelude {
    pub use crate::calibrate::{calibrate, CalibrationResult};
    pub use crate::config::{CalibrationSource, CameraConfig, GlobalConfig, SgbmConfig, SgbmMode};
    pub use crate::depth::{depth_from_disparity, DepthMap, DepthParams};
    pub use crate::disparity::{DisparityAlgorithm, DisparityMap};
    pub use crate::frame::StereoFrame;
    pub use crate::pipeline::{run, PipelineOutput};
    pub use crate::sgbm::Sgbm;
    pub use crate::{Error, Result};
}
