//! # Pipeline configuration
//!
//! Typed configuration objects with the default values the pipeline runs with. Every struct
//! deserialises with `#[serde(default)]`, so a JSON file only needs to name the fields it
//! overrides.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::{Path, PathBuf};

use log::info;
use opencv::calib3d;
use serde::{Deserialize, Serialize};

use crate::disparity::DISP_SCALE;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Stopping rule for sub-pixel corner refinement: stop after `max_iter` iterations or once a
/// corner moves less than `epsilon`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct TermCriteria {
    pub max_iter: usize,
    pub epsilon: f64
}

/// Chessboard and corner refinement parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Sub-pixel refinement stopping rule.
    pub criteria: TermCriteria,

    /// Number of inner corners along a board row and column.
    pub pattern_size: (usize, usize),

    /// Extent of one board square along x and y, in board units.
    pub square_size: (f64, f64),

    /// Number of squares on the printed board.
    pub board_size: (usize, usize),

    /// Half size of the sub-pixel refinement window.
    pub subpix_window: (usize, usize)
}

/// Semi-global block matching parameters.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SgbmConfig {
    pub min_disparity: i32,
    pub num_disparities: usize,
    pub block_size: usize,
    pub uniqueness_ratio: u32,
    pub speckle_range: u32,
    pub speckle_window_size: usize,
    pub pre_filter_cap: u8,
    /// Maximum allowed left/right disparity difference in whole pixels, negative to disable.
    pub disp12_max_diff: i32,
    pub mode: SgbmMode,
    pub p1: u32,
    pub p2: u32
}

/// Source of the stereo calibration.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationSource {
    /// Detect chessboards in two directories of paired images.
    Chessboard {
        left_dir: PathBuf,
        right_dir: PathBuf
    },

    /// Load a precomputed calibration from a `.mat` or `.json` file.
    File {
        path: PathBuf
    }
}

/// Top level configuration of a pipeline run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GlobalConfig {
    pub camera: CameraConfig,
    pub sgbm: SgbmConfig,

    /// Histogram-equalise the input images.
    pub equalization: bool,

    /// Remove lens distortion from the input images.
    pub undistort: bool,

    /// Rectify the input images through remap tables.
    pub remap: bool,

    pub left_image: PathBuf,
    pub right_image: PathBuf,
    pub calibration: CalibrationSource,

    pub disparity_output: PathBuf,
    pub depth_output: PathBuf,

    /// The baseline used for depth is the translation magnitude divided by this value.
    pub baseline_divisor: f64
}

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Path aggregation scheme of the matcher.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SgbmMode {
    /// Five directions, single pass.
    Sgbm,
    /// All eight directions.
    Hh,
    /// Left-to-right, right-to-left and top-to-bottom.
    Sgbm3Way,
    /// The four axis-aligned directions.
    Hh4
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for TermCriteria {
    fn default() -> Self {
        Self {
            max_iter: 30,
            epsilon: 0.001
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            criteria: TermCriteria::default(),
            pattern_size: (8, 6),
            square_size: (8.0, 6.0),
            board_size: (10, 7),
            subpix_window: (5, 5)
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<()> {
        let (cols, rows) = self.pattern_size;
        if cols < 2 || rows < 2 {
            return Err(Error::Config(format!(
                "pattern size {:?} needs at least 2x2 inner corners", self.pattern_size
            )));
        }

        // A board of n squares has at most n - 1 inner corners along that side
        let (bc, br) = self.board_size;
        let fits = (cols < bc && rows < br) || (cols < br && rows < bc);
        if !fits {
            return Err(Error::Config(format!(
                "pattern size {:?} does not fit on a board of {:?} squares",
                self.pattern_size, self.board_size
            )));
        }

        if !(self.square_size.0 > 0.0 && self.square_size.1 > 0.0) {
            return Err(Error::Config("square size must be positive".into()));
        }

        if self.subpix_window.0 == 0 || self.subpix_window.1 == 0 {
            return Err(Error::Config("sub-pixel window must not be empty".into()));
        }

        Ok(())
    }
}

impl Default for SgbmConfig {
    fn default() -> Self {
        let block_size = 5;

        Self {
            min_disparity: 0,
            num_disparities: 128,
            block_size,
            uniqueness_ratio: 5,
            speckle_range: 2,
            speckle_window_size: 50,
            pre_filter_cap: 63,
            disp12_max_diff: 100,
            mode: SgbmMode::Sgbm3Way,
            p1: 8 * 3 * (block_size * block_size) as u32,
            p2: 32 * 3 * (block_size * block_size) as u32
        }
    }
}

impl SgbmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_disparities == 0 || self.num_disparities % 16 != 0 {
            return Err(Error::Config(format!(
                "num_disparities must be a positive multiple of 16, got {}",
                self.num_disparities
            )));
        }

        if self.block_size % 2 == 0 {
            return Err(Error::Config(format!(
                "block_size must be odd, got {}", self.block_size
            )));
        }

        if self.p2 <= self.p1 {
            return Err(Error::Config(format!(
                "p2 ({}) must be greater than p1 ({})", self.p2, self.p1
            )));
        }

        if self.uniqueness_ratio >= 100 {
            return Err(Error::Config("uniqueness_ratio must be below 100".into()));
        }

        // Disparities are 16-bit fixed point, including the invalid marker below the range
        let lowest = (self.min_disparity as i64 - 1) * DISP_SCALE as i64;
        let highest = (self.min_disparity as i64 + self.num_disparities as i64) * DISP_SCALE as i64;
        if lowest < i16::MIN as i64 || highest > i16::MAX as i64 {
            return Err(Error::Config(format!(
                "disparity range {}..{} does not fit 16-bit fixed point",
                self.min_disparity,
                self.min_disparity as i64 + self.num_disparities as i64
            )));
        }

        Ok(())
    }
}

impl SgbmMode {
    /// The matching `StereoSGBM` mode flag.
    pub fn to_cv(self) -> i32 {
        match self {
            SgbmMode::Sgbm => calib3d::StereoSGBM_MODE_SGBM,
            SgbmMode::Hh => calib3d::StereoSGBM_MODE_HH,
            SgbmMode::Sgbm3Way => calib3d::StereoSGBM_MODE_SGBM_3WAY,
            SgbmMode::Hh4 => calib3d::StereoSGBM_MODE_HH4
        }
    }
}

impl Default for CalibrationSource {
    fn default() -> Self {
        CalibrationSource::Chessboard {
            left_dir: PathBuf::from("imgs/left-camera"),
            right_dir: PathBuf::from("imgs/right-camera")
        }
    }
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            camera: CameraConfig::default(),
            sgbm: SgbmConfig::default(),
            equalization: true,
            undistort: true,
            remap: true,
            left_image: PathBuf::from("imgs/left-camera/left_017.png"),
            right_image: PathBuf::from("imgs/right-camera/right_017.png"),
            calibration: CalibrationSource::default(),
            disparity_output: PathBuf::from("disparity.jpg"),
            depth_output: PathBuf::from("output.jpg"),
            baseline_divisor: 100.0
        }
    }
}

impl GlobalConfig {
    /// Read a configuration from a JSON file. Missing fields keep their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::io(path.as_ref(), e))?;

        let cfg: Self = serde_json::from_str(&text)?;
        cfg.validate()?;

        Ok(cfg)
    }

    /// Read the configuration override at `path` when that file exists, otherwise use the
    /// defaults.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            info!("loading configuration from {}", path.as_ref().display());
            Self::from_json_file(path)
        }
        else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.camera.validate()?;
        self.sgbm.validate()?;

        if !(self.baseline_divisor > 0.0) {
            return Err(Error::Config("baseline_divisor must be positive".into()));
        }

        Ok(())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
