//! Run configuration: where the photos are, where the reports go, and which
//! thresholds flag an image as a quality concern.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::dataset::InputDir;
use crate::record::EyeSide;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub left_eye_dir: PathBuf,
    pub right_eye_dir: PathBuf,
    pub csv_output: PathBuf,
    pub report_output: PathBuf,
    /// Analyze files on the rayon pool; row order is unchanged
    pub parallel: bool,
    pub thresholds: QualityThresholds,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            left_eye_dir: PathBuf::from("left_eye"),
            right_eye_dir: PathBuf::from("right_eye"),
            csv_output: PathBuf::from("phase_a_image_tracking.csv"),
            report_output: PathBuf::from("analysis_report.json"),
            parallel: false,
            thresholds: QualityThresholds::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityThresholds {
    /// Below this many megapixels: low resolution
    pub min_megapixels: f64,
    /// Below this Laplacian variance: low sharpness
    pub min_sharpness: f64,
    /// Below this mean intensity: dark image
    pub min_brightness: f64,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            min_megapixels: 2.0,
            min_sharpness: 40.0,
            min_brightness: 100.0,
        }
    }
}

impl AnalysisConfig {
    /// Load a TOML config file; keys left out keep their defaults
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&text)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).context("Failed to parse TOML configuration")
    }

    pub fn validate(&self) -> Result<()> {
        if self.left_eye_dir == self.right_eye_dir {
            bail!(
                "Left and right eye directories must differ (both are {})",
                self.left_eye_dir.display()
            );
        }
        if self.csv_output == self.report_output {
            bail!(
                "Tabular export and summary document would overwrite each other: {}",
                self.csv_output.display()
            );
        }
        Ok(())
    }

    /// Input directories in processing order: left eye, then right eye
    pub fn inputs(&self) -> Vec<InputDir> {
        vec![
            InputDir::new(EyeSide::Left, &self.left_eye_dir),
            InputDir::new(EyeSide::Right, &self.right_eye_dir),
        ]
    }
}
