//! One tracking row per analyzed photo, and the dataset that collects them.

use std::fmt;
use std::path::{Path, PathBuf};

use image_analysis::{AnalysisError, AnalysisResult, ImageMetadata, QualityMetrics};
use serde::{Serialize, Serializer};

/// Marker written wherever a value is missing or could not be computed
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EyeSide {
    Left,
    Right,
}

impl fmt::Display for EyeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EyeSide::Left => write!(f, "LEFT"),
            EyeSide::Right => write!(f, "RIGHT"),
        }
    }
}

/// A flat tracking row. Field order is the column order of the CSV export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageRecord {
    pub participant_id: String,
    pub eye_side: EyeSide,
    pub filename: String,
    pub filepath: String,
    #[serde(serialize_with = "or_na")]
    pub width: Option<u32>,
    #[serde(serialize_with = "or_na")]
    pub height: Option<u32>,
    #[serde(serialize_with = "or_na")]
    pub resolution: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub megapixels: Option<f64>,
    #[serde(skip)]
    pub aspect_ratio: Option<f64>,
    #[serde(serialize_with = "or_na")]
    pub file_size_kb: Option<f64>,
    #[serde(serialize_with = "or_na")]
    pub brightness: Option<f64>,
    #[serde(serialize_with = "or_na")]
    pub sharpness_score: Option<f64>,
    #[serde(serialize_with = "or_na")]
    pub camera_make: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub camera_model: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub datetime: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub flash: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub focal_length: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub iso: Option<String>,
    #[serde(serialize_with = "or_na")]
    pub exposure_time: Option<String>,
    #[serde(skip)]
    pub metadata_error: Option<AnalysisError>,
    #[serde(skip)]
    pub quality_error: Option<AnalysisError>,
}

impl ImageRecord {
    /// Merge the extractor and scorer outputs for one file into a row.
    ///
    /// Width and height come from the extractor's basic properties; everything
    /// a failed stage would have produced is left empty.
    pub fn from_analysis(
        eye_side: EyeSide,
        path: &Path,
        metadata: AnalysisResult<ImageMetadata>,
        quality: AnalysisResult<QualityMetrics>,
    ) -> Self {
        let mut record = Self::empty(eye_side, path);

        match metadata {
            Ok(meta) => {
                let tag = |name: &str| meta.tag(name).map(str::to_string);
                record.width = Some(meta.properties.width);
                record.height = Some(meta.properties.height);
                record.camera_make = tag("Make");
                record.camera_model = tag("Model");
                record.datetime = tag("DateTime");
                record.flash = tag("Flash");
                record.focal_length = tag("FocalLength");
                record.iso = tag("ISOSpeedRatings");
                record.exposure_time = tag("ExposureTime");
            }
            Err(e) => record.metadata_error = Some(e),
        }

        match quality {
            Ok(q) => {
                record.resolution = Some(q.resolution);
                record.megapixels = Some(q.megapixels);
                record.aspect_ratio = Some(q.aspect_ratio);
                record.file_size_kb = Some(q.file_size_kb);
                record.brightness = Some(q.brightness);
                record.sharpness_score = Some(q.sharpness_score);
            }
            Err(e) => record.quality_error = Some(e),
        }

        record
    }

    fn empty(eye_side: EyeSide, path: &Path) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            participant_id: participant_id(path),
            eye_side,
            filename,
            filepath: path.to_string_lossy().into_owned(),
            width: None,
            height: None,
            resolution: None,
            megapixels: None,
            aspect_ratio: None,
            file_size_kb: None,
            brightness: None,
            sharpness_score: None,
            camera_make: None,
            camera_model: None,
            datetime: None,
            flash: None,
            focal_length: None,
            iso: None,
            exposure_time: None,
            metadata_error: None,
            quality_error: None,
        }
    }

    /// Camera model as it appears in the export, `N/A` when unknown
    pub fn camera_model_label(&self) -> &str {
        self.camera_model.as_deref().unwrap_or(NOT_AVAILABLE)
    }

    pub fn is_degraded(&self) -> bool {
        self.metadata_error.is_some() || self.quality_error.is_some()
    }
}

/// Filename with its extension stripped
pub fn participant_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn or_na<T: Serialize, S: Serializer>(value: &Option<T>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => v.serialize(serializer),
        None => serializer.serialize_str(NOT_AVAILABLE),
    }
}

/// All rows of one run, left-eye rows first, in directory listing order
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    records: Vec<ImageRecord>,
    skipped_dirs: Vec<PathBuf>,
}

impl Dataset {
    pub fn new(records: Vec<ImageRecord>, skipped_dirs: Vec<PathBuf>) -> Self {
        Self { records, skipped_dirs }
    }

    pub fn records(&self) -> &[ImageRecord] {
        &self.records
    }

    /// Input directories that did not exist and contributed no rows
    pub fn skipped_dirs(&self) -> &[PathBuf] {
        &self.skipped_dirs
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ImageRecord> {
        self.records.iter()
    }

    pub fn count_side(&self, side: EyeSide) -> usize {
        self.records.iter().filter(|r| r.eye_side == side).count()
    }
}
