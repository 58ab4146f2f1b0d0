//! Aggregate statistics over a finished dataset.
//!
//! Everything here is derived and read-only: counts per eye side, camera model
//! tallies, descriptive statistics for each numeric column, a per-camera
//! breakdown, and the lists of images that fall under the quality thresholds.

use std::collections::BTreeMap;

use chrono::{DateTime, Local};
use image_analysis::AnalysisError;
use serde::Serialize;

use crate::config::QualityThresholds;
use crate::record::{Dataset, EyeSide, ImageRecord, NOT_AVAILABLE};

/// Numeric columns that get descriptive statistics, in export order
pub const NUMERIC_ATTRIBUTES: [&str; 6] = [
    "width",
    "height",
    "megapixels",
    "file_size_kb",
    "brightness",
    "sharpness_score",
];

fn numeric_value(record: &ImageRecord, attribute: &str) -> Option<f64> {
    match attribute {
        "width" => record.width.map(f64::from),
        "height" => record.height.map(f64::from),
        "megapixels" => record.megapixels,
        "file_size_kb" => record.file_size_kb,
        "brightness" => record.brightness,
        "sharpness_score" => record.sharpness_score,
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DescriptiveStats {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; `None` with fewer than two values
    pub std: Option<f64>,
    pub min: f64,
    #[serde(rename = "25%")]
    pub p25: f64,
    #[serde(rename = "50%")]
    pub p50: f64,
    #[serde(rename = "75%")]
    pub p75: f64,
    pub max: f64,
}

impl DescriptiveStats {
    /// `None` when there is nothing to describe
    pub fn from_values(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let count = sorted.len();
        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std = (count > 1).then(|| {
            let ss: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
            (ss / (count - 1) as f64).sqrt()
        });

        Some(Self {
            count,
            mean,
            std,
            min: sorted[0],
            p25: percentile(&sorted, 0.25),
            p50: percentile(&sorted, 0.50),
            p75: percentile(&sorted, 0.75),
            max: sorted[count - 1],
        })
    }
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty
fn percentile(sorted: &[f64], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

/// Statistics for one column, or `"N/A"` when no row had a value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Aggregate {
    Stats(DescriptiveStats),
    NotApplicable(&'static str),
}

impl Aggregate {
    pub fn stats(&self) -> Option<&DescriptiveStats> {
        match self {
            Aggregate::Stats(s) => Some(s),
            Aggregate::NotApplicable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EyeSideCounts {
    #[serde(rename = "LEFT")]
    pub left: usize,
    #[serde(rename = "RIGHT")]
    pub right: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedImage {
    pub filename: String,
    pub participant_id: String,
    pub eye_side: EyeSide,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    pub camera_model: String,
}

impl FlaggedImage {
    fn new(record: &ImageRecord, value: Option<f64>) -> Self {
        Self {
            filename: record.filename.clone(),
            participant_id: record.participant_id.clone(),
            eye_side: record.eye_side,
            value,
            camera_model: record.camera_model_label().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualityConcerns {
    pub low_resolution: Vec<FlaggedImage>,
    pub low_sharpness: Vec<FlaggedImage>,
    pub dark_images: Vec<FlaggedImage>,
    pub missing_metadata: Vec<FlaggedImage>,
}

impl QualityConcerns {
    pub fn collect(dataset: &Dataset, thresholds: &QualityThresholds) -> Self {
        let mut concerns = Self::default();

        for record in dataset.iter() {
            if let Some(mp) = record.megapixels.filter(|&mp| mp < thresholds.min_megapixels) {
                concerns.low_resolution.push(FlaggedImage::new(record, Some(mp)));
            }
            if let Some(s) = record.sharpness_score.filter(|&s| s < thresholds.min_sharpness) {
                concerns.low_sharpness.push(FlaggedImage::new(record, Some(s)));
            }
            if let Some(b) = record.brightness.filter(|&b| b < thresholds.min_brightness) {
                concerns.dark_images.push(FlaggedImage::new(record, Some(b)));
            }
            if record.camera_model.is_none() {
                concerns.missing_metadata.push(FlaggedImage::new(record, None));
            }
        }

        concerns
    }

    pub fn total(&self) -> usize {
        self.low_resolution.len()
            + self.low_sharpness.len()
            + self.dark_images.len()
            + self.missing_metadata.len()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraBreakdown {
    pub image_count: usize,
    pub mean_megapixels: Option<f64>,
    pub mean_brightness: Option<f64>,
    pub mean_sharpness: Option<f64>,
    pub mean_file_size_kb: Option<f64>,
    /// Flash tag value -> occurrences
    pub flash: BTreeMap<String, usize>,
}

impl CameraBreakdown {
    fn from_records(records: &[&ImageRecord]) -> Self {
        let mut flash = BTreeMap::new();
        for record in records {
            let label = record.flash.as_deref().unwrap_or(NOT_AVAILABLE).to_string();
            *flash.entry(label).or_insert(0) += 1;
        }

        Self {
            image_count: records.len(),
            mean_megapixels: mean_of(records, |r| r.megapixels),
            mean_brightness: mean_of(records, |r| r.brightness),
            mean_sharpness: mean_of(records, |r| r.sharpness_score),
            mean_file_size_kb: mean_of(records, |r| r.file_size_kb),
            flash,
        }
    }
}

/// Mean over the records that have a value; `None` if none do
fn mean_of(records: &[&ImageRecord], value: impl Fn(&ImageRecord) -> Option<f64>) -> Option<f64> {
    let values: Vec<f64> = records.iter().filter_map(|r| value(r)).collect();
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// A file whose analysis failed, and at which stage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedImage {
    pub filename: String,
    pub filepath: String,
    pub stage: &'static str,
    pub error: AnalysisError,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryReport {
    pub analysis_date: DateTime<Local>,
    pub total_images: usize,
    pub eye_sides: EyeSideCounts,
    pub unique_camera_model_count: usize,
    /// Distinct camera models in first-seen order, `N/A` included
    pub unique_camera_models: Vec<String>,
    pub summary: BTreeMap<&'static str, Aggregate>,
    pub camera_models: BTreeMap<String, usize>,
    pub per_camera: BTreeMap<String, CameraBreakdown>,
    /// Thresholds the concern lists were computed with
    pub thresholds: QualityThresholds,
    pub quality_concerns: QualityConcerns,
    pub failures: Vec<FailedImage>,
    pub skipped_directories: Vec<String>,
}

impl SummaryReport {
    pub fn build(dataset: &Dataset, thresholds: &QualityThresholds) -> Self {
        Self::build_at(dataset, thresholds, Local::now())
    }

    pub fn build_at(
        dataset: &Dataset,
        thresholds: &QualityThresholds,
        analysis_date: DateTime<Local>,
    ) -> Self {
        let mut unique_camera_models: Vec<String> = Vec::new();
        let mut camera_models: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_camera: BTreeMap<String, Vec<&ImageRecord>> = BTreeMap::new();

        for record in dataset.iter() {
            let model = record.camera_model_label();
            if !unique_camera_models.iter().any(|m| m == model) {
                unique_camera_models.push(model.to_string());
            }
            *camera_models.entry(model.to_string()).or_insert(0) += 1;
            by_camera.entry(model.to_string()).or_default().push(record);
        }

        let summary = NUMERIC_ATTRIBUTES
            .iter()
            .map(|&attribute| {
                let values: Vec<f64> = dataset
                    .iter()
                    .filter_map(|r| numeric_value(r, attribute))
                    .collect();
                let aggregate = DescriptiveStats::from_values(&values)
                    .map(Aggregate::Stats)
                    .unwrap_or(Aggregate::NotApplicable(NOT_AVAILABLE));
                (attribute, aggregate)
            })
            .collect();

        let per_camera = by_camera
            .into_iter()
            .map(|(model, records)| (model, CameraBreakdown::from_records(&records)))
            .collect();

        Self {
            analysis_date,
            total_images: dataset.len(),
            eye_sides: EyeSideCounts {
                left: dataset.count_side(EyeSide::Left),
                right: dataset.count_side(EyeSide::Right),
            },
            unique_camera_model_count: unique_camera_models.len(),
            unique_camera_models,
            summary,
            camera_models,
            per_camera,
            thresholds: *thresholds,
            quality_concerns: QualityConcerns::collect(dataset, thresholds),
            failures: collect_failures(dataset),
            skipped_directories: dataset
                .skipped_dirs()
                .iter()
                .map(|p| p.display().to_string())
                .collect(),
        }
    }

    pub fn stats(&self, attribute: &str) -> Option<&DescriptiveStats> {
        self.summary.get(attribute).and_then(Aggregate::stats)
    }
}

fn collect_failures(dataset: &Dataset) -> Vec<FailedImage> {
    let mut failures = Vec::new();
    for record in dataset.iter() {
        let stages = [("metadata", &record.metadata_error), ("quality", &record.quality_error)];
        for (stage, error) in stages {
            if let Some(error) = error {
                failures.push(FailedImage {
                    filename: record.filename.clone(),
                    filepath: record.filepath.clone(),
                    stage,
                    error: error.clone(),
                });
            }
        }
    }
    failures
}
