//! Per-image analysis for eyeshot
//!
//! Two independent stages, each run against a single file:
//! EXIF/property extraction ([`exif`]) and quality scoring ([`quality`]).
//! Both return an [`AnalysisResult`] so a bad file becomes a typed failure
//! instead of stopping the batch.

pub mod error;
pub mod exif;
pub mod quality;

pub use error::{AnalysisError, AnalysisResult};
pub use exif::{extract_metadata, tag_name, ImageMetadata, ImageProperties};
pub use quality::{score_image, QualityMetrics};
