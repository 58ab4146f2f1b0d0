//! Failure reasons for per-file analysis.
//!
//! A failed file is data, not a fault: the extractor and scorer hand these back
//! so the batch can keep going and the report can say what went wrong.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AnalysisError {
    #[error("file could not be read: {0}")]
    Unreadable(String),

    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),

    #[error("image data could not be decoded: {0}")]
    Decode(String),

    #[error("metadata block is malformed: {0}")]
    MalformedMetadata(String),
}

impl AnalysisError {
    /// Short machine-friendly label, used in summaries and log fields
    pub fn kind(&self) -> &'static str {
        match self {
            AnalysisError::Unreadable(_) => "unreadable",
            AnalysisError::UnsupportedFormat(_) => "unsupported_format",
            AnalysisError::Decode(_) => "decode",
            AnalysisError::MalformedMetadata(_) => "malformed_metadata",
        }
    }
}

impl From<std::io::Error> for AnalysisError {
    fn from(err: std::io::Error) -> Self {
        AnalysisError::Unreadable(err.to_string())
    }
}

impl From<image::ImageError> for AnalysisError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(e) => AnalysisError::Unreadable(e.to_string()),
            image::ImageError::Unsupported(e) => AnalysisError::UnsupportedFormat(e.to_string()),
            other => AnalysisError::Decode(other.to_string()),
        }
    }
}

pub type AnalysisResult<T> = std::result::Result<T, AnalysisError>;
