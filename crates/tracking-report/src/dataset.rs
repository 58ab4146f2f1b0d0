//! Dataset building: walk the eye directories and analyze every photo.
//!
//! Left-eye rows always come before right-eye rows. Within a directory the
//! order is whatever the directory listing returns. A directory that does not
//! exist is skipped with a warning; a file that fails analysis still gets a
//! row, with the failure kept on the record.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image_analysis::{extract_metadata, score_image};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::AnalysisConfig;
use crate::record::{Dataset, EyeSide, ImageRecord};

/// Accepted file extensions, matched case-insensitively
pub const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDir {
    pub eye_side: EyeSide,
    pub path: PathBuf,
}

impl InputDir {
    pub fn new<P: AsRef<Path>>(eye_side: EyeSide, path: P) -> Self {
        Self {
            eye_side,
            path: path.as_ref().to_path_buf(),
        }
    }
}

/// Check whether a path carries one of the accepted image extensions.
///
/// Only the extension is inspected, so names that are not valid UTF-8 still match.
pub fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|accepted| accepted.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

pub struct DatasetBuilder {
    inputs: Vec<InputDir>,
    parallel: bool,
}

impl DatasetBuilder {
    pub fn new(inputs: Vec<InputDir>) -> Self {
        Self { inputs, parallel: false }
    }

    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self::new(config.inputs()).parallel(config.parallel)
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Analyze every image in the input directories, in order
    pub fn build(&self) -> Result<Dataset> {
        let (jobs, skipped) = self.enumerate()?;
        info!(files = jobs.len(), parallel = self.parallel, "analyzing images");

        // Indexed collect keeps enumeration order in both modes
        let records: Vec<ImageRecord> = if self.parallel {
            jobs.par_iter()
                .map(|(side, path)| analyze_file(*side, path))
                .collect()
        } else {
            jobs.iter()
                .map(|(side, path)| analyze_file(*side, path))
                .collect()
        };

        let degraded = records.iter().filter(|r| r.is_degraded()).count();
        if degraded > 0 {
            warn!(rows = records.len(), degraded, "some images could not be fully analyzed");
        }
        info!(rows = records.len(), skipped_dirs = skipped.len(), "dataset built");

        Ok(Dataset::new(records, skipped))
    }

    /// List the image files to analyze, plus the directories that were missing
    fn enumerate(&self) -> Result<(Vec<(EyeSide, PathBuf)>, Vec<PathBuf>)> {
        let mut jobs = Vec::new();
        let mut skipped = Vec::new();

        for input in &self.inputs {
            if !input.path.is_dir() {
                warn!(
                    eye_side = %input.eye_side,
                    dir = %input.path.display(),
                    "input directory not found, skipping"
                );
                skipped.push(input.path.clone());
                continue;
            }

            let entries = std::fs::read_dir(&input.path)
                .with_context(|| format!("Failed to list directory: {}", input.path.display()))?;

            for entry in entries {
                let entry = entry
                    .with_context(|| format!("Failed to read entry in {}", input.path.display()))?;
                let path = entry.path();
                if is_image_path(&path) && path.is_file() {
                    jobs.push((input.eye_side, path));
                }
            }
        }

        Ok((jobs, skipped))
    }
}

/// Run both analysis stages on one file and merge them into a row
pub fn analyze_file(eye_side: EyeSide, path: &Path) -> ImageRecord {
    let filename = path.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
    info!(eye_side = %eye_side, file = %filename, "processing");

    let metadata = extract_metadata(path);
    if let Err(e) = &metadata {
        warn!(file = %path.display(), kind = e.kind(), error = %e, "metadata extraction failed");
    }

    let quality = score_image(path);
    if let Err(e) = &quality {
        warn!(file = %path.display(), kind = e.kind(), error = %e, "quality scoring failed");
    }

    ImageRecord::from_analysis(eye_side, path, metadata, quality)
}
