//! Tracking spreadsheet and summary report for eyeshot
//!
//! Builds one [`ImageRecord`] per photo found in the left-eye and right-eye
//! directories, then derives a [`SummaryReport`] from the finished
//! [`Dataset`] and writes both to disk.

pub mod config;
pub mod dataset;
pub mod export;
pub mod record;
pub mod summary;

pub use config::{AnalysisConfig, QualityThresholds};
pub use dataset::{analyze_file, DatasetBuilder, InputDir};
pub use export::{write_csv, write_summary, CSV_HEADER};
pub use record::{Dataset, EyeSide, ImageRecord, NOT_AVAILABLE};
pub use summary::{Aggregate, DescriptiveStats, SummaryReport};
