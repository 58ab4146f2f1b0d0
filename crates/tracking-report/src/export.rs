//! Writers for the tracking spreadsheet (CSV) and the summary document (JSON).

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

use crate::record::Dataset;
use crate::summary::SummaryReport;

/// Column header of the tracking spreadsheet, in order
pub const CSV_HEADER: [&str; 18] = [
    "participant_id",
    "eye_side",
    "filename",
    "filepath",
    "width",
    "height",
    "resolution",
    "megapixels",
    "file_size_kb",
    "brightness",
    "sharpness_score",
    "camera_make",
    "camera_model",
    "datetime",
    "flash",
    "focal_length",
    "iso",
    "exposure_time",
];

/// Write one CSV row per record. The header is written even for an empty dataset.
pub fn write_csv_to<W: Write>(dataset: &Dataset, writer: W) -> Result<()> {
    let mut csv = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    csv.write_record(CSV_HEADER).context("Failed to write CSV header")?;

    for record in dataset.iter() {
        csv.serialize(record)
            .with_context(|| format!("Failed to write CSV row for {}", record.filepath))?;
    }

    csv.flush().context("Failed to flush CSV output")?;
    Ok(())
}

pub fn write_csv<P: AsRef<Path>>(dataset: &Dataset, path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;

    let file = fs::File::create(path)
        .with_context(|| format!("Failed to create tracking spreadsheet: {}", path.display()))?;
    write_csv_to(dataset, file)
        .with_context(|| format!("Failed to write tracking spreadsheet: {}", path.display()))
}

pub fn write_summary<P: AsRef<Path>>(report: &SummaryReport, path: P) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;

    let json = serde_json::to_string_pretty(report)
        .context("Failed to serialize summary report to JSON")?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write summary report to {}", path.display()))?;

    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create output directory: {}", parent.display())),
        _ => Ok(()),
    }
}
