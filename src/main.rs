use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use image_analysis::{extract_metadata, score_image};
use tracking_report::summary::FlaggedImage;
use tracking_report::{export, AnalysisConfig, DatasetBuilder, SummaryReport};

#[derive(Parser)]
#[command(name = "eyeshot")]
#[command(about = "Quality and EXIF analysis of participant-submitted eye photographs")]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze the left/right eye folders and write the tracking spreadsheet and report
    Analyze {
        /// TOML config file; flags below override its values
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Folder with left-eye photos
        #[arg(long)]
        left: Option<PathBuf>,

        /// Folder with right-eye photos
        #[arg(long)]
        right: Option<PathBuf>,

        /// Where to write the tracking spreadsheet (CSV)
        #[arg(long)]
        csv: Option<PathBuf>,

        /// Where to write the summary report (JSON)
        #[arg(long)]
        report: Option<PathBuf>,

        /// Analyze files in parallel (row order is unchanged)
        #[arg(long)]
        parallel: bool,
    },

    /// Print the extracted metadata and quality metrics of a single image
    Inspect {
        /// Image file to inspect
        path: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Analyze { config, left, right, csv, report, parallel } => {
            load_config(config, left, right, csv, report, parallel)
                .and_then(|config| analyze(&config))
        }
        Commands::Inspect { path } => inspect(path),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "run failed");
            eprintln!("Error during analysis: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(
    config_path: Option<PathBuf>,
    left: Option<PathBuf>,
    right: Option<PathBuf>,
    csv: Option<PathBuf>,
    report: Option<PathBuf>,
    parallel: bool,
) -> Result<AnalysisConfig> {
    let mut config = match config_path {
        Some(path) => AnalysisConfig::from_toml_file(&path)?,
        None => AnalysisConfig::default(),
    };

    if let Some(left) = left {
        config.left_eye_dir = left;
    }
    if let Some(right) = right {
        config.right_eye_dir = right;
    }
    if let Some(csv) = csv {
        config.csv_output = csv;
    }
    if let Some(report) = report {
        config.report_output = report;
    }
    config.parallel |= parallel;

    config.validate()?;
    Ok(config)
}

fn analyze(config: &AnalysisConfig) -> Result<()> {
    info!(
        left = %config.left_eye_dir.display(),
        right = %config.right_eye_dir.display(),
        "starting analysis"
    );

    let dataset = DatasetBuilder::from_config(config)
        .build()
        .context("Failed to build image dataset")?;

    if dataset.is_empty() {
        warn!("no images found in either input directory");
    }

    export::write_csv(&dataset, &config.csv_output)?;
    println!("\n💾 Tracking spreadsheet saved to: {}", config.csv_output.display());

    let report = SummaryReport::build(&dataset, &config.thresholds);
    print_summary(&report);

    export::write_summary(&report, &config.report_output)?;
    println!("\n💾 Detailed report saved to: {}", config.report_output.display());

    Ok(())
}

fn inspect(path: PathBuf) -> Result<()> {
    let output = serde_json::json!({
        "file": path.display().to_string(),
        "metadata": extract_metadata(&path),
        "quality": score_image(&path),
    });

    let json = serde_json::to_string_pretty(&output)
        .context("Failed to serialize inspection result")?;
    println!("{}", json);
    Ok(())
}

fn print_summary(report: &SummaryReport) {
    println!("\n{}", "=".repeat(60));
    println!("📈 IMAGE ANALYSIS SUMMARY");
    println!("{}", "=".repeat(60));
    println!("Total images analyzed: {}", report.total_images);
    println!("Left eye images: {}", report.eye_sides.left);
    println!("Right eye images: {}", report.eye_sides.right);
    println!("\nUnique camera models detected: {}", report.unique_camera_model_count);
    println!("Camera models: {}", report.unique_camera_models.join(", "));

    for dir in &report.skipped_directories {
        println!("⚠️  Skipped missing directory: {}", dir);
    }

    println!("\n{}", "-".repeat(60));
    println!("IMAGE QUALITY METRICS");
    println!("{}", "-".repeat(60));

    let stats = (
        report.stats("megapixels"),
        report.stats("file_size_kb"),
        report.stats("brightness"),
        report.stats("sharpness_score"),
    );
    match stats {
        (Some(mp), Some(size), Some(brightness), Some(sharpness)) => {
            println!("Average resolution: {:.2} MP", mp.mean);
            println!("Resolution range: {:.2} - {:.2} MP", mp.min, mp.max);
            println!("Average file size: {:.2} KB", size.mean);
            println!("Average brightness: {:.2}", brightness.mean);
            println!("Average sharpness: {:.2}", sharpness.mean);
        }
        _ => println!("No quality metrics available (N/A)"),
    }

    if !report.per_camera.is_empty() {
        println!("\n{}", "=".repeat(60));
        println!("📷 CAMERA BREAKDOWN");
        println!("{}", "=".repeat(60));

        let fmt_mean = |value: Option<f64>, precision: usize| {
            value
                .map(|v| format!("{:.*}", precision, v))
                .unwrap_or_else(|| tracking_report::NOT_AVAILABLE.to_string())
        };

        for (model, camera) in &report.per_camera {
            println!("\n{}", model.to_uppercase());
            println!("{}", "-".repeat(40));
            println!("  Image Count: {}", camera.image_count);
            println!("  Avg Resolution: {} MP", fmt_mean(camera.mean_megapixels, 2));
            println!("  Avg Brightness: {}", fmt_mean(camera.mean_brightness, 2));
            println!("  Avg Sharpness: {}", fmt_mean(camera.mean_sharpness, 2));
            println!("  Avg File Size: {} KB", fmt_mean(camera.mean_file_size_kb, 0));

            let flash_known = camera.flash.keys().any(|k| k != tracking_report::NOT_AVAILABLE);
            if flash_known {
                let usage: Vec<String> = camera
                    .flash
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v))
                    .collect();
                println!("  Flash Usage: {}", usage.join(", "));
            }
        }
    }

    let concerns = &report.quality_concerns;
    if concerns.total() > 0 || !report.failures.is_empty() {
        println!("\n{}", "=".repeat(60));
        println!("⚠️  QUALITY CONCERNS");
        println!("{}", "=".repeat(60));
    }

    let limits = &report.thresholds;
    print_flagged(
        &format!("LOW RESOLUTION IMAGES (<{} MP)", limits.min_megapixels),
        &concerns.low_resolution,
        " MP",
    );
    print_flagged(
        &format!("LOW SHARPNESS IMAGES (<{})", limits.min_sharpness),
        &concerns.low_sharpness,
        "",
    );
    print_flagged(
        &format!("DARK IMAGES (<{} brightness)", limits.min_brightness),
        &concerns.dark_images,
        "",
    );
    print_flagged("IMAGES WITH MISSING EXIF DATA", &concerns.missing_metadata, "");

    if !report.failures.is_empty() {
        println!("\nFAILED ANALYSES: {}", report.failures.len());
        for failure in &report.failures {
            println!("  - {} [{}]: {}", failure.filename, failure.stage, failure.error);
        }
    }
}

fn print_flagged(title: &str, images: &[FlaggedImage], unit: &str) {
    if images.is_empty() {
        return;
    }

    println!("\n{}: {}", title, images.len());
    for image in images {
        match image.value {
            Some(value) => println!(
                "  - {}: {:.2}{} ({})",
                image.filename, value, unit, image.camera_model
            ),
            None => println!("  - {}", image.filename),
        }
    }
}
