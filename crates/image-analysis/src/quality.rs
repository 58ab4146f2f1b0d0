//! Image quality scoring for eyeshot
//!
//! Resolution, file size, brightness and a Laplacian-variance sharpness score.
//! Every number is rounded to two decimals; brightness and sharpness are
//! unitless and only comparable between images of the same run.

use std::path::Path;

use image::{DynamicImage, GenericImageView, ImageReader};
use serde::Serialize;

use crate::error::{AnalysisError, AnalysisResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityMetrics {
    pub width: u32,
    pub height: u32,
    /// `"{width}x{height}"`
    pub resolution: String,
    pub megapixels: f64,
    /// width / height
    pub aspect_ratio: f64,
    pub file_size_kb: f64,
    /// Mean of every sample of every channel
    pub brightness: f64,
    /// Variance of the Laplacian of the luminance plane
    pub sharpness_score: f64,
}

impl QualityMetrics {
    /// Score an already decoded image. `file_size_bytes` is the on-disk size.
    pub fn from_image(img: &DynamicImage, file_size_bytes: u64) -> AnalysisResult<Self> {
        let (width, height) = img.dimensions();
        if width == 0 || height == 0 {
            let detail = format!("image has no pixels ({}x{})", width, height);
            return Err(AnalysisError::Decode(detail));
        }

        let pixels = algorithms::pixel_stats(img);
        let sharpness = algorithms::calculate_laplacian_sharpness(
            &pixels.luminance,
            width as usize,
            height as usize,
        );

        Ok(Self {
            width,
            height,
            resolution: format!("{}x{}", width, height),
            megapixels: megapixels(width, height),
            aspect_ratio: round2(width as f64 / height as f64),
            file_size_kb: round2(file_size_bytes as f64 / 1024.0),
            brightness: round2(pixels.brightness),
            sharpness_score: round2(sharpness),
        })
    }
}

/// Decode an image file and compute its quality metrics
pub fn score_image<P: AsRef<Path>>(path: P) -> AnalysisResult<QualityMetrics> {
    let path = path.as_ref();
    let file_size = std::fs::metadata(path)?.len();
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;

    QualityMetrics::from_image(&img, file_size)
}

/// Round to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn megapixels(width: u32, height: u32) -> f64 {
    round2(width as f64 * height as f64 / 1_000_000.0)
}

pub mod algorithms {
    use image::DynamicImage;

    pub struct PixelStats {
        /// Mean over all samples, all channels (alpha included)
        pub brightness: f64,
        /// Row-major per-pixel unweighted channel mean
        pub luminance: Vec<f64>,
    }

    /// 16-bit samples divided by this land on the 8-bit scale (65535 -> 255)
    const U16_TO_U8: f64 = 257.0;
    /// Float samples are nominally 0.0..=1.0
    const F32_TO_U8: f64 = 1.0 / 255.0;

    /// Brightness and luminance plane in one pass over the native samples.
    ///
    /// Every bit depth is measured on the 8-bit scale, so 16-bit and float
    /// images compare directly with ordinary JPEGs.
    pub fn pixel_stats(img: &DynamicImage) -> PixelStats {
        match img {
            DynamicImage::ImageLuma8(buf) => stats_from_samples(buf.as_raw(), 1, 1.0),
            DynamicImage::ImageLumaA8(buf) => stats_from_samples(buf.as_raw(), 2, 1.0),
            DynamicImage::ImageRgb8(buf) => stats_from_samples(buf.as_raw(), 3, 1.0),
            DynamicImage::ImageRgba8(buf) => stats_from_samples(buf.as_raw(), 4, 1.0),
            DynamicImage::ImageLuma16(buf) => stats_from_samples(buf.as_raw(), 1, U16_TO_U8),
            DynamicImage::ImageLumaA16(buf) => stats_from_samples(buf.as_raw(), 2, U16_TO_U8),
            DynamicImage::ImageRgb16(buf) => stats_from_samples(buf.as_raw(), 3, U16_TO_U8),
            DynamicImage::ImageRgba16(buf) => stats_from_samples(buf.as_raw(), 4, U16_TO_U8),
            DynamicImage::ImageRgb32F(buf) => stats_from_samples(buf.as_raw(), 3, F32_TO_U8),
            DynamicImage::ImageRgba32F(buf) => stats_from_samples(buf.as_raw(), 4, F32_TO_U8),
            other => stats_from_samples(other.to_rgba8().as_raw(), 4, 1.0),
        }
    }

    fn stats_from_samples<T>(samples: &[T], channels: usize, divisor: f64) -> PixelStats
    where
        T: Copy + Into<f64>,
    {
        let mut total = 0.0;
        let mut luminance = Vec::with_capacity(samples.len() / channels);

        for pixel in samples.chunks_exact(channels) {
            let sum: f64 = pixel.iter().map(|&s| s.into() / divisor).sum();
            total += sum;
            luminance.push(sum / channels as f64);
        }

        let brightness = if samples.is_empty() {
            0.0
        } else {
            total / samples.len() as f64
        };
        PixelStats { brightness, luminance }
    }

    /// Population variance of the 4-neighbour Laplacian of a luminance plane.
    ///
    /// Kernel `[0 1 0; 1 -4 1; 0 1 0]`. Edge pixels use mirror reflection, so
    /// an out-of-range neighbour is the edge pixel itself. A flat image scores 0.
    pub fn calculate_laplacian_sharpness(luminance: &[f64], width: usize, height: usize) -> f64 {
        if width == 0 || height == 0 || luminance.len() < width * height {
            return 0.0;
        }

        let at = |x: usize, y: usize| luminance[y * width + x];
        let response = |x: usize, y: usize| {
            let left = at(x.saturating_sub(1), y);
            let right = at((x + 1).min(width - 1), y);
            let up = at(x, y.saturating_sub(1));
            let down = at(x, (y + 1).min(height - 1));
            left + right + up + down - 4.0 * at(x, y)
        };

        let count = (width * height) as f64;
        let mut sum = 0.0;
        for y in 0..height {
            for x in 0..width {
                sum += response(x, y);
            }
        }
        let mean = sum / count;

        let mut squared = 0.0;
        for y in 0..height {
            for x in 0..width {
                let d = response(x, y) - mean;
                squared += d * d;
            }
        }

        squared / count
    }
}

#[cfg(test)]
mod tests {
    use super::algorithms::*;
    use super::*;
    use anyhow::Result;
    use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use tempfile::tempdir;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.236), 1.24);
        assert_eq!(round2(2.0), 2.0);
    }

    #[test]
    fn test_megapixels() {
        assert_eq!(megapixels(2000, 1000), 2.0);
        assert_eq!(megapixels(4032, 3024), 12.19);
        assert_eq!(megapixels(640, 480), 0.31);
    }

    #[test]
    fn test_uniform_gray_scores() -> Result<()> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(2000, 1000, Rgb([128, 128, 128])));
        let metrics = QualityMetrics::from_image(&img, 10 * 1024)?;

        assert_eq!(metrics.width, 2000);
        assert_eq!(metrics.height, 1000);
        assert_eq!(metrics.resolution, "2000x1000");
        assert_eq!(metrics.megapixels, 2.0);
        assert_eq!(metrics.aspect_ratio, 2.0);
        assert_eq!(metrics.file_size_kb, 10.0);
        assert_eq!(metrics.brightness, 128.0);
        assert_eq!(metrics.sharpness_score, 0.0);
        Ok(())
    }

    #[test]
    fn test_brightness_includes_every_channel() {
        // (0 + 30 + 60 + 90) / 4
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([0, 30, 60, 90])));
        let stats = pixel_stats(&img);
        assert_eq!(stats.brightness, 45.0);
        assert!(stats.luminance.iter().all(|&l| l == 45.0));
        assert_eq!(stats.luminance.len(), 9);
    }

    #[test]
    fn test_sixteen_bit_images_use_eight_bit_scale() {
        let white = DynamicImage::ImageRgb16(ImageBuffer::from_pixel(4, 4, Rgb([u16::MAX; 3])));
        assert_eq!(pixel_stats(&white).brightness, 255.0);

        // 128 * 257
        let gray = DynamicImage::ImageLuma16(ImageBuffer::from_pixel(4, 4, Luma([32896u16])));
        let stats = pixel_stats(&gray);
        assert_eq!(stats.brightness, 128.0);
        assert!(stats.luminance.iter().all(|&l| l == 128.0));
    }

    #[test]
    fn test_laplacian_known_row() {
        // Responses are [3, -6, 3]: mean 0, variance (9 + 36 + 9) / 3
        let variance = calculate_laplacian_sharpness(&[0.0, 3.0, 0.0], 3, 1);
        assert!((variance - 18.0).abs() < 1e-12);
    }

    #[test]
    fn test_edges_score_sharper_than_flat() {
        let flat = GrayImage::from_pixel(32, 32, Luma([100]));
        let checker = GrayImage::from_fn(32, 32, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 { Luma([0]) } else { Luma([255]) }
        });

        let score = |img: GrayImage| {
            QualityMetrics::from_image(&DynamicImage::ImageLuma8(img), 0).map(|m| m.sharpness_score)
        };
        let flat_score = score(flat);
        let sharp_score = score(checker);

        assert_eq!(flat_score, Ok(0.0));
        assert!(sharp_score.unwrap() > 1000.0);
    }

    #[test]
    fn test_degenerate_planes_score_zero() {
        assert_eq!(calculate_laplacian_sharpness(&[], 0, 0), 0.0);
        assert_eq!(calculate_laplacian_sharpness(&[42.0], 1, 1), 0.0);
        assert_eq!(calculate_laplacian_sharpness(&[1.0, 2.0], 4, 4), 0.0);
    }

    #[test]
    fn test_score_image_is_deterministic() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("p002.png");
        let img = RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 3) as u8, (y * 5) as u8, ((x * y) % 256) as u8])
        });
        img.save(&path)?;

        let first = score_image(&path)?;
        let second = score_image(&path)?;
        assert_eq!(first, second);
        assert_eq!(first.resolution, "64x48");
        assert_eq!(first.aspect_ratio, 1.33);
        let size_kb = std::fs::metadata(&path)?.len() as f64 / 1024.0;
        assert_eq!(first.file_size_kb, round2(size_kb));
        Ok(())
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = score_image("/no/such/dir/p404.jpg").unwrap_err();
        assert!(matches!(err, AnalysisError::Unreadable(_)));
    }
}
