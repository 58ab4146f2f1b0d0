//! EXIF metadata extraction for eyeshot
//!
//! Reads the basic image properties (dimensions, container format, color mode)
//! and the embedded EXIF block from the image decoder, and parses the block with
//! `rexif`. Tag ids
//! are resolved through a static table; ids the table does not know are kept
//! as their decimal string.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::Path;

use image::{ColorType, ImageDecoder, ImageFormat, ImageReader};
use rexif::TagValue;
use serde::Serialize;
use tracing::debug;

use crate::error::{AnalysisError, AnalysisResult};

/// Properties every readable image has, with or without an EXIF block
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageProperties {
    pub width: u32,
    pub height: u32,
    /// Container format, e.g. `JPEG` or `PNG`
    pub format: String,
    /// Pixel layout, e.g. `RGB`, `RGBA`, `L`
    pub color_mode: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageMetadata {
    pub properties: ImageProperties,
    /// Resolved tag name -> rendered value
    pub tags: BTreeMap<String, String>,
}

impl ImageMetadata {
    /// Look up a tag by its resolved name (e.g. `Model`, `ISOSpeedRatings`)
    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.get(name).map(String::as_str)
    }
}

/// Extract basic properties and EXIF tags from an image file.
///
/// The EXIF block is taken from the decoder, so it is found wherever the
/// container keeps it (any JPEG APP1 position, PNG `eXIf`, WebP `EXIF`).
/// A file without one is not an error: the result simply has no tags.
pub fn extract_metadata<P: AsRef<Path>>(path: P) -> AnalysisResult<ImageMetadata> {
    let path = path.as_ref();
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader.format().ok_or_else(|| {
        AnalysisError::UnsupportedFormat(format!("cannot determine format of {}", path.display()))
    })?;

    let mut decoder = reader.into_decoder()?;
    let (width, height) = decoder.dimensions();
    let properties = ImageProperties {
        width,
        height,
        format: format_name(format),
        color_mode: color_mode(decoder.color_type()),
    };

    let exif = decoder
        .exif_metadata()
        .map_err(|e| AnalysisError::MalformedMetadata(e.to_string()))?;
    let tags = match exif {
        Some(block) => parse_exif_block(&block)?,
        None => {
            debug!(path = %path.display(), "no EXIF block");
            BTreeMap::new()
        }
    };

    Ok(ImageMetadata { properties, tags })
}

/// Parse a raw EXIF block (a TIFF structure, optionally behind the `Exif\0\0` marker)
pub fn parse_exif_block(block: &[u8]) -> AnalysisResult<BTreeMap<String, String>> {
    let tiff = block.strip_prefix(EXIF_MARKER.as_slice()).unwrap_or(block);

    let (result, warnings) = rexif::parse_buffer_quiet(tiff);
    for warning in &warnings {
        debug!(warning = %warning, "EXIF parse warning");
    }
    let exif = result.map_err(|e| AnalysisError::MalformedMetadata(e.to_string()))?;

    let mut tags = BTreeMap::new();
    for entry in &exif.entries {
        // Primary IFD comes first; later duplicates (thumbnail IFD) are ignored
        tags.entry(tag_name(entry.ifd.tag).into_owned())
            .or_insert_with(|| render_value(&entry.value, &entry.value_more_readable));
    }

    Ok(tags)
}

const EXIF_MARKER: [u8; 6] = *b"Exif\0\0";

/// Resolve a numeric EXIF tag id to its canonical name
pub fn tag_name(id: u16) -> Cow<'static, str> {
    match EXIF_TAG_NAMES.binary_search_by_key(&id, |&(tag, _)| tag) {
        Ok(index) => Cow::Borrowed(EXIF_TAG_NAMES[index].1),
        Err(_) => Cow::Owned(id.to_string()),
    }
}

fn render_value(value: &TagValue, readable: &str) -> String {
    match value {
        TagValue::Ascii(s) => s.trim_end_matches('\0').trim().to_string(),
        TagValue::U8(v) => join(v.iter().map(u8::to_string)),
        TagValue::U16(v) => join(v.iter().map(u16::to_string)),
        TagValue::U32(v) => join(v.iter().map(u32::to_string)),
        TagValue::URational(v) => join(
            v.iter().map(|r| rational(f64::from(r.numerator), f64::from(r.denominator))),
        ),
        TagValue::IRational(v) => join(
            v.iter().map(|r| rational(f64::from(r.numerator), f64::from(r.denominator))),
        ),
        _ => readable.to_string(),
    }
}

fn join(mut values: impl Iterator<Item = String>) -> String {
    let first = values.next().unwrap_or_default();
    let rest: Vec<String> = values.collect();
    if rest.is_empty() {
        first
    } else {
        format!("({}, {})", first, rest.join(", "))
    }
}

fn rational(numerator: f64, denominator: f64) -> String {
    if denominator == 0.0 {
        return "nan".to_string();
    }
    // Debug keeps the trailing ".0" on whole numbers
    format!("{:?}", numerator / denominator)
}

fn format_name(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "JPEG".to_string(),
        ImageFormat::Png => "PNG".to_string(),
        other => format!("{:?}", other).to_uppercase(),
    }
}

fn color_mode(color: ColorType) -> String {
    let mode = match color {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        other => return format!("{:?}", other),
    };
    mode.to_string()
}

/// EXIF/TIFF tag ids and their canonical names, sorted by id
const EXIF_TAG_NAMES: &[(u16, &str)] = &[
    (0x0100, "ImageWidth"),
    (0x0101, "ImageLength"),
    (0x0102, "BitsPerSample"),
    (0x0103, "Compression"),
    (0x0106, "PhotometricInterpretation"),
    (0x010E, "ImageDescription"),
    (0x010F, "Make"),
    (0x0110, "Model"),
    (0x0111, "StripOffsets"),
    (0x0112, "Orientation"),
    (0x0115, "SamplesPerPixel"),
    (0x011A, "XResolution"),
    (0x011B, "YResolution"),
    (0x011C, "PlanarConfiguration"),
    (0x0128, "ResolutionUnit"),
    (0x0131, "Software"),
    (0x0132, "DateTime"),
    (0x013B, "Artist"),
    (0x013E, "WhitePoint"),
    (0x013F, "PrimaryChromaticities"),
    (0x0201, "JpegIFOffset"),
    (0x0202, "JpegIFByteCount"),
    (0x0211, "YCbCrCoefficients"),
    (0x0213, "YCbCrPositioning"),
    (0x0214, "ReferenceBlackWhite"),
    (0x8298, "Copyright"),
    (0x829A, "ExposureTime"),
    (0x829D, "FNumber"),
    (0x8769, "ExifOffset"),
    (0x8822, "ExposureProgram"),
    (0x8825, "GPSInfo"),
    (0x8827, "ISOSpeedRatings"),
    (0x8830, "SensitivityType"),
    (0x9000, "ExifVersion"),
    (0x9003, "DateTimeOriginal"),
    (0x9004, "DateTimeDigitized"),
    (0x9010, "OffsetTime"),
    (0x9011, "OffsetTimeOriginal"),
    (0x9012, "OffsetTimeDigitized"),
    (0x9101, "ComponentsConfiguration"),
    (0x9102, "CompressedBitsPerPixel"),
    (0x9201, "ShutterSpeedValue"),
    (0x9202, "ApertureValue"),
    (0x9203, "BrightnessValue"),
    (0x9204, "ExposureBiasValue"),
    (0x9205, "MaxApertureValue"),
    (0x9206, "SubjectDistance"),
    (0x9207, "MeteringMode"),
    (0x9208, "LightSource"),
    (0x9209, "Flash"),
    (0x920A, "FocalLength"),
    (0x9214, "SubjectLocation"),
    (0x927C, "MakerNote"),
    (0x9286, "UserComment"),
    (0x9290, "SubsecTime"),
    (0x9291, "SubsecTimeOriginal"),
    (0x9292, "SubsecTimeDigitized"),
    (0xA000, "FlashPixVersion"),
    (0xA001, "ColorSpace"),
    (0xA002, "ExifImageWidth"),
    (0xA003, "ExifImageHeight"),
    (0xA005, "ExifInteroperabilityOffset"),
    (0xA20E, "FocalPlaneXResolution"),
    (0xA20F, "FocalPlaneYResolution"),
    (0xA210, "FocalPlaneResolutionUnit"),
    (0xA215, "ExposureIndex"),
    (0xA217, "SensingMethod"),
    (0xA300, "FileSource"),
    (0xA301, "SceneType"),
    (0xA401, "CustomRendered"),
    (0xA402, "ExposureMode"),
    (0xA403, "WhiteBalance"),
    (0xA404, "DigitalZoomRatio"),
    (0xA405, "FocalLengthIn35mmFilm"),
    (0xA406, "SceneCaptureType"),
    (0xA407, "GainControl"),
    (0xA408, "Contrast"),
    (0xA409, "Saturation"),
    (0xA40A, "Sharpness"),
    (0xA40C, "SubjectDistanceRange"),
    (0xA420, "ImageUniqueID"),
    (0xA430, "CameraOwnerName"),
    (0xA431, "BodySerialNumber"),
    (0xA432, "LensSpecification"),
    (0xA433, "LensMake"),
    (0xA434, "LensModel"),
    (0xA435, "LensSerialNumber"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::fs;
    use std::io::Cursor;
    use tempfile::tempdir;

    enum Field {
        Ascii(&'static str),
        Short(u16),
        Long(u32),
        Rational(u32, u32),
    }

    /// One little-endian IFD starting at `start`, followed by its out-of-line values.
    /// ASCII values get their terminating NUL.
    fn ifd_bytes(start: u32, fields: &[(u16, Field)]) -> Vec<u8> {
        let data_start = start + 2 + 12 * fields.len() as u32 + 4;
        let mut ifd = (fields.len() as u16).to_le_bytes().to_vec();
        let mut data = Vec::new();

        for (tag, field) in fields {
            let (kind, count, payload): (u16, u32, Vec<u8>) = match field {
                Field::Ascii(s) => {
                    (2, s.len() as u32 + 1, [s.as_bytes(), b"\0".as_slice()].concat())
                }
                Field::Short(v) => (3, 1, v.to_le_bytes().to_vec()),
                Field::Long(v) => (4, 1, v.to_le_bytes().to_vec()),
                Field::Rational(n, d) => (5, 1, [n.to_le_bytes(), d.to_le_bytes()].concat()),
            };
            ifd.extend_from_slice(&tag.to_le_bytes());
            ifd.extend_from_slice(&kind.to_le_bytes());
            ifd.extend_from_slice(&count.to_le_bytes());
            if payload.len() <= 4 {
                let mut inline = payload;
                inline.resize(4, 0);
                ifd.extend_from_slice(&inline);
            } else {
                ifd.extend_from_slice(&(data_start + data.len() as u32).to_le_bytes());
                data.extend_from_slice(&payload);
                if data.len() % 2 == 1 {
                    data.push(0);
                }
            }
        }

        ifd.extend_from_slice(&0u32.to_le_bytes());
        ifd.extend_from_slice(&data);
        ifd
    }

    /// TIFF block of a typical phone shot: camera and timestamp in IFD0,
    /// exposure settings in the Exif IFD
    fn camera_tiff(make: &'static str, model: &'static str) -> Vec<u8> {
        let ifd0 = |exif_offset: u32| -> Vec<(u16, Field)> {
            vec![
                (0x010F, Field::Ascii(make)),
                (0x0110, Field::Ascii(model)),
                (0x0132, Field::Ascii("2024:05:01 10:30:00")),
                (0x8769, Field::Long(exif_offset)),
            ]
        };
        let exif: [(u16, Field); 4] = [
            (0x829A, Field::Rational(1, 125)),
            (0x8827, Field::Short(200)),
            (0x9209, Field::Short(16)),
            (0x920A, Field::Rational(50, 1)),
        ];

        let exif_offset = 8 + ifd_bytes(8, &ifd0(0)).len() as u32;
        let mut tiff = b"II*\0".to_vec();
        tiff.extend_from_slice(&8u32.to_le_bytes());
        tiff.extend_from_slice(&ifd_bytes(8, &ifd0(exif_offset)));
        tiff.extend_from_slice(&ifd_bytes(exif_offset, &exif));
        tiff
    }

    fn jpeg_segment(marker: u8, payload: &[u8]) -> Vec<u8> {
        let mut segment = vec![0xFF, marker];
        segment.extend_from_slice(&((2 + payload.len()) as u16).to_be_bytes());
        segment.extend_from_slice(payload);
        segment
    }

    /// Encoded JPEG with extra segments spliced in right after SOI
    fn jpeg_with_segments(segments: &[Vec<u8>]) -> Result<Vec<u8>> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 8, Rgb([90, 60, 30])));
        let mut encoded = Vec::new();
        img.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Jpeg)?;

        let mut jpeg = encoded[..2].to_vec();
        for segment in segments {
            jpeg.extend_from_slice(segment);
        }
        jpeg.extend_from_slice(&encoded[2..]);
        Ok(jpeg)
    }

    fn exif_app1(tiff: &[u8]) -> Vec<u8> {
        jpeg_segment(0xE1, &[EXIF_MARKER.as_slice(), tiff].concat())
    }

    fn crc32(bytes: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in bytes {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    /// Encoded PNG with an `eXIf` chunk placed right after IHDR
    fn png_with_exif(tiff: &[u8]) -> Result<Vec<u8>> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 6, Rgb([200, 180, 160])));
        let mut encoded = Vec::new();
        img.write_to(&mut Cursor::new(&mut encoded), ImageFormat::Png)?;

        // signature (8) + IHDR chunk (4 + 4 + 13 + 4)
        let after_ihdr = 8 + 25;
        let body = [b"eXIf".as_slice(), tiff].concat();
        let mut chunk = (tiff.len() as u32).to_be_bytes().to_vec();
        chunk.extend_from_slice(&body);
        chunk.extend_from_slice(&crc32(&body).to_be_bytes());

        let mut png = encoded[..after_ihdr].to_vec();
        png.extend_from_slice(&chunk);
        png.extend_from_slice(&encoded[after_ihdr..]);
        Ok(png)
    }

    fn assert_camera_tags(meta: &ImageMetadata) {
        assert_eq!(meta.tag("Make"), Some("Canon"));
        assert_eq!(meta.tag("Model"), Some("EOS R5"));
        assert_eq!(meta.tag("DateTime"), Some("2024:05:01 10:30:00"));
        assert_eq!(meta.tag("ExposureTime"), Some("0.008"));
        assert_eq!(meta.tag("ISOSpeedRatings"), Some("200"));
        assert_eq!(meta.tag("Flash"), Some("16"));
        assert_eq!(meta.tag("FocalLength"), Some("50.0"));
    }

    #[test]
    fn test_tag_table_is_sorted() {
        assert!(EXIF_TAG_NAMES.windows(2).all(|pair| pair[0].0 < pair[1].0));
    }

    #[test]
    fn test_tag_name_resolution() {
        assert_eq!(tag_name(0x010F), "Make");
        assert_eq!(tag_name(0x8827), "ISOSpeedRatings");
        assert_eq!(tag_name(0x9209), "Flash");
        // Unknown ids pass through as their decimal form
        assert_eq!(tag_name(0xBEEF), "48879");
    }

    #[test]
    fn test_rational_rendering() {
        assert_eq!(rational(50.0, 1.0), "50.0");
        assert_eq!(rational(1.0, 125.0), "0.008");
        assert_eq!(rational(1.0, 0.0), "nan");
    }

    #[test]
    fn test_join_single_and_multiple() {
        assert_eq!(join(["7".to_string()].into_iter()), "7");
        assert_eq!(join(["1".to_string(), "2".to_string()].into_iter()), "(1, 2)");
        assert_eq!(join(std::iter::empty()), "");
    }

    #[test]
    fn test_png_has_properties_but_no_tags() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("p010.png");
        RgbImage::from_pixel(40, 20, Rgb([10, 20, 30])).save(&path)?;

        let meta = extract_metadata(&path)?;
        assert_eq!(meta.properties.width, 40);
        assert_eq!(meta.properties.height, 20);
        assert_eq!(meta.properties.format, "PNG");
        assert_eq!(meta.properties.color_mode, "RGB");
        assert!(meta.tags.is_empty());
        assert_eq!(meta.tag("Model"), None);
        Ok(())
    }

    #[test]
    fn test_jpeg_exif_tags_are_resolved() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("p011.jpg");
        fs::write(&path, jpeg_with_segments(&[exif_app1(&camera_tiff("Canon", "EOS R5"))])?)?;

        let meta = extract_metadata(&path)?;
        assert_eq!(meta.properties.format, "JPEG");
        assert_eq!(meta.properties.width, 16);
        assert_eq!(meta.properties.height, 8);
        assert_camera_tags(&meta);
        Ok(())
    }

    #[test]
    fn test_jpeg_exif_after_other_app_segments() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("p012.jpg");
        let icc = jpeg_segment(0xE2, b"ICC_PROFILE\0\x01\x01not-a-real-profile");
        fs::write(&path, jpeg_with_segments(&[icc, exif_app1(&camera_tiff("Canon", "EOS R5"))])?)?;

        assert_camera_tags(&extract_metadata(&path)?);
        Ok(())
    }

    #[test]
    fn test_png_exif_chunk_is_read() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("p013.png");
        fs::write(&path, png_with_exif(&camera_tiff("Canon", "EOS R5"))?)?;

        let meta = extract_metadata(&path)?;
        assert_eq!(meta.properties.format, "PNG");
        assert_eq!(meta.properties.width, 12);
        assert_camera_tags(&meta);
        Ok(())
    }

    #[test]
    fn test_exif_block_with_or_without_marker() -> Result<()> {
        let tiff = camera_tiff("Canon", "EOS R5");
        let bare = parse_exif_block(&tiff)?;
        let marked = parse_exif_block(&[EXIF_MARKER.as_slice(), &tiff].concat())?;

        assert_eq!(bare.get("Model").map(String::as_str), Some("EOS R5"));
        assert_eq!(bare, marked);
        Ok(())
    }

    #[test]
    fn test_garbage_exif_block_is_malformed() {
        let err = parse_exif_block(b"definitely not tiff").unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedMetadata(_)));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = extract_metadata("/definitely/not/here/p001.jpg").unwrap_err();
        assert!(matches!(err, AnalysisError::Unreadable(_)));
    }

    #[test]
    fn test_corrupt_file_is_a_typed_failure() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("corrupt.png");
        fs::write(&path, b"this is not an image at all")?;

        let err = extract_metadata(&path).unwrap_err();
        assert!(matches!(err, AnalysisError::Decode(_) | AnalysisError::UnsupportedFormat(_)));
        Ok(())
    }
}
