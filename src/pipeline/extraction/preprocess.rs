//! Image preparation before OCR: decode check, EXIF orientation, grayscale,
//! Otsu binarisation and PNG re-encoding.

use std::io::Cursor;

use image::imageops::FilterType;
use image::io::Reader as ImageReader;
use image::{DynamicImage, GenericImageView, GrayImage, ImageOutputFormat, Luma};
use tracing::debug;

use super::ExtractionError;

/// Minimum valid image size in bytes (smallest valid PNG is ~67 bytes).
const MIN_IMAGE_BYTES: usize = 67;

/// Maximum input image size before rejecting without decoding.
const MAX_IMAGE_BYTES: usize = 50 * 1024 * 1024;

/// Largest edge, in pixels, accepted for decoding at all.
pub const MAX_DECODE_DIMENSION: u32 = 16_384;

/// Largest pixel count accepted for decoding.
pub const MAX_DECODE_PIXELS: u64 = 64 * 1024 * 1024;

/// Largest edge, in pixels, handed to OCR. Bigger images are downscaled.
pub const MAX_INPUT_DIMENSION: u32 = 4096;

/// Image ready for the OCR engine.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub png_bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// EXIF orientation that was applied (1 = none).
    pub orientation: u32,
    pub threshold: u8,
}

/// Reject clearly invalid input before decoding.
pub fn validate_image_bytes(bytes: &[u8]) -> Result<(), ExtractionError> {
    if bytes.len() < MIN_IMAGE_BYTES {
        return Err(ExtractionError::InvalidImage);
    }
    if bytes.len() > MAX_IMAGE_BYTES {
        return Err(ExtractionError::ImageTooLarge(format!(
            "data exceeds {}MB limit",
            MAX_IMAGE_BYTES / (1024 * 1024)
        )));
    }
    Ok(())
}

/// Read width and height from the image header without decoding pixels.
pub fn read_dimensions(bytes: &[u8]) -> Result<(u32, u32), ExtractionError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| ExtractionError::InvalidImage)?
        .into_dimensions()
        .map_err(|e| {
            debug!(error = %e, "Image header unreadable");
            ExtractionError::InvalidImage
        })
}

/// Refuse headers whose pixel buffer would be unreasonably large.
pub fn check_dimensions(width: u32, height: u32) -> Result<(), ExtractionError> {
    if width.max(height) > MAX_DECODE_DIMENSION {
        return Err(ExtractionError::ImageTooLarge(format!(
            "{width}x{height} exceeds {MAX_DECODE_DIMENSION}px edge limit"
        )));
    }
    if u64::from(width) * u64::from(height) > MAX_DECODE_PIXELS {
        return Err(ExtractionError::ImageTooLarge(format!(
            "{width}x{height} exceeds {MAX_DECODE_PIXELS} pixel limit"
        )));
    }
    Ok(())
}

/// Decode uploaded bytes. Anything the decoders reject is `InvalidImage`;
/// oversized headers are refused before any pixel buffer is allocated.
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, ExtractionError> {
    validate_image_bytes(bytes)?;
    let (width, height) = read_dimensions(bytes)?;
    check_dimensions(width, height)?;
    image::load_from_memory(bytes).map_err(|e| {
        debug!(error = %e, "Image decode failed");
        ExtractionError::InvalidImage
    })
}

/// Read EXIF orientation tag from raw image bytes.
/// Returns 1 (normal) if no EXIF data or tag not present.
pub fn read_exif_orientation(bytes: &[u8]) -> u32 {
    let mut cursor = Cursor::new(bytes);
    let reader = match exif::Reader::new().read_from_container(&mut cursor) {
        Ok(r) => r,
        Err(_) => return 1,
    };

    reader
        .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        .unwrap_or(1)
}

/// Apply EXIF orientation transform.
///
/// 1 = normal, 2 = mirrored, 3 = 180, 4 = flipped vertically,
/// 5 = mirrored + 90 CW, 6 = 90 CW, 7 = mirrored + 270 CW, 8 = 270 CW.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Otsu's threshold: the gray level maximising between-class variance.
/// Pixels at or below the threshold are background candidates (ink).
pub fn otsu_threshold(img: &GrayImage) -> u8 {
    let mut histogram = [0u64; 256];
    for Luma([v]) in img.pixels() {
        histogram[*v as usize] += 1;
    }

    let total: u64 = histogram.iter().sum();
    if total == 0 {
        return 127;
    }
    let weighted_total: f64 = histogram
        .iter()
        .enumerate()
        .map(|(level, &count)| level as f64 * count as f64)
        .sum();

    let mut best = (0u8, -1.0f64);
    let mut background_count = 0u64;
    let mut background_sum = 0.0f64;

    for (level, &count) in histogram.iter().enumerate() {
        background_count += count;
        if background_count == 0 {
            continue;
        }
        let foreground_count = total - background_count;
        if foreground_count == 0 {
            break;
        }
        background_sum += level as f64 * count as f64;

        let mean_bg = background_sum / background_count as f64;
        let mean_fg = (weighted_total - background_sum) / foreground_count as f64;
        let variance =
            background_count as f64 * foreground_count as f64 * (mean_bg - mean_fg).powi(2);
        if variance > best.1 {
            best = (level as u8, variance);
        }
    }
    best.0
}

/// Shrink so the longest edge is at most `max_dim`, keeping aspect ratio.
pub fn pre_downscale(img: DynamicImage, max_dim: u32) -> DynamicImage {
    let (w, h) = (img.width(), img.height());
    let largest = w.max(h);
    if largest <= max_dim {
        return img;
    }

    let scale = max_dim as f32 / largest as f32;
    let new_w = ((w as f32 * scale).round() as u32).max(1);
    let new_h = ((h as f32 * scale).round() as u32).max(1);

    debug!(
        from = format!("{w}x{h}"),
        to = format!("{new_w}x{new_h}"),
        "Pre-downscaling oversized image"
    );

    img.resize_exact(new_w, new_h, FilterType::Triangle)
}

/// Map every pixel to 0 (at or below `threshold`) or 255, in place.
pub fn binarize(mut img: GrayImage, threshold: u8) -> GrayImage {
    for Luma([v]) in img.pixels_mut() {
        *v = if *v > threshold { 255 } else { 0 };
    }
    img
}

/// Encode a grayscale image as PNG bytes.
pub fn encode_png(img: GrayImage) -> Result<Vec<u8>, ExtractionError> {
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut cursor, ImageOutputFormat::Png)
        .map_err(|e| ExtractionError::ImageProcessing(format!("PNG encoding failed: {e}")))?;
    Ok(cursor.into_inner())
}

/// Full preparation chain for one upload.
pub fn prepare_for_ocr(bytes: &[u8]) -> Result<PreparedImage, ExtractionError> {
    let decoded = decode_image(bytes)?;
    let orientation = read_exif_orientation(bytes);
    let oriented = apply_orientation(decoded, orientation);
    let gray = pre_downscale(oriented, MAX_INPUT_DIMENSION).into_luma8();
    let threshold = otsu_threshold(&gray);
    let binary = binarize(gray, threshold);
    let (width, height) = binary.dimensions();
    let png_bytes = encode_png(binary)?;

    debug!(width, height, orientation, threshold, "Image prepared for OCR");

    Ok(PreparedImage {
        width,
        height,
        png_bytes,
        orientation,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage};

    /// Left half dark, right half light.
    fn split_gray(width: u32, height: u32, dark: u8, light: u8) -> GrayImage {
        GrayImage::from_fn(width, height, |x, _| {
            if x < width / 2 {
                Luma([dark])
            } else {
                Luma([light])
            }
        })
    }

    fn sample_png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn too_small_input_is_invalid() {
        assert!(matches!(
            validate_image_bytes(&[0u8; 10]),
            Err(ExtractionError::InvalidImage)
        ));
    }

    #[test]
    fn garbage_bytes_are_invalid() {
        let garbage = vec![0xAB; 512];
        assert!(matches!(decode_image(&garbage), Err(ExtractionError::InvalidImage)));
    }

    #[test]
    fn png_without_exif_has_normal_orientation() {
        assert_eq!(read_exif_orientation(&sample_png(16, 16)), 1);
    }

    #[test]
    fn orientation_six_swaps_dimensions() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 20));
        let rotated = apply_orientation(img, 6);
        assert_eq!((rotated.width(), rotated.height()), (20, 40));
    }

    #[test]
    fn unknown_orientation_is_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(40, 20));
        let same = apply_orientation(img, 42);
        assert_eq!((same.width(), same.height()), (40, 20));
    }

    #[test]
    fn otsu_separates_bimodal_image() {
        let img = split_gray(20, 10, 30, 220);
        let t = otsu_threshold(&img);
        assert!((30..220).contains(&t), "threshold {t}");

        let binary = binarize(img, t);
        assert_eq!(binary.get_pixel(0, 0).0[0], 0);
        assert_eq!(binary.get_pixel(19, 9).0[0], 255);
    }

    #[test]
    fn otsu_on_uniform_image_does_not_panic() {
        let img = GrayImage::from_pixel(8, 8, Luma([128]));
        let t = otsu_threshold(&img);
        let binary = binarize(img, t);
        assert_eq!(binary.dimensions(), (8, 8));
    }

    #[test]
    fn prepare_produces_decodable_binary_png() {
        let prepared = prepare_for_ocr(&sample_png(32, 24)).unwrap();
        assert_eq!((prepared.width, prepared.height), (32, 24));
        assert_eq!(prepared.orientation, 1);

        let decoded = image::load_from_memory(&prepared.png_bytes).unwrap().to_luma8();
        assert!(decoded.pixels().all(|Luma([v])| *v == 0 || *v == 255));
    }

    fn gray_png(width: u32, height: u32) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(GrayImage::new(width, height))
            .write_to(&mut cursor, ImageOutputFormat::Png)
            .unwrap();
        cursor.into_inner()
    }

    #[test]
    fn header_dimensions_are_read_without_decoding() {
        assert_eq!(read_dimensions(&sample_png(32, 24)).unwrap(), (32, 24));
        assert!(matches!(
            read_dimensions(&[0xAB; 512]),
            Err(ExtractionError::InvalidImage)
        ));
    }

    #[test]
    fn dimension_limits() {
        assert!(check_dimensions(MAX_DECODE_DIMENSION, 100).is_ok());
        assert!(matches!(
            check_dimensions(MAX_DECODE_DIMENSION + 1, 1),
            Err(ExtractionError::ImageTooLarge(_))
        ));
        assert!(matches!(
            check_dimensions(12_000, 12_000),
            Err(ExtractionError::ImageTooLarge(_))
        ));
    }

    #[test]
    fn overlong_edge_is_refused_before_decode() {
        let err = decode_image(&gray_png(20_000, 1)).unwrap_err();
        assert!(matches!(err, ExtractionError::ImageTooLarge(ref m) if m.contains("20000x1")));
    }

    #[test]
    fn oversized_image_is_downscaled_to_input_limit() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(MAX_INPUT_DIMENSION * 2, 100));
        let scaled = pre_downscale(img, MAX_INPUT_DIMENSION);
        assert_eq!((scaled.width(), scaled.height()), (MAX_INPUT_DIMENSION, 50));
    }

    #[test]
    fn prepare_caps_long_edge_for_ocr() {
        let prepared = prepare_for_ocr(&gray_png(MAX_INPUT_DIMENSION + 904, 10)).unwrap();
        assert_eq!(prepared.width, MAX_INPUT_DIMENSION);
        assert!(prepared.height >= 1 && prepared.height <= 10);
    }

    #[test]
    fn small_image_is_not_resized() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(40, 20));
        let same = pre_downscale(img, MAX_INPUT_DIMENSION);
        assert_eq!((same.width(), same.height()), (40, 20));
    }
}
