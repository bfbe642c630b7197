use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use storegen_contracts::catalog::{ImageRef, ReferenceImage};

/// Longest edge sent inline to the model service.
pub const MAX_REFERENCE_DIM: u32 = 1024;

/// Reads a reference image for a brief. Decodable images are flattened onto
/// white, downscaled to [`MAX_REFERENCE_DIM`] and re-encoded as JPEG; other
/// files are sent as read. The path becomes the product's original image.
pub fn load_reference_image(path: &Path) -> Result<ReferenceImage> {
    let source = ImageRef::new(path.display().to_string());
    if let Some(bytes) = normalize_image_file(path, MAX_REFERENCE_DIM) {
        return Ok(ReferenceImage {
            mime_type: "image/jpeg".to_string(),
            bytes,
            source,
        });
    }
    let bytes = fs::read(path).with_context(|| format!("failed reading {}", path.display()))?;
    Ok(ReferenceImage {
        mime_type: guess_image_mime(path).to_string(),
        bytes,
        source,
    })
}

fn normalize_image_file(path: &Path, max_dim: u32) -> Option<Vec<u8>> {
    let image = image::open(path).ok()?;
    let flattened = flatten_onto_white(&image);
    let flattened = DynamicImage::ImageRgb8(flattened);
    let resized = if flattened.width() > max_dim || flattened.height() > max_dim {
        flattened.resize(max_dim, max_dim, FilterType::Triangle)
    } else {
        flattened
    };
    let mut bytes = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
    encoder.encode_image(&resized).ok()?;
    Some(bytes)
}

fn flatten_onto_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend = |channel: u8| -> u8 {
            ((u16::from(channel) * alpha + 255 * (255 - alpha)) / 255) as u8
        };
        flattened.put_pixel(
            x,
            y,
            image::Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]),
        );
    }
    flattened
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}
