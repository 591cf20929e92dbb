use std::io::Cursor;

use image::imageops::FilterType;
use image::ImageFormat;

fn raster_format(content_type: &str) -> Option<ImageFormat> {
    match content_type {
        "image/jpeg" => Some(ImageFormat::Jpeg),
        "image/png" => Some(ImageFormat::Png),
        "image/webp" => Some(ImageFormat::WebP),
        _ => None,
    }
}

/// Downscale raster images whose longest side exceeds `max_dimension`,
/// keeping the aspect ratio and the original format. Anything else, and any
/// image that fails to decode or encode, is returned untouched.
pub fn optimize_image(bytes: &[u8], content_type: &str, max_dimension: u32) -> Vec<u8> {
    let Some(format) = raster_format(content_type) else {
        return bytes.to_vec();
    };
    match resize(bytes, format, max_dimension) {
        Ok(Some(resized)) => resized,
        Ok(None) => bytes.to_vec(),
        Err(e) => {
            tracing::warn!(content_type, "Image optimization skipped: {e}");
            bytes.to_vec()
        }
    }
}

fn resize(bytes: &[u8], format: ImageFormat, max_dimension: u32) -> anyhow::Result<Option<Vec<u8>>> {
    let img = image::load_from_memory_with_format(bytes, format)?;
    if img.width() <= max_dimension && img.height() <= max_dimension {
        return Ok(None);
    }

    let resized = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    let mut out = Vec::new();
    // The webp encoder in `image` is lossless-only and takes RGBA8.
    if format == ImageFormat::WebP {
        image::DynamicImage::ImageRgba8(resized.to_rgba8())
            .write_to(&mut Cursor::new(&mut out), format)?;
    } else if format == ImageFormat::Jpeg {
        image::DynamicImage::ImageRgb8(resized.to_rgb8()).write_to(&mut Cursor::new(&mut out), format)?;
    } else {
        resized.write_to(&mut Cursor::new(&mut out), format)?;
    }
    tracing::debug!(
        from = ?(img.width(), img.height()),
        to = ?(resized.width(), resized.height()),
        "Downscaled image"
    );
    Ok(Some(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::new(width, height));
        let mut out = Vec::new();
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png).unwrap();
        out
    }

    #[test]
    fn large_images_are_downscaled_keeping_aspect() {
        let original = png(400, 200);
        let optimized = optimize_image(&original, "image/png", 100);
        let img = image::load_from_memory(&optimized).unwrap();
        assert_eq!((img.width(), img.height()), (100, 50));
    }

    #[test]
    fn small_images_pass_through() {
        let original = png(50, 40);
        assert_eq!(optimize_image(&original, "image/png", 100), original);
    }

    #[test]
    fn non_raster_and_corrupt_input_pass_through() {
        assert_eq!(optimize_image(b"abc", "video/mp4", 10), b"abc");
        assert_eq!(optimize_image(b"abc", "image/jpeg", 10), b"abc");
    }
}
