use crate::llm::VisionImage;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Rgb, RgbImage};
use thiserror::Error;

const JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum ImageInputError {
    #[error("image {index} is empty")]
    Empty { index: usize },
    #[error("image {index} could not be decoded: {source}")]
    Decode {
        index: usize,
        #[source]
        source: image::ImageError,
    },
    #[error("image {index} could not be re-encoded: {source}")]
    Encode {
        index: usize,
        #[source]
        source: image::ImageError,
    },
}

/// Decodes one upload into 8-bit RGB, bounds its longest edge and re-encodes
/// it as JPEG so every image reaches the model in the same format.
pub fn normalize_image(
    index: usize,
    bytes: &[u8],
    max_dimension: u32,
) -> Result<VisionImage, ImageInputError> {
    if bytes.is_empty() {
        return Err(ImageInputError::Empty { index });
    }
    let decoded =
        image::load_from_memory(bytes).map_err(|source| ImageInputError::Decode { index, source })?;

    let bounded = if decoded.width().max(decoded.height()) > max_dimension {
        decoded.resize(max_dimension, max_dimension, FilterType::Triangle)
    } else {
        decoded
    };
    let rgb = flatten_to_rgb(&bounded);

    let mut data = Vec::new();
    JpegEncoder::new_with_quality(&mut data, JPEG_QUALITY)
        .encode_image(&rgb)
        .map_err(|source| ImageInputError::Encode { index, source })?;

    Ok(VisionImage {
        mime_type: "image/jpeg",
        data,
    })
}

/// Composites transparent pixels over white; plain `to_rgb8` would turn them black.
fn flatten_to_rgb(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    let mut flattened = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u16::from(pixel[3]);
        let blend =
            |channel: u8| -> u8 { (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8 };
        flattened.put_pixel(x, y, Rgb([blend(pixel[0]), blend(pixel[1]), blend(pixel[2])]));
    }
    flattened
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageFormat, Rgba, RgbaImage};
    use std::io::Cursor;

    pub(crate) fn png_bytes(width: u32, height: u32, pixel: Rgba<u8>) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, pixel);
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn png_becomes_rgb_jpeg() {
        let input = png_bytes(8, 6, Rgba([200, 10, 10, 255]));
        let out = normalize_image(0, &input, 1536).unwrap();
        assert_eq!(out.mime_type, "image/jpeg");
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (8, 6));
        assert!(!decoded.color().has_alpha());
    }

    #[test]
    fn oversized_image_is_bounded_keeping_aspect() {
        let input = png_bytes(64, 32, Rgba([0, 0, 255, 255]));
        let out = normalize_image(0, &input, 16).unwrap();
        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn transparent_pixels_flatten_to_white() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 0])));
        let rgb = flatten_to_rgb(&img);
        assert_eq!(rgb.get_pixel(0, 0), &Rgb([255, 255, 255]));
    }

    #[test]
    fn garbage_bytes_report_their_index() {
        let err = normalize_image(3, b"definitely not an image", 1536).unwrap_err();
        assert!(matches!(err, ImageInputError::Decode { index: 3, .. }));
        assert!(err.to_string().starts_with("image 3 could not be decoded"));
    }

    #[test]
    fn empty_buffer_is_rejected() {
        let err = normalize_image(1, &[], 1536).unwrap_err();
        assert!(matches!(err, ImageInputError::Empty { index: 1 }));
    }
}
