//! Request payload validation and image preparation.
//!
//! Validation order is fixed: body parse, base64, size, raster decode,
//! dimensions, channel layout. The first failure is reported.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::{DynamicImage, RgbImage};
use serde_json::Value;

use crate::config::Limits;
use crate::error::PredictError;

/// Field that carries the base64 payload in JSON requests.
const IMAGE_FIELD: &str = "image";

/// Whether the request body should be parsed as a JSON envelope.
pub fn is_json_content_type(content_type: Option<&str>) -> bool {
    content_type
        .and_then(|value| value.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

/// Extract raw image bytes from the request body.
///
/// JSON bodies must be an object with a base64 string under `image`; any
/// other content type treats the whole body as raw image bytes. The size
/// limit applies to the decoded bytes in both cases.
pub fn extract_image_bytes(
    content_type: Option<&str>,
    body: &[u8],
    limits: &Limits,
) -> Result<Vec<u8>, PredictError> {
    if is_json_content_type(content_type) {
        let value: Value = serde_json::from_slice(body).map_err(|_| PredictError::MissingImage)?;
        let field = value.get(IMAGE_FIELD).ok_or(PredictError::MissingImage)?;
        let encoded = field.as_str().ok_or(PredictError::InvalidData)?;

        // Base64 text longer than 4/3 of the limit cannot decode under it;
        // reject before buffering the decoded copy.
        if encoded.len() / 4 * 3 > limits.max_payload_bytes + 2 {
            return Err(PredictError::PayloadTooLarge {
                max_bytes: limits.max_payload_bytes,
            });
        }

        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|_| PredictError::InvalidData)?;
        if bytes.len() > limits.max_payload_bytes {
            return Err(PredictError::PayloadTooLarge {
                max_bytes: limits.max_payload_bytes,
            });
        }
        Ok(bytes)
    } else {
        if body.len() > limits.max_payload_bytes {
            return Err(PredictError::PayloadTooLarge {
                max_bytes: limits.max_payload_bytes,
            });
        }
        Ok(body.to_vec())
    }
}

/// Decode bytes into the 3-channel layout the engine expects.
pub fn decode_image(bytes: &[u8], limits: &Limits) -> Result<RgbImage, PredictError> {
    let decoded = image::load_from_memory(bytes).map_err(|_| PredictError::InvalidFormat)?;

    if decoded.width() > limits.max_dimension || decoded.height() > limits.max_dimension {
        return Err(PredictError::DimensionsTooLarge {
            max: limits.max_dimension,
        });
    }

    to_engine_layout(decoded)
}

/// Full validation pipeline: request body to engine-ready image.
pub fn prepare_image(
    content_type: Option<&str>,
    body: &[u8],
    limits: &Limits,
) -> Result<RgbImage, PredictError> {
    let bytes = extract_image_bytes(content_type, body, limits)?;
    decode_image(&bytes, limits)
}

/// Accept single-channel and 3-channel layouts only.
///
/// Grayscale expands losslessly to three identical channels; anything with
/// another channel count (alpha, luma-alpha) is rejected.
fn to_engine_layout(image: DynamicImage) -> Result<RgbImage, PredictError> {
    match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => Ok(image.to_rgb8()),
        DynamicImage::ImageRgb8(rgb) => Ok(rgb),
        DynamicImage::ImageRgb16(_) | DynamicImage::ImageRgb32F(_) => Ok(image.to_rgb8()),
        _ => Err(PredictError::UnsupportedLayout),
    }
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
    use std::io::Cursor;

    pub fn png_bytes(image: DynamicImage) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .expect("png encoding");
        buffer.into_inner()
    }

    /// A small RGB test card with a dark block on a light background.
    pub fn rgb_png(width: u32, height: u32) -> Vec<u8> {
        png_bytes(DynamicImage::ImageRgb8(rgb_pattern(width, height)))
    }

    pub fn gray_png(width: u32, height: u32) -> Vec<u8> {
        let gray = GrayImage::from_fn(width, height, |x, y| {
            image::Luma([pattern_value(x, y, width, height)])
        });
        png_bytes(DynamicImage::ImageLuma8(gray))
    }

    pub fn rgba_png(width: u32, height: u32) -> Vec<u8> {
        let rgba = RgbaImage::from_fn(width, height, |x, y| {
            let v = pattern_value(x, y, width, height);
            image::Rgba([v, v, v, 255])
        });
        png_bytes(DynamicImage::ImageRgba8(rgba))
    }

    pub fn rgb_pattern(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let v = pattern_value(x, y, width, height);
            image::Rgb([v, v, v])
        })
    }

    fn pattern_value(x: u32, y: u32, width: u32, height: u32) -> u8 {
        if x >= width / 4 && x < width * 3 / 4 && y >= height / 4 && y < height * 3 / 4 {
            16
        } else {
            240
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_images::{gray_png, rgb_pattern, rgb_png, rgba_png};
    use super::*;
    use base64::Engine as _;

    fn limits() -> Limits {
        Limits::default()
    }

    #[test]
    fn test_json_content_type_detection() {
        assert!(is_json_content_type(Some("application/json")));
        assert!(is_json_content_type(Some("application/json; charset=utf-8")));
        assert!(is_json_content_type(Some("Application/JSON")));
        assert!(!is_json_content_type(Some("image/jpeg")));
        assert!(!is_json_content_type(Some("application/octet-stream")));
        assert!(!is_json_content_type(None));
    }

    #[test]
    fn test_raw_body_passes_through() {
        let body = rgb_png(8, 8);
        let bytes = extract_image_bytes(None, &body, &limits()).unwrap();
        assert_eq!(bytes, body);
    }

    #[test]
    fn test_json_envelope_decodes_base64() {
        let png = rgb_png(8, 8);
        let body = serde_json::json!({ "image": BASE64.encode(&png) }).to_string();
        let bytes =
            extract_image_bytes(Some("application/json"), body.as_bytes(), &limits()).unwrap();
        assert_eq!(bytes, png);
    }

    #[test]
    fn test_malformed_json_reports_missing_image() {
        let err = extract_image_bytes(Some("application/json"), b"{not json", &limits())
            .unwrap_err();
        assert!(matches!(err, PredictError::MissingImage));
    }

    #[test]
    fn test_missing_image_field() {
        let err = extract_image_bytes(Some("application/json"), b"{\"data\": \"x\"}", &limits())
            .unwrap_err();
        assert!(matches!(err, PredictError::MissingImage));
    }

    #[test]
    fn test_non_string_image_field() {
        let err = extract_image_bytes(Some("application/json"), b"{\"image\": 42}", &limits())
            .unwrap_err();
        assert!(matches!(err, PredictError::InvalidData));
    }

    #[test]
    fn test_invalid_base64() {
        let err = extract_image_bytes(
            Some("application/json"),
            b"{\"image\": \"not-base64!!\"}",
            &limits(),
        )
        .unwrap_err();
        assert!(matches!(err, PredictError::InvalidData));
    }

    #[test]
    fn test_raw_body_over_limit() {
        let tight = Limits {
            max_payload_bytes: 16,
            ..limits()
        };
        let err = extract_image_bytes(None, &[0u8; 17], &tight).unwrap_err();
        assert!(matches!(err, PredictError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_base64_body_over_limit() {
        let tight = Limits {
            max_payload_bytes: 16,
            ..limits()
        };
        let body = serde_json::json!({ "image": BASE64.encode([0u8; 64]) }).to_string();
        let err = extract_image_bytes(Some("application/json"), body.as_bytes(), &tight)
            .unwrap_err();
        assert!(matches!(err, PredictError::PayloadTooLarge { .. }));
    }

    #[test]
    fn test_undecodable_bytes_are_invalid_format() {
        let err = decode_image(b"definitely not a raster image", &limits()).unwrap_err();
        assert!(matches!(err, PredictError::InvalidFormat));
    }

    #[test]
    fn test_dimension_limit_per_axis() {
        let tight = Limits {
            max_dimension: 8,
            ..limits()
        };
        let wide = rgb_png(16, 4);
        let err = decode_image(&wide, &tight).unwrap_err();
        assert!(matches!(err, PredictError::DimensionsTooLarge { .. }));

        let tall = rgb_png(4, 16);
        let err = decode_image(&tall, &tight).unwrap_err();
        assert!(matches!(err, PredictError::DimensionsTooLarge { .. }));

        let ok = rgb_png(8, 8);
        assert!(decode_image(&ok, &tight).is_ok());
    }

    #[test]
    fn test_alpha_channel_rejected() {
        let err = decode_image(&rgba_png(8, 8), &limits()).unwrap_err();
        assert!(matches!(err, PredictError::UnsupportedLayout));
    }

    #[test]
    fn test_grayscale_expands_to_rgb_losslessly() {
        let from_gray = decode_image(&gray_png(8, 8), &limits()).unwrap();
        let from_rgb = decode_image(&rgb_png(8, 8), &limits()).unwrap();
        assert_eq!(from_gray.dimensions(), from_rgb.dimensions());
        // The test card uses identical channels, so both decodes must agree
        // pixel for pixel.
        assert_eq!(from_gray.as_raw(), from_rgb.as_raw());
    }

    #[test]
    fn test_prepare_image_end_to_end() {
        let png = rgb_png(8, 8);
        let body = serde_json::json!({ "image": BASE64.encode(&png) }).to_string();
        let image = prepare_image(Some("application/json"), body.as_bytes(), &limits()).unwrap();
        assert_eq!(image.dimensions(), (8, 8));
        assert_eq!(image.as_raw(), rgb_pattern(8, 8).as_raw());
    }
}
