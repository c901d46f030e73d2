use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::DynamicImage;
use log::debug;

use crate::error::{BridgeError, BridgeResult};

/// Decodes a websocket text payload (base64 JPEG) into an image.
///
/// Browsers produce frames with `canvas.toDataURL`, so a leading
/// `data:image/...;base64,` header is accepted and skipped.
pub fn decode_base64_frame(payload: &str) -> BridgeResult<DynamicImage> {
    let encoded = strip_data_url(payload.trim());
    if encoded.is_empty() {
        return Err(BridgeError::EmptyFrame);
    }

    let bytes = STANDARD.decode(encoded)?;
    if bytes.is_empty() {
        return Err(BridgeError::EmptyFrame);
    }

    let frame = image::load_from_memory(&bytes)?;
    if frame.width() == 0 || frame.height() == 0 {
        return Err(BridgeError::EmptyFrame);
    }

    debug!(
        "Decoded frame {}x{} from {} bytes",
        frame.width(),
        frame.height(),
        bytes.len()
    );
    Ok(frame)
}

fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        if let Some((_, data)) = payload.split_once(";base64,") {
            return data;
        }
    }
    payload
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    pub(crate) fn jpeg_base64(width: u32, height: u32) -> String {
        let image = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(image)
            .write_to(&mut buffer, ImageOutputFormat::Jpeg(90))
            .unwrap();
        STANDARD.encode(buffer.into_inner())
    }

    #[test]
    fn test_decodes_known_jpeg() {
        let frame = decode_base64_frame(&jpeg_base64(640, 480)).unwrap();
        assert_eq!((frame.width(), frame.height()), (640, 480));
    }

    #[test]
    fn test_accepts_data_url_prefix() {
        let payload = format!("data:image/jpeg;base64,{}", jpeg_base64(64, 48));
        let frame = decode_base64_frame(&payload).unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));
    }

    #[test]
    fn test_trims_surrounding_whitespace() {
        let payload = format!("  {}\n", jpeg_base64(16, 16));
        assert!(decode_base64_frame(&payload).is_ok());
    }

    #[test]
    fn test_malformed_base64() {
        let err = decode_base64_frame("not*base64!").unwrap_err();
        assert!(matches!(err, BridgeError::Base64(_)));
    }

    #[test]
    fn test_empty_payload() {
        assert!(matches!(
            decode_base64_frame("").unwrap_err(),
            BridgeError::EmptyFrame
        ));
        assert!(matches!(
            decode_base64_frame("data:image/jpeg;base64,").unwrap_err(),
            BridgeError::EmptyFrame
        ));
    }

    #[test]
    fn test_valid_base64_that_is_not_an_image() {
        let payload = STANDARD.encode(b"definitely not a jpeg");
        let err = decode_base64_frame(&payload).unwrap_err();
        assert!(matches!(err, BridgeError::Image(_)));
    }
}
