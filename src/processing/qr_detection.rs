use anyhow::{anyhow, Result};
use image::{imageops, DynamicImage, GrayImage, RgbaImage};
use rxing::Reader;
use tracing::debug;

/// One frame drawn onto the scan canvas. Handed to the decoder once and
/// dropped afterwards.
#[derive(Debug, Clone)]
pub struct ScanAttempt {
    /// RGBA pixels, row-major, `width * height * 4` bytes
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Fixed-size offscreen bitmap the live frame is drawn into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanCanvas {
    pub width: u32,
    pub height: u32,
}

impl ScanCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    /// Stretches the frame to the canvas size, like drawing a video element
    /// onto a canvas of fixed dimensions.
    pub fn draw(&self, frame: &DynamicImage) -> ScanAttempt {
        let rgba = if frame.width() == self.width && frame.height() == self.height {
            frame.to_rgba8()
        } else {
            imageops::resize(frame, self.width, self.height, imageops::FilterType::Triangle)
        };

        ScanAttempt {
            data: rgba.into_raw(),
            width: self.width,
            height: self.height,
        }
    }
}

/// Extracts a QR payload from a raw RGBA bitmap.
pub trait FrameDecoder: Send + Sync {
    fn decode(&self, data: &[u8], width: u32, height: u32) -> Option<String>;

    fn decode_attempt(&self, attempt: &ScanAttempt) -> Option<String> {
        self.decode(&attempt.data, attempt.width, attempt.height)
    }
}

/// Tries rqrr, quircs and rxing in turn, first on the plain grayscale frame
/// and then on an Otsu-binarized copy.
#[derive(Debug, Clone, Default)]
pub struct CascadeDecoder;

impl CascadeDecoder {
    pub fn new() -> Self {
        Self
    }

    fn try_all_decoders(image: &GrayImage) -> Option<(String, &'static str)> {
        // Try rqrr (fastest)
        if let Ok(content) = decode_with_rqrr(image) {
            return Some((content, "rqrr"));
        }
        // Try quircs (medium)
        if let Ok(content) = decode_with_quircs(image) {
            return Some((content, "quircs"));
        }
        // Try rxing (most robust)
        if let Ok(content) = decode_with_rxing(image) {
            return Some((content, "rxing"));
        }
        None
    }
}

impl FrameDecoder for CascadeDecoder {
    fn decode(&self, data: &[u8], width: u32, height: u32) -> Option<String> {
        let rgba = RgbaImage::from_raw(width, height, data.to_vec())?;
        let gray = DynamicImage::ImageRgba8(rgba).to_luma8();

        if let Some((content, decoder)) = Self::try_all_decoders(&gray) {
            debug!("✅ {} decoded frame ({} chars)", decoder, content.len());
            return Some(content);
        }

        let mut binarized = gray;
        let threshold = imageproc::contrast::otsu_level(&binarized);
        imageproc::contrast::threshold_mut(
            &mut binarized,
            threshold,
            imageproc::contrast::ThresholdType::Binary,
        );

        let (content, decoder) = Self::try_all_decoders(&binarized)?;
        debug!("✅ {} decoded Otsu-binarized frame ({} chars)", decoder, content.len());
        Some(content)
    }
}

/// Attempts to decode a QR code using the rqrr library
fn decode_with_rqrr(image: &GrayImage) -> Result<String> {
    let mut prepared_img = rqrr::PreparedImage::prepare(image.clone());
    let grids = prepared_img.detect_grids();

    let grid = grids.first().ok_or_else(|| anyhow!("rqrr: No grids found"))?;
    let (_meta, content) = grid.decode()?;
    Ok(content)
}

/// Attempts to decode a QR code using the quircs library
fn decode_with_quircs(image: &GrayImage) -> Result<String> {
    let mut decoder = quircs::Quirc::default();
    let codes = decoder.identify(image.width() as usize, image.height() as usize, image);

    for code in codes {
        let Ok(code) = code else { continue };
        if let Ok(decoded) = code.decode() {
            return Ok(String::from_utf8(decoded.payload)?);
        }
    }
    Err(anyhow!("quircs: No QR code found"))
}

/// Attempts to decode a QR code using the rxing library
fn decode_with_rxing(image: &GrayImage) -> Result<String> {
    let dynamic_image = DynamicImage::ImageLuma8(image.clone());

    let mut reader = rxing::MultiUseMultiFormatReader::default();
    let result = reader.decode_with_hints(
        &mut rxing::BinaryBitmap::new(rxing::common::GlobalHistogramBinarizer::new(
            rxing::BufferedImageLuminanceSource::new(dynamic_image),
        )),
        &rxing::DecodingHintDictionary::new(),
    )?;

    Ok(result.getText().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgba};
    use qrcode::QrCode;

    fn qr_frame(payload: &str) -> DynamicImage {
        let code = QrCode::new(payload.as_bytes()).unwrap();
        let luma = code.render::<Luma<u8>>().min_dimensions(300, 300).build();
        DynamicImage::ImageLuma8(luma)
    }

    #[test]
    fn test_canvas_stretches_to_fixed_size() {
        let canvas = ScanCanvas::new(64, 48);
        let frame = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 20, Rgba([1, 2, 3, 255])));
        let attempt = canvas.draw(&frame);
        assert_eq!((attempt.width, attempt.height), (64, 48));
        assert_eq!(attempt.data.len(), 64 * 48 * 4);
    }

    #[test]
    fn test_canvas_rejects_zero_size() {
        let canvas = ScanCanvas::new(0, 0);
        assert_eq!(canvas, ScanCanvas::new(1, 1));
    }

    #[test]
    fn test_cascade_decodes_rendered_code() {
        let frame = qr_frame("3f2b8c4e-1d2a-4f6b-9e7a-0c1d2e3f4a5b");
        let canvas = ScanCanvas::new(frame.width(), frame.height());
        let attempt = canvas.draw(&frame);

        let decoded = CascadeDecoder::new().decode_attempt(&attempt);
        assert_eq!(decoded.as_deref(), Some("3f2b8c4e-1d2a-4f6b-9e7a-0c1d2e3f4a5b"));
    }

    #[test]
    fn test_cascade_returns_none_on_blank_frame() {
        let blank = RgbaImage::from_pixel(120, 120, Rgba([255, 255, 255, 255]));
        assert!(CascadeDecoder::new().decode(blank.as_raw(), 120, 120).is_none());
    }

    #[test]
    fn test_cascade_returns_none_on_short_buffer() {
        assert!(CascadeDecoder::new().decode(&[0u8; 10], 120, 120).is_none());
    }
}
