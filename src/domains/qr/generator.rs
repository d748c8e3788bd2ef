use base64::{engine::general_purpose, Engine as _};
use image::{DynamicImage, Luma};
use qrcode::QrCode;
use shared::{AppError, Result};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use uuid::Uuid;

/// QR configuration
#[derive(Debug, Clone)]
pub struct CouponQrConfig {
    /// Edge length of the QR in pixels
    pub size: u32,
    /// Origin of the coupon server, used for the customer page URL
    pub base_url: String,
}

impl Default for CouponQrConfig {
    fn default() -> Self {
        Self {
            size: 200,
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// What the code on a customer's coupon carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponQrMode {
    /// Link to the customer coupon page
    Url,
    /// Bare coupon-code UUID, read by the store's scanner
    Uuid,
}

impl fmt::Display for CouponQrMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CouponQrMode::Url => write!(f, "url"),
            CouponQrMode::Uuid => write!(f, "uuid"),
        }
    }
}

impl FromStr for CouponQrMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(CouponQrMode::Url),
            "uuid" => Ok(CouponQrMode::Uuid),
            other => Err(AppError::validation(format!("unknown QR mode '{}', expected url or uuid", other))),
        }
    }
}

/// Renders coupon codes as QR images.
pub struct CouponQrGenerator {
    pub config: CouponQrConfig,
}

impl CouponQrGenerator {
    pub fn new(config: CouponQrConfig) -> Self {
        Self { config }
    }

    /// `/coupon/view/{uuid}/` on the configured server
    pub fn customer_url(&self, coupon_code_uuid: &Uuid) -> String {
        format!(
            "{}/coupon/view/{}/",
            self.config.base_url.trim_end_matches('/'),
            coupon_code_uuid
        )
    }

    /// Text to encode for the given mode. The UUID must be well-formed.
    pub fn payload(&self, mode: CouponQrMode, coupon_code_uuid: &str) -> Result<String> {
        let uuid = Uuid::parse_str(coupon_code_uuid.trim())
            .map_err(|e| AppError::validation(format!("invalid coupon code UUID: {}", e)))?;

        Ok(match mode {
            CouponQrMode::Url => self.customer_url(&uuid),
            CouponQrMode::Uuid => uuid.to_string(),
        })
    }

    /// PNG bytes of the QR for `text`, `config.size` pixels wide.
    pub fn render_png(&self, text: &str) -> Result<Vec<u8>> {
        let code = QrCode::new(text.as_bytes())
            .map_err(|e| AppError::validation(format!("cannot encode QR payload: {}", e)))?;

        let image = code
            .render::<Luma<u8>>()
            .max_dimensions(self.config.size, self.config.size)
            .build();

        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageLuma8(image).write_to(&mut buffer, image::ImageFormat::Png)?;

        Ok(buffer.into_inner())
    }

    pub fn generate(&self, mode: CouponQrMode, coupon_code_uuid: &str) -> Result<Vec<u8>> {
        let payload = self.payload(mode, coupon_code_uuid)?;
        self.render_png(&payload)
    }

    /// `data:image/png;base64,...` for embedding in a page
    pub fn generate_data_url(&self, mode: CouponQrMode, coupon_code_uuid: &str) -> Result<String> {
        let png = self.generate(mode, coupon_code_uuid)?;
        Ok(format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png)))
    }
}
