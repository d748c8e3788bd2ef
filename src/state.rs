use shared::{Config, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::domains::camera::FrameDirectoryDevice;
use crate::domains::qr::{CouponQrConfig, CouponQrGenerator};
use crate::domains::scan::ScanSession;
use crate::domains::verify::{HttpCouponVerifier, VerificationFlow};
use crate::processing::qr_detection::{CascadeDecoder, ScanCanvas};

pub type StationSession = ScanSession<FrameDirectoryDevice, CascadeDecoder>;
pub type StationFlow = VerificationFlow<FrameDirectoryDevice, CascadeDecoder, HttpCouponVerifier>;

/// Everything the station binary works with.
///
/// The scan page and the verification page share one `ScanSession`, so at
/// most one camera session exists at a time.
pub struct AppState {
    pub config: Config,
    pub session: StationSession,
    pub flow: StationFlow,
    pub qr_generator: CouponQrGenerator,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self> {
        let device = Arc::new(FrameDirectoryDevice::new(&config.scanner.camera_dir));
        let session = ScanSession::new(
            device,
            Arc::new(CascadeDecoder::new()),
            ScanCanvas::new(config.scanner.canvas_width, config.scanner.canvas_height),
            Duration::from_millis(config.scanner.retry_interval_ms),
        );

        let verifier = HttpCouponVerifier::new(
            config.server.base_url.clone(),
            config.server.cookies.clone(),
            config.server.request_timeout_seconds,
        )?;
        let flow = VerificationFlow::new(session.clone(), Arc::new(verifier));

        let qr_generator = CouponQrGenerator::new(CouponQrConfig {
            size: config.qr.size,
            base_url: config.server.base_url.clone(),
        });

        info!(
            "🚀 Station ready: server {}, camera dir {}, canvas {}x{}",
            config.server.base_url,
            config.scanner.camera_dir,
            config.scanner.canvas_width,
            config.scanner.canvas_height
        );

        Ok(AppState {
            config,
            session,
            flow,
            qr_generator,
        })
    }
}
