use async_trait::async_trait;
use tracing::info;

use super::session::ScanHandler;

/// Scan callback of the plain scan page: reports the payload and stops.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogPayload;

#[async_trait]
impl ScanHandler for LogPayload {
    type Output = ();

    async fn on_decoded(&self, token: &str) {
        info!("📦 QR payload found: {}", token);
    }
}
