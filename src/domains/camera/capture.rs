use async_trait::async_trait;
use image::DynamicImage;
use shared::{AppError, Result};
use std::fmt;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Which way the requested camera points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FacingMode {
    /// Rear camera
    Environment,
    /// Front camera
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

/// Video-only capture request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VideoConstraints {
    /// `{ facingMode: { exact: ... } }`
    Exact(FacingMode),
    /// `{ video: true }`
    Any,
}

impl fmt::Display for VideoConstraints {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VideoConstraints::Exact(mode) => write!(f, "facingMode exact {}", mode.as_str()),
            VideoConstraints::Any => write!(f, "any camera"),
        }
    }
}

/// Rear, then front, then whatever the platform offers. Device support for
/// `facingMode` differs between platforms, so the order is fixed.
pub const FALLBACK_ORDER: [VideoConstraints; 3] = [
    VideoConstraints::Exact(FacingMode::Environment),
    VideoConstraints::Exact(FacingMode::User),
    VideoConstraints::Any,
];

/// A live capture stream. Stopping it ends every track it holds.
#[async_trait]
pub trait CaptureStream: Send + Sync {
    /// Current frame of the feed.
    async fn grab_frame(&self) -> Result<DynamicImage>;

    /// Stops all tracks. Calling it twice is harmless.
    fn stop(&self);

    fn is_live(&self) -> bool;

    fn label(&self) -> String;
}

/// Something that can hand out capture streams, such as a camera or a
/// directory of recorded frames.
#[async_trait]
pub trait CaptureDevice: Send + Sync {
    async fn open(&self, constraints: VideoConstraints) -> Result<Arc<dyn CaptureStream>>;
}

/// Stream obtained by `acquire_with_fallback` and the request that won.
pub struct AcquiredStream {
    pub stream: Arc<dyn CaptureStream>,
    pub constraints: VideoConstraints,
}

impl fmt::Debug for AcquiredStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AcquiredStream")
            .field("stream", &self.stream.label())
            .field("constraints", &self.constraints)
            .finish()
    }
}

/// Walks `FALLBACK_ORDER` once and returns the first stream that opens.
#[instrument(skip(device))]
pub async fn acquire_with_fallback<D>(device: &D) -> Result<AcquiredStream>
where
    D: CaptureDevice + ?Sized,
{
    let mut failures = Vec::with_capacity(FALLBACK_ORDER.len());

    for constraints in FALLBACK_ORDER {
        match device.open(constraints).await {
            Ok(stream) => {
                info!("📷 Camera acquired with {} ({})", constraints, stream.label());
                return Ok(AcquiredStream { stream, constraints });
            }
            Err(e) => {
                warn!("⚠️ Camera request '{}' rejected: {}", constraints, e);
                failures.push(format!("{}: {}", constraints, e));
            }
        }
    }

    Err(AppError::device_unavailable(failures.len(), failures.join("; ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct NullStream(&'static str);

    #[async_trait]
    impl CaptureStream for NullStream {
        async fn grab_frame(&self) -> Result<DynamicImage> {
            Err(AppError::device("no frames"))
        }
        fn stop(&self) {}
        fn is_live(&self) -> bool {
            true
        }
        fn label(&self) -> String {
            self.0.to_string()
        }
    }

    /// Accepts only the listed constraints and records every request.
    struct PickyDevice {
        accepts: Vec<VideoConstraints>,
        requests: Mutex<Vec<VideoConstraints>>,
    }

    #[async_trait]
    impl CaptureDevice for PickyDevice {
        async fn open(&self, constraints: VideoConstraints) -> Result<Arc<dyn CaptureStream>> {
            self.requests.lock().push(constraints);
            if self.accepts.contains(&constraints) {
                Ok(Arc::new(NullStream("picky")))
            } else {
                Err(AppError::device("OverconstrainedError"))
            }
        }
    }

    fn device(accepts: Vec<VideoConstraints>) -> PickyDevice {
        PickyDevice {
            accepts,
            requests: Mutex::new(Vec::new()),
        }
    }

    #[tokio::test]
    async fn test_rear_camera_wins_first() {
        let device = device(FALLBACK_ORDER.to_vec());
        let acquired = acquire_with_fallback(&device).await.unwrap();
        assert_eq!(acquired.constraints, VideoConstraints::Exact(FacingMode::Environment));
        assert_eq!(device.requests.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_front_camera() {
        let device = device(vec![VideoConstraints::Exact(FacingMode::User), VideoConstraints::Any]);
        let acquired = acquire_with_fallback(&device).await.unwrap();
        assert_eq!(acquired.constraints, VideoConstraints::Exact(FacingMode::User));
        assert_eq!(
            *device.requests.lock(),
            vec![
                VideoConstraints::Exact(FacingMode::Environment),
                VideoConstraints::Exact(FacingMode::User),
            ]
        );
    }

    #[tokio::test]
    async fn test_unconstrained_is_last_resort() {
        let device = device(vec![VideoConstraints::Any]);
        let acquired = acquire_with_fallback(&device).await.unwrap();
        assert_eq!(acquired.constraints, VideoConstraints::Any);
        assert_eq!(*device.requests.lock(), FALLBACK_ORDER.to_vec());
    }

    #[tokio::test]
    async fn test_all_rejected_is_unavailable_after_one_pass() {
        let device = device(vec![]);
        let err = acquire_with_fallback(&device).await.unwrap_err();
        assert!(matches!(err, AppError::DeviceUnavailable { attempts: 3, .. }));
        assert_eq!(device.requests.lock().len(), 3);
    }
}
