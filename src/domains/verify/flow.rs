use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{VerificationResult, VerifyKind};
use std::sync::Arc;
use tracing::{error, info, instrument};

use super::client::CouponVerifier;
use super::screen::{
    ErrorTarget, ResultAction, VerifyScreen, CAMERA_UNAVAILABLE, COMMUNICATION_ERROR,
    ENTER_CODE_PROMPT,
};
use crate::domains::camera::CaptureDevice;
use crate::domains::scan::{ScanHandler, ScanOutcome, ScanSession, SessionState};
use crate::processing::qr_detection::FrameDecoder;

/// What a verification dispatch ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifyOutcome {
    Verified {
        target_product: String,
        discount: String,
    },
    Rejected(String),
    CommunicationError,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManualOutcome {
    /// Nothing but whitespace was entered; no request was made.
    EmptyCode,
    Dispatched(VerifyOutcome),
}

/// The verification page: camera scanning, manual entry and the result view,
/// all sharing one dispatch path.
pub struct VerificationFlow<D, F, V> {
    session: ScanSession<D, F>,
    verifier: Arc<V>,
    screen: Arc<Mutex<VerifyScreen>>,
}

impl<D, F, V> Clone for VerificationFlow<D, F, V> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            verifier: Arc::clone(&self.verifier),
            screen: Arc::clone(&self.screen),
        }
    }
}

impl<D, F, V> VerificationFlow<D, F, V>
where
    D: CaptureDevice,
    F: FrameDecoder,
    V: CouponVerifier,
{
    pub fn new(session: ScanSession<D, F>, verifier: Arc<V>) -> Self {
        Self {
            session,
            verifier,
            screen: Arc::new(Mutex::new(VerifyScreen::default())),
        }
    }

    /// Snapshot of the page including the camera panel.
    pub fn screen(&self) -> VerifyScreen {
        let mut screen = self.screen.lock().clone();
        screen.camera = self.session.panel();
        screen
    }

    pub fn state(&self) -> SessionState {
        self.session.state()
    }

    pub fn take_alert(&self) -> Option<String> {
        self.screen.lock().take_alert()
    }

    /// Starts the camera and verifies the first code it reads.
    #[instrument(skip(self))]
    pub async fn start_scan(&self) -> ScanOutcome<VerifyOutcome> {
        self.screen.lock().alert = None;

        let handler = QrDispatch {
            verifier: Arc::clone(&self.verifier),
            screen: Arc::clone(&self.screen),
        };
        let outcome = self.session.run(&handler).await;

        if let ScanOutcome::Unavailable(_) = &outcome {
            self.screen.lock().alert = Some(CAMERA_UNAVAILABLE.to_string());
        }
        outcome
    }

    /// "Verify next" after a scanned coupon: reset the page and scan again.
    pub async fn continue_scanning(&self) -> ScanOutcome<VerifyOutcome> {
        self.session.close();
        self.screen.lock().reset();
        self.start_scan().await
    }

    /// "Finish": reset the page and leave the camera off.
    pub fn end(&self) {
        self.session.close();
        self.screen.lock().reset();
    }

    /// Close button on the camera frame.
    pub fn close_camera(&self) {
        self.session.close();
    }

    /// Runs one of the follow-ups offered under a result. Only `Continue`
    /// starts a new scan.
    pub async fn perform(&self, action: ResultAction) -> Option<ScanOutcome<VerifyOutcome>> {
        match action {
            ResultAction::Continue => Some(self.continue_scanning().await),
            ResultAction::End | ResultAction::Next => {
                self.end();
                None
            }
        }
    }

    /// Verifies a typed code. Stops the camera first.
    #[instrument(skip(self, input))]
    pub async fn submit_manual(&self, input: &str) -> ManualOutcome {
        self.session.close();

        let code = input.trim();
        if code.is_empty() {
            self.screen.lock().show_error(ErrorTarget::Manual, ENTER_CODE_PROMPT);
            return ManualOutcome::EmptyCode;
        }

        ManualOutcome::Dispatched(
            dispatch(self.verifier.as_ref(), &self.screen, VerifyKind::Manual, code).await,
        )
    }
}

/// Scan callback of the verification page.
struct QrDispatch<V> {
    verifier: Arc<V>,
    screen: Arc<Mutex<VerifyScreen>>,
}

#[async_trait]
impl<V> ScanHandler for QrDispatch<V>
where
    V: CouponVerifier,
{
    type Output = VerifyOutcome;

    async fn on_decoded(&self, token: &str) -> VerifyOutcome {
        dispatch(self.verifier.as_ref(), &self.screen, VerifyKind::Qr, token).await
    }
}

/// Sends the token and renders the answer into the screen.
async fn dispatch<V>(verifier: &V, screen: &Mutex<VerifyScreen>, kind: VerifyKind, token: &str) -> VerifyOutcome
where
    V: CouponVerifier + ?Sized,
{
    info!("📨 Verifying {} token", kind);
    let outcome = match verifier.verify(kind, token).await {
        Ok(VerificationResult::Success {
            target_product,
            discount,
        }) => VerifyOutcome::Verified {
            target_product,
            discount,
        },
        Ok(VerificationResult::Failure { error }) => VerifyOutcome::Rejected(error),
        Err(e) => {
            error!("❌ Verification request failed ({}): {}", e.error_code(), e);
            VerifyOutcome::CommunicationError
        }
    };

    let target = match kind {
        VerifyKind::Qr => ErrorTarget::Qr,
        VerifyKind::Manual => ErrorTarget::Manual,
    };
    let mut screen = screen.lock();
    match &outcome {
        VerifyOutcome::Verified {
            target_product,
            discount,
        } => {
            let actions = match kind {
                VerifyKind::Qr => vec![ResultAction::Continue, ResultAction::End],
                VerifyKind::Manual => vec![ResultAction::Next],
            };
            screen.show_result(target_product, discount, actions);
        }
        VerifyOutcome::Rejected(message) => screen.show_error(target, message),
        VerifyOutcome::CommunicationError => screen.show_error(target, COMMUNICATION_ERROR),
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::camera::{CaptureStream, VideoConstraints};
    use crate::domains::scan::CameraPanel;
    use crate::processing::qr_detection::ScanCanvas;
    use image::DynamicImage;
    use shared::{AppError, Result};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct StillStream {
        live: AtomicBool,
    }

    #[async_trait]
    impl CaptureStream for StillStream {
        async fn grab_frame(&self) -> Result<DynamicImage> {
            Ok(DynamicImage::new_rgba8(4, 4))
        }
        fn stop(&self) {
            self.live.store(false, Ordering::SeqCst);
        }
        fn is_live(&self) -> bool {
            self.live.load(Ordering::SeqCst)
        }
        fn label(&self) -> String {
            "still".to_string()
        }
    }

    /// Opens only unconstrained requests, after `open_delay`.
    struct SlowDevice {
        open_delay: Duration,
        streams: Mutex<Vec<Arc<StillStream>>>,
    }

    #[async_trait]
    impl CaptureDevice for SlowDevice {
        async fn open(&self, constraints: VideoConstraints) -> Result<Arc<dyn CaptureStream>> {
            if constraints != VideoConstraints::Any {
                return Err(AppError::device("OverconstrainedError"));
            }
            tokio::time::sleep(self.open_delay).await;
            let stream = Arc::new(StillStream {
                live: AtomicBool::new(true),
            });
            self.streams.lock().push(Arc::clone(&stream));
            Ok(stream)
        }
    }

    struct AlwaysDecodes(&'static str);

    impl FrameDecoder for AlwaysDecodes {
        fn decode(&self, _data: &[u8], _width: u32, _height: u32) -> Option<String> {
            Some(self.0.to_string())
        }
    }

    struct FakeVerifier {
        answer: Result<VerificationResult>,
        calls: AtomicUsize,
        seen: Mutex<Vec<(VerifyKind, String)>>,
    }

    impl FakeVerifier {
        fn answering(answer: Result<VerificationResult>) -> Arc<Self> {
            Arc::new(Self {
                answer,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CouponVerifier for FakeVerifier {
        async fn verify(&self, kind: VerifyKind, token: &str) -> Result<VerificationResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().push((kind, token.to_string()));
            match &self.answer {
                Ok(result) => Ok(result.clone()),
                Err(_) => Err(AppError::service_unavailable("coupon-server")),
            }
        }
    }

    fn flow(
        open_delay: Duration,
        verifier: Arc<FakeVerifier>,
    ) -> (VerificationFlow<SlowDevice, AlwaysDecodes, FakeVerifier>, Arc<SlowDevice>) {
        let device = Arc::new(SlowDevice {
            open_delay,
            streams: Mutex::new(Vec::new()),
        });
        let session = ScanSession::new(
            Arc::clone(&device),
            Arc::new(AlwaysDecodes("0b7e6d1c-2f3a-4b5c-8d9e-a1b2c3d4e5f6")),
            ScanCanvas::new(8, 8),
            Duration::from_millis(500),
        );
        (VerificationFlow::new(session, verifier), device)
    }

    fn success() -> Result<VerificationResult> {
        Ok(VerificationResult::Success {
            target_product: "Matcha latte".to_string(),
            discount: "Free size upgrade".to_string(),
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_scanned_success_offers_continue_and_end() {
        let verifier = FakeVerifier::answering(success());
        let (flow, device) = flow(Duration::ZERO, Arc::clone(&verifier));

        let outcome = flow.start_scan().await;

        assert_eq!(
            outcome.output(),
            Some(VerifyOutcome::Verified {
                target_product: "Matcha latte".to_string(),
                discount: "Free size upgrade".to_string(),
            })
        );
        let screen = flow.screen();
        let result = screen.result.expect("result panel shown");
        assert_eq!(result.target_product, "Matcha latte");
        assert_eq!(result.discount, "Free size upgrade");
        assert_eq!(result.actions, vec![ResultAction::Continue, ResultAction::End]);
        assert_eq!(screen.camera, CameraPanel::idle());
        assert!(!device.streams.lock()[0].is_live());
        assert_eq!(
            *verifier.seen.lock(),
            vec![(VerifyKind::Qr, "0b7e6d1c-2f3a-4b5c-8d9e-a1b2c3d4e5f6".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_continue_reenters_acquiring() {
        let verifier = FakeVerifier::answering(success());
        let (flow, _device) = flow(Duration::from_millis(200), verifier);
        flow.start_scan().await;

        let task = {
            let flow = flow.clone();
            tokio::spawn(async move { flow.perform(ResultAction::Continue).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(flow.state(), SessionState::Acquiring);
        assert_eq!(flow.screen().result, None, "page reset before re-acquiring");

        let outcome = task.await.unwrap();
        assert!(matches!(outcome, Some(ScanOutcome::Handled { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_shows_server_error_and_releases_camera() {
        let verifier = FakeVerifier::answering(Ok(VerificationResult::Failure {
            error: "This coupon has already been used".to_string(),
        }));
        let (flow, device) = flow(Duration::ZERO, verifier);

        let outcome = flow.start_scan().await;

        assert_eq!(
            outcome.output(),
            Some(VerifyOutcome::Rejected("This coupon has already been used".to_string()))
        );
        let screen = flow.screen();
        assert_eq!(screen.qr_error.as_deref(), Some("This coupon has already been used"));
        assert_eq!(screen.result, None);
        assert!(!device.streams.lock()[0].is_live());
        assert_eq!(flow.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failure_shows_communication_error() {
        let verifier = FakeVerifier::answering(Err(AppError::service_unavailable("coupon-server")));
        let (flow, _device) = flow(Duration::ZERO, verifier);

        let outcome = flow.start_scan().await;

        assert_eq!(outcome.output(), Some(VerifyOutcome::CommunicationError));
        assert_eq!(flow.screen().qr_error.as_deref(), Some(COMMUNICATION_ERROR));
    }

    #[tokio::test]
    async fn test_empty_manual_code_never_hits_network() {
        let verifier = FakeVerifier::answering(success());
        let (flow, _device) = flow(Duration::ZERO, Arc::clone(&verifier));

        let outcome = flow.submit_manual("   \t ").await;

        assert_eq!(outcome, ManualOutcome::EmptyCode);
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
        assert_eq!(flow.screen().manual_error.as_deref(), Some(ENTER_CODE_PROMPT));
    }

    #[tokio::test]
    async fn test_manual_code_is_trimmed_and_offers_next_only() {
        let verifier = FakeVerifier::answering(success());
        let (flow, _device) = flow(Duration::ZERO, Arc::clone(&verifier));

        flow.submit_manual("  A1B2C3 ").await;

        assert_eq!(*verifier.seen.lock(), vec![(VerifyKind::Manual, "A1B2C3".to_string())]);
        let result = flow.screen().result.expect("result panel shown");
        assert_eq!(result.actions, vec![ResultAction::Next]);

        flow.perform(ResultAction::Next).await;
        assert_eq!(flow.screen().result, None);
    }

    #[tokio::test]
    async fn test_unavailable_camera_raises_alert() {
        struct NoCamera;

        #[async_trait]
        impl CaptureDevice for NoCamera {
            async fn open(&self, _constraints: VideoConstraints) -> Result<Arc<dyn CaptureStream>> {
                Err(AppError::device("NotAllowedError"))
            }
        }

        let verifier = FakeVerifier::answering(success());
        let session = ScanSession::new(
            Arc::new(NoCamera),
            Arc::new(AlwaysDecodes("x")),
            ScanCanvas::new(8, 8),
            Duration::from_millis(500),
        );
        let flow = VerificationFlow::new(session, Arc::clone(&verifier));

        let outcome = flow.start_scan().await;

        assert!(matches!(outcome, ScanOutcome::Unavailable(_)));
        assert_eq!(flow.take_alert().as_deref(), Some(CAMERA_UNAVAILABLE));
        assert_eq!(flow.screen().camera, CameraPanel::idle());
        assert_eq!(verifier.calls.load(Ordering::SeqCst), 0);
    }
}
