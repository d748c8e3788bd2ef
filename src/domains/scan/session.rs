use async_trait::async_trait;
use parking_lot::Mutex;
use shared::AppError;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::domains::camera::{acquire_with_fallback, CaptureDevice, CaptureStream};
use crate::processing::qr_detection::{FrameDecoder, ScanCanvas};

/// Lifecycle of a capture session.
///
/// `Idle → Acquiring → Scanning → Verifying → Idle`, with `Scanning` looping
/// on itself while no code is found and any state dropping to `Idle` on
/// close or acquisition failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Acquiring,
    Scanning,
    /// A code was decoded and its callback is running. No decoding happens.
    Verifying,
}

/// Camera widgets of the scan page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraPanel {
    pub start_visible: bool,
    pub guide_visible: bool,
    pub close_visible: bool,
    pub frame_visible: bool,
    /// Whether a stream is attached to the video surface
    pub video_attached: bool,
}

impl CameraPanel {
    pub fn idle() -> Self {
        Self {
            start_visible: true,
            guide_visible: true,
            close_visible: false,
            frame_visible: false,
            video_attached: false,
        }
    }

    pub fn live() -> Self {
        Self {
            start_visible: false,
            guide_visible: false,
            close_visible: true,
            frame_visible: true,
            video_attached: true,
        }
    }
}

impl Default for CameraPanel {
    fn default() -> Self {
        Self::idle()
    }
}

/// What to do with a decoded payload. The session calls it at most once per
/// start and tears itself down when it returns.
#[async_trait]
pub trait ScanHandler: Send + Sync {
    type Output: Send;

    async fn on_decoded(&self, token: &str) -> Self::Output;
}

#[derive(Debug)]
pub enum ScanOutcome<T> {
    /// A code was decoded and handed to the handler.
    Handled { token: String, output: T },
    /// The session was closed (or replaced) before a code was found.
    Cancelled,
    /// Every camera request was rejected. No stream was attached.
    Unavailable(AppError),
}

impl<T> ScanOutcome<T> {
    pub fn output(self) -> Option<T> {
        match self {
            ScanOutcome::Handled { output, .. } => Some(output),
            _ => None,
        }
    }
}

struct SessionInner {
    state: SessionState,
    /// One-shot guard, set before the handler runs and only reset by the
    /// next start.
    decoded: bool,
    stream: Option<Arc<dyn CaptureStream>>,
    panel: CameraPanel,
    /// Bumped on every start so a loop left over from a replaced session
    /// never keeps polling.
    generation: u64,
}

/// Camera acquisition plus the polling decode loop, shared by every page
/// that scans codes.
pub struct ScanSession<D, F> {
    device: Arc<D>,
    decoder: Arc<F>,
    canvas: ScanCanvas,
    retry_interval: Duration,
    inner: Arc<Mutex<SessionInner>>,
}

impl<D, F> Clone for ScanSession<D, F> {
    fn clone(&self) -> Self {
        Self {
            device: Arc::clone(&self.device),
            decoder: Arc::clone(&self.decoder),
            canvas: self.canvas,
            retry_interval: self.retry_interval,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D, F> ScanSession<D, F>
where
    D: CaptureDevice,
    F: FrameDecoder,
{
    pub fn new(device: Arc<D>, decoder: Arc<F>, canvas: ScanCanvas, retry_interval: Duration) -> Self {
        Self {
            device,
            decoder,
            canvas,
            retry_interval,
            inner: Arc::new(Mutex::new(SessionInner {
                state: SessionState::Idle,
                decoded: false,
                stream: None,
                panel: CameraPanel::idle(),
                generation: 0,
            })),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn panel(&self) -> CameraPanel {
        self.inner.lock().panel.clone()
    }

    pub fn has_stream(&self) -> bool {
        self.inner.lock().stream.is_some()
    }

    /// Starts a session and runs it to completion: acquire a camera, poll
    /// frames until a code decodes, hand it to `handler`, tear down.
    ///
    /// Any session already running is torn down first.
    #[instrument(skip(self, handler))]
    pub async fn run<H>(&self, handler: &H) -> ScanOutcome<H::Output>
    where
        H: ScanHandler + ?Sized,
    {
        self.close();

        let generation = {
            let mut inner = self.inner.lock();
            inner.generation += 1;
            inner.state = SessionState::Acquiring;
            inner.decoded = false;
            inner.generation
        };

        let acquired = match acquire_with_fallback(self.device.as_ref()).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!("❌ No camera could be started: {}", e);
                let mut inner = self.inner.lock();
                if inner.generation == generation {
                    inner.state = SessionState::Idle;
                }
                return ScanOutcome::Unavailable(e);
            }
        };
        let stream = acquired.stream;

        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != SessionState::Acquiring {
                // Closed while the device was opening
                stream.stop();
                return ScanOutcome::Cancelled;
            }
            inner.stream = Some(Arc::clone(&stream));
            inner.state = SessionState::Scanning;
            inner.panel = CameraPanel::live();
        }
        info!("🔍 Scanning with {}", stream.label());

        loop {
            if !self.is_current(generation, SessionState::Scanning) {
                debug!("⏹️ Scan loop {} stopped", generation);
                return ScanOutcome::Cancelled;
            }

            let token = match stream.grab_frame().await {
                Ok(frame) => {
                    let attempt = self.canvas.draw(&frame);
                    self.decoder.decode_attempt(&attempt)
                }
                Err(e) => {
                    if !stream.is_live() && self.is_current(generation, SessionState::Scanning) {
                        warn!("⚠️ Capture stream ended on its own: {}", e);
                        self.teardown_if_current(generation);
                        return ScanOutcome::Cancelled;
                    }
                    debug!("Frame grab failed: {}", e);
                    None
                }
            };

            let Some(token) = token else {
                debug!("No code in frame, retrying in {:?}", self.retry_interval);
                tokio::time::sleep(self.retry_interval).await;
                continue;
            };

            {
                let mut inner = self.inner.lock();
                if inner.generation != generation
                    || inner.state != SessionState::Scanning
                    || inner.decoded
                {
                    return ScanOutcome::Cancelled;
                }
                inner.decoded = true;
                inner.state = SessionState::Verifying;
            }
            info!("✅ Code decoded ({} chars)", token.len());

            let output = handler.on_decoded(&token).await;
            self.teardown_if_current(generation);
            return ScanOutcome::Handled { token, output };
        }
    }

    /// Stops the stream and restores the idle panel. No-op when idle.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        Self::teardown_locked(&mut inner);
    }

    /// Awaits `task` while listening for `interrupt`. An interrupt with the
    /// camera open closes it and keeps waiting for `task` to wind down; an
    /// interrupt with the camera idle abandons `task` and returns `None`.
    pub async fn until_interrupted<T, S, Fut>(&self, task: impl Future<Output = T>, mut interrupt: S) -> Option<T>
    where
        S: FnMut() -> Fut,
        Fut: Future<Output = std::io::Result<()>>,
    {
        tokio::pin!(task);
        loop {
            tokio::select! {
                output = &mut task => return Some(output),
                Ok(()) = interrupt() => {
                    if self.state() == SessionState::Idle {
                        info!("🛑 Interrupted with the camera off");
                        return None;
                    }
                    info!("🛑 Interrupted, closing camera");
                    self.close();
                }
            }
        }
    }

    fn teardown_if_current(&self, generation: u64) {
        let mut inner = self.inner.lock();
        if inner.generation == generation {
            Self::teardown_locked(&mut inner);
        }
    }

    fn teardown_locked(inner: &mut SessionInner) {
        if let Some(stream) = inner.stream.take() {
            stream.stop();
            info!("📷 Camera released ({})", stream.label());
        }
        inner.panel = CameraPanel::idle();
        inner.state = SessionState::Idle;
    }

    fn is_current(&self, generation: u64, state: SessionState) -> bool {
        let inner = self.inner.lock();
        inner.generation == generation && inner.state == state
    }
}
