use async_trait::async_trait;
use image::DynamicImage;
use shared::{AppError, Result};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

use super::capture::{CaptureDevice, CaptureStream, FacingMode, VideoConstraints};

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Capture device backed by still frames on disk, for headless stations
/// and tests.
///
/// Layout under the root directory:
/// - `environment/` frames of the rear camera
/// - `user/` frames of the front camera
/// - frames directly in the root only show up for unconstrained requests
///
/// An exact request whose directory is missing or empty is rejected, the way
/// a platform camera rejects an unsatisfiable `facingMode`.
#[derive(Debug, Clone)]
pub struct FrameDirectoryDevice {
    root: PathBuf,
}

impl FrameDirectoryDevice {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn facing_dir(&self, mode: FacingMode) -> PathBuf {
        self.root.join(mode.as_str())
    }
}

#[async_trait]
impl CaptureDevice for FrameDirectoryDevice {
    async fn open(&self, constraints: VideoConstraints) -> Result<Arc<dyn CaptureStream>> {
        let frames = match constraints {
            VideoConstraints::Exact(mode) => list_frames(&self.facing_dir(mode)).await?,
            VideoConstraints::Any => {
                let mut frames = list_frames(&self.root).await.unwrap_or_default();
                for mode in [FacingMode::Environment, FacingMode::User] {
                    frames.extend(list_frames(&self.facing_dir(mode)).await.unwrap_or_default());
                }
                frames
            }
        };

        if frames.is_empty() {
            return Err(AppError::device(format!(
                "no frames satisfy '{}' under {}",
                constraints,
                self.root.display()
            )));
        }

        info!("🎞️ Opened frame directory stream with {} frames ({})", frames.len(), constraints);
        Ok(Arc::new(FrameDirectoryStream {
            label: format!("{} [{}]", self.root.display(), constraints),
            frames,
            cursor: AtomicUsize::new(0),
            live: AtomicBool::new(true),
        }))
    }
}

/// Sorted image files of one directory, not recursive.
async fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut frames = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_frame = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        if is_frame && entry.file_type().await?.is_file() {
            frames.push(path);
        }
    }

    frames.sort();
    Ok(frames)
}

/// Loops over its frames until stopped.
pub struct FrameDirectoryStream {
    label: String,
    frames: Vec<PathBuf>,
    cursor: AtomicUsize,
    live: AtomicBool,
}

#[async_trait]
impl CaptureStream for FrameDirectoryStream {
    async fn grab_frame(&self) -> Result<DynamicImage> {
        if !self.is_live() {
            return Err(AppError::device("stream has been stopped"));
        }

        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % self.frames.len();
        let path = &self.frames[index];
        debug!("🎞️ Frame {} <- {}", index, path.display());

        let bytes = tokio::fs::read(path).await?;
        Ok(image::load_from_memory(&bytes)?)
    }

    fn stop(&self) {
        if self.live.swap(false, Ordering::SeqCst) {
            debug!("⏹️ Stopped {}", self.label);
        }
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn label(&self) -> String {
        self.label.clone()
    }
}
