pub mod demo;
pub mod session;

pub use demo::LogPayload;
pub use session::{CameraPanel, ScanHandler, ScanOutcome, ScanSession, SessionState};
