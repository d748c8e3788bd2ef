//! Coupon verification station: camera QR scanning, manual code entry and
//! coupon QR generation against the coupon server.

pub mod domains;
pub mod processing;
pub mod state;

pub use state::{AppState, StationFlow, StationSession};
