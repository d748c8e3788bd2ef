//! Shared library for the coupon scanner
//!
//! This library contains common functionality used by the scanner crate:
//! - Error types
//! - Environment configuration
//! - Verification wire types
//! - HTTP client for the coupon server

pub mod config;
pub mod error;
pub mod service_client;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{AppError, Result};
pub use service_client::ServiceClient;
pub use types::*;
