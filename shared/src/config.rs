//! Configuration management for the scanner

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub scanner: ScannerConfig,
    pub qr: QrConfig,
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Origin of the coupon server, without trailing slash
    pub base_url: String,
    /// Raw cookie string, e.g. `csrftoken=...; sessionid=...`
    pub cookies: String,
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub retry_interval_ms: u64,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub camera_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrConfig {
    pub size: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: String,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup. `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let base_url = string("COUPON_BASE_URL", "http://localhost:8000")
            .trim_end_matches('/')
            .to_string();
        url::Url::parse(&base_url)?;

        Ok(Config {
            server: ServerConfig {
                base_url,
                cookies: string("COUPON_COOKIES", ""),
                request_timeout_seconds: parse_var(&lookup, "REQUEST_TIMEOUT_SECONDS", 30)?,
            },
            scanner: ScannerConfig {
                retry_interval_ms: parse_var(&lookup, "SCAN_RETRY_INTERVAL_MS", 500)?,
                canvas_width: parse_var(&lookup, "SCAN_CANVAS_WIDTH", 640)?,
                canvas_height: parse_var(&lookup, "SCAN_CANVAS_HEIGHT", 480)?,
                camera_dir: string("CAMERA_DIR", "camera"),
            },
            qr: QrConfig {
                size: parse_var(&lookup, "QR_SIZE", 200)?,
            },
            app: AppConfig {
                environment: string("ENVIRONMENT", "development"),
                log_level: string("RUST_LOG", "info"),
            },
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::configuration(format!("{} must be a number, got '{}'", key, raw))),
    }
}
