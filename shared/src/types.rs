//! Common types for coupon verification

use serde::{Deserialize, Serialize};

/// Message shown when the server rejects a code without saying why.
pub const GENERIC_REJECTION: &str = "This coupon could not be verified";

/// How the token reached us. Selects the endpoint on the coupon server.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerifyKind {
    #[serde(rename = "uuid")]
    Qr,
    #[serde(rename = "manual")]
    Manual,
}

impl VerifyKind {
    pub fn path_segment(&self) -> &'static str {
        match self {
            VerifyKind::Qr => "uuid",
            VerifyKind::Manual => "manual",
        }
    }
}

impl std::fmt::Display for VerifyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerifyKind::Qr => write!(f, "qr"),
            VerifyKind::Manual => write!(f, "manual"),
        }
    }
}

/// Raw body returned by `/coupon/api/verify/{uuid|manual}/{token}/`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VerifyResponse {
    #[serde(default)]
    pub success: bool,
    pub target_product: Option<String>,
    pub discount: Option<String>,
    pub error: Option<String>,
    pub coupon_code: Option<String>,
}

/// Outcome of one verification call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationResult {
    Success {
        target_product: String,
        discount: String,
    },
    Failure {
        error: String,
    },
}

impl VerificationResult {
    /// Interprets a decoded body. A success needs a 2xx status, `success:
    /// true` and both display fields.
    pub fn from_response(status_ok: bool, response: VerifyResponse) -> Self {
        match response {
            VerifyResponse {
                success: true,
                target_product: Some(target_product),
                discount: Some(discount),
                ..
            } if status_ok => VerificationResult::Success {
                target_product,
                discount,
            },
            VerifyResponse { error, .. } => VerificationResult::Failure {
                error: error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| GENERIC_REJECTION.to_string()),
            },
        }
    }
}
