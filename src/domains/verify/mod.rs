pub mod client;
pub mod flow;
pub mod screen;

pub use client::{cookie_value, verify_endpoint, CouponVerifier, HttpCouponVerifier};
pub use flow::{ManualOutcome, VerificationFlow, VerifyOutcome};
pub use screen::{ErrorTarget, ResultAction, ResultPanel, VerifyScreen};
