pub mod generator;

pub use generator::{CouponQrConfig, CouponQrGenerator, CouponQrMode};
