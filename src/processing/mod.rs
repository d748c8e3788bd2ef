pub mod qr_detection;
