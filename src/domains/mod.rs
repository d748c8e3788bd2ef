pub mod camera;
pub mod qr;
pub mod scan;
pub mod verify;
