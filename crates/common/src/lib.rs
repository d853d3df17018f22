pub mod camera;
pub mod describe;
pub mod frame_extractor;
pub mod keywords;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
