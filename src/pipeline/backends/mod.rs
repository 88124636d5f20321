pub mod math;
pub mod vision;

pub use math::MathOcrClient;
pub use vision::VisionLayoutClient;
