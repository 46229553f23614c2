pub mod calibration;
pub mod config;
#[cfg(not(target_arch = "wasm32"))]
pub mod logging;
pub mod orchestrator;

pub use calibration::CalibrationSession;
pub use config::*;
pub use orchestrator::*;
