pub mod calibration;
pub mod cluster;
pub mod engine;
pub mod headless;
pub mod layer;
pub mod raster;
pub mod symbology;

pub use calibration::*;
pub use cluster::*;
pub use engine::*;
pub use headless::HeadlessEngine;
pub use layer::*;
pub use raster::*;
pub use symbology::*;
