pub mod angle;
pub mod geodesy;
pub mod mat4;
pub mod projection;
pub mod vec;

pub use angle::*;
pub use geodesy::*;
pub use mat4::*;
pub use projection::*;
pub use vec::*;
