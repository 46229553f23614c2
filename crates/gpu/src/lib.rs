pub mod anchor;
pub mod context;
pub mod model_renderer;
pub mod renderer;

pub use anchor::*;
pub use context::*;
pub use model_renderer::*;
pub use renderer::*;
