pub mod cache;
pub mod fetch;
pub mod load;
pub mod progress;

pub use cache::*;
pub use fetch::*;
pub use load::*;
pub use progress::*;
