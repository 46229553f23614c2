pub mod client;
pub mod facets;
pub mod features;
pub mod filter;
pub mod model;
pub mod overlay;
pub mod selection;
pub mod site;

pub use client::*;
pub use features::*;
pub use filter::*;
pub use model::*;
pub use overlay::*;
pub use selection::*;
pub use site::*;
pub use facets::Facets;
