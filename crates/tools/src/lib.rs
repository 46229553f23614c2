//! Offline inspection for site snapshots, asset paths and model files.

pub mod commands;
pub mod fetch;

pub use commands::*;
pub use fetch::FileFetcher;
