//! Project configuration (`.finvault.toml`).

pub mod settings;

pub use settings::{KdfAlgorithm, Settings};
