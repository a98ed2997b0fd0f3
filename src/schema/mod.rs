//! Schema module - Configuration and theme types for the racing simulation.

mod config;
mod evolution;
mod theme;

pub use config::*;
pub use evolution::*;
pub use theme::*;
