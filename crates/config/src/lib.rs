//! Skyway - Configuration
//!
//! Configuration for the control tower read path. All fields have sensible
//! defaults - you only need to specify what you want to change.

mod error;
mod tower;

pub use error::{ConfigError, Result};
pub use tower::TowerConfig;
