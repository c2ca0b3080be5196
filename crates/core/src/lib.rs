//! Core utilities shared by every layer of the visualizer.
//!
//! This crate provides the pieces that do not touch the GPU:
//! - Error types and result aliases for window, configuration and IO failures
//! - Logging initialization
//! - Frame timing
//! - Startup configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::{PresentModePreference, RenderConfig};
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
