//! Shared plumbing for the minivk crates.
//!
//! - Error type and result alias for window/config failures
//! - Logging bootstrap
//! - Frame timer
//! - Runtime configuration

mod config;
mod error;
mod logging;
mod timer;

pub use config::RendererConfig;
pub use error::{Error, Result};
pub use logging::init_logging;
pub use timer::FrameTimer;
