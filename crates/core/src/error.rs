//! Error type shared by the non-GPU crates.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Window creation or event loop failures
    #[error("Window error: {0}")]
    Window(String),

    /// Presentation surface creation failures
    #[error("Surface error: {0}")]
    Surface(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration value could not be parsed
    #[error("Config error: {key}: {message}")]
    Config { key: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
