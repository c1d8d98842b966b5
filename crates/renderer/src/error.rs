//! Renderer error type.

use thiserror::Error;

use minivk_resources::ResourceError;
use minivk_rhi::RhiError;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    /// Window or surface failure from the platform layer
    #[error(transparent)]
    Platform(#[from] minivk_core::Error),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    #[error("Material index {index} out of range ({count} material(s))")]
    NoSuchMaterial { index: usize, count: usize },
}

pub type RendererResult<T> = std::result::Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_rhi_error_is_transparent() {
        let err = RendererError::from(RhiError::FenceTimeout(Duration::from_secs(1)));
        assert_eq!(err.to_string(), "Timed out after 1s waiting for the GPU");
    }

    #[test]
    fn test_material_index_message() {
        let err = RendererError::NoSuchMaterial { index: 3, count: 2 };
        assert_eq!(err.to_string(), "Material index 3 out of range (2 material(s))");
    }
}
