//! RHI error type.

use thiserror::Error;

use crate::spirv::ReflectError;

#[derive(Error, Debug)]
pub enum RhiError {
    /// A Vulkan call failed; the payload prints as the decoded result name.
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// The Vulkan loader library could not be opened
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// The allocator mutex was poisoned by a panicking thread
    #[error("Allocator lock poisoned")]
    AllocatorPoisoned,

    #[error(transparent)]
    Reflection(#[from] ReflectError),

    #[error("No suitable GPU found")]
    NoSuitableGpu,

    #[error("Required extension not available: {0}")]
    MissingExtension(String),

    /// A fence did not signal within the configured timeout
    #[error("Timed out after {0:?} waiting for the GPU")]
    FenceTimeout(std::time::Duration),

    #[error("Shader error: {0}")]
    ShaderError(String),

    #[error("Surface error: {0}")]
    SurfaceError(String),

    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// A buffer was created, mapped or written with invalid parameters
    #[error("Buffer error: {0}")]
    BufferError(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_vulkan_error_is_decoded() {
        let err = RhiError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY);
        assert_eq!(err.to_string(), "Vulkan error: ERROR_OUT_OF_DEVICE_MEMORY");
    }

    #[test]
    fn test_reflection_error_is_transparent() {
        let err = RhiError::from(ReflectError::MissingEntryPoint);
        assert_eq!(err.to_string(), "module has no entry point");
    }

    #[test]
    fn test_buffer_error_names_subsystem() {
        let err = RhiError::BufferError("Buffer 'x' must not be empty".to_string());
        assert_eq!(err.to_string(), "Buffer error: Buffer 'x' must not be empty");
    }
}
