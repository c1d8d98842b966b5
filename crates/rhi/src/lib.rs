//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! Thin RAII wrappers over `ash`:
//! - Instance, physical device selection and logical device creation
//! - SPIR-V reflection and shader modules
//! - Buffers and images backed by `gpu-allocator`
//! - Render pass, swapchain and per-image framebuffers
//! - Graphics pipelines, command recording and synchronization primitives

mod error;

pub mod allocator;
pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod spirv;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

pub use ash::vk;
