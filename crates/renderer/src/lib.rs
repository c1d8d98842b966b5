//! Frame orchestration.
//!
//! - Frame slots and the acquire/record/submit/present protocol
//! - Meshes and materials on the GPU
//! - Scene recording against a [`minivk_rhi::command::CommandRecorder`]
//! - [`Renderer`], which owns every Vulkan object for one window

pub mod draw;
mod error;
pub mod frame;
pub mod material;
pub mod mesh;
mod renderer;

pub use error::{RendererError, RendererResult};
pub use frame::{FrameLoop, FrameOutcome};
pub use renderer::Renderer;

/// Number of frames the CPU may record ahead of the GPU.
pub const FRAME_OVERLAP: usize = 2;
