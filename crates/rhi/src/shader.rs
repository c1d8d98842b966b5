//! Shader module management.
//!
//! Shaders are loaded from compiled SPIR-V. The stage is never passed in by
//! the caller; it is read from the module's entry point by
//! [`crate::spirv::reflect`], together with the module's resource interface.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use minivk_rhi::device::Device;
//! use minivk_rhi::shader::{Shader, ShaderStage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), minivk_rhi::RhiError> {
//! let vertex = Shader::from_spirv_file(device.clone(), Path::new("shaders/mesh.vert.spv"))?;
//! assert_eq!(vertex.stage(), ShaderStage::Vertex);
//! let _stage_info = vertex.stage_create_info();
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;
use std::path::Path;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::spirv::{self, ShaderLayout};

const ENTRY_POINT: &CStr = c"main";

/// Pipeline stage a shader module executes in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    pub fn to_vk_stage(self) -> vk::ShaderStageFlags {
        match self {
            ShaderStage::Vertex => vk::ShaderStageFlags::VERTEX,
            ShaderStage::Fragment => vk::ShaderStageFlags::FRAGMENT,
            ShaderStage::Compute => vk::ShaderStageFlags::COMPUTE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShaderStage::Vertex => "vertex",
            ShaderStage::Fragment => "fragment",
            ShaderStage::Compute => "compute",
        }
    }
}

impl std::fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Converts raw SPIR-V bytes into little-endian words.
///
/// # Errors
///
/// Returns [`RhiError::ShaderError`] if the length is not a multiple of 4.
pub fn spirv_words(bytes: &[u8]) -> RhiResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(RhiError::ShaderError(format!(
            "SPIR-V code must be 4-byte aligned, got {} bytes",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

/// A `VkShaderModule` plus what reflection learned about it.
pub struct Shader {
    device: Arc<Device>,
    module: vk::ShaderModule,
    stage: ShaderStage,
    layout: ShaderLayout,
}

impl Shader {
    /// Reads, reflects and creates a shader module from a `.spv` file.
    ///
    /// # Errors
    ///
    /// Fails if the file cannot be read, the module does not reflect, or
    /// module creation fails.
    pub fn from_spirv_file(device: Arc<Device>, path: &Path) -> RhiResult<Self> {
        debug!("Loading shader from {:?}", path);

        let bytes = std::fs::read(path).map_err(|e| {
            RhiError::ShaderError(format!("Failed to read shader file {:?}: {}", path, e))
        })?;

        Self::from_spirv_bytes(device, &bytes).map_err(|e| match e {
            RhiError::Reflection(inner) => {
                RhiError::ShaderError(format!("{}: {}", path.display(), inner))
            }
            other => other,
        })
    }

    /// Creates a shader module from SPIR-V bytes, inferring the stage.
    pub fn from_spirv_bytes(device: Arc<Device>, bytes: &[u8]) -> RhiResult<Self> {
        let code = spirv_words(bytes)?;
        let reflection = spirv::reflect(&code)?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
        let module = unsafe { device.handle().create_shader_module(&create_info, None)? };

        info!(
            "Created {} shader module ({} resource binding(s), push constants: {})",
            reflection.stage,
            reflection.layout.resource_count(),
            reflection.layout.uses_push_constants
        );

        Ok(Self {
            device,
            module,
            stage: reflection.stage,
            layout: reflection.layout,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }

    #[inline]
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Resource interface discovered by reflection.
    #[inline]
    pub fn layout(&self) -> &ShaderLayout {
        &self.layout
    }

    /// Stage description for pipeline creation; borrows this shader.
    pub fn stage_create_info(&self) -> vk::PipelineShaderStageCreateInfo<'_> {
        vk::PipelineShaderStageCreateInfo::default()
            .stage(self.stage.to_vk_stage())
            .module(self.module)
            .name(ENTRY_POINT)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_shader_module(self.module, None);
        }
        debug!("Destroyed {} shader module", self.stage);
    }
}
