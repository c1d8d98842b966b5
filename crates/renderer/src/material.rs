//! Materials: a shader program compiled into a pipeline and its layout.

use std::path::PathBuf;
use std::sync::Arc;

use ash::vk;
use tracing::info;

use minivk_core::RendererConfig;
use minivk_rhi::descriptor::DescriptorSetLayout;
use minivk_rhi::device::Device;
use minivk_rhi::pipeline::{GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use minivk_rhi::render_pass::RenderPass;
use minivk_rhi::shader::Shader;
use minivk_rhi::vertex::{MeshPushConstants, MeshVertex};
use minivk_rhi::RhiResult;

use crate::draw::DrawMaterial;

/// Which compiled shaders make up a program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderProgram {
    pub name: String,
    pub shaders: Vec<PathBuf>,
    /// Consumes the interleaved [`MeshVertex`] stream.
    pub vertex_input: bool,
}

impl ShaderProgram {
    /// The two programs the viewer switches between: vertex colors, and
    /// normals visualized as color.
    pub fn builtin(config: &RendererConfig) -> Vec<Self> {
        vec![
            Self {
                name: "colored".to_string(),
                shaders: vec![
                    config.shader_path("mesh.vert.spv"),
                    config.shader_path("colored.frag.spv"),
                ],
                vertex_input: true,
            },
            Self {
                name: "normal".to_string(),
                shaders: vec![
                    config.shader_path("mesh.vert.spv"),
                    config.shader_path("normal.frag.spv"),
                ],
                vertex_input: true,
            },
        ]
    }
}

/// Push constant ranges of every material layout. `record_scene` pushes the
/// mesh constants on each draw, so the range is always present.
pub fn push_constant_ranges() -> [vk::PushConstantRange; 1] {
    [MeshPushConstants::range()]
}

pub struct Material {
    name: String,
    vertex_input: bool,
    // Drop order: pipeline before the layouts and modules it was built from
    pipeline: Pipeline,
    layout: PipelineLayout,
    _set_layout: Option<DescriptorSetLayout>,
    shaders: Vec<Shader>,
    device: Arc<Device>,
}

impl Material {
    pub fn build(
        device: Arc<Device>,
        program: &ShaderProgram,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let shaders = program
            .shaders
            .iter()
            .map(|path| Shader::from_spirv_file(device.clone(), path))
            .collect::<RhiResult<Vec<_>>>()?;

        let shader_refs: Vec<&Shader> = shaders.iter().collect();
        let set_layout = DescriptorSetLayout::for_shaders(device.clone(), &shader_refs)?;

        let set_layouts: Vec<vk::DescriptorSetLayout> =
            set_layout.iter().map(|l| l.handle()).collect();
        let layout = PipelineLayout::new(device.clone(), &set_layouts, &push_constant_ranges())?;

        let pipeline = Self::build_pipeline(
            &device,
            &shaders,
            program.vertex_input,
            render_pass,
            extent,
            &layout,
        )?;

        info!(
            "Material '{}' ready ({} shader(s), {} descriptor binding(s))",
            program.name,
            shaders.len(),
            set_layout.as_ref().map_or(0, |l| l.binding_count())
        );

        Ok(Self {
            name: program.name.clone(),
            vertex_input: program.vertex_input,
            pipeline,
            layout,
            _set_layout: set_layout,
            shaders,
            device,
        })
    }

    /// Recreates the pipeline for a new extent. Viewport and scissor are
    /// baked in, so every resize needs this.
    pub fn rebuild(&mut self, render_pass: &RenderPass, extent: vk::Extent2D) -> RhiResult<()> {
        let pipeline = Self::build_pipeline(
            &self.device,
            &self.shaders,
            self.vertex_input,
            render_pass,
            extent,
            &self.layout,
        )?;
        // Old pipeline drops here; the caller has waited for the device
        self.pipeline = pipeline;
        info!(
            "Material '{}' rebuilt for {}x{}",
            self.name, extent.width, extent.height
        );
        Ok(())
    }

    fn build_pipeline(
        device: &Arc<Device>,
        shaders: &[Shader],
        vertex_input: bool,
        render_pass: &RenderPass,
        extent: vk::Extent2D,
        layout: &PipelineLayout,
    ) -> RhiResult<Pipeline> {
        let mut builder = GraphicsPipelineBuilder::new(render_pass, extent).depth_attachment(true);
        for shader in shaders {
            builder = builder.shader(shader);
        }
        if vertex_input {
            builder = builder.vertex_input(MeshVertex::description());
        }
        builder.build(device.clone(), layout)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn draw_material(&self) -> DrawMaterial {
        DrawMaterial {
            pipeline: self.pipeline.handle(),
            layout: self.layout.handle(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_always_has_one_push_range() {
        let ranges = push_constant_ranges();
        assert_eq!(ranges.len(), 1);
        assert_eq!(ranges[0].stage_flags, vk::ShaderStageFlags::VERTEX);
        assert_eq!(ranges[0].offset, 0);
        assert_eq!(ranges[0].size, 80);
        let pushed = MeshPushConstants::new(glam::Mat4::IDENTITY);
        assert_eq!(ranges[0].size as usize, pushed.as_bytes().len());
    }

    #[test]
    fn test_builtin_programs() {
        let config = RendererConfig::default();
        let programs = ShaderProgram::builtin(&config);
        assert_eq!(programs.len(), 2);
        assert_eq!(programs[0].name, "colored");
        assert_eq!(programs[1].name, "normal");
        assert!(programs.iter().all(|p| p.vertex_input));
        assert_eq!(
            programs[1].shaders,
            vec![
                PathBuf::from("shaders/mesh.vert.spv"),
                PathBuf::from("shaders/normal.frag.spv"),
            ]
        );
    }
}
