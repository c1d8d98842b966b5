//! Graphics pipeline construction.
//!
//! Every pipeline in the renderer shares one fixed-function configuration
//! ([`FixedFunctionState::default`]):
//!
//! | state | value |
//! |---|---|
//! | topology | triangle list |
//! | rasterization | fill, clockwise front face, no culling |
//! | multisample | 1 sample |
//! | color blend | disabled, RGBA write mask, logic op COPY |
//! | depth | test + write, LESS_OR_EQUAL (only with a depth attachment) |
//! | viewport / scissor | static, full swapchain extent |
//!
//! Because viewport and scissor are baked in, pipelines must be rebuilt when
//! the swapchain extent changes.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use ash::vk;
//! use minivk_rhi::device::Device;
//! use minivk_rhi::pipeline::{GraphicsPipelineBuilder, PipelineLayout};
//! use minivk_rhi::render_pass::RenderPass;
//! use minivk_rhi::shader::Shader;
//! use minivk_rhi::vertex::{MeshPushConstants, MeshVertex};
//!
//! # fn example(device: Arc<Device>, render_pass: &RenderPass, extent: vk::Extent2D) -> Result<(), minivk_rhi::RhiError> {
//! let vertex = Shader::from_spirv_file(device.clone(), Path::new("shaders/mesh.vert.spv"))?;
//! let fragment = Shader::from_spirv_file(device.clone(), Path::new("shaders/colored.frag.spv"))?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[MeshPushConstants::range()])?;
//!
//! let pipeline = GraphicsPipelineBuilder::new(render_pass, extent)
//!     .shader(&vertex)
//!     .shader(&fragment)
//!     .vertex_input(MeshVertex::description())
//!     .build(device, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::{Shader, ShaderStage};
use crate::vertex::VertexInputDescription;

pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        debug!("Graphics pipeline destroyed");
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    #[default]
    TriangleList,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    #[default]
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Depth comparison operation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompareOp {
    Less,
    #[default]
    LessOrEqual,
    Always,
}

impl CompareOp {
    pub fn to_vk(self) -> vk::CompareOp {
        match self {
            CompareOp::Less => vk::CompareOp::LESS,
            CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
            CompareOp::Always => vk::CompareOp::ALWAYS,
        }
    }
}

/// The fixed-function configuration shared by every pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedFunctionState {
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub samples: vk::SampleCountFlags,
    pub depth_compare_op: CompareOp,
    pub color_write_mask: vk::ColorComponentFlags,
    pub logic_op: vk::LogicOp,
}

impl Default for FixedFunctionState {
    fn default() -> Self {
        Self {
            topology: PrimitiveTopology::TriangleList,
            polygon_mode: PolygonMode::Fill,
            cull_mode: CullMode::None,
            front_face: FrontFace::Clockwise,
            samples: vk::SampleCountFlags::TYPE_1,
            depth_compare_op: CompareOp::LessOrEqual,
            color_write_mask: vk::ColorComponentFlags::RGBA,
            logic_op: vk::LogicOp::COPY,
        }
    }
}

impl FixedFunctionState {
    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(self.color_write_mask)
    }

    fn depth_stencil(&self, has_depth: bool) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth)
            .depth_write_enable(has_depth)
            .depth_compare_op(if has_depth {
                self.depth_compare_op.to_vk()
            } else {
                vk::CompareOp::ALWAYS
            })
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false)
    }
}

/// Full-extent viewport with the standard 0..1 depth range.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Full-extent scissor rectangle.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Builds a pipeline for subpass 0 of a [`RenderPass`].
pub struct GraphicsPipelineBuilder<'a> {
    render_pass: &'a RenderPass,
    extent: vk::Extent2D,
    shaders: Vec<&'a Shader>,
    vertex_input: Option<VertexInputDescription>,
    depth_attachment: bool,
    state: FixedFunctionState,
}

impl<'a> GraphicsPipelineBuilder<'a> {
    pub fn new(render_pass: &'a RenderPass, extent: vk::Extent2D) -> Self {
        Self {
            render_pass,
            extent,
            shaders: Vec::new(),
            vertex_input: None,
            depth_attachment: true,
            state: FixedFunctionState::default(),
        }
    }

    /// Adds a stage. The stage comes from the shader's own reflection.
    pub fn shader(mut self, shader: &'a Shader) -> Self {
        self.shaders.push(shader);
        self
    }

    /// Consumes an interleaved vertex stream with this layout. Without it
    /// the pipeline has no vertex input and shaders generate positions.
    pub fn vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_input = Some(description);
        self
    }

    /// Whether depth testing is enabled. Defaults to true.
    pub fn depth_attachment(mut self, enabled: bool) -> Self {
        self.depth_attachment = enabled;
        self
    }

    /// Checks the shader stage set.
    ///
    /// # Errors
    ///
    /// A vertex stage is required, compute stages are rejected and each
    /// stage may appear only once.
    fn validate_stages(&self) -> RhiResult<()> {
        let stages: Vec<ShaderStage> = self.shaders.iter().map(|s| s.stage()).collect();
        validate_stage_set(&stages)
    }

    pub fn build(self, device: Arc<Device>, layout: &PipelineLayout) -> RhiResult<Pipeline> {
        self.validate_stages()?;

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> =
            self.shaders.iter().map(|s| s.stage_create_info()).collect();

        let (bindings, attributes) = match &self.vertex_input {
            Some(desc) => (desc.bindings.as_slice(), desc.attributes.as_slice()),
            None => (&[][..], &[][..]),
        };
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(bindings)
            .vertex_attribute_descriptions(attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.state.topology.to_vk())
            .primitive_restart_enable(false);

        let viewports = [full_viewport(self.extent)];
        let scissors = [full_scissor(self.extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.state.polygon_mode.to_vk())
            .line_width(1.0)
            .cull_mode(self.state.cull_mode.to_vk())
            .front_face(self.state.front_face.to_vk())
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.state.samples)
            .min_sample_shading(1.0);

        let depth_stencil_state = self.state.depth_stencil(self.depth_attachment);

        let color_blend_attachments = [self.state.color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(self.state.logic_op)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .layout(layout.handle())
            .render_pass(self.render_pass.handle())
            .subpass(0);

        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };
        let pipeline = pipeline.into_iter().next().ok_or_else(|| {
            RhiError::PipelineError("Driver returned no pipeline".to_string())
        })?;

        info!(
            "Graphics pipeline created ({} stage(s), {}x{}, vertex input: {})",
            self.shaders.len(),
            self.extent.width,
            self.extent.height,
            self.vertex_input.is_some()
        );

        Ok(Pipeline { device, pipeline })
    }
}

fn validate_stage_set(stages: &[ShaderStage]) -> RhiResult<()> {
    if stages.contains(&ShaderStage::Compute) {
        return Err(RhiError::PipelineError(
            "Compute shaders cannot be part of a graphics pipeline".to_string(),
        ));
    }
    if !stages.contains(&ShaderStage::Vertex) {
        return Err(RhiError::PipelineError(
            "Vertex shader is required".to_string(),
        ));
    }
    for (i, stage) in stages.iter().enumerate() {
        if stages[..i].contains(stage) {
            return Err(RhiError::PipelineError(format!(
                "Duplicate {} stage",
                stage
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_state_defaults() {
        let state = FixedFunctionState::default();
        assert_eq!(state.topology.to_vk(), vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(state.polygon_mode.to_vk(), vk::PolygonMode::FILL);
        assert_eq!(state.cull_mode.to_vk(), vk::CullModeFlags::NONE);
        assert_eq!(state.front_face.to_vk(), vk::FrontFace::CLOCKWISE);
        assert_eq!(state.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(state.logic_op, vk::LogicOp::COPY);
    }

    #[test]
    fn test_color_blend_disabled_with_full_mask() {
        let attachment = FixedFunctionState::default().color_blend_attachment();
        assert_eq!(attachment.blend_enable, vk::FALSE);
        assert_eq!(attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
    }

    #[test]
    fn test_depth_state_with_attachment() {
        let depth = FixedFunctionState::default().depth_stencil(true);
        assert_eq!(depth.depth_test_enable, vk::TRUE);
        assert_eq!(depth.depth_write_enable, vk::TRUE);
        assert_eq!(depth.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(depth.stencil_test_enable, vk::FALSE);
    }

    #[test]
    fn test_depth_state_without_attachment() {
        let depth = FixedFunctionState::default().depth_stencil(false);
        assert_eq!(depth.depth_test_enable, vk::FALSE);
        assert_eq!(depth.depth_write_enable, vk::FALSE);
        assert_eq!(depth.depth_compare_op, vk::CompareOp::ALWAYS);
    }

    #[test]
    fn test_viewport_and_scissor_cover_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let viewport = full_viewport(extent);
        assert_eq!((viewport.x, viewport.y), (0.0, 0.0));
        assert_eq!((viewport.width, viewport.height), (1280.0, 720.0));
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));

        let scissor = full_scissor(extent);
        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent.width, 1280);
        assert_eq!(scissor.extent.height, 720);
    }

    #[test]
    fn test_stage_set_validation() {
        use ShaderStage::*;

        assert!(validate_stage_set(&[Vertex, Fragment]).is_ok());
        assert!(validate_stage_set(&[Vertex]).is_ok());
        assert!(validate_stage_set(&[Fragment]).is_err());
        assert!(validate_stage_set(&[Vertex, Vertex]).is_err());
        assert!(validate_stage_set(&[Vertex, Compute]).is_err());
    }

    #[test]
    fn test_compare_op_to_vk() {
        assert_eq!(CompareOp::Less.to_vk(), vk::CompareOp::LESS);
        assert_eq!(CompareOp::LessOrEqual.to_vk(), vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(CompareOp::Always.to_vk(), vk::CompareOp::ALWAYS);
    }
}
