//! Scene recording.
//!
//! Everything here talks to a [`CommandRecorder`], never to a device, so the
//! exact command stream of a frame can be checked without a GPU.

use ash::vk;
use glam::Mat4;

use minivk_rhi::command::CommandRecorder;
use minivk_rhi::vertex::MeshPushConstants;

/// Frames per radian of the clear color's blue pulse.
const FLASH_PERIOD_FRAMES: f32 = 120.0;

/// A pipeline and the layout its push constants go through.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawMaterial {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// A vertex buffer holding `vertex_count` vertices.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawMesh {
    pub buffer: vk::Buffer,
    pub vertex_count: u32,
}

/// Render target and transforms for one recorded frame.
#[derive(Clone, Copy, Debug)]
pub struct FrameTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub frame_number: u64,
}

/// `(0, 0, |sin(frame / 120)|, 1)`
pub fn flash_clear_color(frame_number: u64) -> [f32; 4] {
    let flash = (frame_number as f32 / FLASH_PERIOD_FRAMES).sin().abs();
    [0.0, 0.0, flash, 1.0]
}

/// Color clear followed by the depth clear to 1.0.
pub fn clear_values(frame_number: u64) -> [vk::ClearValue; 2] {
    [
        vk::ClearValue {
            color: vk::ClearColorValue {
                float32: flash_clear_color(frame_number),
            },
        },
        vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        },
    ]
}

/// Records one render pass drawing every mesh with every material.
///
/// `mvp` is the full projection * view * model matrix pushed with each draw.
pub fn record_scene<R: CommandRecorder + ?Sized>(
    recorder: &mut R,
    target: &FrameTarget,
    materials: &[DrawMaterial],
    meshes: &[DrawMesh],
    mvp: Mat4,
) {
    let clear = clear_values(target.frame_number);
    recorder.begin_render_pass(
        target.render_pass,
        target.framebuffer,
        target.extent,
        &clear,
    );

    let constants = MeshPushConstants::new(mvp);
    for material in materials {
        for mesh in meshes {
            recorder.bind_graphics_pipeline(material.pipeline);
            recorder.bind_vertex_buffer(mesh.buffer, 0);
            recorder.push_constants(
                material.layout,
                vk::ShaderStageFlags::VERTEX,
                constants.as_bytes(),
            );
            recorder.draw(mesh.vertex_count, 1, 0, 0);
        }
    }

    recorder.end_render_pass();
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[derive(Debug, Clone, PartialEq)]
    enum Command {
        BeginRenderPass {
            framebuffer: u64,
            extent: (u32, u32),
            clear_color: [f32; 4],
            clear_depth: f32,
        },
        BindPipeline(u64),
        BindVertexBuffer(u64, vk::DeviceSize),
        PushConstants {
            layout: u64,
            stages: vk::ShaderStageFlags,
            data: Vec<u8>,
        },
        Draw(u32, u32, u32, u32),
        EndRenderPass,
    }

    #[derive(Default)]
    struct Recording(Vec<Command>);

    impl CommandRecorder for Recording {
        fn begin_render_pass(
            &mut self,
            _: vk::RenderPass,
            framebuffer: vk::Framebuffer,
            extent: vk::Extent2D,
            clear_values: &[vk::ClearValue],
        ) {
            // SAFETY: record_scene writes color then depth
            let (clear_color, clear_depth) = unsafe {
                (
                    clear_values[0].color.float32,
                    clear_values[1].depth_stencil.depth,
                )
            };
            self.0.push(Command::BeginRenderPass {
                framebuffer: framebuffer.as_raw(),
                extent: (extent.width, extent.height),
                clear_color,
                clear_depth,
            });
        }

        fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
            self.0.push(Command::BindPipeline(pipeline.as_raw()));
        }

        fn bind_vertex_buffer(&mut self, buffer: vk::Buffer, offset: vk::DeviceSize) {
            self.0.push(Command::BindVertexBuffer(buffer.as_raw(), offset));
        }

        fn push_constants(
            &mut self,
            layout: vk::PipelineLayout,
            stages: vk::ShaderStageFlags,
            data: &[u8],
        ) {
            self.0.push(Command::PushConstants {
                layout: layout.as_raw(),
                stages,
                data: data.to_vec(),
            });
        }

        fn draw(&mut self, a: u32, b: u32, c: u32, d: u32) {
            self.0.push(Command::Draw(a, b, c, d));
        }

        fn end_render_pass(&mut self) {
            self.0.push(Command::EndRenderPass);
        }
    }

    fn target(frame_number: u64) -> FrameTarget {
        FrameTarget {
            render_pass: vk::RenderPass::from_raw(1),
            framebuffer: vk::Framebuffer::from_raw(2),
            extent: vk::Extent2D {
                width: 800,
                height: 600,
            },
            frame_number,
        }
    }

    fn material(raw: u64) -> DrawMaterial {
        DrawMaterial {
            pipeline: vk::Pipeline::from_raw(raw),
            layout: vk::PipelineLayout::from_raw(raw + 100),
        }
    }

    fn mesh(raw: u64, vertex_count: u32) -> DrawMesh {
        DrawMesh {
            buffer: vk::Buffer::from_raw(raw),
            vertex_count,
        }
    }

    #[test]
    fn test_single_triangle_draw() {
        let mut recording = Recording::default();
        let mvp = Mat4::from_translation(glam::Vec3::new(1.0, 2.0, 3.0));
        record_scene(
            &mut recording,
            &target(0),
            &[material(10)],
            &[mesh(20, 3)],
            mvp,
        );

        let expected_constants = MeshPushConstants::new(mvp).as_bytes().to_vec();
        assert_eq!(
            recording.0,
            vec![
                Command::BeginRenderPass {
                    framebuffer: 2,
                    extent: (800, 600),
                    clear_color: [0.0, 0.0, 0.0, 1.0],
                    clear_depth: 1.0,
                },
                Command::BindPipeline(10),
                Command::BindVertexBuffer(20, 0),
                Command::PushConstants {
                    layout: 110,
                    stages: vk::ShaderStageFlags::VERTEX,
                    data: expected_constants,
                },
                Command::Draw(3, 1, 0, 0),
                Command::EndRenderPass,
            ]
        );
    }

    #[test]
    fn test_materials_outer_meshes_inner() {
        let mut recording = Recording::default();
        record_scene(
            &mut recording,
            &target(0),
            &[material(10), material(11)],
            &[mesh(20, 3), mesh(21, 36)],
            Mat4::IDENTITY,
        );

        let order: Vec<(u64, u32)> = recording
            .0
            .windows(4)
            .filter_map(|w| match (&w[0], &w[3]) {
                (Command::BindPipeline(p), Command::Draw(n, ..)) => Some((*p, *n)),
                _ => None,
            })
            .collect();
        assert_eq!(order, vec![(10, 3), (10, 36), (11, 3), (11, 36)]);
    }

    #[test]
    fn test_push_constants_are_80_bytes() {
        let mut recording = Recording::default();
        record_scene(
            &mut recording,
            &target(0),
            &[material(10)],
            &[mesh(20, 3)],
            Mat4::IDENTITY,
        );
        let pushed = recording.0.iter().find_map(|c| match c {
            Command::PushConstants { data, .. } => Some(data.len()),
            _ => None,
        });
        assert_eq!(pushed, Some(80));
    }

    #[test]
    fn test_empty_scene_still_clears() {
        let mut recording = Recording::default();
        record_scene(&mut recording, &target(5), &[], &[], Mat4::IDENTITY);
        assert_eq!(recording.0.len(), 2);
        assert!(matches!(recording.0[0], Command::BeginRenderPass { .. }));
        assert_eq!(recording.0[1], Command::EndRenderPass);
    }

    #[test]
    fn test_flash_clear_color() {
        assert_eq!(flash_clear_color(0), [0.0, 0.0, 0.0, 1.0]);

        let quarter = (120.0 * std::f32::consts::FRAC_PI_2) as u64;
        assert!((flash_clear_color(quarter)[2] - 1.0).abs() < 1e-3);

        // Absolute value keeps the pulse non-negative past pi
        let past_pi = (120.0 * 4.0) as u64;
        assert!(flash_clear_color(past_pi)[2] >= 0.0);
        assert!((flash_clear_color(past_pi)[2] - 4.0f32.sin().abs()).abs() < 1e-6);
    }

    #[test]
    fn test_clear_depth_is_one() {
        let values = clear_values(42);
        let depth = unsafe { values[1].depth_stencil };
        assert_eq!(depth.depth, 1.0);
        assert_eq!(depth.stencil, 0);
    }
}
