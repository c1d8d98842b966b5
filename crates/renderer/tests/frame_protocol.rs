//! Drives whole frames through the public frame protocol with a recording
//! backend and checks the command stream a frame produces.

use ash::vk::{self, Handle};
use glam::Mat4;

use minivk_renderer::draw::{DrawMaterial, DrawMesh, FrameTarget, record_scene};
use minivk_renderer::frame::{AcquireOutcome, FrameBackend};
use minivk_renderer::{FRAME_OVERLAP, FrameLoop, FrameOutcome};
use minivk_rhi::RhiResult;
use minivk_rhi::command::CommandRecorder;

#[derive(Debug, Default)]
struct Recorder {
    draws: Vec<(u32, u32, u32, u32)>,
    pipelines: Vec<vk::Pipeline>,
    pushed_bytes: Vec<usize>,
    passes: usize,
}

impl CommandRecorder for Recorder {
    fn begin_render_pass(
        &mut self,
        _: vk::RenderPass,
        _: vk::Framebuffer,
        _: vk::Extent2D,
        _: &[vk::ClearValue],
    ) {
        self.passes += 1;
    }
    fn bind_graphics_pipeline(&mut self, pipeline: vk::Pipeline) {
        self.pipelines.push(pipeline);
    }
    fn bind_vertex_buffer(&mut self, _: vk::Buffer, _: vk::DeviceSize) {}
    fn push_constants(&mut self, _: vk::PipelineLayout, _: vk::ShaderStageFlags, data: &[u8]) {
        self.pushed_bytes.push(data.len());
    }
    fn draw(&mut self, a: u32, b: u32, c: u32, d: u32) {
        self.draws.push((a, b, c, d));
    }
    fn end_render_pass(&mut self) {}
}

/// Every slot has its own recorder, as every frame context has its own
/// command buffer.
struct Backend {
    recorders: Vec<Recorder>,
    waits: Vec<usize>,
    out_of_date_once: bool,
}

impl Backend {
    fn new(slots: usize) -> Self {
        Self {
            recorders: (0..slots).map(|_| Recorder::default()).collect(),
            waits: Vec::new(),
            out_of_date_once: false,
        }
    }
}

impl FrameBackend for Backend {
    type Recorder = Recorder;

    fn slot_count(&self) -> usize {
        self.recorders.len()
    }
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.waits.push(slot);
        Ok(())
    }
    fn reset_slot_fence(&mut self, _: usize) -> RhiResult<()> {
        Ok(())
    }
    fn rearm_slot_fence(&mut self, _: usize, _: bool) -> RhiResult<()> {
        Ok(())
    }
    fn acquire_image(&mut self, _: usize) -> RhiResult<AcquireOutcome> {
        if std::mem::take(&mut self.out_of_date_once) {
            return Ok(AcquireOutcome::OutOfDate);
        }
        Ok(AcquireOutcome::Image {
            index: 0,
            suboptimal: false,
        })
    }
    fn begin_commands(&mut self, slot: usize) -> RhiResult<&mut Recorder> {
        let recorder = &mut self.recorders[slot];
        *recorder = Recorder::default();
        Ok(recorder)
    }
    fn end_commands(&mut self, _: usize) -> RhiResult<()> {
        Ok(())
    }
    fn submit(&mut self, _: usize) -> RhiResult<()> {
        Ok(())
    }
    fn present(&mut self, _: usize, _: u32) -> RhiResult<bool> {
        Ok(false)
    }
}

fn run(
    frames: &mut FrameLoop,
    backend: &mut Backend,
    materials: &[DrawMaterial],
    meshes: &[DrawMesh],
) -> FrameOutcome {
    frames
        .run_frame(backend, |recorder, _image, frame_number| {
            let target = FrameTarget {
                render_pass: vk::RenderPass::from_raw(1),
                framebuffer: vk::Framebuffer::from_raw(2),
                extent: vk::Extent2D {
                    width: 640,
                    height: 480,
                },
                frame_number,
            };
            record_scene(recorder, &target, materials, meshes, Mat4::IDENTITY);
            Ok(())
        })
        .unwrap()
}

fn triangle_scene() -> (Vec<DrawMaterial>, Vec<DrawMesh>) {
    let materials = vec![DrawMaterial {
        pipeline: vk::Pipeline::from_raw(10),
        layout: vk::PipelineLayout::from_raw(11),
    }];
    let meshes = vec![DrawMesh {
        buffer: vk::Buffer::from_raw(20),
        vertex_count: 3,
    }];
    (materials, meshes)
}

#[test]
fn test_one_triangle_one_draw() {
    let (materials, meshes) = triangle_scene();
    let mut backend = Backend::new(FRAME_OVERLAP);
    let mut frames = FrameLoop::new(FRAME_OVERLAP);

    let outcome = run(&mut frames, &mut backend, &materials, &meshes);
    assert_eq!(
        outcome,
        FrameOutcome::Presented {
            image_index: 0,
            needs_recreate: false
        }
    );

    let recorder = &backend.recorders[0];
    assert_eq!(recorder.passes, 1);
    assert_eq!(recorder.draws, vec![(3, 1, 0, 0)]);
    assert_eq!(recorder.pipelines, vec![vk::Pipeline::from_raw(10)]);
    assert_eq!(recorder.pushed_bytes, vec![80]);
}

#[test]
fn test_consecutive_frames_use_alternate_slots() {
    let (materials, meshes) = triangle_scene();
    let mut backend = Backend::new(FRAME_OVERLAP);
    let mut frames = FrameLoop::new(FRAME_OVERLAP);

    for _ in 0..4 {
        run(&mut frames, &mut backend, &materials, &meshes);
    }
    assert_eq!(backend.waits, vec![0, 1, 0, 1]);
    assert!(backend.recorders.iter().all(|r| r.draws == vec![(3, 1, 0, 0)]));
}

#[test]
fn test_out_of_date_frame_is_retried_on_same_slot() {
    let (materials, meshes) = triangle_scene();
    let mut backend = Backend::new(FRAME_OVERLAP);
    backend.out_of_date_once = true;
    let mut frames = FrameLoop::new(FRAME_OVERLAP);

    assert_eq!(
        run(&mut frames, &mut backend, &materials, &meshes),
        FrameOutcome::SwapchainOutOfDate
    );
    assert!(backend.recorders[0].draws.is_empty());

    run(&mut frames, &mut backend, &materials, &meshes);
    assert_eq!(backend.waits, vec![0, 0]);
    assert_eq!(backend.recorders[0].draws, vec![(3, 1, 0, 0)]);
    assert_eq!(frames.frame_number(), 1);
}
