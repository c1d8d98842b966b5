//! Main renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object for one window and turns a camera
//! plus a material choice into a presented frame.
//!
//! # Resource Destruction Order
//!
//! 1. Wait for every frame slot's fence, then for the device to go idle
//! 2. Frame slots (command pools, semaphores, fences)
//! 3. Meshes, then materials (pipelines, layouts, shader modules)
//! 4. Swapchain targets, then the render pass
//! 5. Device and allocator
//! 6. Surface, then instance
//!
//! Steps 2 to 6 follow field declaration order.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use minivk_core::RendererConfig;
use minivk_platform::{Surface, Window, aspect_ratio};
use minivk_resources::Model;
use minivk_rhi::device::Device;
use minivk_rhi::image::DEPTH_FORMAT;
use minivk_rhi::instance::Instance;
use minivk_rhi::physical_device::select_physical_device;
use minivk_rhi::render_pass::RenderPass;
use minivk_rhi::swapchain::{Swapchain, SwapchainSupportDetails, negotiate_surface_format};
use minivk_scene::{FlyCamera, model_spin};

use crate::FRAME_OVERLAP;
use crate::draw::{DrawMesh, FrameTarget, record_scene};
use crate::error::{RendererError, RendererResult};
use crate::frame::{FrameContext, FrameLoop, FrameOutcome, VulkanFrames};
use crate::material::{Material, ShaderProgram};
use crate::mesh::Mesh;

pub struct Renderer {
    // Declaration order is drop order
    frames: Vec<FrameContext>,
    meshes: Vec<Mesh>,
    materials: Vec<Material>,
    swapchain: Swapchain,
    render_pass: RenderPass,
    device: Arc<Device>,
    surface: Surface,
    instance: Instance,

    frame_loop: FrameLoop,
    gpu_timeout: Duration,
    width: u32,
    height: u32,
    /// Set by resize or a suboptimal/out-of-date swapchain; handled before
    /// the next acquire.
    needs_recreate: bool,
}

impl Renderer {
    /// Creates the instance, device, swapchain, frame slots, meshes and
    /// materials for `window`.
    ///
    /// # Errors
    ///
    /// Any failure during setup is returned; nothing is retried.
    pub fn new(window: &Window, config: &RendererConfig) -> RendererResult<Self> {
        let width = window.width();
        let height = window.height();
        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let extensions = window.required_extensions()?;
        let instance = Instance::new(&config.title, &extensions, config.validation)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let gpu = select_physical_device(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &gpu)?;

        let support =
            SwapchainSupportDetails::query(gpu.device, surface.handle(), surface.loader())?;
        let surface_format = negotiate_surface_format(&support.formats)?;

        let render_pass = RenderPass::new(device.clone(), surface_format.format, DEPTH_FORMAT)?;
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            surface_format,
            width,
            height,
            &render_pass,
        )?;

        let frames = FrameContext::create_slots(&device, FRAME_OVERLAP)?;
        let meshes = Self::load_meshes(&device, config)?;

        let extent = swapchain.extent();
        let materials = ShaderProgram::builtin(config)
            .iter()
            .map(|program| Material::build(device.clone(), program, &render_pass, extent))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            "Renderer ready: {} mesh(es), {} material(s), {} frame slot(s)",
            meshes.len(),
            materials.len(),
            frames.len()
        );

        Ok(Self {
            frames,
            meshes,
            materials,
            swapchain,
            render_pass,
            device,
            surface,
            instance,
            frame_loop: FrameLoop::new(FRAME_OVERLAP),
            gpu_timeout: config.gpu_timeout,
            width,
            height,
            needs_recreate: false,
        })
    }

    /// The built-in triangle, plus every object of the configured model.
    fn load_meshes(device: &Arc<Device>, config: &RendererConfig) -> RendererResult<Vec<Mesh>> {
        let mut model = Model::triangle();
        if let Some(path) = &config.mesh_path {
            model.meshes.extend(Model::load(path)?.meshes);
        }

        let meshes = model
            .meshes
            .iter()
            .map(|data| Mesh::upload(device.clone(), data))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meshes)
    }

    /// Notes a new window size. The swapchain is rebuilt before the next
    /// frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == self.width && height == self.height {
            return;
        }
        debug!(
            "Resize triggered: {}x{} -> {}x{}",
            self.width, self.height, width, height
        );
        self.width = width;
        self.height = height;
        self.needs_recreate = true;
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    pub fn material_name(&self, index: usize) -> Option<&str> {
        self.materials.get(index).map(|m| m.name())
    }

    fn recreate_swapchain(&mut self) -> RendererResult<()> {
        self.device.wait_idle()?;

        self.swapchain.recreate(
            &self.instance,
            self.surface.handle(),
            self.width,
            self.height,
            &self.render_pass,
        )?;

        let extent = self.swapchain.extent();
        for material in &mut self.materials {
            material.rebuild(&self.render_pass, extent)?;
        }

        self.needs_recreate = false;
        Ok(())
    }

    /// Renders and presents one frame of every mesh with the selected
    /// material. Does nothing while the window is minimized.
    pub fn draw_frame(&mut self, camera: &FlyCamera, material_index: usize) -> RendererResult<()> {
        if self.width == 0 || self.height == 0 {
            return Ok(());
        }

        if self.needs_recreate {
            debug!("Recreating swapchain before acquire");
            self.recreate_swapchain()?;
        }

        let material = self
            .materials
            .get(material_index)
            .ok_or(RendererError::NoSuchMaterial {
                index: material_index,
                count: self.materials.len(),
            })?;
        let draw_materials = [material.draw_material()];
        let draw_meshes: Vec<DrawMesh> = self
            .meshes
            .iter()
            .map(|mesh| DrawMesh {
                buffer: mesh.buffer(),
                vertex_count: mesh.vertex_count(),
            })
            .collect();

        let extent = self.swapchain.extent();
        let view_projection = camera.view_projection(aspect_ratio(extent.width, extent.height));
        let render_pass = self.render_pass.handle();
        let swapchain = &self.swapchain;

        let mut backend = VulkanFrames {
            device: &self.device,
            swapchain,
            slots: &mut self.frames,
            timeout: self.gpu_timeout,
        };

        let outcome =
            self.frame_loop
                .run_frame(&mut backend, |recorder, image_index, frame_number| {
                    let target = FrameTarget {
                        render_pass,
                        framebuffer: swapchain.image(image_index)?.framebuffer,
                        extent,
                        frame_number,
                    };
                    let mvp = view_projection * model_spin(frame_number);
                    record_scene(recorder, &target, &draw_materials, &draw_meshes, mvp);
                    Ok(())
                })?;

        match outcome {
            FrameOutcome::SwapchainOutOfDate
            | FrameOutcome::Presented {
                needs_recreate: true,
                ..
            } => {
                self.needs_recreate = true;
            }
            FrameOutcome::Presented { .. } => {}
        }

        Ok(())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let mut backend = VulkanFrames {
            device: &self.device,
            swapchain: &self.swapchain,
            slots: &mut self.frames,
            timeout: self.gpu_timeout,
        };
        if let Err(e) = self.frame_loop.wait_all(&mut backend) {
            error!("Failed to wait for frame slots during renderer drop: {}", e);
        }

        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }

        info!(
            "Renderer destroyed after {} frame(s)",
            self.frame_loop.frame_number()
        );
    }
}
