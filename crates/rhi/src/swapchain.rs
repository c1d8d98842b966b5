//! Swapchain and render targets.
//!
//! A [`Swapchain`] owns everything that has to be rebuilt together when the
//! surface changes size: the `VkSwapchainKHR`, one [`SwapchainImage`] per
//! presentable image (image, view, framebuffer), and the depth image every
//! framebuffer shares.
//!
//! Selection rules:
//! - format: `R8G8B8A8_UNORM` or `B8G8R8A8_UNORM`, otherwise the first offered
//! - image count: at least 2, or the surface minimum if that is higher
//! - composite alpha: opaque, then pre-multiplied, post-multiplied, inherit
//! - present mode: always FIFO
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use minivk_rhi::device::Device;
//! use minivk_rhi::image::DEPTH_FORMAT;
//! use minivk_rhi::instance::Instance;
//! use minivk_rhi::render_pass::RenderPass;
//! use minivk_rhi::swapchain::{Swapchain, SwapchainSupportDetails, negotiate_surface_format};
//!
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR) -> Result<(), minivk_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let support = SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
//! let format = negotiate_surface_format(&support.formats)?;
//! let render_pass = RenderPass::new(device.clone(), format.format, DEPTH_FORMAT)?;
//! let swapchain = Swapchain::new(instance, device, surface, format, 1280, 720, &render_pass)?;
//! println!("{} presentable images", swapchain.image_count());
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{AllocatedImage, single_level_range};
use crate::instance::Instance;
use crate::render_pass::RenderPass;

/// Fewest presentable images ever requested.
pub const MIN_SWAPCHAIN_IMAGES: u32 = 2;

const PREFERRED_FORMATS: [vk::Format; 2] = [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM];

const COMPOSITE_ALPHA_PRIORITY: [vk::CompositeAlphaFlagsKHR; 4] = [
    vk::CompositeAlphaFlagsKHR::OPAQUE,
    vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    vk::CompositeAlphaFlagsKHR::INHERIT,
];

/// Surface capabilities, formats and present modes of one GPU.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?
        };
        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(physical_device, surface)?
        };
        let present_modes = unsafe {
            surface_loader.get_physical_device_surface_present_modes(physical_device, surface)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, min images {}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }
}

/// One presentable image and the objects that render into it.
#[derive(Clone, Copy, Debug)]
pub struct SwapchainImage {
    /// Owned by the presentation engine, never destroyed here.
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub framebuffer: vk::Framebuffer,
}

pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<SwapchainImage>,
    depth: AllocatedImage,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Creates the swapchain, its per-image targets and the depth image.
    ///
    /// `surface_format` comes from [`negotiate_surface_format`] and must be
    /// the color format `render_pass` was created with.
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_format: vk::SurfaceFormatKHR,
        width: u32,
        height: u32,
        render_pass: &RenderPass,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let (swapchain, images, depth, extent) = create_targets(
            instance,
            &device,
            &swapchain_loader,
            surface,
            surface_format,
            width,
            height,
            render_pass,
            vk::SwapchainKHR::null(),
        )?;

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            depth,
            surface_format,
            extent,
        })
    }

    /// Rebuilds swapchain, views, framebuffers and depth image for a new size.
    ///
    /// Waits for the device to go idle first.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        render_pass: &RenderPass,
    ) -> RhiResult<()> {
        self.device.wait_idle()?;
        info!("Recreating swapchain for new size: {}x{}", width, height);

        destroy_image_targets(&self.device, &mut self.images);

        let old_swapchain = self.swapchain;
        let created = create_targets(
            instance,
            &self.device,
            &self.swapchain_loader,
            surface,
            self.surface_format,
            width,
            height,
            render_pass,
            old_swapchain,
        );

        unsafe {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }
        self.swapchain = vk::SwapchainKHR::null();

        let (swapchain, images, depth, extent) = created?;
        self.swapchain = swapchain;
        self.images = images;
        self.depth = depth;
        self.extent = extent;
        Ok(())
    }

    /// Requests the next image, signaling `semaphore` when it is ready.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        }
    }

    /// Queues `image_index` for display after `wait_semaphore`. Returns true
    /// when the swapchain is suboptimal.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> Result<bool, vk::Result> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Targets of presentable image `index`.
    pub fn image(&self, index: u32) -> RhiResult<&SwapchainImage> {
        self.images.get(index as usize).ok_or_else(|| {
            RhiError::SwapchainError(format!(
                "Image index {} out of range ({} images)",
                index,
                self.images.len()
            ))
        })
    }

    #[inline]
    pub fn images(&self) -> &[SwapchainImage] {
        &self.images
    }

    #[inline]
    pub fn depth(&self) -> &AllocatedImage {
        &self.depth
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        destroy_image_targets(&self.device, &mut self.images);
        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }
            info!(
                "Swapchain destroyed (was {}x{})",
                self.extent.width, self.extent.height
            );
        }
    }
}

/// Everything `create_targets` builds.
type Targets = (
    vk::SwapchainKHR,
    Vec<SwapchainImage>,
    AllocatedImage,
    vk::Extent2D,
);

#[allow(clippy::too_many_arguments)]
fn create_targets(
    instance: &Instance,
    device: &Arc<Device>,
    swapchain_loader: &ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    surface_format: vk::SurfaceFormatKHR,
    width: u32,
    height: u32,
    render_pass: &RenderPass,
    old_swapchain: vk::SwapchainKHR,
) -> RhiResult<Targets> {
    let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
    let support = SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;
    let capabilities = &support.capabilities;

    let extent = choose_extent(capabilities, width, height);
    let image_count = choose_image_count(capabilities);
    let composite_alpha = choose_composite_alpha(capabilities.supported_composite_alpha);

    info!(
        "Creating swapchain: {}x{}, format {:?}, {} images, composite alpha {:?}, FIFO",
        extent.width, extent.height, surface_format.format, image_count, composite_alpha
    );

    let queue_family_indices = [device.graphics_family()];
    let create_info = vk::SwapchainCreateInfoKHR::default()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .queue_family_indices(&queue_family_indices)
        .pre_transform(capabilities.current_transform)
        .composite_alpha(composite_alpha)
        .present_mode(vk::PresentModeKHR::FIFO)
        .clipped(true)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

    let built = build_image_targets(
        device,
        swapchain_loader,
        swapchain,
        surface_format.format,
        extent,
        render_pass,
    );
    match built {
        Ok((images, depth)) => {
            info!("Swapchain created with {} images", images.len());
            Ok((swapchain, images, depth, extent))
        }
        Err(e) => {
            unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
            Err(e)
        }
    }
}

/// Depth image plus one view and framebuffer per presentable image.
fn build_image_targets(
    device: &Arc<Device>,
    swapchain_loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    extent: vk::Extent2D,
    render_pass: &RenderPass,
) -> RhiResult<(Vec<SwapchainImage>, AllocatedImage)> {
    let depth = AllocatedImage::depth(device.clone(), extent)?;
    let raw_images = unsafe { swapchain_loader.get_swapchain_images(swapchain)? };

    let mut images = Vec::with_capacity(raw_images.len());
    for (i, &image) in raw_images.iter().enumerate() {
        match create_image_target(device, image, format, extent, render_pass, depth.view()) {
            Ok(target) => images.push(target),
            Err(e) => {
                destroy_image_targets(device, &mut images);
                return Err(RhiError::SwapchainError(format!(
                    "Failed to create targets for image {}: {}",
                    i, e
                )));
            }
        }
    }

    debug!("Created {} image views and framebuffers", images.len());
    Ok((images, depth))
}

fn create_image_target(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
    extent: vk::Extent2D,
    render_pass: &RenderPass,
    depth_view: vk::ImageView,
) -> RhiResult<SwapchainImage> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(single_level_range(vk::ImageAspectFlags::COLOR));
    let view = unsafe { device.handle().create_image_view(&view_info, None)? };

    let attachments = [view, depth_view];
    let framebuffer_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass.handle())
        .attachments(&attachments)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    match unsafe { device.handle().create_framebuffer(&framebuffer_info, None) } {
        Ok(framebuffer) => Ok(SwapchainImage {
            image,
            view,
            framebuffer,
        }),
        Err(e) => {
            unsafe { device.handle().destroy_image_view(view, None) };
            Err(e.into())
        }
    }
}

fn destroy_image_targets(device: &Device, images: &mut Vec<SwapchainImage>) {
    for target in images.drain(..) {
        unsafe {
            device.handle().destroy_framebuffer(target.framebuffer, None);
            device.handle().destroy_image_view(target.view, None);
        }
    }
}

/// Picks the presentation format.
///
/// # Errors
///
/// [`RhiError::SwapchainError`] when the surface offers no formats.
pub fn negotiate_surface_format(
    formats: &[vk::SurfaceFormatKHR],
) -> RhiResult<vk::SurfaceFormatKHR> {
    if let Some(&preferred) = formats
        .iter()
        .find(|f| PREFERRED_FORMATS.contains(&f.format))
    {
        debug!("Selected surface format {:?}", preferred.format);
        return Ok(preferred);
    }

    let first = formats.first().copied().ok_or_else(|| {
        RhiError::SwapchainError("Surface reports no formats".to_string())
    })?;
    warn!("Using first available surface format: {:?}", first.format);
    Ok(first)
}

/// Highest-priority composite alpha mode in `supported`.
pub fn choose_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> vk::CompositeAlphaFlagsKHR {
    COMPOSITE_ALPHA_PRIORITY
        .into_iter()
        .find(|&mode| supported.contains(mode))
        .unwrap_or(vk::CompositeAlphaFlagsKHR::OPAQUE)
}

/// Never fewer than [`MIN_SWAPCHAIN_IMAGES`].
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    capabilities.min_image_count.max(MIN_SWAPCHAIN_IMAGES)
}

fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}
