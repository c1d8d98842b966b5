//! GPU images with a matching view.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::{debug, info};

use crate::allocator::{self, Residency};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Format of the depth attachment shared by every framebuffer.
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

/// A 2D, single-mip image, its memory, and a view over it.
pub struct AllocatedImage {
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl AllocatedImage {
    /// Creates an optimally tiled image and a view with `aspect`.
    ///
    /// # Errors
    ///
    /// Fails on a zero extent, on image or view creation failure, or when
    /// memory cannot be allocated. Partially created objects are destroyed.
    pub fn new(
        device: Arc<Device>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        residency: Residency,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::SwapchainError(format!(
                "Image '{}' must have a non-zero extent",
                name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };
        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocation = match allocator::allocate(&device, name, requirements, residency, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let view = unsafe {
            device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .and_then(|()| {
                    let view_info = vk::ImageViewCreateInfo::default()
                        .image(image)
                        .view_type(vk::ImageViewType::TYPE_2D)
                        .format(format)
                        .subresource_range(single_level_range(aspect));
                    device.handle().create_image_view(&view_info, None)
                })
        };
        let view = match view {
            Ok(view) => view,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                allocator::release(&device, allocation, name);
                return Err(e.into());
            }
        };

        info!(
            "Created image '{}': {}x{} ({:?}, {:?})",
            name, extent.width, extent.height, format, residency
        );

        Ok(Self {
            device,
            image,
            view,
            allocation: Some(allocation),
            format,
            extent,
        })
    }

    /// Device-local depth attachment in [`DEPTH_FORMAT`].
    pub fn depth(device: Arc<Device>, extent: vk::Extent2D) -> RhiResult<Self> {
        Self::new(
            device,
            "depth",
            extent,
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            Residency::GpuOnly,
        )
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for AllocatedImage {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_image_view(self.view, None);
            self.device.handle().destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            allocator::release(&self.device, allocation, "image");
        }
        debug!(
            "Destroyed image {}x{}",
            self.extent.width, self.extent.height
        );
    }
}

/// Subresource range covering mip 0 and layer 0.
pub fn single_level_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(aspect)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_format() {
        assert_eq!(DEPTH_FORMAT, vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_single_level_range() {
        let range = single_level_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
        assert_eq!(range.base_mip_level, 0);
    }
}
