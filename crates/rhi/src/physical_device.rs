//! Physical device (GPU) selection.
//!
//! Devices are considered in enumeration order. The first one that offers
//! `VK_KHR_swapchain` and a graphics queue family able to present to the
//! window surface is taken; among such families the last one wins.
//!
//! # Example
//!
//! ```no_run
//! use minivk_rhi::instance::Instance;
//! use minivk_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), minivk_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let gpu = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! println!("Selected GPU: {}", gpu.device_name());
//! # Ok(())
//! # }
//! ```

use std::ffi::CStr;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};

/// Extensions every selected device must expose.
pub const DEVICE_EXTENSIONS: &[&CStr] = &[ash::khr::swapchain::NAME];

/// The chosen GPU and the facts the rest of setup needs about it.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Family used for both rendering and presentation.
    pub graphics_family: u32,
}

impl PhysicalDeviceInfo {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }
}

impl std::fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("graphics_family", &self.graphics_family)
            .finish()
    }
}

/// Picks the GPU used for the lifetime of the renderer.
///
/// # Errors
///
/// [`RhiError::NoSuitableGpu`] when no device qualifies.
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };
    info!("Found {} GPU(s)", devices.len());

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let extensions = unsafe { instance.enumerate_device_extension_properties(device)? };
        let extension_names: Vec<&CStr> = extensions
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();
        if let Some(missing) = missing_extension(&extension_names) {
            debug!("GPU '{}' skipped: missing {:?}", name, missing);
            continue;
        }

        let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let graphics_family = pick_graphics_family(&families, |index| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        });
        let Some(graphics_family) = graphics_family else {
            debug!("GPU '{}' skipped: no graphics queue with present support", name);
            continue;
        };

        let info = PhysicalDeviceInfo {
            device,
            properties,
            memory_properties: unsafe { instance.get_physical_device_memory_properties(device) },
            graphics_family,
        };
        let (major, minor, patch) = info.api_version();
        info!(
            "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, queue family {}",
            info.device_name(),
            info.device_type_name(),
            major,
            minor,
            patch,
            graphics_family
        );
        return Ok(info);
    }

    warn!("No GPU with swapchain and graphics/present support");
    Err(RhiError::NoSuitableGpu)
}

/// First entry of [`DEVICE_EXTENSIONS`] absent from `available`.
fn missing_extension(available: &[&CStr]) -> Option<&'static CStr> {
    DEVICE_EXTENSIONS
        .iter()
        .copied()
        .find(|required| !available.contains(required))
}

/// Last queue family that supports graphics and can present.
pub fn pick_graphics_family(
    families: &[vk::QueueFamilyProperties],
    supports_present: impl Fn(u32) -> bool,
) -> Option<u32> {
    families
        .iter()
        .enumerate()
        .filter(|(_, family)| {
            family.queue_count > 0 && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        })
        .map(|(index, _)| index as u32)
        .filter(|&index| supports_present(index))
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    #[test]
    fn test_last_graphics_family_wins() {
        let families = [
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1),
            family(vk::QueueFlags::TRANSFER, 2),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(pick_graphics_family(&families, |_| true), Some(2));
    }

    #[test]
    fn test_present_support_required() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        assert_eq!(pick_graphics_family(&families, |i| i == 0), Some(0));
        assert_eq!(pick_graphics_family(&families, |_| false), None);
    }

    #[test]
    fn test_empty_families_skipped() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 0),
        ];
        assert_eq!(pick_graphics_family(&families, |_| true), Some(0));
    }

    #[test]
    fn test_no_graphics_family() {
        let families = [family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER, 4)];
        assert_eq!(pick_graphics_family(&families, |_| true), None);
    }

    #[test]
    fn test_missing_extension() {
        assert_eq!(missing_extension(&[]), Some(ash::khr::swapchain::NAME));
        assert_eq!(
            missing_extension(&[ash::khr::swapchain::NAME, ash::khr::maintenance1::NAME]),
            None
        );
    }
}
