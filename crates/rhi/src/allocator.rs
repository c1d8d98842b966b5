//! GPU memory residency and allocation helpers.
//!
//! Buffers and images obtain their memory through [`allocate`] and return it
//! through [`release`]. Both go through the `gpu-allocator` instance owned by
//! the [`Device`].

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::error;

use crate::device::Device;
use crate::error::RhiResult;

/// Where an allocation lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Residency {
    /// Host-visible and persistently mapped. Used for uploads.
    CpuToGpu,
    /// Device-local, not mappable. Used for render targets.
    GpuOnly,
}

impl Residency {
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            Residency::CpuToGpu => MemoryLocation::CpuToGpu,
            Residency::GpuOnly => MemoryLocation::GpuOnly,
        }
    }

    #[inline]
    pub fn is_host_visible(self) -> bool {
        matches!(self, Residency::CpuToGpu)
    }
}

/// Allocates memory satisfying `requirements`.
///
/// `linear` is true for buffers and linearly tiled images.
pub(crate) fn allocate(
    device: &Device,
    name: &str,
    requirements: vk::MemoryRequirements,
    residency: Residency,
    linear: bool,
) -> RhiResult<Allocation> {
    let mut allocator = device.allocator()?;
    let allocation = allocator.allocate(&AllocationCreateDesc {
        name,
        requirements,
        location: residency.memory_location(),
        linear,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;
    Ok(allocation)
}

/// Returns `allocation` to the allocator, logging instead of failing.
pub(crate) fn release(device: &Device, allocation: Allocation, what: &str) {
    match device.allocator() {
        Ok(mut allocator) => {
            if let Err(e) = allocator.free(allocation) {
                error!("Failed to free {} allocation: {:?}", what, e);
            }
        }
        Err(e) => error!("Leaking {} allocation: {}", what, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_residency_memory_location() {
        assert_eq!(
            Residency::CpuToGpu.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(Residency::GpuOnly.memory_location(), MemoryLocation::GpuOnly);
    }

    #[test]
    fn test_host_visibility() {
        assert!(Residency::CpuToGpu.is_host_visible());
        assert!(!Residency::GpuOnly.is_host_visible());
    }
}
