//! GPU buffers.
//!
//! [`AllocatedBuffer`] pairs a `VkBuffer` with its `gpu-allocator` memory.
//! Host-visible buffers stay mapped for their whole life; [`AllocatedBuffer::map`]
//! hands out the mapped bytes for as long as the buffer is mutably borrowed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ash::vk;
//! use minivk_rhi::allocator::Residency;
//! use minivk_rhi::buffer::AllocatedBuffer;
//! use minivk_rhi::device::Device;
//!
//! # fn example(device: Arc<Device>) -> Result<(), minivk_rhi::RhiError> {
//! let vertices: [f32; 9] = [0.0, -0.5, 0.0, 0.5, 0.5, 0.0, -0.5, 0.5, 0.0];
//! let buffer = AllocatedBuffer::with_data(
//!     device,
//!     "triangle",
//!     vk::BufferUsageFlags::VERTEX_BUFFER,
//!     bytemuck::cast_slice(&vertices),
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use tracing::debug;

use crate::allocator::{self, Residency};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};

pub struct AllocatedBuffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: vk::DeviceSize,
    residency: Residency,
}

impl AllocatedBuffer {
    /// Creates a buffer of `size` bytes.
    ///
    /// # Errors
    ///
    /// Fails on a zero size, on buffer creation failure, or when the
    /// allocator cannot satisfy the request.
    pub fn new(
        device: Arc<Device>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        residency: Residency,
    ) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::BufferError(format!(
                "Buffer '{}' must not be empty",
                name
            )));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };
        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let bound = allocator::allocate(&device, name, requirements, residency, true).and_then(
            |allocation| {
                let result = unsafe {
                    device
                        .handle()
                        .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                };
                match result {
                    Ok(()) => Ok(allocation),
                    Err(e) => {
                        allocator::release(&device, allocation, name);
                        Err(e.into())
                    }
                }
            },
        );
        let allocation = match bound {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_buffer(buffer, None) };
                return Err(e);
            }
        };

        debug!("Created buffer '{}': {} bytes ({:?})", name, size, residency);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            residency,
        })
    }

    /// Creates a host-visible buffer holding a copy of `data`.
    pub fn with_data(
        device: Arc<Device>,
        name: &str,
        usage: vk::BufferUsageFlags,
        data: &[u8],
    ) -> RhiResult<Self> {
        let mut buffer = Self::new(
            device,
            name,
            data.len() as vk::DeviceSize,
            usage,
            Residency::CpuToGpu,
        )?;
        buffer.write(0, data)?;
        Ok(buffer)
    }

    /// Mapped bytes of a host-visible buffer.
    ///
    /// # Errors
    ///
    /// [`RhiError::BufferError`] if the buffer is not host-visible.
    pub fn map(&mut self) -> RhiResult<&mut [u8]> {
        let size = self.size as usize;
        self.allocation
            .as_mut()
            .and_then(|allocation| allocation.mapped_slice_mut())
            .map(|bytes| &mut bytes[..size])
            .ok_or_else(|| {
                RhiError::BufferError(format!(
                    "Buffer with {:?} residency is not mappable",
                    self.residency
                ))
            })
    }

    /// Copies `data` into the buffer at `offset`.
    pub fn write(&mut self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let range = write_range(self.size, offset, data.len())?;
        self.map()?[range].copy_from_slice(data);
        Ok(())
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn residency(&self) -> Residency {
        self.residency
    }
}

impl Drop for AllocatedBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }
        if let Some(allocation) = self.allocation.take() {
            allocator::release(&self.device, allocation, "buffer");
        }
        debug!("Destroyed buffer ({} bytes)", self.size);
    }
}

/// Byte range touched by a write, checked against the buffer size.
fn write_range(
    size: vk::DeviceSize,
    offset: vk::DeviceSize,
    len: usize,
) -> RhiResult<std::ops::Range<usize>> {
    let end = offset.checked_add(len as vk::DeviceSize);
    match end {
        Some(end) if end <= size => Ok(offset as usize..end as usize),
        _ => Err(RhiError::BufferError(format!(
            "Write exceeds buffer size: offset {} + data {} > buffer {}",
            offset, len, size
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_range_fits() {
        assert_eq!(write_range(64, 0, 64).unwrap(), 0..64);
        assert_eq!(write_range(64, 16, 8).unwrap(), 16..24);
    }

    #[test]
    fn test_write_range_overflow() {
        assert!(matches!(
            write_range(64, 60, 8),
            Err(RhiError::BufferError(_))
        ));
        assert!(matches!(
            write_range(64, u64::MAX, 1),
            Err(RhiError::BufferError(_))
        ));
    }

    #[test]
    fn test_buffer_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<AllocatedBuffer>();
    }
}
