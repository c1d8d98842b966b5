//! Synchronization primitives.
//!
//! - [`Semaphore`] orders GPU work (acquire -> render -> present)
//! - [`Fence`] lets the host wait for a submission to finish
//!
//! Fence waits are always bounded; an expired wait becomes
//! [`RhiError::FenceTimeout`] instead of blocking forever on a hung GPU.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use minivk_rhi::device::Device;
//! use minivk_rhi::sync::{Semaphore, Fence};
//!
//! # fn example(device: Arc<Device>) -> Result<(), minivk_rhi::RhiError> {
//! let image_acquired = Semaphore::new(device.clone())?;
//! let render_fence = Fence::new(device.clone(), true)?;
//!
//! render_fence.wait(Duration::from_secs(1))?;
//! render_fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Converts a timeout into the nanosecond count Vulkan expects, saturating
/// at `u64::MAX` (which Vulkan treats as infinite).
pub fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}

pub struct Semaphore {
    device: Arc<Device>,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();
        let semaphore = unsafe { device.handle().create_semaphore(&create_info, None)? };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

pub struct Fence {
    device: Arc<Device>,
    fence: vk::Fence,
}

impl Fence {
    /// Creates a fence. Frame fences start signaled so the first wait on
    /// each slot returns immediately.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.handle().create_fence(&create_info, None)? };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits until the fence is signaled.
    ///
    /// # Errors
    ///
    /// [`RhiError::FenceTimeout`] if `timeout` elapses first.
    pub fn wait(&self, timeout: Duration) -> RhiResult<()> {
        let fences = [self.fence];
        let result = unsafe {
            self.device
                .handle()
                .wait_for_fences(&fences, true, timeout_nanos(timeout))
        };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => {
                warn!("Fence wait exceeded {:?}", timeout);
                Err(RhiError::FenceTimeout(timeout))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe { self.device.handle().reset_fences(&fences)? };
        Ok(())
    }

    /// Signals a fence that was reset but never submitted with, by queueing an
    /// empty batch on the graphics queue. The batch waits on `wait_semaphores`,
    /// unsignaling any that an aborted frame left signaled.
    pub fn rearm(&self, wait_semaphores: &[vk::Semaphore]) -> RhiResult<()> {
        if wait_semaphores.is_empty() {
            unsafe { self.device.submit_graphics(&[], self.fence)? };
        } else {
            let wait_stages =
                vec![vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT; wait_semaphores.len()];
            let submit_info = vk::SubmitInfo::default()
                .wait_semaphores(wait_semaphores)
                .wait_dst_stage_mask(&wait_stages);
            unsafe { self.device.submit_graphics(&[submit_info], self.fence)? };
        }
        debug!(
            "Re-armed fence with an empty submission ({} wait semaphore(s))",
            wait_semaphores.len()
        );
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_nanos() {
        assert_eq!(timeout_nanos(Duration::from_secs(1)), 1_000_000_000);
        assert_eq!(timeout_nanos(Duration::from_millis(5)), 5_000_000);
        assert_eq!(timeout_nanos(Duration::ZERO), 0);
    }

    #[test]
    fn test_timeout_nanos_saturates() {
        assert_eq!(timeout_nanos(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence>();
    }
}
