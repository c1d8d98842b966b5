//! Frame slots and the per-frame protocol.
//!
//! [`FrameLoop::run_frame`] drives one application frame through a
//! [`FrameBackend`]:
//!
//! 1. wait for the slot's render fence (`frame_number % overlap`)
//! 2. reset the fence
//! 3. acquire a swapchain image (signals the slot's image-acquired semaphore)
//! 4. reset and begin the slot's command buffer, record, end
//! 5. submit: wait image-acquired at color output, signal render-finished
//!    and the fence
//! 6. present, waiting on render-finished
//! 7. advance `frame_number`
//!
//! The fence wait in step 1 is the only back-pressure: the CPU can record into
//! one slot while the GPU still executes the other, but never reuses a slot
//! before its previous submission completed.
//!
//! A frame that fails between steps 2 and 5 re-arms the slot fence before the
//! error is returned, so the slot's next wait (or the shutdown wait) still
//! completes.
//!
//! [`VulkanFrames`] is the real backend; tests drive the loop with a mock.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, info, warn};

use minivk_rhi::command::{CommandBuffer, CommandPool, CommandRecorder};
use minivk_rhi::device::Device;
use minivk_rhi::swapchain::Swapchain;
use minivk_rhi::sync::{Fence, Semaphore, timeout_nanos};
use minivk_rhi::{RhiError, RhiResult};

/// Result of asking the swapchain for an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Image { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface.
    OutOfDate,
}

/// What happened to one call of [`FrameLoop::run_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented {
        image_index: u32,
        /// Acquire or present reported suboptimal/out-of-date.
        needs_recreate: bool,
    },
    /// Acquisition failed with out-of-date; nothing was submitted and the
    /// frame number did not advance.
    SwapchainOutOfDate,
}

/// The GPU operations the frame protocol is made of, addressed by slot.
pub trait FrameBackend {
    type Recorder: CommandRecorder;

    fn slot_count(&self) -> usize;

    /// Blocks until the slot's render fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()>;

    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()>;

    /// Signals a reset fence without doing any work, so the next wait on the
    /// slot does not deadlock after an aborted frame. With `image_acquired`
    /// the empty submission also consumes the slot's image-acquired
    /// semaphore.
    fn rearm_slot_fence(&mut self, slot: usize, image_acquired: bool) -> RhiResult<()>;

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome>;

    /// Resets the slot's command buffer and begins one-time-submit recording.
    fn begin_commands(&mut self, slot: usize) -> RhiResult<&mut Self::Recorder>;

    fn end_commands(&mut self, slot: usize) -> RhiResult<()>;

    fn submit(&mut self, slot: usize) -> RhiResult<()>;

    /// Returns true when the swapchain should be recreated.
    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<bool>;
}

/// Frame counter and slot selection.
#[derive(Debug)]
pub struct FrameLoop {
    frame_number: u64,
    overlap: usize,
}

impl FrameLoop {
    pub fn new(overlap: usize) -> Self {
        Self {
            frame_number: 0,
            overlap: overlap.max(1),
        }
    }

    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    #[inline]
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Slot used by the next frame.
    #[inline]
    pub fn current_slot(&self) -> usize {
        (self.frame_number % self.overlap as u64) as usize
    }

    /// Runs one frame. `record` receives the slot's recorder between begin
    /// and end, plus the acquired image index and the frame number.
    pub fn run_frame<B, F>(&mut self, backend: &mut B, record: F) -> RhiResult<FrameOutcome>
    where
        B: FrameBackend,
        F: FnOnce(&mut B::Recorder, u32, u64) -> RhiResult<()>,
    {
        let slot = self.current_slot();

        backend.wait_for_slot(slot)?;
        backend.reset_slot_fence(slot)?;

        let (image_index, acquire_suboptimal) = match backend.acquire_image(slot) {
            Ok(AcquireOutcome::Image { index, suboptimal }) => (index, suboptimal),
            Ok(AcquireOutcome::OutOfDate) => {
                debug!("Swapchain out of date during acquire (slot {})", slot);
                backend.rearm_slot_fence(slot, false)?;
                return Ok(FrameOutcome::SwapchainOutOfDate);
            }
            Err(e) => return Err(abandon_slot(backend, slot, false, e)),
        };

        if let Err(e) = record_and_submit(backend, slot, image_index, self.frame_number, record) {
            return Err(abandon_slot(backend, slot, true, e));
        }

        let present_wants_recreate = backend.present(slot, image_index)?;

        self.frame_number += 1;

        Ok(FrameOutcome::Presented {
            image_index,
            needs_recreate: acquire_suboptimal || present_wants_recreate,
        })
    }

    /// Waits for every slot's last submission. Call before releasing any GPU
    /// resource those submissions might reference.
    ///
    /// Every slot is waited on even if an earlier one fails; the first error
    /// is returned.
    pub fn wait_all<B: FrameBackend>(&self, backend: &mut B) -> RhiResult<()> {
        let mut first_error = None;
        for slot in 0..backend.slot_count() {
            if let Err(e) = backend.wait_for_slot(slot) {
                warn!("Frame slot {} did not become idle: {}", slot, e);
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => {
                debug!("All {} frame slot(s) idle", backend.slot_count());
                Ok(())
            }
        }
    }
}

/// Steps 4 and 5 of the protocol: everything that has to reach the queue
/// before the slot fence is signaled again.
fn record_and_submit<B, F>(
    backend: &mut B,
    slot: usize,
    image_index: u32,
    frame_number: u64,
    record: F,
) -> RhiResult<()>
where
    B: FrameBackend,
    F: FnOnce(&mut B::Recorder, u32, u64) -> RhiResult<()>,
{
    let recorder = backend.begin_commands(slot)?;
    record(recorder, image_index, frame_number)?;
    backend.end_commands(slot)?;
    backend.submit(slot)
}

/// Re-arms the fence of a slot whose frame failed before submission and
/// hands back the original error.
fn abandon_slot<B: FrameBackend>(
    backend: &mut B,
    slot: usize,
    image_acquired: bool,
    error: RhiError,
) -> RhiError {
    warn!("Frame on slot {} abandoned before submit: {}", slot, error);
    if let Err(rearm_error) = backend.rearm_slot_fence(slot, image_acquired) {
        warn!("Failed to re-arm fence of slot {}: {}", slot, rearm_error);
    }
    error
}

/// Per-slot GPU objects.
pub struct FrameContext {
    command_buffer: CommandBuffer,
    // Frees the command buffer when dropped
    _command_pool: CommandPool,
    image_acquired: Semaphore,
    render_finished: Semaphore,
    render_fence: Fence,
}

impl FrameContext {
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone(), device.graphics_family())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let image_acquired = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled so the first wait on this slot returns at once
        let render_fence = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            _command_pool: command_pool,
            image_acquired,
            render_finished,
            render_fence,
        })
    }

    /// Creates `count` slots.
    pub fn create_slots(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Self>> {
        let slots = (0..count)
            .map(|_| Self::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;
        info!("Created {} frame slot(s)", slots.len());
        Ok(slots)
    }
}

/// [`FrameBackend`] over real Vulkan objects, borrowed for one frame.
pub struct VulkanFrames<'a> {
    pub device: &'a Device,
    pub swapchain: &'a Swapchain,
    pub slots: &'a mut [FrameContext],
    pub timeout: Duration,
}

impl VulkanFrames<'_> {
    fn slot(&self, slot: usize) -> RhiResult<&FrameContext> {
        self.slots.get(slot).ok_or_else(|| {
            RhiError::SwapchainError(format!("Frame slot {} does not exist", slot))
        })
    }
}

impl FrameBackend for VulkanFrames<'_> {
    type Recorder = CommandBuffer;

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn wait_for_slot(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.render_fence.wait(self.timeout)
    }

    fn reset_slot_fence(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.render_fence.reset()
    }

    fn rearm_slot_fence(&mut self, slot: usize, image_acquired: bool) -> RhiResult<()> {
        let frame = self.slot(slot)?;
        if image_acquired {
            frame.render_fence.rearm(&[frame.image_acquired.handle()])
        } else {
            frame.render_fence.rearm(&[])
        }
    }

    fn acquire_image(&mut self, slot: usize) -> RhiResult<AcquireOutcome> {
        let semaphore = self.slot(slot)?.image_acquired.handle();
        match self
            .swapchain
            .acquire_next_image(semaphore, timeout_nanos(self.timeout))
        {
            Ok((index, suboptimal)) => Ok(AcquireOutcome::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::OutOfDate),
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => {
                Err(RhiError::SwapchainError(format!(
                    "No presentable image within {:?}",
                    self.timeout
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn begin_commands(&mut self, slot: usize) -> RhiResult<&mut CommandBuffer> {
        let frame = self.slots.get_mut(slot).ok_or_else(|| {
            RhiError::SwapchainError(format!("Frame slot {} does not exist", slot))
        })?;
        frame.command_buffer.reset()?;
        frame.command_buffer.begin()?;
        Ok(&mut frame.command_buffer)
    }

    fn end_commands(&mut self, slot: usize) -> RhiResult<()> {
        self.slot(slot)?.command_buffer.end()
    }

    fn submit(&mut self, slot: usize) -> RhiResult<()> {
        let frame = self.slot(slot)?;

        let wait_semaphores = [frame.image_acquired.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [frame.render_finished.handle()];
        let command_buffers = [frame.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], frame.render_fence.handle())
        }
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RhiResult<bool> {
        let wait = self.slot(slot)?.render_finished.handle();
        match self
            .swapchain
            .present(self.device.graphics_queue(), image_index, wait)
        {
            Ok(suboptimal) => {
                if suboptimal {
                    debug!("Present returned suboptimal");
                }
                Ok(suboptimal)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                warn!("Present returned ERROR_OUT_OF_DATE_KHR");
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }
}
