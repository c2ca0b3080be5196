//! Per-frame resources.
//!
//! The ring holds [`FRAMES_IN_FLIGHT`] slots. Slot `frame_number % FRAMES_IN_FLIGHT`
//! is used by the current frame, so while the GPU executes frame N the CPU can
//! record frame N+1 into the other slot.
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on the slot fence (the previous use of this slot has finished), reset it
//! 2. Acquire a presentable image (signals the slot's acquire semaphore)
//! 3. Record into the slot's command buffer
//! 4. Submit:
//!    - wait on the acquire semaphore at COLOR_ATTACHMENT_OUTPUT
//!    - signal the image's render-finished semaphore
//!    - signal the slot fence
//! 5. Present (waits on the render-finished semaphore)
//! ```

use std::sync::Arc;

use tracing::{debug, info};

use lsv_rhi::RhiResult;
use lsv_rhi::command::{CommandBuffer, CommandPool};
use lsv_rhi::gpu::GpuDevice;
use lsv_rhi::sync::{Fence, Semaphore};

use crate::FRAMES_IN_FLIGHT;
use crate::context::FrameContext;

/// Resources of one frame in flight.
pub struct FrameSlot<D: GpuDevice> {
    // Field order is drop order: the buffer is freed with its pool.
    command_buffer: CommandBuffer<D>,
    _command_pool: CommandPool<D>,
    /// Signaled when the acquired presentable image is ready to be written.
    image_acquired: Semaphore<D>,
    /// Signaled when the slot's last submission has completed. Created signaled.
    in_flight: Fence<D>,
}

impl<D: GpuDevice> FrameSlot<D> {
    fn new(device: Arc<D>) -> RhiResult<Self> {
        let command_pool = CommandPool::new(device.clone())?;
        let command_buffer = CommandBuffer::new(device.clone(), &command_pool)?;
        let image_acquired = Semaphore::new(device.clone())?;
        // Signaled so the first use of the slot does not block
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            _command_pool: command_pool,
            image_acquired,
            in_flight,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer<D> {
        &self.command_buffer
    }

    #[inline]
    pub fn image_acquired(&self) -> &Semaphore<D> {
        &self.image_acquired
    }

    #[inline]
    pub fn in_flight(&self) -> &Fence<D> {
        &self.in_flight
    }
}

/// Fixed set of [`FRAMES_IN_FLIGHT`] frame slots.
///
/// Dropping the ring while any slot has pending GPU work is a logic error; the
/// renderer waits for the device to go idle first.
pub struct FrameRing<D: GpuDevice> {
    slots: Vec<FrameSlot<D>>,
}

impl<D: GpuDevice> FrameRing<D> {
    /// Creates every slot with a fresh pool, command buffer, semaphore and signaled
    /// fence.
    ///
    /// # Errors
    ///
    /// Returns an error if any resource creation fails. Slots already created are
    /// released.
    pub fn new(device: Arc<D>) -> RhiResult<Self> {
        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);

        for i in 0..FRAMES_IN_FLIGHT {
            slots.push(FrameSlot::new(device.clone())?);
            debug!("Created frame slot {}", i);
        }

        info!("Frame ring created with {} frames in flight", FRAMES_IN_FLIGHT);

        Ok(Self { slots })
    }

    /// Returns the slot of the frame `ctx` is about to draw.
    #[inline]
    pub fn current(&self, ctx: &FrameContext) -> &FrameSlot<D> {
        &self.slots[ctx.slot_index()]
    }

    #[inline]
    pub fn slot(&self, index: usize) -> Option<&FrameSlot<D>> {
        self.slots.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsv_rhi::device::Device;
    use lsv_rhi::testing::{Event, FakeDevice};

    #[test]
    fn test_frame_ring_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FrameRing<Device>>();
        assert_send::<FrameSlot<Device>>();
    }

    #[test]
    fn test_slots_start_with_signaled_fences() {
        let device = FakeDevice::new();
        let ring = FrameRing::new(device.clone()).unwrap();

        assert_eq!(ring.len(), FRAMES_IN_FLIGHT);
        for i in 0..FRAMES_IN_FLIGHT {
            let slot = ring.slot(i).unwrap();
            assert!(slot.in_flight().is_signaled());
            assert!(device.events().contains(&Event::CreateFence {
                fence: slot.in_flight().handle(),
                signaled: true,
            }));
        }
    }

    #[test]
    fn test_current_follows_frame_number() {
        let device = FakeDevice::new();
        let ring = FrameRing::new(device).unwrap();
        let mut ctx = FrameContext::new();

        let first = ring.current(&ctx).in_flight().handle();
        ctx.advance();
        let second = ring.current(&ctx).in_flight().handle();
        ctx.advance();

        assert_ne!(first, second);
        assert_eq!(ring.current(&ctx).in_flight().handle(), first);
    }

    #[test]
    fn test_drop_releases_every_slot() {
        let device = FakeDevice::new();
        drop(FrameRing::new(device.clone()).unwrap());
        device.assert_clean();
    }
}
