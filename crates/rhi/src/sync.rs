//! Synchronization primitives.
//!
//! This module provides owning wrappers for the two synchronization objects the
//! frame lifecycle uses:
//! - [`Semaphore`] - GPU-to-GPU ordering between queue operations (image acquired,
//!   render finished)
//! - [`Fence`] - GPU-to-CPU completion signal the host can wait on
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::sync::{Fence, Semaphore};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lsv_rhi::RhiError> {
//! let image_acquired = Semaphore::new(device.clone())?;
//!
//! // Signaled so the first wait on it never blocks.
//! let commands_complete = Fence::new(device, true)?;
//!
//! commands_complete.wait(1_000_000_000)?;
//! commands_complete.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::error::RhiResult;
use crate::gpu::GpuDevice;

/// Owned semaphore.
///
/// Semaphores order queue operations without involving the CPU:
/// - image acquired: signaled by acquisition, waited on by the frame submission
/// - render finished: signaled by the frame submission, waited on by presentation
pub struct Semaphore<D: GpuDevice> {
    device: Arc<D>,
    semaphore: vk::Semaphore,
}

impl<D: GpuDevice> Semaphore<D> {
    /// Creates a new semaphore in the unsignaled state.
    pub fn new(device: Arc<D>) -> RhiResult<Self> {
        let semaphore = device.create_semaphore()?;
        debug!("Created semaphore");
        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl<D: GpuDevice> Drop for Semaphore<D> {
    fn drop(&mut self) {
        self.device.destroy_semaphore(self.semaphore);
        debug!("Destroyed semaphore");
    }
}

/// Owned fence.
///
/// Fences let the host wait for GPU work:
/// - frame slot fence: waited on before the slot's command buffer is reused
/// - immediate submission fence: waited on before a one-off upload returns
pub struct Fence<D: GpuDevice> {
    device: Arc<D>,
    fence: vk::Fence,
}

impl<D: GpuDevice> Fence<D> {
    /// Creates a new fence.
    ///
    /// # Arguments
    ///
    /// * `device` - The device
    /// * `signaled` - If true, the fence starts signaled so the first wait on it
    ///   returns immediately.
    pub fn new(device: Arc<D>, signaled: bool) -> RhiResult<Self> {
        let fence = device.create_fence(signaled)?;
        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );
        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Waits for the fence to become signaled.
    ///
    /// # Errors
    ///
    /// Returns [`crate::RhiError::Timeout`] if `timeout_ns` expires first.
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        self.device.wait_for_fence(self.fence, timeout_ns)
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be in use by any pending queue operation.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_fence(self.fence)
    }

    /// Non-blocking status query.
    pub fn is_signaled(&self) -> bool {
        matches!(self.device.fence_signaled(self.fence), Ok(true))
    }
}

impl<D: GpuDevice> Drop for Fence<D> {
    fn drop(&mut self) {
        self.device.destroy_fence(self.fence);
        debug!("Destroyed fence");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::testing::{Event, FakeDevice};

    #[test]
    fn test_semaphore_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore<Device>>();
    }

    #[test]
    fn test_fence_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Fence<Device>>();
    }

    #[test]
    fn test_signaled_fence_wait_returns_immediately() {
        let device = FakeDevice::new();
        let fence = Fence::new(device.clone(), true).unwrap();
        assert!(fence.is_signaled());
        fence.wait(1_000_000_000).unwrap();
        fence.reset().unwrap();
        assert!(!fence.is_signaled());
    }

    #[test]
    fn test_unsignaled_fence_without_work_times_out() {
        let device = FakeDevice::new();
        let fence = Fence::new(device.clone(), false).unwrap();
        let err = fence.wait(1_000).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::SynchronizationTimeout);
    }

    #[test]
    fn test_drop_destroys_handles_once() {
        let device = FakeDevice::new();
        let (fence_handle, semaphore_handle) = {
            let fence = Fence::new(device.clone(), true).unwrap();
            let semaphore = Semaphore::new(device.clone()).unwrap();
            (fence.handle(), semaphore.handle())
        };
        let events = device.events();
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == Event::DestroyFence(fence_handle))
                .count(),
            1
        );
        assert_eq!(
            events
                .iter()
                .filter(|e| **e == Event::DestroySemaphore(semaphore_handle))
                .count(),
            1
        );
        device.assert_clean();
    }
}
