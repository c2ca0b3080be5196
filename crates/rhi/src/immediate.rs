//! Immediate submission channel.
//!
//! One-off GPU work outside the frame ring: image initialization and buffer uploads.
//! Every call records into the channel's own command buffer, submits it and blocks
//! until the GPU has finished.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::immediate::ImmediateSubmitter;
//!
//! # fn example(device: Arc<Device>, image: lsv_rhi::vk::Image) -> Result<(), lsv_rhi::RhiError> {
//! let immediate = ImmediateSubmitter::new(device)?;
//! immediate.submit(|cmd| {
//!     cmd.pipeline_barrier(&lsv_rhi::barrier::image_barrier(
//!         image,
//!         lsv_rhi::vk::ImageLayout::UNDEFINED,
//!         lsv_rhi::vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
//!     ));
//!     Ok(())
//! })?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, SubmitDesc};
use crate::sync::Fence;

/// How long an immediate submission may take before it is reported as hung.
pub const IMMEDIATE_TIMEOUT_NS: u64 = 9_999_999_999;

/// Synchronous command-and-wait path.
///
/// Not reentrant: the closure passed to [`submit`](Self::submit) must not call back
/// into the same channel.
pub struct ImmediateSubmitter<D: GpuDevice> {
    device: Arc<D>,
    // Field order is drop order: the fence and buffer go before their pool.
    fence: Fence<D>,
    cmd: CommandBuffer<D>,
    _pool: CommandPool<D>,
}

impl<D: GpuDevice> ImmediateSubmitter<D> {
    /// Creates the channel's pool, command buffer and (unsignaled) fence.
    pub fn new(device: Arc<D>) -> RhiResult<Self> {
        let pool = CommandPool::new_transient(device.clone())?;
        let cmd = CommandBuffer::new(device.clone(), &pool)?;
        let fence = Fence::new(device.clone(), false)?;

        debug!("Immediate submission channel created");

        Ok(Self {
            device,
            fence,
            cmd,
            _pool: pool,
        })
    }

    /// Records `record` into a one-time command buffer, submits it and waits for it
    /// to complete.
    ///
    /// # Errors
    ///
    /// Errors from `record` abort the submission. A GPU that does not finish within
    /// [`IMMEDIATE_TIMEOUT_NS`] yields [`RhiError::Timeout`].
    pub fn submit<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer<D>) -> RhiResult<()>,
    {
        self.fence.reset()?;
        self.cmd.reset()?;

        self.cmd.begin()?;
        record(&self.cmd)?;
        self.cmd.end()?;

        self.device.submit(&SubmitDesc {
            command_buffer: self.cmd.handle(),
            wait: None,
            signal: None,
            fence: self.fence.handle(),
        })?;

        self.fence.wait(IMMEDIATE_TIMEOUT_NS)
    }

    /// Copies `data` into the device-local buffer `dst` through a staging buffer.
    ///
    /// The staging buffer lives until the copy has been confirmed complete.
    pub fn upload_buffer(&self, dst: &Buffer<D>, data: &[u8]) -> RhiResult<()> {
        let size = data.len() as vk::DeviceSize;
        if size > dst.size() {
            return Err(RhiError::Resource(format!(
                "Upload of {} bytes exceeds {} buffer of {} bytes",
                size,
                dst.usage().name(),
                dst.size()
            )));
        }

        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, data)?;

        self.submit(|cmd| {
            cmd.copy_buffer(staging.handle(), dst.handle(), size);
            Ok(())
        })?;

        debug!("Uploaded {} bytes to {} buffer", size, dst.usage().name());
        drop(staging);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeDevice};

    #[test]
    fn test_submit_resets_records_submits_and_waits() {
        let device = FakeDevice::new();
        let immediate = ImmediateSubmitter::new(device.clone()).unwrap();
        device.clear_events();

        let mut called = false;
        immediate
            .submit(|_| {
                called = true;
                Ok(())
            })
            .unwrap();
        assert!(called);

        let events = device.events();
        assert!(matches!(events[0], Event::ResetFence(_)));
        assert!(matches!(events[1], Event::ResetCommandBuffer(_)));
        assert!(matches!(events[2], Event::BeginCommandBuffer(_)));
        assert!(matches!(events[3], Event::EndCommandBuffer(_)));
        assert!(matches!(events[4], Event::Submit(_)));
        assert!(matches!(events[5], Event::WaitFence(_)));
    }

    #[test]
    fn test_record_error_skips_submission() {
        let device = FakeDevice::new();
        let immediate = ImmediateSubmitter::new(device.clone()).unwrap();
        device.clear_events();

        let result = immediate.submit(|_| Err(RhiError::Resource("nope".to_string())));
        assert!(result.is_err());
        assert!(
            !device
                .events()
                .iter()
                .any(|e| matches!(e, Event::Submit(_)))
        );
    }

    #[test]
    fn test_upload_frees_staging_after_wait() {
        let device = FakeDevice::new();
        let immediate = ImmediateSubmitter::new(device.clone()).unwrap();
        let dst = Buffer::new(device.clone(), BufferUsage::Vertex, 16).unwrap();
        device.clear_events();

        immediate.upload_buffer(&dst, &[7u8; 16]).unwrap();

        let events = device.events();
        let staging = events
            .iter()
            .find_map(|e| match e {
                Event::CopyBuffer { src, .. } => Some(*src),
                _ => None,
            })
            .unwrap();
        let wait_at = events
            .iter()
            .position(|e| matches!(e, Event::WaitFence(_)))
            .unwrap();
        let free_at = events
            .iter()
            .position(|e| *e == Event::DestroyBuffer(staging))
            .unwrap();
        assert!(wait_at < free_at);
        assert!(
            events.contains(&Event::CopyBuffer {
                src: staging,
                dst: dst.handle(),
                size: 16,
            })
        );
    }

    #[test]
    fn test_upload_larger_than_destination_fails() {
        let device = FakeDevice::new();
        let immediate = ImmediateSubmitter::new(device.clone()).unwrap();
        let dst = Buffer::new(device.clone(), BufferUsage::Index, 4).unwrap();
        assert!(immediate.upload_buffer(&dst, &[0u8; 8]).is_err());
    }
}
