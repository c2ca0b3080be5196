//! GPU buffer management.
//!
//! Mesh data lives in device-local vertex and index buffers. It reaches them through
//! host-visible staging buffers copied on the immediate submission channel (see
//! [`crate::immediate::ImmediateSubmitter::upload_buffer`]).
//!
//! - [`BufferUsage`] defines how a buffer will be used
//! - [`Buffer`] wraps VkBuffer with its device memory allocation

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use tracing::debug;

use crate::error::{RhiError, RhiResult};
use crate::gpu::GpuDevice;

/// Buffer usage type.
///
/// Defines the intended use of the buffer, which affects
/// Vulkan usage flags and memory allocation strategy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer, filled by a transfer
    Vertex,
    /// Index buffer, filled by a transfer
    Index,
    /// Staging buffer, CPU-writable transfer source
    Staging,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST
            }
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
        }
    }

    /// Returns the preferred memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Staging => MemoryLocation::CpuToGpu,
        }
    }

    /// Returns true when the host can write the buffer directly.
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Staging => "staging",
        }
    }
}

/// GPU buffer wrapper with managed memory.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Synchronize access externally
/// when sharing between threads.
pub struct Buffer<D: GpuDevice> {
    device: Arc<D>,
    buffer: vk::Buffer,
    /// Taken on drop.
    allocation: Option<D::Allocation>,
    size: vk::DeviceSize,
    usage: BufferUsage,
}

impl<D: GpuDevice> Buffer<D> {
    /// Creates a new buffer with the specified size.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Resource`] for a zero size, or the device error if buffer
    /// or memory allocation fails.
    pub fn new(device: Arc<D>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::Resource(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let (buffer, allocation) = device.create_buffer(usage, size)?;

        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        })
    }

    /// Creates a host-visible buffer and initializes it with data.
    pub fn new_with_data(device: Arc<D>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Resource`] if:
    /// - The buffer is not host-visible
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        if !self.usage.is_host_visible() {
            return Err(RhiError::Resource(format!(
                "Cannot write {} buffer from the host",
                self.usage.name()
            )));
        }

        let end = offset + data.len() as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::Resource(format!(
                "Write exceeds buffer size: offset {} + data {} > buffer {}",
                offset,
                data.len(),
                self.size
            )));
        }

        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::Resource("Buffer allocation is not available".to_string())
        })?;

        self.device.write_buffer(allocation, offset, data)
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl<D: GpuDevice> Drop for Buffer<D> {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_buffer(self.buffer, allocation);
        }
        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Event, FakeDevice};

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        assert!(
            BufferUsage::Vertex
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::VERTEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Index
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST)
        );
        assert!(
            BufferUsage::Staging
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::TRANSFER_SRC)
        );
    }

    #[test]
    fn test_buffer_usage_memory_location() {
        assert_eq!(
            BufferUsage::Vertex.memory_location(),
            MemoryLocation::GpuOnly
        );
        assert_eq!(BufferUsage::Index.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(
            BufferUsage::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Staging.name(), "staging");
    }

    #[test]
    fn test_zero_size_is_rejected() {
        let device = FakeDevice::new();
        let result = Buffer::new(device, BufferUsage::Vertex, 0);
        assert!(matches!(result, Err(RhiError::Resource(_))));
    }

    #[test]
    fn test_write_checks_bounds_and_visibility() {
        let device = FakeDevice::new();
        let staging = Buffer::new(device.clone(), BufferUsage::Staging, 8).unwrap();
        staging.write_data(0, &[1, 2, 3, 4]).unwrap();
        assert!(staging.write_data(6, &[1, 2, 3, 4]).is_err());

        let vertex = Buffer::new(device, BufferUsage::Vertex, 8).unwrap();
        assert!(vertex.write_data(0, &[1, 2, 3, 4]).is_err());
    }

    #[test]
    fn test_drop_releases_buffer() {
        let device = FakeDevice::new();
        let handle = Buffer::new(device.clone(), BufferUsage::Index, 64)
            .unwrap()
            .handle();
        assert!(device.events().contains(&Event::DestroyBuffer(handle)));
        device.assert_clean();
    }
}
