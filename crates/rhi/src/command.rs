//! Command pool and command buffer management.
//!
//! - [`CommandPool`] owns a VkCommandPool on the graphics queue family
//! - [`CommandBuffer`] wraps a VkCommandBuffer with methods for recording commands
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::command::{CommandBuffer, CommandPool};
//!
//! # fn example(device: Arc<Device>) -> Result<(), lsv_rhi::RhiError> {
//! let pool = CommandPool::new(device.clone())?;
//! let cmd = CommandBuffer::new(device, &pool)?;
//!
//! cmd.begin()?;
//! // ... record rendering commands ...
//! cmd.end()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::barrier::ImageBarrier;
use crate::error::RhiResult;
use crate::gpu::GpuDevice;
use crate::rendering::ColorAttachment;

/// Command pool on the graphics queue family.
///
/// Pools are created with `RESET_COMMAND_BUFFER`, so buffers allocated from them can
/// be reset one at a time.
///
/// # Thread Safety
///
/// Command pools are not thread-safe. Each frame slot and the immediate submission
/// channel own a separate pool.
pub struct CommandPool<D: GpuDevice> {
    device: Arc<D>,
    pool: vk::CommandPool,
}

impl<D: GpuDevice> CommandPool<D> {
    /// Creates a pool for command buffers recorded every frame.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new(device: Arc<D>) -> RhiResult<Self> {
        let pool = device.create_command_pool(false)?;
        debug!(
            "Command pool created for queue family {}",
            device.graphics_queue_family()
        );
        Ok(Self { device, pool })
    }

    /// Creates a transient pool for short-lived, one-off command buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if command pool creation fails.
    pub fn new_transient(device: Arc<D>) -> RhiResult<Self> {
        let pool = device.create_command_pool(true)?;
        debug!(
            "Transient command pool created for queue family {}",
            device.graphics_queue_family()
        );
        Ok(Self { device, pool })
    }

    /// Returns the Vulkan command pool handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }
}

impl<D: GpuDevice> Drop for CommandPool<D> {
    fn drop(&mut self) {
        self.device.destroy_command_pool(self.pool);
        debug!("Command pool destroyed");
    }
}

/// Command buffer wrapper.
///
/// Commands are recorded between [`begin`](Self::begin) and [`end`](Self::end).
///
/// # Note
///
/// The command buffer does NOT own the underlying VkCommandBuffer handle.
/// The handle is freed when the owning [`CommandPool`] is destroyed.
pub struct CommandBuffer<D: GpuDevice> {
    device: Arc<D>,
    buffer: vk::CommandBuffer,
}

impl<D: GpuDevice> CommandBuffer<D> {
    /// Allocates a primary command buffer from `pool`.
    ///
    /// # Errors
    ///
    /// Returns an error if allocation fails.
    pub fn new(device: Arc<D>, pool: &CommandPool<D>) -> RhiResult<Self> {
        let buffer = device.allocate_command_buffer(pool.handle())?;
        Ok(Self { device, buffer })
    }

    /// Returns the raw Vulkan command buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    /// Returns the device this buffer records for.
    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording for a single submission.
    pub fn begin(&self) -> RhiResult<()> {
        self.device.begin_command_buffer(self.buffer)
    }

    /// Ends recording. The buffer is ready for submission afterwards.
    pub fn end(&self) -> RhiResult<()> {
        self.device.end_command_buffer(self.buffer)
    }

    /// Resets the command buffer to its initial state.
    pub fn reset(&self) -> RhiResult<()> {
        self.device.reset_command_buffer(self.buffer)
    }

    // =========================================================================
    // Transfer
    // =========================================================================

    /// Records an image layout transition.
    pub fn pipeline_barrier(&self, barrier: &ImageBarrier) {
        self.device.cmd_image_barrier(self.buffer, barrier);
    }

    /// Clears the whole color image, which must be in `layout`.
    pub fn clear_color_image(&self, image: vk::Image, layout: vk::ImageLayout, color: [f32; 4]) {
        self.device
            .cmd_clear_color_image(self.buffer, image, layout, color);
    }

    /// Blits the full extent of `src` (TRANSFER_SRC) onto the full extent of
    /// `dst` (TRANSFER_DST) with linear filtering.
    pub fn blit_image(
        &self,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    ) {
        self.device
            .cmd_blit_image(self.buffer, src, src_extent, dst, dst_extent);
    }

    /// Copies `size` bytes from the start of `src` to the start of `dst`.
    pub fn copy_buffer(&self, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        self.device.cmd_copy_buffer(self.buffer, src, dst, size);
    }

    // =========================================================================
    // Dynamic Rendering (Vulkan 1.3)
    // =========================================================================

    /// Begins dynamic rendering into a single color attachment.
    pub fn begin_rendering(&self, attachment: &ColorAttachment, extent: vk::Extent2D) {
        self.device
            .cmd_begin_rendering(self.buffer, attachment, extent);
    }

    /// Ends dynamic rendering.
    pub fn end_rendering(&self) {
        self.device.cmd_end_rendering(self.buffer);
    }

    // =========================================================================
    // Binding and State
    // =========================================================================

    /// Binds a graphics pipeline.
    pub fn bind_pipeline(&self, pipeline: vk::Pipeline) {
        self.device.cmd_bind_pipeline(self.buffer, pipeline);
    }

    /// Binds a descriptor set at set index 0 for graphics.
    pub fn bind_descriptor_set(&self, layout: vk::PipelineLayout, set: vk::DescriptorSet) {
        self.device.cmd_bind_descriptor_set(self.buffer, layout, set);
    }

    /// Binds a vertex buffer at binding 0, offset 0.
    pub fn bind_vertex_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_vertex_buffer(self.buffer, buffer);
    }

    /// Binds a `u32` index buffer at offset 0.
    pub fn bind_index_buffer(&self, buffer: vk::Buffer) {
        self.device.cmd_bind_index_buffer(self.buffer, buffer);
    }

    /// Sets viewport and scissor to `area`.
    pub fn set_viewport_and_scissor(&self, area: vk::Rect2D) {
        self.device.cmd_set_viewport_and_scissor(self.buffer, area);
    }

    /// Pushes constants at offset 0.
    pub fn push_constants(
        &self,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        self.device
            .cmd_push_constants(self.buffer, layout, stages, bytes);
    }

    // =========================================================================
    // Draw
    // =========================================================================

    /// Draws `vertex_count` non-indexed vertices, one instance.
    pub fn draw(&self, vertex_count: u32) {
        self.device.cmd_draw(self.buffer, vertex_count);
    }

    /// Draws `index_count` indexed vertices, one instance.
    pub fn draw_indexed(&self, index_count: u32) {
        self.device.cmd_draw_indexed(self.buffer, index_count);
    }
}
