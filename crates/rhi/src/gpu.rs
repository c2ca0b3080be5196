//! Device seam.
//!
//! Every device, queue and presentation operation the frame lifecycle performs goes
//! through [`GpuDevice`]. The Vulkan implementation lives in [`crate::device::Device`];
//! tests drive the same code against the recording fake in `crate::testing`.
//!
//! Handles are plain `ash::vk` handle types. Ownership of each handle belongs to the
//! RAII wrapper that created it (see [`crate::sync`], [`crate::command`],
//! [`crate::buffer`], [`crate::image`], [`crate::swapchain`]); the trait methods are
//! the raw create/destroy pairs those wrappers call.

use ash::vk;

use crate::barrier::ImageBarrier;
use crate::buffer::BufferUsage;
use crate::error::RhiResult;
use crate::rendering::ColorAttachment;

/// Why the presentation chain no longer matches the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Staleness {
    /// The chain still works but no longer matches the surface exactly.
    Suboptimal,
    /// The chain can no longer be presented to.
    OutOfDate,
}

/// Result of asking the chain for the next presentable image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired { image_index: u32 },
    Stale(Staleness),
}

/// Result of queueing an image for presentation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentOutcome {
    Presented,
    Stale(Staleness),
}

/// One command buffer submission on the graphics queue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SubmitDesc {
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore to wait on and the stage that waits.
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags2)>,
    /// Semaphore signaled when the commands complete.
    pub signal: Option<vk::Semaphore>,
    /// Fence signaled when the commands complete.
    pub fence: vk::Fence,
}

/// A freshly created presentation chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SwapchainImages {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<vk::Image>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
}

/// Creation parameters of a device-local 2D image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
}

/// Operations the frame lifecycle needs from a GPU device.
///
/// Implementations must be usable through `Arc<Self>` from the single render thread.
/// `destroy_*` methods must tolerate being called exactly once per created handle and
/// never for handles they did not create.
pub trait GpuDevice {
    /// Device memory backing an image or buffer.
    type Allocation;

    // Queue

    fn graphics_queue_family(&self) -> u32;
    fn submit(&self, submit: &SubmitDesc) -> RhiResult<()>;
    fn wait_idle(&self) -> RhiResult<()>;

    // Synchronization

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Blocks until `fence` is signaled. Expiry is reported as [`crate::RhiError::Timeout`].
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()>;
    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()>;
    fn fence_signaled(&self, fence: vk::Fence) -> RhiResult<bool>;
    fn create_semaphore(&self) -> RhiResult<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);

    // Command recording

    /// Creates a resettable pool on the graphics queue family.
    fn create_command_pool(&self, transient: bool) -> RhiResult<vk::CommandPool>;
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer>;
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;
    /// Begins recording for a single submission.
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()>;
    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    );
    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    );
    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    );
    fn cmd_begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        attachment: &ColorAttachment,
        extent: vk::Extent2D,
    );
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    );
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    fn cmd_set_viewport_and_scissor(&self, cmd: vk::CommandBuffer, area: vk::Rect2D);
    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    );
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32);
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32);

    // Memory-backed resources

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<(vk::Image, Self::Allocation)>;
    fn destroy_image(&self, image: vk::Image, allocation: Self::Allocation);
    fn create_image_view(&self, image: vk::Image, format: vk::Format)
    -> RhiResult<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);
    fn create_sampler(&self) -> RhiResult<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);
    fn create_buffer(
        &self,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RhiResult<(vk::Buffer, Self::Allocation)>;
    /// Copies `data` into a host-visible allocation at `offset`.
    fn write_buffer(
        &self,
        allocation: &Self::Allocation,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RhiResult<()>;
    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Self::Allocation);

    // Presentation

    /// Creates a chain for the window surface sized as close to `width`x`height` as
    /// the surface allows.
    fn create_swapchain(&self, width: u32, height: u32) -> RhiResult<SwapchainImages>;
    /// Destroys the chain handle. The images it owned become invalid.
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireOutcome>;
    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<PresentOutcome>;
}
