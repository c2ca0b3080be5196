//! Vulkan logical device and queue management.
//!
//! [`Device`] is the Vulkan implementation of [`GpuDevice`]. It owns:
//! - the logical device with the one graphics queue used for rendering, transfers
//!   and presentation
//! - the gpu-allocator memory allocator
//! - the swapchain extension loader and the surface it presents to
//!
//! # Example
//!
//! ```no_run
//! use lsv_rhi::instance::Instance;
//! use lsv_rhi::physical_device::select_physical_device;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::vk;
//!
//! # fn example(instance: &Instance, surface: vk::SurfaceKHR) -> Result<(), lsv_rhi::RhiError> {
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//! let physical = select_physical_device(instance.handle(), surface, &surface_loader)?;
//! let device = Device::new(instance, surface, &physical, vk::PresentModeKHR::FIFO)?;
//! # Ok(())
//! # }
//! ```

use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex, MutexGuard};

use ash::prelude::VkResult;
use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator, AllocatorCreateDesc};
use tracing::{debug, error, info};

use crate::barrier::ImageBarrier;
use crate::buffer::BufferUsage;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{
    AcquireOutcome, GpuDevice, ImageDesc, PresentOutcome, Staleness, SubmitDesc,
    SwapchainImages,
};
use crate::instance::Instance;
use crate::physical_device::PhysicalDeviceInfo;
use crate::rendering::{ColorAttachment, viewport_for};
use crate::swapchain::{
    SwapchainSupportDetails, choose_extent, choose_present_mode, choose_surface_format,
    determine_image_count,
};

/// Required device extensions.
const DEVICE_EXTENSIONS: &[&std::ffi::CStr] = &[ash::khr::swapchain::NAME];

/// Vulkan logical device wrapper.
///
/// # Thread Safety
///
/// The [`Device`] is shared through `Arc`. The allocator is protected by a `Mutex`;
/// queue access is externally synchronized by the single render thread.
pub struct Device {
    /// Vulkan logical device handle.
    device: ash::Device,
    /// Physical device handle.
    physical_device: vk::PhysicalDevice,
    /// Dropped in `Drop` before the logical device is destroyed.
    allocator: ManuallyDrop<Mutex<Allocator>>,
    /// Graphics (and present) queue handle.
    graphics_queue: vk::Queue,
    queue_family: u32,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    /// Borrowed: owned by the window layer, which outlives the device.
    surface: vk::SurfaceKHR,
    present_mode: vk::PresentModeKHR,
}

impl Device {
    /// Creates a new logical device.
    ///
    /// This function creates a Vulkan logical device with:
    /// - The swapchain extension
    /// - Vulkan 1.1 features (shader draw parameters)
    /// - Vulkan 1.3 features (dynamic rendering, synchronization2)
    ///
    /// It also initializes the gpu-allocator for memory management.
    ///
    /// # Arguments
    ///
    /// * `instance` - The Vulkan instance
    /// * `surface` - The window surface presentation chains are built for
    /// * `physical_device_info` - The selected physical device
    /// * `present_mode` - Preferred present mode; FIFO is used when unsupported
    ///
    /// # Errors
    ///
    /// Returns an error if device creation or allocator initialization fails.
    pub fn new(
        instance: &Instance,
        surface: vk::SurfaceKHR,
        physical_device_info: &PhysicalDeviceInfo,
        present_mode: vk::PresentModeKHR,
    ) -> RhiResult<Arc<Self>> {
        let queue_family = physical_device_info.queue_family;
        let queue_priorities = [1.0f32];
        let queue_create_infos = [vk::DeviceQueueCreateInfo::default()
            .queue_family_index(queue_family)
            .queue_priorities(&queue_priorities)];

        let mut features_1_1 =
            vk::PhysicalDeviceVulkan11Features::default().shader_draw_parameters(true);

        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::default()
            .dynamic_rendering(true)
            .synchronization2(true);

        let extension_names: Vec<*const std::ffi::c_char> =
            DEVICE_EXTENSIONS.iter().map(|ext| ext.as_ptr()).collect();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .push_next(&mut features_1_1)
            .push_next(&mut features_1_3);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)?
        };

        info!(
            "Logical device created with {} extension(s)",
            DEVICE_EXTENSIONS.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(queue_family, 0) };
        debug!("Graphics queue retrieved from family {}", queue_family);

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: instance.handle().clone(),
            device: device.clone(),
            physical_device: physical_device_info.device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return Err(e.into());
            }
        };

        info!("GPU memory allocator initialized");

        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), &device);

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            queue_family,
            surface_loader,
            swapchain_loader,
            surface,
            present_mode,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    /// Returns the physical device handle.
    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    /// Returns the graphics queue handle.
    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    fn allocator(&self) -> RhiResult<MutexGuard<'_, Allocator>> {
        self.allocator
            .lock()
            .map_err(|_| RhiError::Resource("GPU allocator mutex poisoned".to_string()))
    }

    fn free(&self, allocation: Allocation) {
        match self.allocator() {
            Ok(mut allocator) => {
                if let Err(e) = allocator.free(allocation) {
                    error!("Failed to free allocation: {:?}", e);
                }
            }
            Err(e) => error!("Leaking allocation: {}", e),
        }
    }

    fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> RhiResult<Allocation> {
        Ok(self.allocator()?.allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?)
    }
}

impl GpuDevice for Device {
    type Allocation = Allocation;

    fn graphics_queue_family(&self) -> u32 {
        self.queue_family
    }

    fn submit(&self, submit: &SubmitDesc) -> RhiResult<()> {
        let command_buffers =
            [vk::CommandBufferSubmitInfo::default().command_buffer(submit.command_buffer)];

        let wait: Vec<_> = submit
            .wait
            .iter()
            .map(|&(semaphore, stage)| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore)
                    .stage_mask(stage)
                    .value(1)
            })
            .collect();

        let signal: Vec<_> = submit
            .signal
            .iter()
            .map(|&semaphore| {
                vk::SemaphoreSubmitInfo::default()
                    .semaphore(semaphore)
                    .stage_mask(vk::PipelineStageFlags2::ALL_GRAPHICS)
                    .value(1)
            })
            .collect();

        let submit_info = vk::SubmitInfo2::default()
            .command_buffer_infos(&command_buffers)
            .wait_semaphore_infos(&wait)
            .signal_semaphore_infos(&signal);

        unsafe {
            self.device
                .queue_submit2(self.graphics_queue, &[submit_info], submit.fence)?;
        }
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        unsafe { self.device.device_wait_idle()? };
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);
        Ok(unsafe { self.device.create_fence(&create_info, None)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device.destroy_fence(fence, None) };
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()> {
        let result = unsafe { self.device.wait_for_fences(&[fence], true, timeout_ns) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(RhiError::Timeout {
                what: "fence",
                timeout_ns,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        unsafe { self.device.reset_fences(&[fence])? };
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> RhiResult<bool> {
        Ok(unsafe { self.device.get_fence_status(fence)? })
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.device.create_semaphore(&create_info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device.destroy_semaphore(semaphore, None) };
    }

    fn create_command_pool(&self, transient: bool) -> RhiResult<vk::CommandPool> {
        let mut flags = vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER;
        if transient {
            flags |= vk::CommandPoolCreateFlags::TRANSIENT;
        }
        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(self.queue_family)
            .flags(flags);
        Ok(unsafe { self.device.create_command_pool(&create_info, None)? })
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device.destroy_command_pool(pool, None) };
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffers = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::Resource("Driver returned no command buffer".to_string()))
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe {
            self.device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?
        };
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(cmd, &begin_info)? };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        unsafe { self.device.end_command_buffer(cmd)? };
        Ok(())
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let barriers = [barrier.to_vk()];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device.cmd_pipeline_barrier2(cmd, &dependency_info) };
    }

    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        layout: vk::ImageLayout,
        color: [f32; 4],
    ) {
        let clear = vk::ClearColorValue { float32: color };
        let range = color_subresource_range();
        unsafe {
            self.device
                .cmd_clear_color_image(cmd, image, layout, &clear, &[range])
        };
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    ) {
        let regions = [vk::ImageBlit2::default()
            .src_subresource(color_subresource_layers())
            .src_offsets(extent_offsets(src_extent))
            .dst_subresource(color_subresource_layers())
            .dst_offsets(extent_offsets(dst_extent))];

        let blit_info = vk::BlitImageInfo2::default()
            .src_image(src)
            .src_image_layout(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
            .dst_image(dst)
            .dst_image_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
            .filter(vk::Filter::LINEAR)
            .regions(&regions);

        unsafe { self.device.cmd_blit_image2(cmd, &blit_info) };
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        let region = vk::BufferCopy::default().size(size);
        unsafe { self.device.cmd_copy_buffer(cmd, src, dst, &[region]) };
    }

    fn cmd_begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        attachment: &ColorAttachment,
        extent: vk::Extent2D,
    ) {
        let color_attachments = [attachment.to_rendering_attachment_info()];
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent,
            })
            .layer_count(1)
            .color_attachments(&color_attachments);

        unsafe { self.device.cmd_begin_rendering(cmd, &rendering_info) };
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device.cmd_end_rendering(cmd) };
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        };
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                &[],
            )
        };
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device.cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) };
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe {
            self.device
                .cmd_bind_index_buffer(cmd, buffer, 0, vk::IndexType::UINT32)
        };
    }

    fn cmd_set_viewport_and_scissor(&self, cmd: vk::CommandBuffer, area: vk::Rect2D) {
        unsafe {
            self.device.cmd_set_viewport(cmd, 0, &[viewport_for(area)]);
            self.device.cmd_set_scissor(cmd, 0, &[area]);
        }
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        unsafe { self.device.cmd_push_constants(cmd, layout, stages, 0, bytes) };
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        unsafe { self.device.cmd_draw(cmd, vertex_count, 1, 0, 0) };
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        unsafe { self.device.cmd_draw_indexed(cmd, index_count, 1, 0, 0, 0) };
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<(vk::Image, Allocation)> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { self.device.create_image(&create_info, None)? };
        let requirements = unsafe { self.device.get_image_memory_requirements(image) };

        let allocation =
            match self.allocate(desc.name, requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { self.device.destroy_image(image, None) };
                    return Err(e);
                }
            };

        if let Err(e) = unsafe {
            self.device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        } {
            self.free(allocation);
            unsafe { self.device.destroy_image(image, None) };
            return Err(e.into());
        }

        Ok((image, allocation))
    }

    fn destroy_image(&self, image: vk::Image, allocation: Allocation) {
        unsafe { self.device.destroy_image(image, None) };
        self.free(allocation);
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
    ) -> RhiResult<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(color_subresource_range());

        Ok(unsafe { self.device.create_image_view(&create_info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device.destroy_image_view(view, None) };
    }

    fn create_sampler(&self) -> RhiResult<vk::Sampler> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(false)
            .max_anisotropy(1.0)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        Ok(unsafe { self.device.create_sampler(&create_info, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.device.destroy_sampler(sampler, None) };
    }

    fn create_buffer(
        &self,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RhiResult<(vk::Buffer, Allocation)> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None)? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };

        let allocation =
            match self.allocate(usage.name(), requirements, usage.memory_location(), true) {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { self.device.destroy_buffer(buffer, None) };
                    return Err(e);
                }
            };

        if let Err(e) = unsafe {
            self.device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
        } {
            self.free(allocation);
            unsafe { self.device.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok((buffer, allocation))
    }

    fn write_buffer(
        &self,
        allocation: &Allocation,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RhiResult<()> {
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| RhiError::Resource("Buffer memory is not mapped".to_string()))?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: Allocation) {
        unsafe { self.device.destroy_buffer(buffer, None) };
        self.free(allocation);
    }

    fn create_swapchain(&self, width: u32, height: u32) -> RhiResult<SwapchainImages> {
        let support =
            SwapchainSupportDetails::query(self.physical_device, self.surface, &self.surface_loader)?;

        if !support.is_adequate() {
            return Err(RhiError::Swapchain(
                "Inadequate swapchain support (no formats or present modes)".to_string(),
            ));
        }

        let surface_format = choose_surface_format(&support.formats)
            .ok_or_else(|| RhiError::Swapchain("Surface reports no formats".to_string()))?;
        let present_mode = choose_present_mode(&support.present_modes, self.present_mode);
        let extent = choose_extent(&support.capabilities, width, height);
        let image_count = determine_image_count(&support.capabilities);

        debug!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None)? };

        let images = match unsafe { self.swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        Ok(SwapchainImages {
            swapchain,
            images,
            format: surface_format.format,
            extent,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        unsafe { self.swapchain_loader.destroy_swapchain(swapchain, None) };
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireOutcome> {
        let result = unsafe {
            self.swapchain_loader
                .acquire_next_image(swapchain, timeout_ns, signal, vk::Fence::null())
        };
        acquire_outcome(result, timeout_ns)
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let swapchains = [swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain_loader
                .queue_present(self.graphics_queue, &present_info)
        };
        present_outcome(result)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                error!("Failed to wait for device idle during drop: {:?}", e);
            }

            // The allocator frees its memory blocks through the device.
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device and the extension loaders are Send+Sync
// - vk::PhysicalDevice, vk::Queue and vk::SurfaceKHR are Copy handles
// - Allocator is protected by Mutex
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

/// Translates a raw acquisition result. Staleness is an outcome, not an error.
fn acquire_outcome(result: VkResult<(u32, bool)>, timeout_ns: u64) -> RhiResult<AcquireOutcome> {
    match result {
        Ok((image_index, false)) => Ok(AcquireOutcome::Acquired { image_index }),
        Ok((_, true)) => Ok(AcquireOutcome::Stale(Staleness::Suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale(Staleness::OutOfDate)),
        Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(RhiError::Timeout {
            what: "presentable image",
            timeout_ns,
        }),
        Err(e) => Err(e.into()),
    }
}

/// Translates a raw presentation result.
fn present_outcome(result: VkResult<bool>) -> RhiResult<PresentOutcome> {
    match result {
        Ok(false) => Ok(PresentOutcome::Presented),
        Ok(true) => Ok(PresentOutcome::Stale(Staleness::Suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale(Staleness::OutOfDate)),
        Err(e) => Err(e.into()),
    }
}

fn color_subresource_range() -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
}

fn color_subresource_layers() -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers::default()
        .aspect_mask(vk::ImageAspectFlags::COLOR)
        .mip_level(0)
        .base_array_layer(0)
        .layer_count(1)
}

/// Blit offsets covering a whole 2D extent.
fn extent_offsets(extent: vk::Extent2D) -> [vk::Offset3D; 2] {
    [
        vk::Offset3D::default(),
        vk::Offset3D {
            x: extent.width as i32,
            y: extent.height as i32,
            z: 1,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_extensions_defined() {
        assert!(DEVICE_EXTENSIONS.contains(&ash::khr::swapchain::NAME));
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }

    #[test]
    fn test_acquire_staleness_is_not_an_error() {
        assert_eq!(
            acquire_outcome(Ok((2, false)), 1).unwrap(),
            AcquireOutcome::Acquired { image_index: 2 }
        );
        assert_eq!(
            acquire_outcome(Ok((2, true)), 1).unwrap(),
            AcquireOutcome::Stale(Staleness::Suboptimal)
        );
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR), 1).unwrap(),
            AcquireOutcome::Stale(Staleness::OutOfDate)
        );
    }

    #[test]
    fn test_acquire_timeout_is_fatal() {
        for raw in [vk::Result::TIMEOUT, vk::Result::NOT_READY] {
            assert!(matches!(
                acquire_outcome(Err(raw), 1_000_000_000),
                Err(RhiError::Timeout {
                    timeout_ns: 1_000_000_000,
                    ..
                })
            ));
        }
        assert!(matches!(
            acquire_outcome(Err(vk::Result::ERROR_DEVICE_LOST), 1),
            Err(RhiError::Vulkan(vk::Result::ERROR_DEVICE_LOST))
        ));
    }

    #[test]
    fn test_present_outcomes() {
        assert_eq!(present_outcome(Ok(false)).unwrap(), PresentOutcome::Presented);
        assert_eq!(
            present_outcome(Ok(true)).unwrap(),
            PresentOutcome::Stale(Staleness::Suboptimal)
        );
        assert_eq!(
            present_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentOutcome::Stale(Staleness::OutOfDate)
        );
        assert!(present_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)).is_err());
    }

    #[test]
    fn test_blit_offsets_cover_extent() {
        let [start, end] = extent_offsets(vk::Extent2D {
            width: 1280,
            height: 720,
        });
        assert_eq!((start.x, start.y, start.z), (0, 0, 0));
        assert_eq!((end.x, end.y, end.z), (1280, 720, 1));
    }
}
