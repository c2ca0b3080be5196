//! Recording fake device for tests.
//!
//! [`FakeDevice`] implements [`GpuDevice`] without a GPU. It hands out fresh handles,
//! appends every call to an ordered [`Event`] log and checks the host-visible rules a
//! validation layer would check:
//!
//! - handles are destroyed exactly once and never used after destruction
//! - a fence is not submitted while signaled and not reset while its work is pending
//! - a command buffer is not reset or re-recorded while its last submission is pending
//! - a semaphore is not signaled twice without a wait in between, and never waited on
//!   without a pending signal
//!
//! Broken rules are collected as violations rather than panicking, so a test can run
//! a whole scenario and then call [`FakeDevice::assert_clean`].
//!
//! GPU work completes instantly: waiting on a fence with pending work signals it.
//! Waiting on an unsignaled fence with nothing pending returns
//! [`RhiError::Timeout`], which is what a real device would do after the bound.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use ash::vk;
use ash::vk::Handle;

use crate::barrier::ImageBarrier;
use crate::buffer::BufferUsage;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{
    AcquireOutcome, GpuDevice, ImageDesc, PresentOutcome, Staleness, SubmitDesc,
    SwapchainImages,
};
use crate::rendering::ColorAttachment;

/// One call made on the fake device.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    CreateFence { fence: vk::Fence, signaled: bool },
    DestroyFence(vk::Fence),
    WaitFence(vk::Fence),
    ResetFence(vk::Fence),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    CreateCommandPool(vk::CommandPool),
    DestroyCommandPool(vk::CommandPool),
    AllocateCommandBuffer(vk::CommandBuffer),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Barrier {
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },
    ClearColor {
        cmd: vk::CommandBuffer,
        image: vk::Image,
        color: [f32; 4],
    },
    Blit {
        cmd: vk::CommandBuffer,
        src: vk::Image,
        dst: vk::Image,
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    },
    BeginRendering {
        cmd: vk::CommandBuffer,
        view: vk::ImageView,
        extent: vk::Extent2D,
    },
    EndRendering(vk::CommandBuffer),
    BindPipeline(vk::Pipeline),
    BindDescriptorSet(vk::DescriptorSet),
    BindVertexBuffer(vk::Buffer),
    BindIndexBuffer(vk::Buffer),
    SetViewportAndScissor(vk::Rect2D),
    PushConstants { size: usize },
    Draw { vertex_count: u32 },
    DrawIndexed { index_count: u32 },
    Submit(SubmitDesc),
    WaitIdle,
    CreateImage(vk::Image),
    DestroyImage(vk::Image),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateSampler(vk::Sampler),
    DestroySampler(vk::Sampler),
    CreateBuffer(vk::Buffer),
    WriteBuffer { size: usize },
    DestroyBuffer(vk::Buffer),
    CreateSwapchain {
        swapchain: vk::SwapchainKHR,
        extent: vk::Extent2D,
    },
    DestroySwapchain(vk::SwapchainKHR),
    Acquire {
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        outcome: AcquireOutcome,
    },
    AcquireTimeout(vk::SwapchainKHR),
    Present {
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
        outcome: PresentOutcome,
    },
}

/// Memory handed out by [`FakeDevice`].
#[derive(Debug, PartialEq, Eq)]
pub struct FakeAllocation {
    id: u64,
    size: vk::DeviceSize,
    host_visible: bool,
}

/// Scripted result of one acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScriptedAcquire {
    Stale(Staleness),
    Timeout,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Kind {
    Fence,
    Semaphore,
    CommandPool,
    CommandBuffer,
    Image,
    SwapchainImage,
    ImageView,
    Sampler,
    Buffer,
    Swapchain,
}

#[derive(Default)]
struct FenceState {
    signaled: bool,
    pending: bool,
}

#[derive(Default)]
struct State {
    next_handle: u64,
    events: Vec<Event>,
    violations: Vec<String>,
    live: HashMap<u64, Kind>,
    fences: HashMap<u64, FenceState>,
    signaled_semaphores: HashSet<u64>,
    recording: HashSet<u64>,
    /// Fence of the last submission of each command buffer.
    in_flight: HashMap<u64, u64>,
    swapchain_images: HashMap<u64, Vec<u64>>,
    pool_buffers: HashMap<u64, Vec<u64>>,
    next_image: HashMap<u64, u32>,
    acquire_count: usize,
    present_count: usize,
    acquire_script: HashMap<usize, ScriptedAcquire>,
    present_script: HashMap<usize, Staleness>,
}

impl State {
    fn create(&mut self, kind: Kind) -> u64 {
        self.next_handle += 1;
        let raw = 0x1000 + self.next_handle;
        self.live.insert(raw, kind);
        raw
    }

    fn destroy(&mut self, raw: u64, kind: Kind) {
        match self.live.remove(&raw) {
            Some(found) if found == kind => {}
            Some(found) => {
                self.live.insert(raw, found);
                self.violations
                    .push(format!("{kind:?} {raw:#x} destroyed as the wrong kind ({found:?})"));
            }
            None => self
                .violations
                .push(format!("{kind:?} {raw:#x} destroyed twice or never created")),
        }
    }

    fn check_live(&mut self, raw: u64, kind: Kind, action: &str) {
        if raw == 0 {
            return;
        }
        if !self.live.contains_key(&raw) {
            self.violations
                .push(format!("{action}: {kind:?} {raw:#x} is not alive"));
        }
    }

    fn check_image(&mut self, raw: u64, action: &str) {
        match self.live.get(&raw) {
            Some(Kind::Image) | Some(Kind::SwapchainImage) => {}
            _ => self
                .violations
                .push(format!("{action}: image {raw:#x} is not alive")),
        }
    }

    fn check_recording(&mut self, cmd: vk::CommandBuffer, action: &str) {
        self.check_live(cmd.as_raw(), Kind::CommandBuffer, action);
        if !self.recording.contains(&cmd.as_raw()) {
            self.violations
                .push(format!("{action}: command buffer {:#x} is not recording", cmd.as_raw()));
        }
    }

    fn check_not_in_flight(&mut self, cmd: vk::CommandBuffer, action: &str) {
        if let Some(fence) = self.in_flight.get(&cmd.as_raw())
            && self.fences.get(fence).is_some_and(|f| f.pending)
        {
            self.violations.push(format!(
                "{action}: command buffer {:#x} is still in flight",
                cmd.as_raw()
            ));
        }
    }

    fn signal_semaphore(&mut self, raw: u64, action: &str) {
        self.check_live(raw, Kind::Semaphore, action);
        if !self.signaled_semaphores.insert(raw) {
            self.violations.push(format!(
                "{action}: semaphore {raw:#x} signaled again before anyone waited on it"
            ));
        }
    }

    fn consume_semaphore(&mut self, raw: u64, action: &str) {
        self.check_live(raw, Kind::Semaphore, action);
        if !self.signaled_semaphores.remove(&raw) {
            self.violations.push(format!(
                "{action}: waiting on semaphore {raw:#x} with no pending signal"
            ));
        }
    }
}

/// GPU-less [`GpuDevice`] that records and checks every call.
pub struct FakeDevice {
    state: Mutex<State>,
    image_count: usize,
}

impl FakeDevice {
    /// Creates a fake whose presentation chains have two images.
    pub fn new() -> Arc<Self> {
        Self::with_image_count(2)
    }

    /// Creates a fake whose presentation chains have `image_count` images.
    pub fn with_image_count(image_count: usize) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(State::default()),
            image_count,
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the `nth` acquisition (1-based, counted over the device lifetime) report
    /// staleness or time out.
    pub fn script_acquire(&self, nth: usize, result: ScriptedAcquire) {
        self.state().acquire_script.insert(nth, result);
    }

    /// Makes the `nth` presentation (1-based) report staleness.
    pub fn script_present(&self, nth: usize, staleness: Staleness) {
        self.state().present_script.insert(nth, staleness);
    }

    /// Number of acquisitions made so far.
    pub fn acquire_count(&self) -> usize {
        self.state().acquire_count
    }

    /// Number of presentations made so far.
    pub fn present_count(&self) -> usize {
        self.state().present_count
    }

    /// Registers a standalone image, for recording tests that need a target.
    pub fn create_test_image(&self) -> vk::Image {
        vk::Image::from_raw(self.state().create(Kind::Image))
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn clear_events(&self) {
        self.state().events.clear();
    }

    /// Every submission in order.
    pub fn submits(&self) -> Vec<SubmitDesc> {
        self.state()
            .events
            .iter()
            .filter_map(|e| match e {
                Event::Submit(submit) => Some(*submit),
                _ => None,
            })
            .collect()
    }

    pub fn violations(&self) -> Vec<String> {
        self.state().violations.clone()
    }

    /// Number of handles created and not yet destroyed.
    pub fn live_count(&self) -> usize {
        self.state()
            .live
            .values()
            .filter(|kind| **kind != Kind::CommandBuffer && **kind != Kind::SwapchainImage)
            .count()
    }

    /// Panics if any rule was broken so far.
    pub fn assert_no_violations(&self) {
        let violations = self.violations();
        assert!(violations.is_empty(), "device rule violations: {violations:#?}");
    }

    /// Panics if any rule was broken or any handle is still alive.
    pub fn assert_clean(&self) {
        self.assert_no_violations();
        let state = self.state();
        let leaked: Vec<_> = state
            .live
            .iter()
            .filter(|(_, kind)| **kind != Kind::CommandBuffer && **kind != Kind::SwapchainImage)
            .map(|(raw, kind)| format!("{kind:?} {raw:#x}"))
            .collect();
        assert!(leaked.is_empty(), "leaked handles: {leaked:#?}");
    }
}

impl GpuDevice for FakeDevice {
    type Allocation = FakeAllocation;

    fn graphics_queue_family(&self) -> u32 {
        0
    }

    fn submit(&self, submit: &SubmitDesc) -> RhiResult<()> {
        let mut state = self.state();
        let cmd = submit.command_buffer.as_raw();
        state.check_live(cmd, Kind::CommandBuffer, "submit");
        if state.recording.contains(&cmd) {
            state
                .violations
                .push(format!("submit: command buffer {cmd:#x} is still recording"));
        }
        if let Some((semaphore, _)) = submit.wait {
            state.consume_semaphore(semaphore.as_raw(), "submit");
        }
        if let Some(semaphore) = submit.signal {
            state.signal_semaphore(semaphore.as_raw(), "submit");
        }
        let fence = submit.fence.as_raw();
        if fence != 0 {
            state.check_live(fence, Kind::Fence, "submit");
            let fence_state = state.fences.entry(fence).or_default();
            let already = fence_state.signaled || fence_state.pending;
            fence_state.pending = true;
            if already {
                state
                    .violations
                    .push(format!("submit: fence {fence:#x} is not unsignaled"));
            }
            state.in_flight.insert(cmd, fence);
        }
        state.events.push(Event::Submit(*submit));
        Ok(())
    }

    fn wait_idle(&self) -> RhiResult<()> {
        let mut state = self.state();
        for fence in state.fences.values_mut() {
            if fence.pending {
                fence.pending = false;
                fence.signaled = true;
            }
        }
        state.events.push(Event::WaitIdle);
        Ok(())
    }

    fn create_fence(&self, signaled: bool) -> RhiResult<vk::Fence> {
        let mut state = self.state();
        let raw = state.create(Kind::Fence);
        state.fences.insert(
            raw,
            FenceState {
                signaled,
                pending: false,
            },
        );
        let fence = vk::Fence::from_raw(raw);
        state.events.push(Event::CreateFence { fence, signaled });
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state();
        state.destroy(fence.as_raw(), Kind::Fence);
        if state.fences.remove(&fence.as_raw()).is_some_and(|f| f.pending) {
            state
                .violations
                .push(format!("destroy: fence {:#x} has pending work", fence.as_raw()));
        }
        state.events.push(Event::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> RhiResult<()> {
        let mut state = self.state();
        state.check_live(fence.as_raw(), Kind::Fence, "wait");
        state.events.push(Event::WaitFence(fence));
        let fence_state = state.fences.entry(fence.as_raw()).or_default();
        if fence_state.pending {
            fence_state.pending = false;
            fence_state.signaled = true;
        }
        if fence_state.signaled {
            Ok(())
        } else {
            Err(RhiError::Timeout {
                what: "fence",
                timeout_ns,
            })
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> RhiResult<()> {
        let mut state = self.state();
        state.check_live(fence.as_raw(), Kind::Fence, "reset");
        let fence_state = state.fences.entry(fence.as_raw()).or_default();
        let pending = fence_state.pending;
        fence_state.signaled = false;
        if pending {
            state
                .violations
                .push(format!("reset: fence {:#x} has pending work", fence.as_raw()));
        }
        state.events.push(Event::ResetFence(fence));
        Ok(())
    }

    fn fence_signaled(&self, fence: vk::Fence) -> RhiResult<bool> {
        let state = self.state();
        Ok(state
            .fences
            .get(&fence.as_raw())
            .is_some_and(|f| f.signaled))
    }

    fn create_semaphore(&self) -> RhiResult<vk::Semaphore> {
        let mut state = self.state();
        let semaphore = vk::Semaphore::from_raw(state.create(Kind::Semaphore));
        state.events.push(Event::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state();
        state.destroy(semaphore.as_raw(), Kind::Semaphore);
        state.signaled_semaphores.remove(&semaphore.as_raw());
        state.events.push(Event::DestroySemaphore(semaphore));
    }

    fn create_command_pool(&self, _transient: bool) -> RhiResult<vk::CommandPool> {
        let mut state = self.state();
        let pool = vk::CommandPool::from_raw(state.create(Kind::CommandPool));
        state.events.push(Event::CreateCommandPool(pool));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        let mut state = self.state();
        state.destroy(pool.as_raw(), Kind::CommandPool);
        let buffers = state
            .pool_buffers
            .remove(&pool.as_raw())
            .unwrap_or_default();
        for cmd in buffers {
            state.live.remove(&cmd);
            state.recording.remove(&cmd);
        }
        state.events.push(Event::DestroyCommandPool(pool));
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> RhiResult<vk::CommandBuffer> {
        let mut state = self.state();
        state.check_live(pool.as_raw(), Kind::CommandPool, "allocate");
        let raw = state.create(Kind::CommandBuffer);
        state.pool_buffers.entry(pool.as_raw()).or_default().push(raw);
        let cmd = vk::CommandBuffer::from_raw(raw);
        state.events.push(Event::AllocateCommandBuffer(cmd));
        Ok(cmd)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let mut state = self.state();
        state.check_live(cmd.as_raw(), Kind::CommandBuffer, "reset");
        state.check_not_in_flight(cmd, "reset");
        state.recording.remove(&cmd.as_raw());
        state.events.push(Event::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let mut state = self.state();
        state.check_live(cmd.as_raw(), Kind::CommandBuffer, "begin");
        state.check_not_in_flight(cmd, "begin");
        if !state.recording.insert(cmd.as_raw()) {
            state.violations.push(format!(
                "begin: command buffer {:#x} is already recording",
                cmd.as_raw()
            ));
        }
        state.events.push(Event::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> RhiResult<()> {
        let mut state = self.state();
        state.check_recording(cmd, "end");
        state.recording.remove(&cmd.as_raw());
        state.events.push(Event::EndCommandBuffer(cmd));
        Ok(())
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let mut state = self.state();
        state.check_recording(cmd, "barrier");
        state.check_image(barrier.image.as_raw(), "barrier");
        state.events.push(Event::Barrier {
            cmd,
            image: barrier.image,
            old: barrier.old_layout,
            new: barrier.new_layout,
        });
    }

    fn cmd_clear_color_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        _layout: vk::ImageLayout,
        color: [f32; 4],
    ) {
        let mut state = self.state();
        state.check_recording(cmd, "clear");
        state.check_image(image.as_raw(), "clear");
        state.events.push(Event::ClearColor { cmd, image, color });
    }

    fn cmd_blit_image(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Image,
        src_extent: vk::Extent2D,
        dst: vk::Image,
        dst_extent: vk::Extent2D,
    ) {
        let mut state = self.state();
        state.check_recording(cmd, "blit");
        state.check_image(src.as_raw(), "blit");
        state.check_image(dst.as_raw(), "blit");
        state.events.push(Event::Blit {
            cmd,
            src,
            dst,
            src_extent,
            dst_extent,
        });
    }

    fn cmd_copy_buffer(
        &self,
        cmd: vk::CommandBuffer,
        src: vk::Buffer,
        dst: vk::Buffer,
        size: vk::DeviceSize,
    ) {
        let mut state = self.state();
        state.check_recording(cmd, "copy");
        state.check_live(src.as_raw(), Kind::Buffer, "copy");
        state.check_live(dst.as_raw(), Kind::Buffer, "copy");
        state.events.push(Event::CopyBuffer { src, dst, size });
    }

    fn cmd_begin_rendering(
        &self,
        cmd: vk::CommandBuffer,
        attachment: &ColorAttachment,
        extent: vk::Extent2D,
    ) {
        let mut state = self.state();
        state.check_recording(cmd, "begin rendering");
        state.check_live(
            attachment.image_view.as_raw(),
            Kind::ImageView,
            "begin rendering",
        );
        state.events.push(Event::BeginRendering {
            cmd,
            view: attachment.image_view,
            extent,
        });
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        let mut state = self.state();
        state.check_recording(cmd, "end rendering");
        state.events.push(Event::EndRendering(cmd));
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        let mut state = self.state();
        state.check_recording(cmd, "bind pipeline");
        state.events.push(Event::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
    ) {
        let mut state = self.state();
        state.check_recording(cmd, "bind descriptor set");
        state.events.push(Event::BindDescriptorSet(set));
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        let mut state = self.state();
        state.check_recording(cmd, "bind vertex buffer");
        state.check_live(buffer.as_raw(), Kind::Buffer, "bind vertex buffer");
        state.events.push(Event::BindVertexBuffer(buffer));
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        let mut state = self.state();
        state.check_recording(cmd, "bind index buffer");
        state.check_live(buffer.as_raw(), Kind::Buffer, "bind index buffer");
        state.events.push(Event::BindIndexBuffer(buffer));
    }

    fn cmd_set_viewport_and_scissor(&self, cmd: vk::CommandBuffer, area: vk::Rect2D) {
        let mut state = self.state();
        state.check_recording(cmd, "set viewport");
        state.events.push(Event::SetViewportAndScissor(area));
    }

    fn cmd_push_constants(
        &self,
        cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _stages: vk::ShaderStageFlags,
        bytes: &[u8],
    ) {
        let mut state = self.state();
        state.check_recording(cmd, "push constants");
        state
            .events
            .push(Event::PushConstants { size: bytes.len() });
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32) {
        let mut state = self.state();
        state.check_recording(cmd, "draw");
        state.events.push(Event::Draw { vertex_count });
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32) {
        let mut state = self.state();
        state.check_recording(cmd, "draw indexed");
        state.events.push(Event::DrawIndexed { index_count });
    }

    fn create_image(&self, desc: &ImageDesc) -> RhiResult<(vk::Image, FakeAllocation)> {
        let mut state = self.state();
        let raw = state.create(Kind::Image);
        let image = vk::Image::from_raw(raw);
        state.events.push(Event::CreateImage(image));
        let size = u64::from(desc.extent.width) * u64::from(desc.extent.height) * 8;
        Ok((
            image,
            FakeAllocation {
                id: raw,
                size,
                host_visible: false,
            },
        ))
    }

    fn destroy_image(&self, image: vk::Image, allocation: FakeAllocation) {
        let mut state = self.state();
        if allocation.id != image.as_raw() {
            state.violations.push(format!(
                "destroy: image {:#x} freed with a foreign allocation",
                image.as_raw()
            ));
        }
        state.destroy(image.as_raw(), Kind::Image);
        state.events.push(Event::DestroyImage(image));
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        _format: vk::Format,
    ) -> RhiResult<vk::ImageView> {
        let mut state = self.state();
        state.check_image(image.as_raw(), "create view");
        let view = vk::ImageView::from_raw(state.create(Kind::ImageView));
        state.events.push(Event::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        let mut state = self.state();
        state.destroy(view.as_raw(), Kind::ImageView);
        state.events.push(Event::DestroyImageView(view));
    }

    fn create_sampler(&self) -> RhiResult<vk::Sampler> {
        let mut state = self.state();
        let sampler = vk::Sampler::from_raw(state.create(Kind::Sampler));
        state.events.push(Event::CreateSampler(sampler));
        Ok(sampler)
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        let mut state = self.state();
        state.destroy(sampler.as_raw(), Kind::Sampler);
        state.events.push(Event::DestroySampler(sampler));
    }

    fn create_buffer(
        &self,
        usage: BufferUsage,
        size: vk::DeviceSize,
    ) -> RhiResult<(vk::Buffer, FakeAllocation)> {
        let mut state = self.state();
        let raw = state.create(Kind::Buffer);
        let buffer = vk::Buffer::from_raw(raw);
        state.events.push(Event::CreateBuffer(buffer));
        Ok((
            buffer,
            FakeAllocation {
                id: raw,
                size,
                host_visible: usage.is_host_visible(),
            },
        ))
    }

    fn write_buffer(
        &self,
        allocation: &FakeAllocation,
        offset: vk::DeviceSize,
        data: &[u8],
    ) -> RhiResult<()> {
        let mut state = self.state();
        if !allocation.host_visible {
            return Err(RhiError::Resource("Buffer memory is not mapped".to_string()));
        }
        if offset + data.len() as vk::DeviceSize > allocation.size {
            state
                .violations
                .push(format!("write: {} bytes past the allocation end", data.len()));
        }
        state.events.push(Event::WriteBuffer { size: data.len() });
        Ok(())
    }

    fn destroy_buffer(&self, buffer: vk::Buffer, allocation: FakeAllocation) {
        let mut state = self.state();
        if allocation.id != buffer.as_raw() {
            state.violations.push(format!(
                "destroy: buffer {:#x} freed with a foreign allocation",
                buffer.as_raw()
            ));
        }
        state.destroy(buffer.as_raw(), Kind::Buffer);
        state.events.push(Event::DestroyBuffer(buffer));
    }

    fn create_swapchain(&self, width: u32, height: u32) -> RhiResult<SwapchainImages> {
        let mut state = self.state();
        let swapchain_raw = state.create(Kind::Swapchain);
        let image_raws: Vec<u64> = (0..self.image_count)
            .map(|_| state.create(Kind::SwapchainImage))
            .collect();
        state.swapchain_images.insert(swapchain_raw, image_raws.clone());

        let swapchain = vk::SwapchainKHR::from_raw(swapchain_raw);
        let extent = vk::Extent2D { width, height };
        state
            .events
            .push(Event::CreateSwapchain { swapchain, extent });

        Ok(SwapchainImages {
            swapchain,
            images: image_raws.into_iter().map(vk::Image::from_raw).collect(),
            format: vk::Format::B8G8R8A8_UNORM,
            extent,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        let mut state = self.state();
        state.destroy(swapchain.as_raw(), Kind::Swapchain);
        let images = state
            .swapchain_images
            .remove(&swapchain.as_raw())
            .unwrap_or_default();
        for image in images {
            state.live.remove(&image);
        }
        state.next_image.remove(&swapchain.as_raw());
        state.events.push(Event::DestroySwapchain(swapchain));
    }

    fn acquire_next_image(
        &self,
        swapchain: vk::SwapchainKHR,
        signal: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireOutcome> {
        let mut state = self.state();
        state.acquire_count += 1;
        state.check_live(swapchain.as_raw(), Kind::Swapchain, "acquire");

        let nth = state.acquire_count;
        let outcome = match state.acquire_script.remove(&nth) {
            Some(ScriptedAcquire::Timeout) => {
                state.events.push(Event::AcquireTimeout(swapchain));
                return Err(RhiError::Timeout {
                    what: "presentable image",
                    timeout_ns,
                });
            }
            Some(ScriptedAcquire::Stale(staleness)) => AcquireOutcome::Stale(staleness),
            None => {
                let next = state.next_image.entry(swapchain.as_raw()).or_insert(0);
                let image_index = *next;
                *next = (*next + 1) % self.image_count.max(1) as u32;
                AcquireOutcome::Acquired { image_index }
            }
        };

        // A suboptimal acquisition still hands out an image and signals.
        if outcome != AcquireOutcome::Stale(Staleness::OutOfDate) {
            state.signal_semaphore(signal.as_raw(), "acquire");
        }

        state.events.push(Event::Acquire {
            swapchain,
            signal,
            outcome,
        });
        Ok(outcome)
    }

    fn present(
        &self,
        swapchain: vk::SwapchainKHR,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> RhiResult<PresentOutcome> {
        let mut state = self.state();
        state.present_count += 1;
        state.check_live(swapchain.as_raw(), Kind::Swapchain, "present");
        state.consume_semaphore(wait.as_raw(), "present");
        if image_index as usize >= self.image_count {
            state
                .violations
                .push(format!("present: image index {image_index} out of range"));
        }

        let nth = state.present_count;
        let outcome = match state.present_script.remove(&nth) {
            Some(staleness) => PresentOutcome::Stale(staleness),
            None => PresentOutcome::Presented,
        };
        state.events.push(Event::Present {
            swapchain,
            image_index,
            wait,
            outcome,
        });
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_destroy_is_a_violation() {
        let device = FakeDevice::new();
        let fence = device.create_fence(true).unwrap();
        device.destroy_fence(fence);
        device.destroy_fence(fence);
        assert_eq!(device.violations().len(), 1);
    }

    #[test]
    fn test_fence_completes_only_after_submission() {
        let device = FakeDevice::new();
        let fence = device.create_fence(false).unwrap();
        assert!(device.wait_for_fence(fence, 10).is_err());

        let pool = device.create_command_pool(false).unwrap();
        let cmd = device.allocate_command_buffer(pool).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .submit(&SubmitDesc {
                command_buffer: cmd,
                wait: None,
                signal: None,
                fence,
            })
            .unwrap();

        device.wait_for_fence(fence, 10).unwrap();
        device.destroy_fence(fence);
        device.destroy_command_pool(pool);
        device.assert_clean();
    }

    #[test]
    fn test_rerecording_in_flight_buffer_is_a_violation() {
        let device = FakeDevice::new();
        let fence = device.create_fence(false).unwrap();
        let pool = device.create_command_pool(false).unwrap();
        let cmd = device.allocate_command_buffer(pool).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        device.end_command_buffer(cmd).unwrap();
        device
            .submit(&SubmitDesc {
                command_buffer: cmd,
                wait: None,
                signal: None,
                fence,
            })
            .unwrap();

        device.reset_command_buffer(cmd).unwrap();
        assert_eq!(device.violations().len(), 1);
    }

    #[test]
    fn test_scripted_acquire_results() {
        let device = FakeDevice::with_image_count(3);
        let chain = device.create_swapchain(100, 100).unwrap();
        let semaphore = device.create_semaphore().unwrap();
        device.script_acquire(2, ScriptedAcquire::Stale(Staleness::OutOfDate));
        device.script_acquire(3, ScriptedAcquire::Timeout);

        assert_eq!(
            device
                .acquire_next_image(chain.swapchain, semaphore, 1)
                .unwrap(),
            AcquireOutcome::Acquired { image_index: 0 }
        );
        assert_eq!(
            device
                .acquire_next_image(chain.swapchain, semaphore, 1)
                .unwrap(),
            AcquireOutcome::Stale(Staleness::OutOfDate)
        );
        assert!(matches!(
            device.acquire_next_image(chain.swapchain, semaphore, 1),
            Err(RhiError::Timeout { .. })
        ));
        assert_eq!(device.acquire_count(), 3);
    }
}
