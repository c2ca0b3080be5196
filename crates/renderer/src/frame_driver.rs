//! One frame, start to finish.
//!
//! ```text
//! Idle -> WaitFence -> AcquireImage -> Record -> Submit -> Present -> Idle
//!                           |                                 |
//!                           +-------------> Stale <-----------+
//!                                             |
//!                                             +-> Idle
//! ```
//!
//! A stale acquisition aborts the frame before anything is recorded or submitted and
//! leaves the frame number unchanged. A stale presentation also ends in `Stale`, but
//! the submission already happened, so the frame is counted before leaving.

use ash::vk;
use tracing::trace;

use lsv_rhi::RhiResult;
use lsv_rhi::barrier::image_barrier;
use lsv_rhi::command::CommandBuffer;
use lsv_rhi::gpu::{AcquireOutcome, GpuDevice, PresentOutcome, Staleness, SubmitDesc};
use lsv_rhi::image::RenderTarget;
use lsv_rhi::rendering::ColorAttachment;
use lsv_rhi::swapchain::SurfaceChain;

use crate::FRAME_TIMEOUT_NS;
use crate::context::FrameContext;
use crate::frame_ring::FrameRing;
use crate::layer::{SceneRenderer, TargetInfo, UiLayer};
use crate::targets::DrawTargets;

/// Phase of the frame being driven.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    WaitFence,
    AcquireImage,
    Record,
    Submit,
    Present,
    Stale,
}

impl FrameState {
    /// Whether `next` may directly follow `self`.
    pub fn can_enter(self, next: FrameState) -> bool {
        use FrameState::*;
        matches!(
            (self, next),
            (Idle, WaitFence)
                | (WaitFence, AcquireImage)
                | (AcquireImage, Record)
                | (AcquireImage, Stale)
                | (Record, Submit)
                | (Submit, Present)
                | (Present, Idle)
                | (Present, Stale)
                | (Stale, Idle)
        )
    }
}

/// How a frame ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Submitted and presented.
    Presented { image_index: u32 },
    /// Submitted, but presentation reported the chain stale.
    PresentStale { image_index: u32, staleness: Staleness },
    /// Acquisition reported the chain stale; nothing was recorded or submitted.
    AcquireStale(Staleness),
}

impl FrameOutcome {
    /// Whether the frame's commands reached the queue.
    pub fn submitted(&self) -> bool {
        !matches!(self, FrameOutcome::AcquireStale(_))
    }
}

/// Drives one frame against the current ring, chain and draw targets.
pub struct FrameDriver<'a, D: GpuDevice> {
    ring: &'a FrameRing<D>,
    chain: &'a SurfaceChain<D>,
    targets: &'a mut DrawTargets<D>,
    clear_color: [f32; 4],
    state: FrameState,
}

impl<'a, D: GpuDevice> FrameDriver<'a, D> {
    pub fn new(
        ring: &'a FrameRing<D>,
        chain: &'a SurfaceChain<D>,
        targets: &'a mut DrawTargets<D>,
        clear_color: [f32; 4],
    ) -> Self {
        Self {
            ring,
            chain,
            targets,
            clear_color,
            state: FrameState::Idle,
        }
    }

    #[inline]
    pub fn state(&self) -> FrameState {
        self.state
    }

    fn enter(&mut self, next: FrameState, frame_number: u64) {
        debug_assert!(
            self.state.can_enter(next),
            "illegal frame transition {:?} -> {:?}",
            self.state,
            next
        );
        trace!("Frame {}: {:?} -> {:?}", frame_number, self.state, next);
        self.state = next;
    }

    /// Draws one frame.
    ///
    /// `draw_data` is what the UI layer produced for this iteration.
    ///
    /// # Errors
    ///
    /// Any device error, including a fence or acquire wait exceeding
    /// [`FRAME_TIMEOUT_NS`], is returned unchanged and is fatal. Staleness is never
    /// an error.
    pub fn draw<U: UiLayer<D>>(
        &mut self,
        ctx: &mut FrameContext,
        scenes: &mut [Box<dyn SceneRenderer<D>>],
        ui: &mut U,
        draw_data: &U::DrawData,
    ) -> RhiResult<FrameOutcome> {
        let ring = self.ring;
        let chain = self.chain;
        let frame_number = ctx.frame_number;
        let slot = ring.current(ctx);

        self.enter(FrameState::WaitFence, frame_number);
        slot.in_flight().wait(FRAME_TIMEOUT_NS)?;
        slot.in_flight().reset()?;

        self.enter(FrameState::AcquireImage, frame_number);
        let image_index = match chain.acquire(slot.image_acquired(), FRAME_TIMEOUT_NS)? {
            AcquireOutcome::Acquired { image_index } => image_index,
            AcquireOutcome::Stale(staleness) => {
                ctx.mark_stale(staleness);
                self.enter(FrameState::Stale, frame_number);
                self.enter(FrameState::Idle, frame_number);
                return Ok(FrameOutcome::AcquireStale(staleness));
            }
        };

        self.enter(FrameState::Record, frame_number);
        let cmd = slot.command_buffer();
        cmd.reset()?;
        cmd.begin()?;
        self.record(cmd, image_index, scenes, ui, draw_data)?;
        cmd.end()?;

        self.enter(FrameState::Submit, frame_number);
        cmd.device().submit(&SubmitDesc {
            command_buffer: cmd.handle(),
            wait: Some((
                slot.image_acquired().handle(),
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            )),
            signal: Some(chain.render_finished(image_index)?.handle()),
            fence: slot.in_flight().handle(),
        })?;

        self.enter(FrameState::Present, frame_number);
        let outcome = match chain.present(image_index)? {
            PresentOutcome::Presented => FrameOutcome::Presented { image_index },
            PresentOutcome::Stale(staleness) => {
                ctx.mark_stale(staleness);
                FrameOutcome::PresentStale {
                    image_index,
                    staleness,
                }
            }
        };

        ctx.advance();
        if !matches!(outcome, FrameOutcome::Presented { .. }) {
            self.enter(FrameState::Stale, frame_number);
        }
        self.enter(FrameState::Idle, frame_number);
        Ok(outcome)
    }

    fn record<U: UiLayer<D>>(
        &mut self,
        cmd: &CommandBuffer<D>,
        image_index: u32,
        scenes: &mut [Box<dyn SceneRenderer<D>>],
        ui: &mut U,
        draw_data: &U::DrawData,
    ) -> RhiResult<()> {
        let clear_color = self.clear_color;
        let swapchain_image = self.chain.image(image_index)?;

        // Scene image: drawn by the scene renderers, then sampled by the UI
        let scene = self.targets.scene_mut();
        let scene_info = begin_target(cmd, scene, clear_color)?;
        for renderer in scenes.iter_mut() {
            renderer.record(cmd, &scene_info)?;
        }
        end_target(cmd, scene, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?;

        // Main image: the UI composites into it
        let main = self.targets.main_mut();
        let main_info = begin_target(cmd, main, clear_color)?;
        ui.render(draw_data, cmd, &main_info)?;
        end_target(cmd, main, vk::ImageLayout::TRANSFER_SRC_OPTIMAL)?;

        // Presentable image
        cmd.pipeline_barrier(&image_barrier(
            swapchain_image,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        ));
        cmd.blit_image(
            main.image(),
            main.extent(),
            swapchain_image,
            self.chain.extent(),
        );
        cmd.pipeline_barrier(&image_barrier(
            swapchain_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        ));

        Ok(())
    }
}

/// Discards and clears `target`, then begins dynamic rendering into it.
fn begin_target<D: GpuDevice>(
    cmd: &CommandBuffer<D>,
    target: &mut RenderTarget<D>,
    clear_color: [f32; 4],
) -> RhiResult<TargetInfo> {
    target.discard_to(cmd, vk::ImageLayout::GENERAL);
    target.clear(cmd, clear_color)?;
    target.transition_to(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

    let info = TargetInfo {
        image_view: target.view(),
        extent: target.extent(),
        format: target.format(),
    };
    cmd.begin_rendering(&ColorAttachment::new(info.image_view), info.extent);
    Ok(info)
}

/// Ends dynamic rendering into `target` and moves it on to `next_layout`.
///
/// # Errors
///
/// [`RhiError::InvalidLayout`](lsv_rhi::RhiError::InvalidLayout) when `target` is
/// not a color attachment, i.e. rendering was never begun on it.
fn end_target<D: GpuDevice>(
    cmd: &CommandBuffer<D>,
    target: &mut RenderTarget<D>,
    next_layout: vk::ImageLayout,
) -> RhiResult<()> {
    cmd.end_rendering();
    target.transition_from(cmd, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL, next_layout)
}
