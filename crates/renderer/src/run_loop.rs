//! The renderer and its run loop.
//!
//! [`Renderer`] owns the frame ring, the immediate submission channel, the draw
//! targets and the presentation chain. Each iteration of the loop polls the window,
//! rebuilds the chain if the previous frame found it stale, and drives one frame.
//!
//! # Rebuild Order
//!
//! ```text
//! device idle -> drop frame ring -> drop chain -> read window size
//!   -> build chain -> resize main draw image -> new frame ring (fences signaled)
//! ```
//!
//! Recreating the ring restores the fence and semaphore state an aborted frame may
//! have left behind (a reset fence, a signaled acquire semaphore).
//!
//! # Resource Destruction
//!
//! On drop the renderer waits for the device to go idle, then releases the frame
//! ring, the immediate channel, the draw targets and the chain, in that order. The
//! device itself goes when its last `Arc` is released.

use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::{debug, error, info, trace};

use lsv_core::{FrameTimer, RenderConfig};
use lsv_platform::WindowSource;
use lsv_rhi::gpu::GpuDevice;
use lsv_rhi::immediate::ImmediateSubmitter;
use lsv_rhi::swapchain::SurfaceChain;
use lsv_rhi::{RhiError, RhiResult};

use crate::context::FrameContext;
use crate::frame_driver::{FrameDriver, FrameOutcome};
use crate::frame_ring::FrameRing;
use crate::layer::{FrameInfo, SceneRenderer, UiLayer};
use crate::targets::DrawTargets;

/// How long to sleep between iterations while the window has no drawable area.
const MINIMIZED_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Renderer creation parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RendererDesc {
    /// Drawable size of the window at startup.
    pub surface_extent: vk::Extent2D,
    /// Fixed size of the scene image.
    pub scene_extent: vk::Extent2D,
    pub clear_color: [f32; 4],
}

impl RendererDesc {
    pub fn from_config(config: &RenderConfig, drawable_size: (u32, u32)) -> Self {
        Self {
            surface_extent: vk::Extent2D {
                width: drawable_size.0,
                height: drawable_size.1,
            },
            scene_extent: vk::Extent2D {
                width: config.scene_width,
                height: config.scene_height,
            },
            clear_color: config.clear_color,
        }
    }
}

/// Result of one run loop iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// The window asked to close.
    Quit,
    /// The drawable area is zero; nothing was drawn or rebuilt.
    Skipped,
    Drawn(FrameOutcome),
}

/// Owner of every per-surface GPU object.
pub struct Renderer<D: GpuDevice> {
    // Field order is drop order.
    ring: Option<FrameRing<D>>,
    immediate: ImmediateSubmitter<D>,
    targets: DrawTargets<D>,
    chain: Option<SurfaceChain<D>>,
    device: Arc<D>,
    ctx: FrameContext,
    clear_color: [f32; 4],
    timer: FrameTimer,
    rebuild_count: u64,
}

impl<D: GpuDevice> Renderer<D> {
    /// Builds the presentation chain, draw targets, immediate channel and frame ring.
    ///
    /// # Errors
    ///
    /// Returns the first creation failure. Everything created before it is released.
    pub fn new(device: Arc<D>, desc: &RendererDesc) -> RhiResult<Self> {
        let chain = SurfaceChain::build(
            device.clone(),
            desc.surface_extent.width,
            desc.surface_extent.height,
        )?;
        let immediate = ImmediateSubmitter::new(device.clone())?;
        let targets = DrawTargets::new(
            device.clone(),
            &immediate,
            chain.extent(),
            desc.scene_extent,
        )?;
        let ring = FrameRing::new(device.clone())?;

        info!("Renderer initialized");

        Ok(Self {
            ring: Some(ring),
            immediate,
            targets,
            chain: Some(chain),
            device,
            ctx: FrameContext::new(),
            clear_color: desc.clear_color,
            timer: FrameTimer::new(),
            rebuild_count: 0,
        })
    }

    /// Runs one iteration: poll, maybe rebuild, draw.
    ///
    /// # Errors
    ///
    /// Every error is fatal; staleness is handled internally.
    pub fn tick<W, U>(
        &mut self,
        window: &mut W,
        scenes: &mut [Box<dyn SceneRenderer<D>>],
        ui: &mut U,
    ) -> RhiResult<TickOutcome>
    where
        W: WindowSource,
        U: UiLayer<D>,
    {
        window.poll_events();
        if window.quit_requested() {
            return Ok(TickOutcome::Quit);
        }

        let (width, height) = window.drawable_size();
        if width == 0 || height == 0 {
            trace!("Drawable area is zero, skipping frame");
            return Ok(TickOutcome::Skipped);
        }

        if self.ctx.take_stale() {
            self.rebuild(window)?;
        }

        let info = FrameInfo {
            frame_number: self.ctx.frame_number,
            delta: self.timer.tick(),
        };
        for scene in scenes.iter_mut() {
            scene.update(&info, window.input());
        }
        ui.begin_frame(&info);
        let draw_data = ui.end_frame();

        let ring = self.ring.as_ref().ok_or_else(not_built)?;
        let chain = self.chain.as_ref().ok_or_else(not_built)?;
        let mut driver = FrameDriver::new(ring, chain, &mut self.targets, self.clear_color);
        let outcome = driver.draw(&mut self.ctx, scenes, ui, &draw_data)?;

        Ok(TickOutcome::Drawn(outcome))
    }

    /// Iterates until the window asks to quit, then waits for the device to go idle.
    pub fn run<W, U>(
        &mut self,
        window: &mut W,
        scenes: &mut [Box<dyn SceneRenderer<D>>],
        ui: &mut U,
    ) -> RhiResult<()>
    where
        W: WindowSource,
        U: UiLayer<D>,
    {
        info!("Entering run loop");

        loop {
            match self.tick(window, scenes, ui)? {
                TickOutcome::Quit => break,
                TickOutcome::Skipped => std::thread::sleep(MINIMIZED_POLL_INTERVAL),
                TickOutcome::Drawn(_) => {}
            }
        }

        self.device.wait_idle()?;
        info!(
            "Run loop finished after {} frames and {} rebuild(s)",
            self.ctx.frame_number, self.rebuild_count
        );
        Ok(())
    }

    /// Replaces the presentation chain and frame ring to match the window's current
    /// size. Only called between frames.
    fn rebuild<W: WindowSource>(&mut self, window: &W) -> RhiResult<()> {
        info!("Rebuilding presentation chain");

        self.device.wait_idle()?;
        self.ring = None;
        self.chain = None;

        let (width, height) = window.drawable_size();
        let chain = SurfaceChain::build(self.device.clone(), width, height)?;
        let extent = chain.extent();
        self.chain = Some(chain);

        if self.targets.resize_main(self.device.clone(), extent)? {
            debug!("Main draw image follows the new surface size");
        }

        self.ring = Some(FrameRing::new(self.device.clone())?);
        self.rebuild_count += 1;

        info!(
            "Presentation chain rebuilt at {}x{}",
            extent.width, extent.height
        );
        Ok(())
    }

    #[inline]
    pub fn context(&self) -> &FrameContext {
        &self.ctx
    }

    #[inline]
    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Channel for one-off uploads outside the frame ring.
    #[inline]
    pub fn immediate(&self) -> &ImmediateSubmitter<D> {
        &self.immediate
    }

    #[inline]
    pub fn targets(&self) -> &DrawTargets<D> {
        &self.targets
    }

    #[inline]
    pub fn chain(&self) -> Option<&SurfaceChain<D>> {
        self.chain.as_ref()
    }

    /// Number of rebuilds performed so far.
    #[inline]
    pub fn rebuild_count(&self) -> u64 {
        self.rebuild_count
    }
}

impl<D: GpuDevice> Drop for Renderer<D> {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }
        self.ring = None;
        info!("Renderer shutting down");
    }
}

fn not_built() -> RhiError {
    RhiError::Swapchain("Presentation chain is not built".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desc_from_config() {
        let config = RenderConfig::default();
        let desc = RendererDesc::from_config(&config, (1920, 1080));
        assert_eq!(
            desc.surface_extent,
            vk::Extent2D {
                width: 1920,
                height: 1080
            }
        );
        assert_eq!(
            desc.scene_extent,
            vk::Extent2D {
                width: config.scene_width,
                height: config.scene_height
            }
        );
        assert_eq!(desc.clear_color, config.clear_color);
    }
}
