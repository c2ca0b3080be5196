//! Interfaces of the collaborators the renderer drives.
//!
//! The renderer never interprets draw content. Scene renderers and the UI layer
//! record into a command buffer while a color target is bound for dynamic rendering.
//! The window source (from `lsv-platform`) supplies the drawable size, event polling,
//! input and the quit signal.

use std::time::Duration;

use ash::vk;
use lsv_platform::InputState;
use lsv_rhi::RhiResult;
use lsv_rhi::command::CommandBuffer;
use lsv_rhi::gpu::GpuDevice;

/// Per-iteration timing handed to the UI layer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    pub frame_number: u64,
    /// CPU time since the previous iteration.
    pub delta: Duration,
}

/// The color target a collaborator is recording into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetInfo {
    pub image_view: vk::ImageView,
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

impl TargetInfo {
    /// Rectangle covering the whole target.
    pub fn full_rect(&self) -> vk::Rect2D {
        lsv_rhi::rendering::full_rect(self.extent)
    }
}

/// Draws scene content into the scene image.
pub trait SceneRenderer<D: GpuDevice> {
    /// Advances scene state once per drawn iteration, before recording.
    fn update(&mut self, _info: &FrameInfo, _input: &InputState) {}

    /// Records draw commands. Dynamic rendering into `target` is active.
    fn record(&mut self, cmd: &CommandBuffer<D>, target: &TargetInfo) -> RhiResult<()>;
}

/// Immediate-mode UI composited into the main draw image.
pub trait UiLayer<D: GpuDevice> {
    /// Draw data produced by [`end_frame`](Self::end_frame).
    type DrawData;

    /// Starts building this iteration's UI.
    fn begin_frame(&mut self, info: &FrameInfo);

    /// Finishes the UI and returns what to draw.
    fn end_frame(&mut self) -> Self::DrawData;

    /// Records `draw_data`. Dynamic rendering into `target` is active.
    fn render(
        &mut self,
        draw_data: &Self::DrawData,
        cmd: &CommandBuffer<D>,
        target: &TargetInfo,
    ) -> RhiResult<()>;
}

/// UI layer that draws nothing.
impl<D: GpuDevice> UiLayer<D> for () {
    type DrawData = ();

    fn begin_frame(&mut self, _info: &FrameInfo) {}

    fn end_frame(&mut self) {}

    fn render(&mut self, _: &(), _: &CommandBuffer<D>, _: &TargetInfo) -> RhiResult<()> {
        Ok(())
    }
}
