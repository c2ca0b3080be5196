//! UI layer: shows the scene image in the window and reports frame times.
//!
//! The scene image has a fixed size, so it is drawn into the largest centered
//! rectangle of the main draw image that keeps its aspect ratio.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use tracing::info;

use lsv_renderer::{FrameInfo, TargetInfo, UiLayer};
use lsv_rhi::command::CommandBuffer;
use lsv_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, sampled_image_binding, write_combined_image_sampler,
};
use lsv_rhi::device::Device;
use lsv_rhi::image::{DRAW_FORMAT, RenderTarget};
use lsv_rhi::pipeline::{GraphicsPipelineDesc, Pipeline, PipelineLayout};
use lsv_rhi::shader::{Shader, ShaderStage};
use lsv_rhi::{RhiError, RhiResult};

/// How often frame times are logged.
const REPORT_INTERVAL: Duration = Duration::from_secs(2);

/// Largest rectangle with `content`'s aspect ratio that fits centered in `area`.
pub fn aspect_fit(content: vk::Extent2D, area: vk::Extent2D) -> vk::Rect2D {
    if content.width == 0 || content.height == 0 {
        return vk::Rect2D::default();
    }
    let scale = f64::min(
        f64::from(area.width) / f64::from(content.width),
        f64::from(area.height) / f64::from(content.height),
    );
    let width = ((f64::from(content.width) * scale).round() as u32).min(area.width);
    let height = ((f64::from(content.height) * scale).round() as u32).min(area.height);

    vk::Rect2D {
        offset: vk::Offset2D {
            x: ((area.width - width) / 2) as i32,
            y: ((area.height - height) / 2) as i32,
        },
        extent: vk::Extent2D { width, height },
    }
}

/// CPU frame time averaged over one report interval.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameTimes {
    pub frame_number: u64,
    pub average: Duration,
}

impl FrameTimes {
    pub fn fps(&self) -> f64 {
        let secs = self.average.as_secs_f64();
        if secs > 0.0 { 1.0 / secs } else { 0.0 }
    }
}

/// Accumulates frame deltas and yields an average once per interval.
#[derive(Debug)]
struct FrameTimeReport {
    interval: Duration,
    accumulated: Duration,
    frames: u32,
}

impl FrameTimeReport {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            accumulated: Duration::ZERO,
            frames: 0,
        }
    }

    /// Adds one frame; returns the interval's average when the interval is complete.
    fn record(&mut self, info: &FrameInfo) -> Option<FrameTimes> {
        self.accumulated += info.delta;
        self.frames += 1;
        if self.accumulated < self.interval {
            return None;
        }

        let times = FrameTimes {
            frame_number: info.frame_number,
            average: self.accumulated / self.frames,
        };
        self.accumulated = Duration::ZERO;
        self.frames = 0;
        Some(times)
    }
}

/// Draws the sampled scene image with a fullscreen-triangle pipeline.
pub struct ViewportUi {
    // Field order is drop order.
    pipeline: Pipeline,
    layout: PipelineLayout,
    set: vk::DescriptorSet,
    // Kept alive for `set`.
    _pool: DescriptorPool,
    _set_layout: DescriptorSetLayout,
    scene_extent: vk::Extent2D,
    report: FrameTimeReport,
}

impl ViewportUi {
    /// Builds the pipeline and points a descriptor at the scene image.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Resource`] if the scene image has no sampler; shader and
    /// pipeline failures propagate.
    pub fn new(
        device: Arc<Device>,
        scene: &RenderTarget<Device>,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let sampler = scene.sampler().ok_or_else(|| {
            RhiError::Resource(format!("{} image is not sampled", scene.name()))
        })?;

        let set_layout = DescriptorSetLayout::new(
            device.clone(),
            &[sampled_image_binding(0, vk::ShaderStageFlags::FRAGMENT)],
        )?;
        let pool = DescriptorPool::for_sampled_images(device.clone(), 1)?;
        let set = pool.allocate(&set_layout)?;
        write_combined_image_sampler(&device, set, 0, sampler, scene.view());

        let vertex_shader =
            Shader::load(device.clone(), shader_dir, "viewport.vert", ShaderStage::Vertex)?;
        let fragment_shader =
            Shader::load(device.clone(), shader_dir, "viewport.frag", ShaderStage::Fragment)?;

        let layout = PipelineLayout::new(device.clone(), &[set_layout.handle()], &[])?;
        let desc = GraphicsPipelineDesc::new(
            vertex_shader.handle(),
            fragment_shader.handle(),
            DRAW_FORMAT,
        );
        let pipeline = Pipeline::new_graphics(device, &desc, &layout)?;

        info!(
            "Viewport layer ready for a {}x{} scene",
            scene.extent().width,
            scene.extent().height
        );

        Ok(Self {
            pipeline,
            layout,
            set,
            _pool: pool,
            _set_layout: set_layout,
            scene_extent: scene.extent(),
            report: FrameTimeReport::new(REPORT_INTERVAL),
        })
    }
}

impl UiLayer<Device> for ViewportUi {
    type DrawData = vk::Extent2D;

    fn begin_frame(&mut self, info: &FrameInfo) {
        if let Some(times) = self.report.record(info) {
            info!(
                "Frame {}: {:.2} ms ({:.0} fps)",
                times.frame_number,
                times.average.as_secs_f64() * 1000.0,
                times.fps()
            );
        }
    }

    fn end_frame(&mut self) -> vk::Extent2D {
        self.scene_extent
    }

    fn render(
        &mut self,
        scene_extent: &vk::Extent2D,
        cmd: &CommandBuffer<Device>,
        target: &TargetInfo,
    ) -> RhiResult<()> {
        let rect = aspect_fit(*scene_extent, target.extent);
        if rect.extent.width == 0 || rect.extent.height == 0 {
            return Ok(());
        }

        cmd.bind_pipeline(self.pipeline.handle());
        cmd.set_viewport_and_scissor(rect);
        cmd.bind_descriptor_set(self.layout.handle(), self.set);
        cmd.draw(3);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_square_scene_in_wide_window_is_pillarboxed() {
        let rect = aspect_fit(extent(600, 600), extent(1280, 720));
        assert_eq!(rect.extent, extent(720, 720));
        assert_eq!(rect.offset, vk::Offset2D { x: 280, y: 0 });
    }

    #[test]
    fn test_square_scene_in_tall_window_is_letterboxed() {
        let rect = aspect_fit(extent(600, 600), extent(400, 1000));
        assert_eq!(rect.extent, extent(400, 400));
        assert_eq!(rect.offset, vk::Offset2D { x: 0, y: 300 });
    }

    #[test]
    fn test_degenerate_extents() {
        assert_eq!(aspect_fit(extent(0, 600), extent(800, 600)), vk::Rect2D::default());
        assert_eq!(aspect_fit(extent(600, 600), extent(0, 0)).extent, extent(0, 0));
    }

    #[test]
    fn test_report_averages_over_interval() {
        let mut report = FrameTimeReport::new(Duration::from_millis(40));
        let frame = |n, ms| FrameInfo {
            frame_number: n,
            delta: Duration::from_millis(ms),
        };

        assert_eq!(report.record(&frame(0, 10)), None);
        assert_eq!(report.record(&frame(1, 10)), None);
        let times = report.record(&frame(2, 25)).unwrap();
        assert_eq!(times.frame_number, 2);
        assert_eq!(times.average, Duration::from_millis(15));
        assert!((times.fps() - 66.666).abs() < 0.01);

        assert_eq!(report.record(&frame(3, 10)), None);
    }
}
