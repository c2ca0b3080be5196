//! Offscreen draw targets.
//!
//! - the *main* image is window-sized; the UI draws into it and it is blitted onto
//!   the presentable image every frame
//! - the *scene* image has a fixed size; scene renderers draw into it and the UI
//!   samples it
//!
//! The scene image is moved to `SHADER_READ_ONLY_OPTIMAL` at creation so it can be
//! sampled before anything was drawn into it.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use lsv_rhi::RhiResult;
use lsv_rhi::gpu::GpuDevice;
use lsv_rhi::image::RenderTarget;
use lsv_rhi::immediate::ImmediateSubmitter;

pub struct DrawTargets<D: GpuDevice> {
    main: RenderTarget<D>,
    scene: RenderTarget<D>,
}

impl<D: GpuDevice> DrawTargets<D> {
    /// Creates both targets and prepares the scene image for sampling through
    /// `immediate`.
    pub fn new(
        device: Arc<D>,
        immediate: &ImmediateSubmitter<D>,
        main_extent: vk::Extent2D,
        scene_extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let main = RenderTarget::new(device.clone(), "main draw image", main_extent, false)?;
        let mut scene = RenderTarget::new(device, "scene image", scene_extent, true)?;

        immediate.submit(|cmd| {
            scene.transition_to(cmd, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
            Ok(())
        })?;

        info!(
            "Draw targets created: main {}x{}, scene {}x{}",
            main_extent.width, main_extent.height, scene_extent.width, scene_extent.height
        );

        Ok(Self { main, scene })
    }

    /// Recreates the main image when `extent` differs from its current size.
    ///
    /// Returns whether the image was recreated. Must only be called while the device
    /// is idle.
    pub fn resize_main(&mut self, device: Arc<D>, extent: vk::Extent2D) -> RhiResult<bool> {
        if self.main.extent() == extent {
            return Ok(false);
        }

        let name = self.main.name();
        let replacement = RenderTarget::new(device, name, extent, false)?;
        self.main = replacement;

        debug!("Main draw image resized to {}x{}", extent.width, extent.height);
        Ok(true)
    }

    #[inline]
    pub fn main(&self) -> &RenderTarget<D> {
        &self.main
    }

    #[inline]
    pub fn main_mut(&mut self) -> &mut RenderTarget<D> {
        &mut self.main
    }

    #[inline]
    pub fn scene(&self) -> &RenderTarget<D> {
        &self.scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut RenderTarget<D> {
        &mut self.scene
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsv_rhi::testing::{Event, FakeDevice};

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_scene_image_starts_sampleable() {
        let device = FakeDevice::new();
        let immediate = ImmediateSubmitter::new(device.clone()).unwrap();
        let targets =
            DrawTargets::new(device.clone(), &immediate, extent(1280, 720), extent(600, 600))
                .unwrap();

        assert_eq!(
            targets.scene().layout(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
        assert!(targets.scene().sampler().is_some());
        assert_eq!(targets.main().layout(), vk::ImageLayout::UNDEFINED);
        assert!(targets.main().sampler().is_none());
        assert_eq!(device.submits().len(), 1);
        device.assert_no_violations();
    }

    #[test]
    fn test_resize_main_only_on_change() {
        let device = FakeDevice::new();
        let immediate = ImmediateSubmitter::new(device.clone()).unwrap();
        let mut targets =
            DrawTargets::new(device.clone(), &immediate, extent(800, 600), extent(600, 600))
                .unwrap();

        assert!(!targets.resize_main(device.clone(), extent(800, 600)).unwrap());

        let old_image = targets.main().image();
        let scene_image = targets.scene().image();
        assert!(targets.resize_main(device.clone(), extent(1024, 768)).unwrap());
        assert_eq!(targets.main().extent(), extent(1024, 768));
        assert!(device.events().contains(&Event::DestroyImage(old_image)));
        assert_eq!(targets.scene().image(), scene_image);

        drop(targets);
        drop(immediate);
        device.assert_clean();
    }
}
