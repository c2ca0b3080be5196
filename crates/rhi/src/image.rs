//! Offscreen render targets.
//!
//! A [`RenderTarget`] is a device-local color image with a view, an optional sampler
//! and the layout it is currently in. Transitions are recorded through the target so
//! the old layout never has to be spelled out at the call site.
//!
//! # Resource Destruction
//!
//! Resources are destroyed in the following order:
//! 1. Sampler
//! 2. Image view
//! 3. Image and its memory allocation

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::barrier::image_barrier;
use crate::command::CommandBuffer;
use crate::error::{RhiError, RhiResult};
use crate::gpu::{GpuDevice, ImageDesc};

/// Color format of every offscreen target.
pub const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Color image drawn into, cleared, sampled or blitted from.
pub struct RenderTarget<D: GpuDevice> {
    device: Arc<D>,
    name: &'static str,
    image: vk::Image,
    view: vk::ImageView,
    sampler: Option<vk::Sampler>,
    /// Taken on drop.
    allocation: Option<D::Allocation>,
    extent: vk::Extent2D,
    layout: vk::ImageLayout,
}

impl<D: GpuDevice> RenderTarget<D> {
    /// Creates a target usable as color attachment, transfer source and transfer
    /// destination. `sampled` adds SAMPLED usage and a linear sampler.
    ///
    /// The target starts in `UNDEFINED`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Resource`] for a zero-area extent.
    pub fn new(
        device: Arc<D>,
        name: &'static str,
        extent: vk::Extent2D,
        sampled: bool,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::Resource(format!(
                "Render target '{}' has zero area ({}x{})",
                name, extent.width, extent.height
            )));
        }

        let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT
            | vk::ImageUsageFlags::TRANSFER_SRC
            | vk::ImageUsageFlags::TRANSFER_DST;
        if sampled {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }

        let (image, allocation) = device.create_image(&ImageDesc {
            name,
            extent,
            format: DRAW_FORMAT,
            usage,
        })?;

        let view = match device.create_image_view(image, DRAW_FORMAT) {
            Ok(view) => view,
            Err(e) => {
                device.destroy_image(image, allocation);
                return Err(e);
            }
        };

        let sampler = if sampled {
            match device.create_sampler() {
                Ok(sampler) => Some(sampler),
                Err(e) => {
                    device.destroy_image_view(view);
                    device.destroy_image(image, allocation);
                    return Err(e);
                }
            }
        } else {
            None
        };

        debug!(
            "Created render target '{}': {}x{}",
            name, extent.width, extent.height
        );

        Ok(Self {
            device,
            name,
            image,
            view,
            sampler,
            allocation: Some(allocation),
            extent,
            layout: vk::ImageLayout::UNDEFINED,
        })
    }

    /// Records a transition from the tracked layout to `new_layout`.
    ///
    /// Nothing is recorded when the target is already in `new_layout`.
    pub fn transition_to(&mut self, cmd: &CommandBuffer<D>, new_layout: vk::ImageLayout) {
        if self.layout == new_layout {
            return;
        }
        cmd.pipeline_barrier(&image_barrier(self.image, self.layout, new_layout));
        self.layout = new_layout;
    }

    /// Records a transition from `expected` to `new_layout`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::InvalidLayout`] without recording anything when the
    /// tracked layout is not `expected`.
    pub fn transition_from(
        &mut self,
        cmd: &CommandBuffer<D>,
        expected: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> RhiResult<()> {
        if self.layout != expected {
            return Err(RhiError::InvalidLayout {
                expected,
                actual: self.layout,
            });
        }
        self.transition_to(cmd, new_layout);
        Ok(())
    }

    /// Records a transition from `UNDEFINED`, dropping the current contents.
    pub fn discard_to(&mut self, cmd: &CommandBuffer<D>, new_layout: vk::ImageLayout) {
        cmd.pipeline_barrier(&image_barrier(
            self.image,
            vk::ImageLayout::UNDEFINED,
            new_layout,
        ));
        self.layout = new_layout;
    }

    /// Clears the whole image. The target must be in `GENERAL` or `TRANSFER_DST_OPTIMAL`.
    pub fn clear(&self, cmd: &CommandBuffer<D>, color: [f32; 4]) -> RhiResult<()> {
        if self.layout != vk::ImageLayout::GENERAL
            && self.layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL
        {
            return Err(RhiError::InvalidLayout {
                expected: vk::ImageLayout::GENERAL,
                actual: self.layout,
            });
        }
        cmd.clear_color_image(self.image, self.layout, color);
        Ok(())
    }

    #[inline]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn sampler(&self) -> Option<vk::Sampler> {
        self.sampler
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        DRAW_FORMAT
    }

    /// Layout the last recorded transition leaves the image in.
    #[inline]
    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    #[inline]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<D: GpuDevice> Drop for RenderTarget<D> {
    fn drop(&mut self) {
        if let Some(sampler) = self.sampler.take() {
            self.device.destroy_sampler(sampler);
        }
        self.device.destroy_image_view(self.view);
        if let Some(allocation) = self.allocation.take() {
            self.device.destroy_image(self.image, allocation);
        }
        debug!("Destroyed render target '{}'", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::CommandPool;
    use crate::testing::{Event, FakeDevice};

    fn extent() -> vk::Extent2D {
        vk::Extent2D {
            width: 64,
            height: 32,
        }
    }

    fn barrier_count(device: &FakeDevice) -> usize {
        device
            .events()
            .iter()
            .filter(|e| matches!(e, Event::Barrier { .. }))
            .count()
    }

    #[test]
    fn test_zero_area_is_rejected() {
        let device = FakeDevice::new();
        let result = RenderTarget::new(
            device,
            "empty",
            vk::Extent2D {
                width: 0,
                height: 10,
            },
            false,
        );
        assert!(matches!(result, Err(RhiError::Resource(_))));
    }

    #[test]
    fn test_transition_to_same_layout_records_nothing() {
        let device = FakeDevice::new();
        let pool = CommandPool::new(device.clone()).unwrap();
        let cmd = CommandBuffer::new(device.clone(), &pool).unwrap();
        let mut target = RenderTarget::new(device.clone(), "main", extent(), false).unwrap();

        target.transition_to(&cmd, vk::ImageLayout::GENERAL);
        target.transition_to(&cmd, vk::ImageLayout::GENERAL);

        assert_eq!(barrier_count(&device), 1);
        assert_eq!(target.layout(), vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_transition_from_rejects_wrong_layout() {
        let device = FakeDevice::new();
        let pool = CommandPool::new(device.clone()).unwrap();
        let cmd = CommandBuffer::new(device.clone(), &pool).unwrap();
        let mut target = RenderTarget::new(device.clone(), "main", extent(), false).unwrap();

        let err = target
            .transition_from(
                &cmd,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            )
            .unwrap_err();

        assert!(matches!(
            err,
            RhiError::InvalidLayout {
                expected: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                actual: vk::ImageLayout::UNDEFINED,
            }
        ));
        assert_eq!(barrier_count(&device), 0);
    }

    #[test]
    fn test_discard_always_starts_from_undefined() {
        let device = FakeDevice::new();
        let pool = CommandPool::new(device.clone()).unwrap();
        let cmd = CommandBuffer::new(device.clone(), &pool).unwrap();
        let mut target = RenderTarget::new(device.clone(), "main", extent(), false).unwrap();

        target.transition_to(&cmd, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        target.discard_to(&cmd, vk::ImageLayout::GENERAL);

        let last = device
            .events()
            .into_iter()
            .filter(|e| matches!(e, Event::Barrier { .. }))
            .last()
            .unwrap();
        assert_eq!(
            last,
            Event::Barrier {
                cmd: cmd.handle(),
                image: target.image(),
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::GENERAL,
            }
        );
    }

    #[test]
    fn test_clear_requires_writable_layout() {
        let device = FakeDevice::new();
        let pool = CommandPool::new(device.clone()).unwrap();
        let cmd = CommandBuffer::new(device.clone(), &pool).unwrap();
        let mut target = RenderTarget::new(device.clone(), "main", extent(), false).unwrap();

        assert!(target.clear(&cmd, [0.0; 4]).is_err());
        target.discard_to(&cmd, vk::ImageLayout::GENERAL);
        target.clear(&cmd, [0.0; 4]).unwrap();
    }

    #[test]
    fn test_drop_releases_sampler_view_then_image() {
        let device = FakeDevice::new();
        let (image, view, sampler) = {
            let target = RenderTarget::new(device.clone(), "scene", extent(), true).unwrap();
            (target.image(), target.view(), target.sampler().unwrap())
        };

        let events = device.events();
        let position = |wanted: &Event| events.iter().position(|e| e == wanted).unwrap();
        let sampler_at = position(&Event::DestroySampler(sampler));
        let view_at = position(&Event::DestroyImageView(view));
        let image_at = position(&Event::DestroyImage(image));
        assert!(sampler_at < view_at && view_at < image_at);
        device.assert_clean();
    }
}
