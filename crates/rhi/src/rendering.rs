//! Dynamic rendering helpers (Vulkan 1.3).
//!
//! Draw passes render into a single color attachment without a `VkRenderPass`.

use ash::vk;

/// Configuration for the color attachment of a dynamic rendering pass.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ColorAttachment {
    pub image_view: vk::ImageView,
    pub layout: vk::ImageLayout,
    /// Clear color applied at the start of the pass; `None` loads existing contents.
    pub clear_color: Option<[f32; 4]>,
}

impl ColorAttachment {
    /// Attachment in `COLOR_ATTACHMENT_OPTIMAL` that keeps its existing contents.
    #[inline]
    pub fn new(image_view: vk::ImageView) -> Self {
        Self {
            image_view,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            clear_color: None,
        }
    }

    #[inline]
    pub fn with_clear_color(mut self, color: [f32; 4]) -> Self {
        self.clear_color = Some(color);
        self
    }

    pub fn to_rendering_attachment_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        let load_op = if self.clear_color.is_some() {
            vk::AttachmentLoadOp::CLEAR
        } else {
            vk::AttachmentLoadOp::LOAD
        };

        vk::RenderingAttachmentInfo::default()
            .image_view(self.image_view)
            .image_layout(self.layout)
            .load_op(load_op)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.clear_color.unwrap_or([0.0; 4]),
                },
            })
    }
}

/// Viewport covering `area` with the standard 0..1 depth range.
pub fn viewport_for(area: vk::Rect2D) -> vk::Viewport {
    vk::Viewport {
        x: area.offset.x as f32,
        y: area.offset.y as f32,
        width: area.extent.width as f32,
        height: area.extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Rect covering an entire extent.
#[inline]
pub fn full_rect(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}
