//! Image layout transitions.
//!
//! [`image_barrier`] is a pure function of `(image, old_layout, new_layout)`. Every
//! barrier it produces covers all mip levels and array layers and uses the
//! conservative `ALL_COMMANDS` stage with full memory access on both sides, so callers
//! never track partial-resource state. Stages are not narrowed per transition.

use ash::vk;

/// One image memory barrier, independent of the recording backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub aspect_mask: vk::ImageAspectFlags,
}

impl ImageBarrier {
    /// Whole-resource subresource range.
    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange::default()
            .aspect_mask(self.aspect_mask)
            .base_mip_level(0)
            .level_count(vk::REMAINING_MIP_LEVELS)
            .base_array_layer(0)
            .layer_count(vk::REMAINING_ARRAY_LAYERS)
    }

    /// Synchronization2 form of this barrier.
    pub fn to_vk(&self) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .src_stage_mask(self.src_stage)
            .src_access_mask(self.src_access)
            .dst_stage_mask(self.dst_stage)
            .dst_access_mask(self.dst_access)
            .old_layout(self.old_layout)
            .new_layout(self.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.subresource_range())
    }
}

/// Barrier moving `image` from `old_layout` to `new_layout`.
pub fn image_barrier(
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> ImageBarrier {
    ImageBarrier {
        image,
        old_layout,
        new_layout,
        src_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
        src_access: vk::AccessFlags2::MEMORY_WRITE,
        dst_stage: vk::PipelineStageFlags2::ALL_COMMANDS,
        dst_access: vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ,
        aspect_mask: aspect_for(new_layout),
    }
}

fn aspect_for(layout: vk::ImageLayout) -> vk::ImageAspectFlags {
    match layout {
        vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL | vk::ImageLayout::DEPTH_READ_ONLY_OPTIMAL => {
            vk::ImageAspectFlags::DEPTH
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn image() -> vk::Image {
        vk::Image::from_raw(0x42)
    }

    #[test]
    fn test_barrier_covers_whole_resource() {
        let barrier = image_barrier(
            image(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        );
        let range = barrier.subresource_range();
        assert_eq!(range.base_mip_level, 0);
        assert_eq!(range.level_count, vk::REMAINING_MIP_LEVELS);
        assert_eq!(range.base_array_layer, 0);
        assert_eq!(range.layer_count, vk::REMAINING_ARRAY_LAYERS);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn test_barrier_is_conservative() {
        let barrier = image_barrier(
            image(),
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        );
        assert_eq!(barrier.src_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert_eq!(barrier.dst_stage, vk::PipelineStageFlags2::ALL_COMMANDS);
        assert!(barrier.src_access.contains(vk::AccessFlags2::MEMORY_WRITE));
        assert!(
            barrier
                .dst_access
                .contains(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
        );
    }

    #[test]
    fn test_depth_layout_selects_depth_aspect() {
        let barrier = image_barrier(
            image(),
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
        );
        assert_eq!(barrier.aspect_mask, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn test_same_request_yields_same_barrier() {
        let first = image_barrier(
            image(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        let second = image_barrier(
            image(),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        );
        assert_eq!(first, second);
    }

    #[test]
    fn test_to_vk_carries_layouts() {
        let barrier = image_barrier(
            image(),
            vk::ImageLayout::GENERAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .to_vk();
        assert_eq!(barrier.old_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.image, image());
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }
}
