//! Vertex format for mesh rendering.
//!
//! # Memory Layout
//!
//! The UV coordinates are split across the padding slots after the two `Vec3`s so the
//! vertex packs into 48 bytes with `color` 16-byte aligned:
//!
//! | Offset | Field    | Location |
//! |--------|----------|----------|
//! | 0      | position | 0        |
//! | 12     | uv_x     | 1        |
//! | 16     | normal   | 2        |
//! | 28     | uv_y     | 3        |
//! | 32     | color    | 4        |

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub uv_x: f32,
    pub normal: Vec3,
    pub uv_y: f32,
    pub color: Vec4,
}

impl Vertex {
    /// Creates a vertex with a position and color, facing +Z with zero UVs.
    #[inline]
    pub fn colored(position: Vec3, color: Vec4) -> Self {
        Self {
            position,
            uv_x: 0.0,
            normal: Vec3::Z,
            uv_y: 0.0,
            color,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Binding 0, per-vertex input rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: Self::size() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 5] {
        [
            attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, position)),
            attribute(1, vk::Format::R32_SFLOAT, offset_of!(Vertex, uv_x)),
            attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Vertex, normal)),
            attribute(3, vk::Format::R32_SFLOAT, offset_of!(Vertex, uv_y)),
            attribute(4, vk::Format::R32G32B32A32_SFLOAT, offset_of!(Vertex, color)),
        ]
    }
}

fn attribute(location: u32, format: vk::Format, offset: usize) -> vk::VertexInputAttributeDescription {
    vk::VertexInputAttributeDescription {
        binding: 0,
        location,
        format,
        offset: offset as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(Vertex::size(), 48);
        assert_eq!(Vertex::binding_description().stride, 48);
    }

    #[test]
    fn test_attribute_offsets() {
        let attributes = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 16, 28, 32]);
        for (i, attribute) in attributes.iter().enumerate() {
            assert_eq!(attribute.location, i as u32);
            assert_eq!(attribute.binding, 0);
        }
    }

    #[test]
    fn test_vertex_bytes() {
        let vertices = [
            Vertex::colored(Vec3::new(0.0, -0.5, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
            Vertex::colored(Vec3::new(0.5, 0.5, 0.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
        ];
        let bytes: &[u8] = bytemuck::cast_slice(&vertices);
        assert_eq!(bytes.len(), 96);
        // color.x of the first vertex
        assert_eq!(&bytes[32..36], &1.0f32.to_le_bytes());
    }
}
