//! Scene content: a spinning triangle drawn into the scene image.
//!
//! Space pauses and resumes the spin.

use std::f32::consts::TAU;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ash::vk;
use glam::{Mat4, Vec3, Vec4};
use tracing::{debug, info};

use lsv_platform::KeyCode;
use lsv_renderer::{FrameInfo, InputState, SceneRenderer, TargetInfo};
use lsv_rhi::RhiResult;
use lsv_rhi::buffer::{Buffer, BufferUsage};
use lsv_rhi::command::CommandBuffer;
use lsv_rhi::device::Device;
use lsv_rhi::image::DRAW_FORMAT;
use lsv_rhi::immediate::ImmediateSubmitter;
use lsv_rhi::pipeline::{GraphicsPipelineDesc, Pipeline, PipelineLayout};
use lsv_rhi::shader::{Shader, ShaderStage};
use lsv_rhi::vertex::Vertex;

/// Radians per second.
const SPIN_SPEED: f32 = 0.8;

const PAUSE_KEY: KeyCode = KeyCode::Space;

/// Triangle vertices and indices, colored red, green and blue.
pub fn triangle_mesh() -> (Vec<Vertex>, Vec<u32>) {
    let vertices = vec![
        Vertex::colored(Vec3::new(0.0, -0.5, 0.0), Vec4::new(1.0, 0.0, 0.0, 1.0)),
        Vertex::colored(Vec3::new(0.5, 0.5, 0.0), Vec4::new(0.0, 1.0, 0.0, 1.0)),
        Vertex::colored(Vec3::new(-0.5, 0.5, 0.0), Vec4::new(0.0, 0.0, 1.0, 1.0)),
    ];
    (vertices, vec![0, 1, 2])
}

/// World matrix for a rotation of `angle` about Z, corrected for the target's
/// aspect ratio so the triangle keeps its shape.
pub fn world_matrix(angle: f32, extent: vk::Extent2D) -> Mat4 {
    let aspect = if extent.height == 0 {
        1.0
    } else {
        extent.width as f32 / extent.height as f32
    };
    Mat4::from_scale(Vec3::new(1.0 / aspect.max(1.0), aspect.min(1.0), 1.0))
        * Mat4::from_rotation_z(angle)
}

/// Rotation angle, advanced by frame time unless paused.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Spin {
    angle: f32,
    paused: bool,
}

impl Spin {
    fn update(&mut self, delta: Duration, input: &InputState) {
        if input.is_key_pressed(PAUSE_KEY) {
            self.paused = !self.paused;
            debug!("Triangle spin {}", if self.paused { "paused" } else { "resumed" });
        }
        if !self.paused {
            self.angle = (self.angle + delta.as_secs_f32() * SPIN_SPEED) % TAU;
        }
    }
}

/// Draws an indexed triangle with a per-frame world matrix in push constants.
pub struct TriangleLayer {
    // Field order is drop order.
    pipeline: Pipeline,
    layout: PipelineLayout,
    vertices: Buffer<Device>,
    indices: Buffer<Device>,
    index_count: u32,
    spin: Spin,
}

impl TriangleLayer {
    /// Builds the pipeline and uploads the mesh through the immediate channel.
    ///
    /// # Errors
    ///
    /// Missing shader files are IO errors; pipeline and buffer failures propagate.
    pub fn new(
        device: Arc<Device>,
        immediate: &ImmediateSubmitter<Device>,
        shader_dir: &Path,
    ) -> RhiResult<Self> {
        let vertex_shader =
            Shader::load(device.clone(), shader_dir, "triangle.vert", ShaderStage::Vertex)?;
        let fragment_shader =
            Shader::load(device.clone(), shader_dir, "triangle.frag", ShaderStage::Fragment)?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<Mat4>() as u32);
        let layout = PipelineLayout::new(device.clone(), &[], &[push_range])?;

        let desc = GraphicsPipelineDesc {
            vertex_bindings: vec![Vertex::binding_description()],
            vertex_attributes: Vertex::attribute_descriptions().to_vec(),
            ..GraphicsPipelineDesc::new(
                vertex_shader.handle(),
                fragment_shader.handle(),
                DRAW_FORMAT,
            )
        };
        let pipeline = Pipeline::new_graphics(device.clone(), &desc, &layout)?;

        let (mesh_vertices, mesh_indices) = triangle_mesh();
        let vertex_bytes: &[u8] = bytemuck::cast_slice(mesh_vertices.as_slice());
        let index_bytes: &[u8] = bytemuck::cast_slice(mesh_indices.as_slice());

        let vertices = Buffer::new(
            device.clone(),
            BufferUsage::Vertex,
            vertex_bytes.len() as vk::DeviceSize,
        )?;
        immediate.upload_buffer(&vertices, vertex_bytes)?;

        let indices = Buffer::new(
            device,
            BufferUsage::Index,
            index_bytes.len() as vk::DeviceSize,
        )?;
        immediate.upload_buffer(&indices, index_bytes)?;

        info!("Triangle layer ready ({} indices)", mesh_indices.len());

        Ok(Self {
            pipeline,
            layout,
            vertices,
            indices,
            index_count: mesh_indices.len() as u32,
            spin: Spin::default(),
        })
    }
}

impl SceneRenderer<Device> for TriangleLayer {
    fn update(&mut self, info: &FrameInfo, input: &InputState) {
        self.spin.update(info.delta, input);
    }

    fn record(&mut self, cmd: &CommandBuffer<Device>, target: &TargetInfo) -> RhiResult<()> {
        let world = world_matrix(self.spin.angle, target.extent);

        cmd.bind_pipeline(self.pipeline.handle());
        cmd.set_viewport_and_scissor(target.full_rect());
        cmd.push_constants(
            self.layout.handle(),
            vk::ShaderStageFlags::VERTEX,
            bytemuck::bytes_of(&world),
        );
        cmd.bind_vertex_buffer(self.vertices.handle());
        cmd.bind_index_buffer(self.indices.handle());
        cmd.draw_indexed(self.index_count);
        Ok(())
    }
}
