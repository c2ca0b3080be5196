//! Graphics pipeline configuration and creation.
//!
//! - [`GraphicsPipelineDesc`] is a plain configuration struct with named fields,
//!   checked by [`GraphicsPipelineDesc::validate`] before anything is created
//! - [`PipelineLayout`] wraps VkPipelineLayout (descriptor set layouts and push constants)
//! - [`Pipeline`] wraps a VkPipeline built for dynamic rendering with dynamic
//!   viewport and scissor
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use lsv_rhi::device::Device;
//! use lsv_rhi::shader::{Shader, ShaderStage};
//! use lsv_rhi::pipeline::{GraphicsPipelineDesc, Pipeline, PipelineLayout};
//! use lsv_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), lsv_rhi::RhiError> {
//! let vs = Shader::load(device.clone(), Path::new("shaders"), "mesh.vert", ShaderStage::Vertex)?;
//! let fs = Shader::load(device.clone(), Path::new("shaders"), "mesh.frag", ShaderStage::Fragment)?;
//! let layout = PipelineLayout::new(device.clone(), &[], &[])?;
//!
//! let desc = GraphicsPipelineDesc {
//!     vertex_bindings: vec![Vertex::binding_description()],
//!     vertex_attributes: Vertex::attribute_descriptions().to_vec(),
//!     ..GraphicsPipelineDesc::new(vs.handle(), fs.handle(), vk::Format::R16G16B16A16_SFLOAT)
//! };
//! let pipeline = Pipeline::new_graphics(device, &desc, &layout)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::shader::{ENTRY_POINT, ShaderStage};

/// Vulkan pipeline layout wrapper.
pub struct PipelineLayout {
    device: Arc<Device>,
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates a new pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns an error if pipeline layout creation fails.
    pub fn new(
        device: Arc<Device>,
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe { device.handle().create_pipeline_layout(&create_info, None)? };

        debug!(
            "Created pipeline layout with {} descriptor set layout(s) and {} push constant range(s)",
            descriptor_set_layouts.len(),
            push_constant_ranges.len()
        );

        Ok(Self { device, layout })
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Primitive topology for input assembly.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PrimitiveTopology {
    LineList,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    pub fn to_vk(self) -> vk::PrimitiveTopology {
        match self {
            PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
            PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
            PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        }
    }
}

/// Polygon rasterization mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
}

impl PolygonMode {
    pub fn to_vk(self) -> vk::PolygonMode {
        match self {
            PolygonMode::Fill => vk::PolygonMode::FILL,
            PolygonMode::Line => vk::PolygonMode::LINE,
        }
    }
}

/// Face culling mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

impl CullMode {
    pub fn to_vk(self) -> vk::CullModeFlags {
        match self {
            CullMode::None => vk::CullModeFlags::NONE,
            CullMode::Front => vk::CullModeFlags::FRONT,
            CullMode::Back => vk::CullModeFlags::BACK,
        }
    }
}

/// Front face winding order.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FrontFace {
    CounterClockwise,
    #[default]
    Clockwise,
}

impl FrontFace {
    pub fn to_vk(self) -> vk::FrontFace {
        match self {
            FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
            FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
        }
    }
}

/// Fixed-function and shader configuration of a graphics pipeline.
///
/// Built with struct-update syntax over [`GraphicsPipelineDesc::new`]; the defaults are
/// a filled, unculled triangle list without blending or depth.
#[derive(Clone, Debug)]
pub struct GraphicsPipelineDesc {
    /// Shader modules by stage. Exactly one vertex and one fragment stage.
    pub shaders: Vec<(ShaderStage, vk::ShaderModule)>,
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    pub topology: PrimitiveTopology,
    pub polygon_mode: PolygonMode,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    /// Standard alpha blending (src alpha, one minus src alpha).
    pub blending: bool,
    pub color_format: vk::Format,
    pub depth_format: Option<vk::Format>,
    /// Depth test and write with `LESS_OR_EQUAL`. Requires `depth_format`.
    pub depth_test: bool,
}

impl GraphicsPipelineDesc {
    /// Returns a description with a vertex and fragment shader and default state.
    pub fn new(
        vertex: vk::ShaderModule,
        fragment: vk::ShaderModule,
        color_format: vk::Format,
    ) -> Self {
        Self {
            shaders: vec![(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)],
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            topology: PrimitiveTopology::default(),
            polygon_mode: PolygonMode::default(),
            cull_mode: CullMode::default(),
            front_face: FrontFace::default(),
            blending: false,
            color_format,
            depth_format: None,
            depth_test: false,
        }
    }

    /// Checks the description for inconsistencies.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Pipeline`] describing the first problem found.
    pub fn validate(&self) -> RhiResult<()> {
        for stage in [ShaderStage::Vertex, ShaderStage::Fragment] {
            let count = self.shaders.iter().filter(|(s, _)| *s == stage).count();
            if count != 1 {
                return Err(RhiError::Pipeline(format!(
                    "Expected exactly one {} shader, got {}",
                    stage, count
                )));
            }
        }

        if let Some((stage, _)) = self
            .shaders
            .iter()
            .find(|(_, module)| *module == vk::ShaderModule::null())
        {
            return Err(RhiError::Pipeline(format!("Null {} shader module", stage)));
        }

        if self.color_format == vk::Format::UNDEFINED {
            return Err(RhiError::Pipeline(
                "Color attachment format must be defined".to_string(),
            ));
        }

        if self.depth_test && self.depth_format.is_none() {
            return Err(RhiError::Pipeline(
                "Depth test requires a depth attachment format".to_string(),
            ));
        }

        for attribute in &self.vertex_attributes {
            if !self
                .vertex_bindings
                .iter()
                .any(|b| b.binding == attribute.binding)
            {
                return Err(RhiError::Pipeline(format!(
                    "Vertex attribute at location {} uses undeclared binding {}",
                    attribute.location, attribute.binding
                )));
            }
        }

        Ok(())
    }

    fn color_blend_attachment(&self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA);
        if self.blending {
            state
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
        } else {
            state.blend_enable(false)
        }
    }
}

/// Vulkan graphics pipeline wrapper.
pub struct Pipeline {
    device: Arc<Device>,
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Validates `desc` and creates a graphics pipeline for dynamic rendering.
    ///
    /// Viewport and scissor are dynamic state and must be set while recording.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Pipeline`] if the description is invalid, or the Vulkan
    /// error if creation fails.
    pub fn new_graphics(
        device: Arc<Device>,
        desc: &GraphicsPipelineDesc,
        layout: &PipelineLayout,
    ) -> RhiResult<Self> {
        desc.validate()?;

        let shader_stages: Vec<_> = desc
            .shaders
            .iter()
            .map(|&(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.to_vk_stage())
                    .module(module)
                    .name(ENTRY_POINT)
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(desc.topology.to_vk())
            .primitive_restart_enable(false);

        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(desc.polygon_mode.to_vk())
            .cull_mode(desc.cull_mode.to_vk())
            .front_face(desc.front_face.to_vk())
            .line_width(1.0);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_test)
            .depth_compare_op(if desc.depth_test {
                vk::CompareOp::LESS_OR_EQUAL
            } else {
                vk::CompareOp::NEVER
            })
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let color_blend_attachments = [desc.color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let color_formats = [desc.color_format];
        let mut rendering_info =
            vk::PipelineRenderingCreateInfo::default().color_attachment_formats(&color_formats);
        if let Some(depth_format) = desc.depth_format {
            rendering_info = rendering_info.depth_attachment_format(depth_format);
        }

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout.handle())
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(|(_, result)| result)?
        };

        let pipeline = pipelines
            .into_iter()
            .next()
            .ok_or_else(|| RhiError::Pipeline("Driver returned no pipeline".to_string()))?;

        info!(
            "Graphics pipeline created ({:?}, blending {})",
            desc.color_format, desc.blending
        );

        Ok(Self { device, pipeline })
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}
