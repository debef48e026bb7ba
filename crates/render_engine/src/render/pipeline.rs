//! Composable pipeline abstraction
//!
//! An [`Effect`] describes everything a pipeline needs as plain data:
//! shader stages, descriptor layouts, push constant ranges and the
//! fixed-function state record. [`Pipeline::build`] runs one assembly
//! algorithm over that description for every effect; there are no
//! per-effect pipeline creation paths.
//!
//! Viewport and scissor are dynamic state, so pipelines survive window
//! resizes; only framebuffers are rebuilt.

use ash::{vk, Device};
use bitflags::bitflags;
use std::ffi::CStr;
use std::path::PathBuf;

use crate::render::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::shader::ShaderModule;

bitflags! {
    /// Which bind points an effect's pipeline serves
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PipelineCapabilities: u32 {
        /// Has a graphics pipeline (vertex + fragment stages)
        const GRAPHICS = 0b01;
        /// Has a compute pipeline
        const COMPUTE = 0b10;
    }
}

/// One shader stage: where its SPIR-V lives and what stage it fills
#[derive(Debug, Clone)]
pub struct ShaderStageDesc {
    /// Path to the compiled SPIR-V file
    pub path: PathBuf,
}

impl ShaderStageDesc {
    /// Describe a stage by its SPIR-V path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

/// The shader stages an effect uses
#[derive(Debug, Clone, Default)]
pub struct ShaderSet {
    /// Vertex stage, required for graphics
    pub vertex: Option<ShaderStageDesc>,
    /// Fragment stage, required for graphics
    pub fragment: Option<ShaderStageDesc>,
    /// Compute stage
    pub compute: Option<ShaderStageDesc>,
}

impl ShaderSet {
    /// Capabilities implied by which stages are present
    pub fn capabilities(&self) -> PipelineCapabilities {
        let mut caps = PipelineCapabilities::empty();
        if self.vertex.is_some() && self.fragment.is_some() {
            caps |= PipelineCapabilities::GRAPHICS;
        }
        if self.compute.is_some() {
            caps |= PipelineCapabilities::COMPUTE;
        }
        caps
    }
}

/// Color blend state record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlendState {
    /// Standard alpha blending on the color attachment
    pub enabled: bool,
}

impl BlendState {
    /// No blending, color writes replace
    pub fn opaque() -> Self {
        Self { enabled: false }
    }

    /// Source-alpha blending
    pub fn alpha() -> Self {
        Self { enabled: true }
    }
}

/// Depth test/write state record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthState {
    /// Whether fragments are depth-tested
    pub test: bool,
    /// Whether surviving fragments write depth
    pub write: bool,
}

impl DepthState {
    /// Test against and write the depth buffer
    pub fn read_write() -> Self {
        Self {
            test: true,
            write: true,
        }
    }

    /// Ignore the depth buffer entirely
    pub fn disabled() -> Self {
        Self {
            test: false,
            write: false,
        }
    }
}

/// Rasterizer state record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterState {
    /// Fill or wireframe
    pub polygon_mode: vk::PolygonMode,
    /// Face culling
    pub cull_mode: vk::CullModeFlags,
    /// Winding order of front faces
    pub front_face: vk::FrontFace,
}

impl RasterState {
    /// Filled triangles with back faces culled
    pub fn back_culled() -> Self {
        Self {
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
        }
    }

    /// Filled primitives, no culling
    pub fn unculled() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::NONE,
            ..Self::back_culled()
        }
    }
}

/// Vertex input layout record
#[derive(Debug, Clone, Default)]
pub struct VertexLayout {
    /// Vertex input bindings
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Vertex input attributes
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

impl VertexLayout {
    /// Layout from explicit binding and attribute descriptions
    pub fn new(
        bindings: Vec<vk::VertexInputBindingDescription>,
        attributes: Vec<vk::VertexInputAttributeDescription>,
    ) -> Self {
        Self {
            bindings,
            attributes,
        }
    }
}

/// Fixed-function state for an effect's graphics pipeline, as data.
///
/// The named constructors are shared records many effects reuse; an
/// effect overrides only what differs. Sample count is not part of the
/// record because it must match the target the pipeline renders into.
#[derive(Debug, Clone)]
pub struct PipelineStateDescription {
    /// Primitive topology
    pub topology: vk::PrimitiveTopology,
    /// Rasterizer state
    pub raster: RasterState,
    /// Depth test/write state
    pub depth: DepthState,
    /// Color blend state
    pub blend: BlendState,
    /// Vertex input layout
    pub vertex_layout: VertexLayout,
}

impl PipelineStateDescription {
    /// Standard opaque triangle list with back-face culling
    pub fn opaque_mesh() -> Self {
        Self {
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            raster: RasterState::back_culled(),
            depth: DepthState::read_write(),
            blend: BlendState::opaque(),
            vertex_layout: VertexLayout::default(),
        }
    }

    /// Alpha-blended point sprites, depth ignored
    pub fn point_sprites() -> Self {
        Self {
            topology: vk::PrimitiveTopology::POINT_LIST,
            raster: RasterState::unculled(),
            depth: DepthState::disabled(),
            blend: BlendState::alpha(),
            vertex_layout: VertexLayout::default(),
        }
    }

    /// Same record with the given vertex layout attached
    pub fn with_vertex_layout(mut self, vertex_layout: VertexLayout) -> Self {
        self.vertex_layout = vertex_layout;
        self
    }
}

impl Default for PipelineStateDescription {
    fn default() -> Self {
        Self::opaque_mesh()
    }
}

/// A renderable effect described as data.
///
/// Implementations hold their descriptor layouts and per-slot resources;
/// the trait only exposes what pipeline assembly needs.
pub trait Effect {
    /// Stable name, used in logs and error reports
    fn name(&self) -> &str;

    /// Shader stages to compile into the pipeline
    fn shaders(&self) -> ShaderSet;

    /// Descriptor set layouts, in set-index order
    fn descriptor_layouts(&self) -> Vec<vk::DescriptorSetLayout>;

    /// Push constant ranges, empty by default
    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        Vec::new()
    }

    /// Fixed-function state for the graphics pipeline
    fn graphics_state(&self) -> PipelineStateDescription {
        PipelineStateDescription::default()
    }
}

/// Built pipeline: layout plus the per-bind-point pipeline objects
pub struct Pipeline {
    device: Device,
    name: String,
    capabilities: PipelineCapabilities,
    layout: vk::PipelineLayout,
    graphics: Option<vk::Pipeline>,
    compute: Option<vk::Pipeline>,
}

impl Pipeline {
    /// Assemble the effect's pipelines for the given render pass.
    ///
    /// Shader modules live only for the duration of this call; the
    /// built pipeline objects do not reference them.
    pub fn build(
        context: &VulkanContext,
        effect: &dyn Effect,
        render_pass: vk::RenderPass,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let shaders = effect.shaders();
        let capabilities = shaders.capabilities();

        if capabilities.is_empty() {
            return Err(VulkanError::PipelineBuild {
                effect: effect.name().to_string(),
                reason: "effect declares no complete shader stage set".to_string(),
            });
        }

        let set_layouts = effect.descriptor_layouts();
        let push_ranges = effect.push_constant_ranges();
        let layout_info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(&set_layouts)
            .push_constant_ranges(&push_ranges);
        let layout = unsafe {
            device
                .create_pipeline_layout(&layout_info, None)
                .map_err(|code| VulkanError::PipelineBuild {
                    effect: effect.name().to_string(),
                    reason: format!("pipeline layout creation failed: {:?}", code),
                })?
        };

        let entry = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

        let graphics = if capabilities.contains(PipelineCapabilities::GRAPHICS) {
            // capabilities() guarantees both stages are present here
            let (vertex_desc, fragment_desc) = match (&shaders.vertex, &shaders.fragment) {
                (Some(v), Some(f)) => (v, f),
                _ => unreachable!(),
            };
            let vertex = ShaderModule::from_file(device.clone(), &vertex_desc.path)?;
            let fragment = ShaderModule::from_file(device.clone(), &fragment_desc.path)?;

            let pipeline = Self::build_graphics(
                &device,
                effect,
                layout,
                render_pass,
                samples,
                &vertex,
                &fragment,
            )?;
            Some(pipeline)
        } else {
            None
        };

        let compute = if let Some(compute_desc) = &shaders.compute {
            let module = ShaderModule::from_file(device.clone(), &compute_desc.path)?;
            let stage = vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::COMPUTE)
                .module(module.handle())
                .name(entry)
                .build();

            let create_info = vk::ComputePipelineCreateInfo::builder()
                .stage(stage)
                .layout(layout)
                .build();

            let pipelines = unsafe {
                device.create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
            }
            .map_err(|(_, code)| VulkanError::PipelineBuild {
                effect: effect.name().to_string(),
                reason: format!("compute pipeline creation failed: {:?}", code),
            })?;
            Some(pipelines[0])
        } else {
            None
        };

        log::debug!("Built pipeline '{}' ({:?})", effect.name(), capabilities);

        Ok(Self {
            device,
            name: effect.name().to_string(),
            capabilities,
            layout,
            graphics,
            compute,
        })
    }

    fn build_graphics(
        device: &Device,
        effect: &dyn Effect,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        samples: vk::SampleCountFlags,
        vertex: &ShaderModule,
        fragment: &ShaderModule,
    ) -> VulkanResult<vk::Pipeline> {
        let state = effect.graphics_state();
        let entry = unsafe { CStr::from_bytes_with_nul_unchecked(b"main\0") };

        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex.handle())
                .name(entry)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment.handle())
                .name(entry)
                .build(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&state.vertex_layout.bindings)
            .vertex_attribute_descriptions(&state.vertex_layout.attributes);

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(state.topology)
            .primitive_restart_enable(false);

        // Dynamic viewport/scissor: counts set here, values at record time
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&dynamic_states);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(state.raster.polygon_mode)
            .line_width(1.0)
            .cull_mode(state.raster.cull_mode)
            .front_face(state.raster.front_face)
            .depth_bias_enable(false);

        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(samples);

        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(state.depth.test)
            .depth_write_enable(state.depth.write)
            .depth_compare_op(vk::CompareOp::LESS)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let color_blend_attachment = if state.blend.enabled {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(true)
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD)
                .build()
        } else {
            vk::PipelineColorBlendAttachmentState::builder()
                .color_write_mask(vk::ColorComponentFlags::RGBA)
                .blend_enable(false)
                .build()
        };
        let color_blend_attachments = [color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .dynamic_state(&dynamic_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(0);

        let pipelines = unsafe {
            device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info.build()],
                None,
            )
        }
        .map_err(|(_, code)| VulkanError::PipelineBuild {
            effect: effect.name().to_string(),
            reason: format!("graphics pipeline creation failed: {:?}", code),
        })?;

        Ok(pipelines[0])
    }

    /// Effect name this pipeline was built from
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Bind points the pipeline serves
    pub fn capabilities(&self) -> PipelineCapabilities {
        self.capabilities
    }

    /// Shared pipeline layout
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    /// Graphics pipeline handle, if the effect has graphics stages
    pub fn graphics(&self) -> Option<vk::Pipeline> {
        self.graphics
    }

    /// Compute pipeline handle, if the effect has a compute stage
    pub fn compute(&self) -> Option<vk::Pipeline> {
        self.compute
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            if let Some(pipeline) = self.graphics {
                self.device.destroy_pipeline(pipeline, None);
            }
            if let Some(pipeline) = self.compute {
                self.device.destroy_pipeline(pipeline, None);
            }
            self.device.destroy_pipeline_layout(self.layout, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capabilities_follow_declared_stages() {
        let graphics_only = ShaderSet {
            vertex: Some(ShaderStageDesc::new("a.vert.spv")),
            fragment: Some(ShaderStageDesc::new("a.frag.spv")),
            compute: None,
        };
        assert_eq!(
            graphics_only.capabilities(),
            PipelineCapabilities::GRAPHICS
        );

        let both = ShaderSet {
            vertex: Some(ShaderStageDesc::new("p.vert.spv")),
            fragment: Some(ShaderStageDesc::new("p.frag.spv")),
            compute: Some(ShaderStageDesc::new("p.comp.spv")),
        };
        assert_eq!(
            both.capabilities(),
            PipelineCapabilities::GRAPHICS | PipelineCapabilities::COMPUTE
        );
    }

    #[test]
    fn lone_vertex_stage_grants_no_graphics() {
        let incomplete = ShaderSet {
            vertex: Some(ShaderStageDesc::new("a.vert.spv")),
            fragment: None,
            compute: None,
        };
        assert!(incomplete.capabilities().is_empty());
    }

    #[test]
    fn opaque_mesh_record_is_the_default() {
        let state = PipelineStateDescription::default();
        assert_eq!(state.topology, vk::PrimitiveTopology::TRIANGLE_LIST);
        assert_eq!(state.raster, RasterState::back_culled());
        assert_eq!(state.depth, DepthState::read_write());
        assert!(!state.blend.enabled);
        assert!(state.vertex_layout.bindings.is_empty());
    }

    #[test]
    fn point_sprite_record_skips_depth_and_culling() {
        let state = PipelineStateDescription::point_sprites();
        assert_eq!(state.topology, vk::PrimitiveTopology::POINT_LIST);
        assert_eq!(state.raster.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(state.depth, DepthState::disabled());
        assert!(state.blend.enabled);
    }
}
