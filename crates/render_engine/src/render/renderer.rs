//! Frame orchestrator
//!
//! [`VulkanRenderer`] owns every GPU resource and drives the per-frame
//! protocol: wait on the slot fence, acquire, upload per-slot data,
//! record, submit, present, advance. A frame that cannot proceed (stale
//! surface, zero-extent window) ends early without advancing the frame
//! schedule, so the retry reuses the same slot.
//!
//! Swapchain rebuilds run the fixed sequence: device idle, new swapchain
//! handing over the retired handle, new presentation target, per-image
//! semaphores resized. Pipelines use dynamic viewport state and render
//! passes of identical format, so they survive rebuilds untouched.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use slotmap::SlotMap;
use std::path::{Path, PathBuf};

use crate::config::EngineConfig;
use crate::render::commands::FrameCommands;
use crate::render::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::frame::FrameSyncController;
use crate::render::lighting::{LightKey, LightingSystem, PointLight};
use crate::render::object::{EffectKind, MeshData, RenderObject, RenderObjectKey, TextureHandle};
use crate::render::particles::ParticleSystem;
use crate::render::pipeline::{
    Effect, Pipeline, PipelineStateDescription, ShaderSet, ShaderStageDesc, VertexLayout,
};
use crate::render::swapchain::{SurfaceStatus, Swapchain};
use crate::render::target::{OffscreenTarget, PresentationTarget, RenderTarget};
use crate::render::uniforms::FrameUniforms;
use crate::window::Window;

/// Push constant block shared by the mesh effects
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct MeshPushConstants {
    model: [[f32; 4]; 4],
    color: [f32; 4],
}

struct MeshEffect {
    name: &'static str,
    shader_dir: PathBuf,
    vertex_shader: &'static str,
    fragment_shader: &'static str,
    shared_layout: vk::DescriptorSetLayout,
}

impl Effect for MeshEffect {
    fn name(&self) -> &str {
        self.name
    }

    fn shaders(&self) -> ShaderSet {
        ShaderSet {
            vertex: Some(ShaderStageDesc::new(self.shader_dir.join(self.vertex_shader))),
            fragment: Some(ShaderStageDesc::new(
                self.shader_dir.join(self.fragment_shader),
            )),
            compute: None,
        }
    }

    fn descriptor_layouts(&self) -> Vec<vk::DescriptorSetLayout> {
        vec![self.shared_layout]
    }

    fn push_constant_ranges(&self) -> Vec<vk::PushConstantRange> {
        vec![vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            offset: 0,
            size: std::mem::size_of::<MeshPushConstants>() as u32,
        }]
    }

    fn graphics_state(&self) -> PipelineStateDescription {
        PipelineStateDescription::opaque_mesh().with_vertex_layout(VertexLayout::new(
            vec![crate::render::object::MeshVertex::binding_description()],
            crate::render::object::MeshVertex::attribute_descriptions(),
        ))
    }
}

/// Top-level renderer owning context, swapchain and all frame resources.
///
/// Field order is load-bearing: fields drop in declaration order, so
/// everything holding GPU objects is declared before `context`, which
/// destroys the device, the surface and the instance. The swapchain sits
/// directly above it because the surface must outlive the swapchain.
pub struct VulkanRenderer {
    objects: SlotMap<RenderObjectKey, RenderObject>,
    lit_pipeline: Pipeline,
    unlit_pipeline: Pipeline,
    particles: Option<ParticleSystem>,
    lighting: LightingSystem,
    commands: FrameCommands,
    sync: FrameSyncController,
    target: PresentationTarget,
    swapchain: Swapchain,
    context: VulkanContext,
    shader_dir: PathBuf,
    rebuild_pending: bool,
}

impl VulkanRenderer {
    /// Bring up the full rendering stack for the window
    pub fn new(
        window: &mut Window,
        config: &EngineConfig,
        shader_dir: impl Into<PathBuf>,
    ) -> VulkanResult<Self> {
        let shader_dir = shader_dir.into();
        let context = VulkanContext::new(window, &config.window.title)?;

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            &context,
            vk::Extent2D { width, height },
            vk::SwapchainKHR::null(),
        )?;

        let samples = context.physical_device().max_msaa_samples();
        let target = PresentationTarget::new(&context, &swapchain, samples)?;

        let sync = FrameSyncController::new(context.raw_device(), swapchain.image_count())?;
        let commands =
            FrameCommands::new(context.raw_device(), context.graphics_queue_family())?;

        let lighting = LightingSystem::new(&context)?;

        let lit_pipeline = Pipeline::build(
            &context,
            &MeshEffect {
                name: "lit",
                shader_dir: shader_dir.clone(),
                vertex_shader: "mesh.vert.spv",
                fragment_shader: "lit.frag.spv",
                shared_layout: lighting.layout(),
            },
            target.render_pass(),
            samples,
        )?;
        let unlit_pipeline = Pipeline::build(
            &context,
            &MeshEffect {
                name: "unlit",
                shader_dir: shader_dir.clone(),
                vertex_shader: "mesh.vert.spv",
                fragment_shader: "unlit.frag.spv",
                shared_layout: lighting.layout(),
            },
            target.render_pass(),
            samples,
        )?;

        let particles = if config.effects.particles {
            Some(ParticleSystem::new(
                &context,
                target.render_pass(),
                samples,
                &shader_dir,
                config.effects.particle_count,
            )?)
        } else {
            None
        };

        log::info!(
            "Renderer initialized: {}x{}, {} swapchain images, {:?} MSAA",
            swapchain.extent().width,
            swapchain.extent().height,
            swapchain.image_count(),
            samples
        );

        Ok(Self {
            objects: SlotMap::with_key(),
            lit_pipeline,
            unlit_pipeline,
            particles,
            lighting,
            commands,
            sync,
            target,
            swapchain,
            context,
            shader_dir,
            rebuild_pending: false,
        })
    }

    /// Upload a mesh and register it for drawing.
    ///
    /// Texture handles come from the asset layer and may be absent for
    /// untextured effects.
    pub fn load_render_object(
        &mut self,
        mesh: &MeshData,
        effect: EffectKind,
        texture: Option<TextureHandle>,
        specular_texture: Option<TextureHandle>,
    ) -> VulkanResult<RenderObjectKey> {
        let object = RenderObject::new(&self.context, mesh, effect, texture, specular_texture)?;
        Ok(self.objects.insert(object))
    }

    /// Remove a render object.
    ///
    /// The GPU buffers are dropped immediately, so callers must not
    /// remove objects referenced by in-flight frames without waiting;
    /// the engine waits for the device during shutdown and rebuilds.
    pub fn remove_render_object(&mut self, key: RenderObjectKey) -> VulkanResult<()> {
        self.context.wait_idle()?;
        self.objects.remove(key);
        Ok(())
    }

    /// Mutable access to an object's transform and color
    pub fn object_mut(&mut self, key: RenderObjectKey) -> Option<&mut RenderObject> {
        self.objects.get_mut(key)
    }

    /// Register a point light
    pub fn create_light(&mut self, light: PointLight) -> LightKey {
        self.lighting.add_light(light)
    }

    /// Update a light in place
    pub fn update_light(&mut self, key: LightKey, light: PointLight) {
        self.lighting.update_light(key, light);
    }

    /// Remove a light
    pub fn remove_light(&mut self, key: LightKey) {
        self.lighting.remove_light(key);
    }

    /// Create an offscreen target sharing this renderer's device, for
    /// render-to-texture passes (editor viewports, picking targets)
    pub fn create_offscreen_target(
        &self,
        extent: vk::Extent2D,
        color_format: vk::Format,
    ) -> VulkanResult<OffscreenTarget> {
        OffscreenTarget::new(&self.context, extent, color_format)
    }

    /// Directory the renderer loads SPIR-V shaders from
    pub fn shader_dir(&self) -> &Path {
        &self.shader_dir
    }

    /// Render one frame.
    ///
    /// Returns without drawing when the window has zero area; callers
    /// should block on window events in that case rather than spin.
    pub fn render(&mut self, window: &mut Window, uniforms: &FrameUniforms) -> VulkanResult<()> {
        if window.is_minimized() {
            return Ok(());
        }
        if window.take_resized() {
            self.rebuild_pending = true;
        }

        // Slot fence first: everything per-slot is free to reuse after this
        self.sync.wait_current(u64::MAX)?;

        if self.rebuild_pending {
            self.rebuild_swapchain(window)?;
            self.rebuild_pending = false;
        }

        let (image_index, acquire_status) = self
            .swapchain
            .acquire_next_image(self.sync.current_frame().image_available.handle())?;

        let image_index = match (image_index, acquire_status) {
            (Some(index), _) => index,
            (None, _) => {
                // Stale surface, nothing acquired; rebuild and retry on
                // the same slot next call
                self.rebuild_swapchain(window)?;
                return Ok(());
            }
        };
        if acquire_status == SurfaceStatus::Suboptimal {
            self.rebuild_pending = true;
        }

        let slot = self.sync.current_slot();

        self.lighting
            .prepare_slot(&self.context, slot, &uniforms.camera)?;
        if let Some(particles) = &self.particles {
            particles.prepare_slot(slot, uniforms.delta_time)?;
        }

        self.record_frame(slot, image_index)?;

        // Reset only once submission is certain; an early-exit frame
        // must leave the fence signaled
        self.sync.current_frame().in_flight.reset()?;
        self.submit_frame(slot, image_index)?;

        let present_status = self.swapchain.present(
            self.context.present_queue(),
            image_index,
            self.sync.render_finished(image_index).handle(),
        )?;
        if present_status.needs_rebuild() {
            self.rebuild_pending = true;
        }

        self.sync.advance();
        Ok(())
    }

    fn record_frame(&self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let mut recorder = self.commands.begin_frame(slot)?;

        // Compute before the render pass; the buffer barrier inside
        // orders it against the particle draw
        if let Some(particles) = &self.particles {
            particles.record_compute(&mut recorder, slot)?;
        }

        let extent = self.target.extent();
        let render_area = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let clear_values = self.target.clear_values();

        {
            let mut pass = recorder.begin_render_pass(
                self.target.render_pass(),
                self.target.framebuffer(image_index),
                render_area,
                &clear_values,
            )?;

            pass.set_viewport(&vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: extent.width as f32,
                height: extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            });
            pass.set_scissor(&render_area);

            let shared_set = self.lighting.descriptor_set(slot);
            for effect in [EffectKind::Lit, EffectKind::Unlit] {
                let pipeline = match effect {
                    EffectKind::Lit => &self.lit_pipeline,
                    EffectKind::Unlit => &self.unlit_pipeline,
                };
                let Some(graphics) = pipeline.graphics() else {
                    continue;
                };

                let mut bound = false;
                for object in self.objects.values().filter(|o| o.effect == effect) {
                    if !bound {
                        pass.cmd_bind_pipeline(graphics);
                        pass.cmd_bind_descriptor_sets(pipeline.layout(), &[shared_set]);
                        bound = true;
                    }

                    let push = MeshPushConstants {
                        model: object.model.into(),
                        color: object.color,
                    };
                    pass.cmd_push_constants(
                        pipeline.layout(),
                        vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
                        0,
                        bytemuck::bytes_of(&push),
                    );
                    pass.cmd_bind_vertex_buffers(0, &[object.vertex_buffer.handle()], &[0]);
                    pass.cmd_bind_index_buffer(
                        object.index_buffer.handle(),
                        0,
                        vk::IndexType::UINT32,
                    );
                    pass.cmd_draw_indexed(object.index_buffer.index_count(), 1, 0, 0, 0);
                }
            }

            if let Some(particles) = &self.particles {
                particles.record_draw(&mut pass, slot)?;
            }
        }

        recorder.end()?;
        Ok(())
    }

    fn submit_frame(&self, slot: usize, image_index: u32) -> VulkanResult<()> {
        let wait_semaphores = [self.sync.current_frame().image_available.handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [self.commands.buffer(slot)];
        let signal_semaphores = [self.sync.render_finished(image_index).handle()];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.context
                .device()
                .device
                .queue_submit(
                    self.context.graphics_queue(),
                    &[submit_info],
                    self.sync.current_frame().in_flight.handle(),
                )
                .map_err(VulkanError::DeviceLost)
        }
    }

    /// Run the fixed rebuild sequence against the window's current size
    fn rebuild_swapchain(&mut self, window: &Window) -> VulkanResult<()> {
        let (width, height) = window.framebuffer_size();
        if width == 0 || height == 0 {
            // Deferred until the window has area again
            self.rebuild_pending = true;
            return Ok(());
        }

        self.context.wait_idle()?;

        let new_swapchain = Swapchain::new(
            &self.context,
            vk::Extent2D { width, height },
            self.swapchain.handle(),
        )?;
        // Old swapchain drops here, after the new one took its handle
        self.swapchain = new_swapchain;

        self.target =
            PresentationTarget::new(&self.context, &self.swapchain, self.target.samples())?;
        self.sync.reset_image_semaphores(self.swapchain.image_count())?;

        log::debug!(
            "Swapchain rebuilt: {}x{}, {} images",
            width,
            height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    /// Current swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    /// Block until the GPU is idle; used before application shutdown
    pub fn wait_idle(&self) -> VulkanResult<()> {
        self.context.wait_idle()
    }
}

impl Drop for VulkanRenderer {
    fn drop(&mut self) {
        // Field drops run after this wait, in declaration order: every
        // device-held resource releases before `context` tears down the
        // device, surface and instance
        let _ = self.context.wait_idle();
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Tracked {
        name: &'static str,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.name);
        }
    }

    // Mirrors the renderer's field layout rule: resources above, the
    // device-owning root below.
    struct Layout {
        swapchain: Tracked,
        context: Tracked,
    }

    #[test]
    fn gpu_resources_release_before_the_context() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let renderer = Layout {
            swapchain: Tracked {
                name: "swapchain",
                log: log.clone(),
            },
            context: Tracked {
                name: "context",
                log: log.clone(),
            },
        };
        let _ = &renderer.swapchain;
        let _ = &renderer.context;

        drop(renderer);
        assert_eq!(*log.borrow(), ["swapchain", "context"]);
    }
}
