//! Compute-driven particle effect
//!
//! Particles are simulated entirely on the GPU. Each frame slot owns a
//! particle storage buffer; the compute pass for frame `i` reads the
//! buffer written by the previous frame and writes slot `i`'s buffer,
//! which the draw then consumes directly as its vertex stream. A buffer
//! memory barrier after the dispatch orders both readers of that buffer,
//! this frame's vertex input and the next frame's compute pass; no extra
//! semaphores are involved.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

use crate::render::buffer::{StorageBuffer, UniformBuffer};
use crate::render::commands::{ActiveRenderPass, CommandRecorder};
use crate::render::context::{VulkanContext, VulkanResult};
use crate::render::descriptor::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
use crate::render::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::pipeline::{
    Effect, Pipeline, PipelineStateDescription, ShaderSet, ShaderStageDesc, VertexLayout,
};

/// Threads per compute work group; must match the shader's local size
const WORKGROUP_SIZE: u32 = 256;

/// Work groups needed to cover `count` particles
fn dispatch_groups(count: u32) -> u32 {
    count.div_ceil(WORKGROUP_SIZE)
}

/// Stage/access masks for the barrier recorded after each dispatch.
///
/// The buffer written by frame `i`'s compute has two readers: frame
/// `i`'s vertex input, and frame `i+1`'s compute pass, which runs in a
/// later submission on the same queue and is not covered by any fence
/// by the time it executes. Both readers must appear in the destination
/// masks; barriers order across command buffers on one queue.
fn interop_barrier_masks() -> (
    vk::PipelineStageFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::AccessFlags,
) {
    (
        vk::PipelineStageFlags::COMPUTE_SHADER,
        vk::AccessFlags::SHADER_WRITE,
        vk::PipelineStageFlags::VERTEX_INPUT | vk::PipelineStageFlags::COMPUTE_SHADER,
        vk::AccessFlags::VERTEX_ATTRIBUTE_READ | vk::AccessFlags::SHADER_READ,
    )
}

/// One simulated particle, also the vertex format of the draw
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct Particle {
    position: [f32; 2],
    velocity: [f32; 2],
    color: [f32; 4],
}

/// Per-frame simulation parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SimParams {
    delta_time: f32,
    particle_count: u32,
    _pad: [f32; 2],
}

/// Deterministic initial state: particles on a golden-angle spiral with
/// outward velocities
fn seed_particles(count: u32) -> Vec<Particle> {
    const GOLDEN_ANGLE: f32 = 2.399_963;
    (0..count)
        .map(|i| {
            let t = i as f32 / count.max(1) as f32;
            let angle = i as f32 * GOLDEN_ANGLE;
            let radius = 0.8 * t.sqrt();
            let (sin, cos) = angle.sin_cos();
            Particle {
                position: [radius * cos, radius * sin],
                velocity: [cos * 0.1, sin * 0.1],
                color: [0.3 + 0.7 * t, 0.5, 1.0 - 0.6 * t, 1.0],
            }
        })
        .collect()
}

struct ParticleEffect {
    layout: vk::DescriptorSetLayout,
    shader_set: ShaderSet,
}

impl Effect for ParticleEffect {
    fn name(&self) -> &str {
        "particles"
    }

    fn shaders(&self) -> ShaderSet {
        self.shader_set.clone()
    }

    fn descriptor_layouts(&self) -> Vec<vk::DescriptorSetLayout> {
        vec![self.layout]
    }

    fn graphics_state(&self) -> PipelineStateDescription {
        PipelineStateDescription::point_sprites().with_vertex_layout(VertexLayout::new(
            vec![vk::VertexInputBindingDescription {
                binding: 0,
                stride: std::mem::size_of::<Particle>() as u32,
                input_rate: vk::VertexInputRate::VERTEX,
            }],
            vec![
                vk::VertexInputAttributeDescription {
                    location: 0,
                    binding: 0,
                    format: vk::Format::R32G32_SFLOAT,
                    offset: 0,
                },
                vk::VertexInputAttributeDescription {
                    location: 1,
                    binding: 0,
                    format: vk::Format::R32G32B32A32_SFLOAT,
                    offset: 16,
                },
            ],
        ))
    }
}

struct SlotResources {
    params: UniformBuffer<SimParams>,
    buffer: StorageBuffer,
    descriptor_set: vk::DescriptorSet,
}

/// Particle simulation and rendering, one buffer per frame slot
pub struct ParticleSystem {
    count: u32,
    layout: DescriptorSetLayout,
    _pool: DescriptorPool,
    slots: Vec<SlotResources>,
    pipeline: Pipeline,
}

impl ParticleSystem {
    /// Create buffers, descriptor sets and the combined compute/graphics
    /// pipeline. All slot buffers start from the same seeded state so
    /// the first frame's read of the "previous" slot is well defined.
    pub fn new(
        context: &VulkanContext,
        render_pass: vk::RenderPass,
        samples: vk::SampleCountFlags,
        shader_dir: &Path,
        count: u32,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();

        let layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(0, vk::ShaderStageFlags::COMPUTE)
            .add_storage_buffer(1, vk::ShaderStageFlags::COMPUTE)
            .add_storage_buffer(2, vk::ShaderStageFlags::COMPUTE)
            .build(&device)?;

        let pool = DescriptorPool::new(device.clone(), MAX_FRAMES_IN_FLIGHT as u32)?;
        let layouts = [layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let sets = pool.allocate_descriptor_sets(&layouts)?;

        let seed = seed_particles(count);
        let buffers = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| {
                StorageBuffer::with_data(
                    context,
                    &seed,
                    vk::BufferUsageFlags::VERTEX_BUFFER,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let mut params_buffers = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for (i, &descriptor_set) in sets.iter().enumerate() {
            let params = UniformBuffer::<SimParams>::new(context)?;
            params.update(&SimParams {
                delta_time: 0.0,
                particle_count: count,
                _pad: [0.0; 2],
            })?;

            // Read the previous slot's buffer, write this slot's
            let prev = (i + MAX_FRAMES_IN_FLIGHT - 1) % MAX_FRAMES_IN_FLIGHT;
            DescriptorSetWriter::new()
                .write_uniform_buffer(descriptor_set, 0, params.handle(), params.size())
                .write_storage_buffer(
                    descriptor_set,
                    1,
                    buffers[prev].handle(),
                    buffers[prev].size(),
                )
                .write_storage_buffer(descriptor_set, 2, buffers[i].handle(), buffers[i].size())
                .update(&device);

            params_buffers.push(params);
        }

        let slots: Vec<SlotResources> = params_buffers
            .into_iter()
            .zip(buffers)
            .zip(sets)
            .map(|((params, buffer), descriptor_set)| SlotResources {
                params,
                buffer,
                descriptor_set,
            })
            .collect();

        let effect = ParticleEffect {
            layout: layout.handle(),
            shader_set: ShaderSet {
                vertex: Some(ShaderStageDesc::new(shader_dir.join("particles.vert.spv"))),
                fragment: Some(ShaderStageDesc::new(shader_dir.join("particles.frag.spv"))),
                compute: Some(ShaderStageDesc::new(shader_dir.join("particles.comp.spv"))),
            },
        };
        let pipeline = Pipeline::build(context, &effect, render_pass, samples)?;

        Ok(Self {
            count,
            layout,
            _pool: pool,
            slots,
            pipeline,
        })
    }

    /// Number of simulated particles
    pub fn particle_count(&self) -> u32 {
        self.count
    }

    /// Upload this frame's simulation parameters for the slot
    pub fn prepare_slot(&self, slot: usize, delta_time: f32) -> VulkanResult<()> {
        self.slots[slot].params.update(&SimParams {
            delta_time,
            particle_count: self.count,
            _pad: [0.0; 2],
        })
    }

    /// Record the simulation dispatch and the barrier that makes its
    /// writes visible to this frame's vertex input and the next frame's
    /// compute pass. Must be recorded before the frame's render pass
    /// begins.
    pub fn record_compute(&self, recorder: &mut CommandRecorder, slot: usize) -> VulkanResult<()> {
        let slot_res = &self.slots[slot];
        let pipeline = self
            .pipeline
            .compute()
            .ok_or_else(|| crate::render::context::VulkanError::InvalidOperation {
                reason: "particle pipeline has no compute stage".to_string(),
            })?;

        recorder.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, pipeline);
        recorder.cmd_bind_descriptor_sets(
            vk::PipelineBindPoint::COMPUTE,
            self.pipeline.layout(),
            &[slot_res.descriptor_set],
        );
        recorder.cmd_dispatch(dispatch_groups(self.count), 1, 1);

        let (src_stage, src_access, dst_stage, dst_access) = interop_barrier_masks();
        recorder.cmd_buffer_barrier(
            slot_res.buffer.handle(),
            slot_res.buffer.size(),
            src_stage,
            src_access,
            dst_stage,
            dst_access,
        );

        Ok(())
    }

    /// Draw the slot's particles inside an active render pass
    pub fn record_draw(&self, pass: &mut ActiveRenderPass<'_>, slot: usize) -> VulkanResult<()> {
        let pipeline = self
            .pipeline
            .graphics()
            .ok_or_else(|| crate::render::context::VulkanError::InvalidOperation {
                reason: "particle pipeline has no graphics stage".to_string(),
            })?;

        pass.cmd_bind_pipeline(pipeline);
        pass.cmd_bind_vertex_buffers(0, &[self.slots[slot].buffer.handle()], &[0]);
        pass.cmd_draw(self.count, 1, 0, 0);

        Ok(())
    }

    /// Descriptor layout handle, exposed for tests and tooling
    pub fn descriptor_layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_covers_every_particle() {
        assert_eq!(dispatch_groups(0), 0);
        assert_eq!(dispatch_groups(1), 1);
        assert_eq!(dispatch_groups(256), 1);
        assert_eq!(dispatch_groups(257), 2);
        assert_eq!(dispatch_groups(4096), 16);
    }

    #[test]
    fn particle_vertex_stride_matches_layout() {
        assert_eq!(std::mem::size_of::<Particle>(), 32);
        // color attribute starts after position + velocity
        assert_eq!(std::mem::size_of::<[f32; 2]>() * 2, 16);
    }

    #[test]
    fn barrier_covers_both_readers_of_a_slot_buffer() {
        let (src_stage, src_access, dst_stage, dst_access) = interop_barrier_masks();
        assert_eq!(src_stage, vk::PipelineStageFlags::COMPUTE_SHADER);
        assert_eq!(src_access, vk::AccessFlags::SHADER_WRITE);
        // This frame's draw reads the buffer as vertex input; the next
        // frame's compute reads it as its simulation input.
        assert!(dst_stage.contains(vk::PipelineStageFlags::VERTEX_INPUT));
        assert!(dst_stage.contains(vk::PipelineStageFlags::COMPUTE_SHADER));
        assert!(dst_access.contains(vk::AccessFlags::VERTEX_ATTRIBUTE_READ));
        assert!(dst_access.contains(vk::AccessFlags::SHADER_READ));
    }

    #[test]
    fn seeded_particles_start_inside_clip_space() {
        let particles = seed_particles(1000);
        assert_eq!(particles.len(), 1000);
        for p in &particles {
            assert!(p.position[0].abs() <= 1.0);
            assert!(p.position[1].abs() <= 1.0);
        }
    }
}
