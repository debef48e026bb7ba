//! Shared lighting data
//!
//! The lighting system owns the per-slot shared descriptor set: camera
//! uniform at binding 0, point-light storage buffer at binding 1. Lights
//! live in a slotmap so applications can add, move and remove them
//! between frames with stable keys.
//!
//! When light count outgrows a slot's storage buffer, only that buffer
//! is replaced and only binding 1 of that slot's set is rewritten; the
//! camera binding is never touched. The rewrite happens in
//! [`LightingSystem::prepare_slot`], after the caller has waited on the
//! slot's fence, so no in-flight frame can still reference the old
//! buffer.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use slotmap::{new_key_type, SlotMap};

use crate::render::buffer::{StorageBuffer, UniformBuffer};
use crate::render::context::{VulkanContext, VulkanResult};
use crate::render::descriptor::{
    DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter,
};
use crate::render::frame::MAX_FRAMES_IN_FLIGHT;
use crate::render::uniforms::CameraUniformData;

new_key_type! {
    /// Stable handle to a point light
    pub struct LightKey;
}

/// Application-facing point light description
#[derive(Debug, Clone, Copy)]
pub struct PointLight {
    /// World-space position
    pub position: [f32; 3],
    /// Linear RGB color
    pub color: [f32; 3],
    /// Brightness multiplier
    pub intensity: f32,
    /// Distance beyond which the light contributes nothing
    pub radius: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: [0.0, 0.0, 0.0],
            color: [1.0, 1.0, 1.0],
            intensity: 1.0,
            radius: 10.0,
        }
    }
}

/// std430 light record as the shader sees it
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct GpuPointLight {
    position: [f32; 4],
    color_intensity: [f32; 4],
    params: [f32; 4],
}

impl From<&PointLight> for GpuPointLight {
    fn from(light: &PointLight) -> Self {
        Self {
            position: [light.position[0], light.position[1], light.position[2], 1.0],
            color_intensity: [
                light.color[0],
                light.color[1],
                light.color[2],
                light.intensity,
            ],
            params: [light.radius, 0.0, 0.0, 0.0],
        }
    }
}

/// Buffer header preceding the light array; count plus padding to 16
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct LightBufferHeader {
    count: u32,
    _pad: [u32; 3],
}

/// Initial per-slot light capacity
const INITIAL_LIGHT_CAPACITY: usize = 16;

/// Capacity the lights buffer must grow to, or `None` if it already fits.
///
/// Doubles from the current capacity so repeated single-light additions
/// do not reallocate every frame.
fn grown_capacity(current: usize, needed: usize) -> Option<usize> {
    if needed <= current {
        return None;
    }
    let mut capacity = current.max(1);
    while capacity < needed {
        capacity *= 2;
    }
    Some(capacity)
}

fn buffer_size_for(capacity: usize) -> vk::DeviceSize {
    (std::mem::size_of::<LightBufferHeader>()
        + capacity * std::mem::size_of::<GpuPointLight>()) as vk::DeviceSize
}

struct SlotResources {
    camera: UniformBuffer<CameraUniformData>,
    lights: StorageBuffer,
    capacity: usize,
    descriptor_set: vk::DescriptorSet,
}

/// Owner of the shared per-frame descriptor set and the light registry
pub struct LightingSystem {
    lights: SlotMap<LightKey, PointLight>,
    layout: DescriptorSetLayout,
    _pool: DescriptorPool,
    slots: Vec<SlotResources>,
}

impl LightingSystem {
    /// Create per-slot camera and light buffers and their descriptor sets
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let device = context.raw_device();

        let layout = DescriptorSetLayoutBuilder::new()
            .add_uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )
            .add_storage_buffer(1, vk::ShaderStageFlags::FRAGMENT)
            .build(&device)?;

        let pool = DescriptorPool::new(device.clone(), MAX_FRAMES_IN_FLIGHT as u32)?;
        let layouts = [layout.handle(); MAX_FRAMES_IN_FLIGHT];
        let sets = pool.allocate_descriptor_sets(&layouts)?;

        let mut slots = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for &descriptor_set in &sets {
            let camera = UniformBuffer::<CameraUniformData>::new(context)?;
            camera.update(&CameraUniformData::default())?;

            let lights = StorageBuffer::new(
                context,
                buffer_size_for(INITIAL_LIGHT_CAPACITY),
                vk::BufferUsageFlags::empty(),
            )?;

            DescriptorSetWriter::new()
                .write_uniform_buffer(descriptor_set, 0, camera.handle(), camera.size())
                .write_storage_buffer(descriptor_set, 1, lights.handle(), lights.size())
                .update(&device);

            slots.push(SlotResources {
                camera,
                lights,
                capacity: INITIAL_LIGHT_CAPACITY,
                descriptor_set,
            });
        }

        Ok(Self {
            lights: SlotMap::with_key(),
            layout,
            _pool: pool,
            slots,
        })
    }

    /// Register a light, returning its stable key
    pub fn add_light(&mut self, light: PointLight) -> LightKey {
        self.lights.insert(light)
    }

    /// Update a light in place; ignored if the key is stale
    pub fn update_light(&mut self, key: LightKey, light: PointLight) {
        if let Some(entry) = self.lights.get_mut(key) {
            *entry = light;
        }
    }

    /// Remove a light; ignored if the key is stale
    pub fn remove_light(&mut self, key: LightKey) {
        self.lights.remove(key);
    }

    /// Number of registered lights
    pub fn light_count(&self) -> usize {
        self.lights.len()
    }

    /// Layout of the shared descriptor set, for pipeline assembly
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout.handle()
    }

    /// Descriptor set bound for the given frame slot
    pub fn descriptor_set(&self, slot: usize) -> vk::DescriptorSet {
        self.slots[slot].descriptor_set
    }

    /// Upload this frame's camera and light data into the slot's buffers.
    ///
    /// Must only run after the slot's fence wait; growing the light
    /// buffer frees the previous one.
    pub fn prepare_slot(
        &mut self,
        context: &VulkanContext,
        slot: usize,
        camera: &CameraUniformData,
    ) -> VulkanResult<()> {
        let device = context.raw_device();
        let slot_res = &mut self.slots[slot];

        slot_res.camera.update(camera)?;

        if let Some(new_capacity) = grown_capacity(slot_res.capacity, self.lights.len()) {
            log::debug!(
                "Growing light buffer for slot {}: {} -> {} entries",
                slot,
                slot_res.capacity,
                new_capacity
            );
            slot_res.lights = StorageBuffer::new(
                context,
                buffer_size_for(new_capacity),
                vk::BufferUsageFlags::empty(),
            )?;
            slot_res.capacity = new_capacity;

            // Only binding 1 changed; the camera binding keeps its write
            DescriptorSetWriter::new()
                .write_storage_buffer(
                    slot_res.descriptor_set,
                    1,
                    slot_res.lights.handle(),
                    slot_res.lights.size(),
                )
                .update(&device);
        }

        let header = LightBufferHeader {
            count: self.lights.len() as u32,
            _pad: [0; 3],
        };
        let records: Vec<GpuPointLight> = self.lights.values().map(GpuPointLight::from).collect();

        let mut bytes =
            Vec::with_capacity(buffer_size_for(records.len()) as usize);
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        bytes.extend_from_slice(bytemuck::cast_slice(&records));
        slot_res.lights.write(bytes.as_slice())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_untouched_while_lights_fit() {
        assert_eq!(grown_capacity(16, 0), None);
        assert_eq!(grown_capacity(16, 16), None);
    }

    #[test]
    fn capacity_doubles_until_lights_fit() {
        assert_eq!(grown_capacity(16, 17), Some(32));
        assert_eq!(grown_capacity(16, 100), Some(128));
        assert_eq!(grown_capacity(0, 3), Some(4));
    }

    #[test]
    fn gpu_record_packs_color_and_intensity_together() {
        let light = PointLight {
            position: [1.0, 2.0, 3.0],
            color: [0.5, 0.25, 0.125],
            intensity: 7.0,
            radius: 42.0,
        };
        let gpu = GpuPointLight::from(&light);
        assert_eq!(gpu.position, [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(gpu.color_intensity, [0.5, 0.25, 0.125, 7.0]);
        assert_eq!(gpu.params[0], 42.0);
    }

    #[test]
    fn buffer_layout_starts_with_aligned_header() {
        assert_eq!(std::mem::size_of::<LightBufferHeader>(), 16);
        assert_eq!(std::mem::size_of::<GpuPointLight>(), 48);
        assert_eq!(buffer_size_for(2), 16 + 96);
    }
}
