//! Render objects and mesh data
//!
//! A render object is a mesh uploaded to GPU buffers plus the effect
//! that draws it and a model transform the application updates between
//! frames. Objects live in a slotmap; the returned key is the only
//! handle the application holds.

use ash::vk;
use bytemuck::{Pod, Zeroable};
use nalgebra::Matrix4;
use slotmap::new_key_type;

use crate::render::buffer::{IndexBuffer, VertexBuffer};
use crate::render::context::{VulkanContext, VulkanResult};

new_key_type! {
    /// Stable handle to a loaded render object
    pub struct RenderObjectKey;
}

/// Standard mesh vertex: position, normal, texture coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct MeshVertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Texture coordinates
    pub tex_coord: [f32; 2],
}

impl MeshVertex {
    /// Vertex input binding description for the mesh vertex layout
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Vertex attribute descriptions matching the binding above
    pub fn attribute_descriptions() -> Vec<vk::VertexInputAttributeDescription> {
        vec![
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 0,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: 12,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: 24,
            },
        ]
    }
}

/// CPU-side mesh description handed to the renderer for upload
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    /// Vertex records
    pub vertices: Vec<MeshVertex>,
    /// Triangle list indices
    pub indices: Vec<u32>,
}

/// Opaque handle to a texture uploaded by the asset layer.
///
/// The representative effects here are untextured; objects carry their
/// handles so textured effects can resolve them without an API change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureHandle(pub u32);

/// Which effect a render object is drawn with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EffectKind {
    /// Phong-lit opaque geometry
    Lit,
    /// Unlit flat color, used by debug helpers
    Unlit,
}

/// Mesh uploaded to the GPU together with its drawing state
pub struct RenderObject {
    /// Uploaded vertex data
    pub vertex_buffer: VertexBuffer,
    /// Uploaded index data
    pub index_buffer: IndexBuffer,
    /// Effect used to draw this object
    pub effect: EffectKind,
    /// Object-to-world transform, updated by the application
    pub model: Matrix4<f32>,
    /// Base color multiplier pushed to the shader
    pub color: [f32; 4],
    /// Diffuse texture, if the asset layer supplied one
    pub texture: Option<TextureHandle>,
    /// Specular map, if the asset layer supplied one
    pub specular_texture: Option<TextureHandle>,
}

impl RenderObject {
    /// Upload a mesh and wrap it as a render object
    pub fn new(
        context: &VulkanContext,
        mesh: &MeshData,
        effect: EffectKind,
        texture: Option<TextureHandle>,
        specular_texture: Option<TextureHandle>,
    ) -> VulkanResult<Self> {
        let vertex_buffer = VertexBuffer::new(context, &mesh.vertices)?;
        let index_buffer = IndexBuffer::new(context, &mesh.indices)?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            effect,
            model: Matrix4::identity(),
            color: [1.0, 1.0, 1.0, 1.0],
            texture,
            specular_texture,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_layout_matches_attribute_offsets() {
        let attrs = MeshVertex::attribute_descriptions();
        assert_eq!(attrs.len(), 3);
        assert_eq!(attrs[1].offset, 12);
        assert_eq!(attrs[2].offset, 24);
        assert_eq!(
            MeshVertex::binding_description().stride,
            std::mem::size_of::<MeshVertex>() as u32
        );
    }
}
