//! Vulkan rendering core
//!
//! Low-level Vulkan implementation with a strict ownership direction:
//! [`context::VulkanContext`] is the sole root; every other component holds
//! a non-owning reference to it and is owned by the frame orchestrator.

/// Per-slot GPU buffers (vertex/index/uniform/storage)
pub mod buffer;
/// Command pool and typed command recording
pub mod commands;
/// Instance, device, queues and the error taxonomy
pub mod context;
/// Descriptor set layouts, pools and writers
pub mod descriptor;
/// Frame slot rotation and the acquire/submit/present protocol
pub mod frame;
/// Shared lighting data: registry, storage buffers, descriptor set
pub mod lighting;
/// Render objects and their registry
pub mod object;
/// Compute-to-graphics particle interop
pub mod particles;
/// Composable pipeline abstraction and state records
pub mod pipeline;
/// Render pass construction
pub mod render_pass;
/// Frame orchestrator
pub mod renderer;
/// Swapchain lifecycle and surface status
pub mod swapchain;
/// RAII synchronization primitives
pub mod sync;
/// Presentation-backed and offscreen render targets
pub mod target;
/// Plain-old-data uniform records
pub mod uniforms;
/// SPIR-V shader modules
pub mod shader;

pub use buffer::{Buffer, IndexBuffer, StorageBuffer, UniformBuffer, VertexBuffer};
pub use commands::{ActiveRenderPass, CommandPool, CommandRecorder, FrameCommands};
pub use context::{
    LogicalDevice, PhysicalDeviceInfo, VulkanContext, VulkanError, VulkanInstance, VulkanResult,
};
pub use descriptor::{DescriptorPool, DescriptorSetLayout, DescriptorSetLayoutBuilder, DescriptorSetWriter};
pub use frame::{FrameSchedule, FrameSyncController, MAX_FRAMES_IN_FLIGHT};
pub use lighting::{LightKey, LightingSystem, PointLight};
pub use object::{EffectKind, MeshData, MeshVertex, RenderObject, RenderObjectKey, TextureHandle};
pub use particles::ParticleSystem;
pub use pipeline::{
    BlendState, DepthState, Effect, Pipeline, PipelineCapabilities, PipelineStateDescription,
    RasterState, ShaderSet, ShaderStageDesc, VertexLayout,
};
pub use render_pass::RenderPass;
pub use renderer::VulkanRenderer;
pub use swapchain::{SurfaceStatus, Swapchain};
pub use sync::{Fence, FrameSync, Semaphore};
pub use target::{
    AttachmentImage, OffscreenTarget, OffscreenTexture, PresentationTarget, RenderTarget,
    OFFSCREEN_IMAGE_COUNT,
};
pub use uniforms::{CameraUniformData, FrameUniforms};
pub use shader::ShaderModule;
