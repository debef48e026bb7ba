//! Buffer management for vertex, index, uniform and storage data
//!
//! Memory management following RAII patterns with proper allocation and
//! cleanup. All buffers here are host-visible and coherent; per-slot
//! buffers are re-written every frame so a staging path would buy nothing.

use ash::{vk, Device};
use bytemuck::Pod;
use std::mem;

use crate::render::context::{VulkanContext, VulkanError, VulkanResult};

/// Buffer wrapper with memory management
pub struct Buffer {
    device: Device,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
}

impl Buffer {
    /// Create a new buffer with memory allocation
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .create_buffer(&buffer_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "buffer", code })?
        };

        let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

        let memory_type_index =
            context.find_memory_type(mem_requirements.memory_type_bits, properties)?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(mem_requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "buffer memory", code })?
        };

        unsafe {
            device
                .bind_buffer_memory(buffer, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        Ok(Self {
            device,
            buffer,
            memory,
            size,
        })
    }

    /// Write data to the buffer through a transient mapping
    pub fn write_data<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        let byte_len = mem::size_of_val(data);
        if byte_len as vk::DeviceSize > self.size {
            return Err(VulkanError::InvalidOperation {
                reason: format!(
                    "write of {} bytes exceeds buffer size {}",
                    byte_len, self.size
                ),
            });
        }

        unsafe {
            let mapped = self
                .device
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(
                data.as_ptr() as *const std::ffi::c_void,
                mapped,
                byte_len,
            );
            self.device.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Get size
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Vertex buffer initialized with vertex data
pub struct VertexBuffer {
    buffer: Buffer,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Create vertex buffer with vertex data
    pub fn new<T: Pod>(context: &VulkanContext, vertices: &[T]) -> VulkanResult<Self> {
        let size = mem::size_of_val(vertices) as vk::DeviceSize;

        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        buffer.write_data(vertices)?;

        Ok(Self {
            buffer,
            vertex_count: vertices.len() as u32,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get vertex count
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }
}

/// Index buffer for u32 index data
pub struct IndexBuffer {
    buffer: Buffer,
    index_count: u32,
}

impl IndexBuffer {
    /// Create index buffer with index data
    pub fn new(context: &VulkanContext, indices: &[u32]) -> VulkanResult<Self> {
        let size = mem::size_of_val(indices) as vk::DeviceSize;

        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        buffer.write_data(indices)?;

        Ok(Self {
            buffer,
            index_count: indices.len() as u32,
        })
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get index count
    pub fn index_count(&self) -> u32 {
        self.index_count
    }
}

/// Typed uniform buffer, one record of `T`
pub struct UniformBuffer<T> {
    buffer: Buffer,
    _phantom: std::marker::PhantomData<T>,
}

impl<T: Pod> UniformBuffer<T> {
    /// Create uniform buffer sized for one `T`
    pub fn new(context: &VulkanContext) -> VulkanResult<Self> {
        let size = mem::size_of::<T>() as vk::DeviceSize;

        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self {
            buffer,
            _phantom: std::marker::PhantomData,
        })
    }

    /// Update uniform data
    pub fn update(&self, data: &T) -> VulkanResult<()> {
        self.buffer.write_data(std::slice::from_ref(data))
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}

/// Shader storage buffer, optionally also usable as a vertex source.
///
/// The particle effect binds the same buffer as compute output and as
/// the vertex stream of the draw, so both usages are requested there.
pub struct StorageBuffer {
    buffer: Buffer,
}

impl StorageBuffer {
    /// Create a storage buffer of the given byte size
    pub fn new(
        context: &VulkanContext,
        size: vk::DeviceSize,
        extra_usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let buffer = Buffer::new(
            context,
            size,
            vk::BufferUsageFlags::STORAGE_BUFFER | extra_usage,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        Ok(Self { buffer })
    }

    /// Create a storage buffer initialized with the given records
    pub fn with_data<T: Pod>(
        context: &VulkanContext,
        data: &[T],
        extra_usage: vk::BufferUsageFlags,
    ) -> VulkanResult<Self> {
        let size = mem::size_of_val(data) as vk::DeviceSize;
        let buffer = Self::new(context, size, extra_usage)?;
        buffer.write(data)?;
        Ok(buffer)
    }

    /// Overwrite the buffer contents from the start
    pub fn write<T: Pod>(&self, data: &[T]) -> VulkanResult<()> {
        self.buffer.write_data(data)
    }

    /// Get buffer handle
    pub fn handle(&self) -> vk::Buffer {
        self.buffer.handle()
    }

    /// Get size in bytes
    pub fn size(&self) -> vk::DeviceSize {
        self.buffer.size()
    }
}
