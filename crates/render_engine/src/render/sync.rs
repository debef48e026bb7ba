//! Vulkan synchronization primitives
//!
//! RAII wrappers for semaphores (GPU-GPU ordering) and fences (CPU-GPU
//! completion), plus the per-slot [`FrameSync`] bundle the frame protocol
//! rotates through.

use ash::{vk, Device};

use crate::render::context::{VulkanError, VulkanResult};

/// GPU-side-only signal used to order one queue operation after another
/// without CPU involvement
pub struct Semaphore {
    device: Device,
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Create a new binary semaphore
    pub fn new(device: Device) -> VulkanResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();

        let semaphore = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "semaphore", code })?
        };

        Ok(Self { device, semaphore })
    }

    /// Get the semaphore handle
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

/// CPU-waitable signal indicating GPU work has finished
pub struct Fence {
    device: Device,
    fence: vk::Fence,
}

impl Fence {
    /// Create a new fence, optionally starting in the signaled state
    pub fn new(device: Device, signaled: bool) -> VulkanResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::builder().flags(flags);

        let fence = unsafe {
            device
                .create_fence(&create_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "fence", code })?
        };

        Ok(Self { device, fence })
    }

    /// Block the CPU until the fence is signaled
    pub fn wait(&self, timeout: u64) -> VulkanResult<()> {
        unsafe {
            self.device
                .wait_for_fences(&[self.fence], true, timeout)
                .map_err(VulkanError::Api)
        }
    }

    /// Reset the fence to unsignaled
    pub fn reset(&self) -> VulkanResult<()> {
        unsafe {
            self.device
                .reset_fences(&[self.fence])
                .map_err(VulkanError::Api)
        }
    }

    /// Get the fence handle
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.fence, None);
        }
    }
}

/// Per-slot synchronization bundle for in-flight frame management
pub struct FrameSync {
    /// Signaled by image acquisition, waited on by the frame's submit
    pub image_available: Semaphore,
    /// CPU-waitable completion of this slot's previous submission.
    /// Starts signaled so the first wait on a never-used slot passes.
    pub in_flight: Fence,
}

impl FrameSync {
    /// Create the slot's synchronization objects
    pub fn new(device: Device) -> VulkanResult<Self> {
        let image_available = Semaphore::new(device.clone())?;
        let in_flight = Fence::new(device, true)?;

        Ok(Self {
            image_available,
            in_flight,
        })
    }
}
