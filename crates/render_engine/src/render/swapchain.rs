//! Vulkan swapchain lifecycle and surface status
//!
//! Stale and suboptimal surface conditions are frequent, expected events
//! (every window resize produces one), so acquire and present report them
//! as a [`SurfaceStatus`] value rather than through the error channel.
//! Genuinely unexpected results still surface as [`VulkanError`].

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use crate::render::context::{VulkanContext, VulkanError, VulkanResult};

/// Health of the presentation surface as reported by acquire/present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceStatus {
    /// Swapchain matches the surface; nothing to do
    Optimal,
    /// Presentation still works but the swapchain no longer matches the
    /// surface exactly; rebuild after the current frame completes
    Suboptimal,
    /// Swapchain is unusable; rebuild before any further presentation
    Stale,
}

impl SurfaceStatus {
    /// Whether this status requires a swapchain rebuild
    pub fn needs_rebuild(self) -> bool {
        !matches!(self, SurfaceStatus::Optimal)
    }
}

/// Map an `acquire_next_image` result into an image index and status.
///
/// `ERROR_OUT_OF_DATE_KHR` yields no image at all, so the index is absent
/// for [`SurfaceStatus::Stale`].
pub(crate) fn classify_acquire(
    result: Result<(u32, bool), vk::Result>,
) -> VulkanResult<(Option<u32>, SurfaceStatus)> {
    match result {
        Ok((index, false)) => Ok((Some(index), SurfaceStatus::Optimal)),
        Ok((index, true)) => Ok((Some(index), SurfaceStatus::Suboptimal)),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((None, SurfaceStatus::Stale)),
        Err(code) => Err(VulkanError::Api(code)),
    }
}

/// Map a `queue_present` result into a status.
///
/// Unlike acquire, a stale result here means the frame was already
/// submitted; only the presentation itself was dropped.
pub(crate) fn classify_present(result: Result<bool, vk::Result>) -> VulkanResult<SurfaceStatus> {
    match result {
        Ok(false) => Ok(SurfaceStatus::Optimal),
        Ok(true) => Ok(SurfaceStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SurfaceStatus::Stale),
        Err(code) => Err(VulkanError::DeviceLost(code)),
    }
}

/// Clamp a window framebuffer extent into the surface's supported range.
///
/// When the surface reports a concrete `current_extent` (width is not the
/// `u32::MAX` sentinel), that extent is authoritative.
pub(crate) fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window_extent
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window_extent
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Request one image beyond the minimum, respecting the maximum when the
/// surface declares one (0 means unbounded).
pub(crate) fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        desired.min(caps.max_image_count)
    } else {
        desired
    }
}

/// Pick MAILBOX when available, otherwise the always-present FIFO
pub(crate) fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Prefer BGRA8 sRGB, otherwise the first format the surface offers
pub(crate) fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|sf| {
            sf.format == vk::Format::B8G8R8A8_SRGB
                && sf.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(formats[0])
}

/// Swapchain wrapper with RAII cleanup
///
/// A single construction path serves both initial creation and rebuild;
/// rebuilds pass the retired swapchain handle so in-flight presentation
/// can complete against it.
pub struct Swapchain {
    device: Device,
    swapchain_loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Create a swapchain for the context's surface.
    ///
    /// `old_swapchain` is `vk::SwapchainKHR::null()` on first creation and
    /// the retired handle on rebuild.
    pub fn new(
        context: &VulkanContext,
        window_extent: vk::Extent2D,
        old_swapchain: vk::SwapchainKHR,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let swapchain_loader = context.swapchain_loader().clone();
        let physical = context.physical_device().device;
        let surface = context.surface();
        let surface_loader = context.surface_loader();

        let caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical, surface)
                .map_err(VulkanError::Api)?
        };
        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical, surface)
                .map_err(VulkanError::Api)?
        };

        let format = choose_surface_format(&formats);
        let present_mode = choose_present_mode(&present_modes);
        let extent = choose_extent(&caps, window_extent);
        let image_count = choose_image_count(&caps);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "swapchain", code })?
        };

        let images = unsafe {
            swapchain_loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::Api)?
        };

        let image_views: Result<Vec<_>, _> = images
            .iter()
            .map(|&image| {
                let view_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format.format)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.create_image_view(&view_info, None) }
            })
            .collect();
        let image_views = image_views
            .map_err(|code| VulkanError::ResourceCreation { kind: "swapchain image view", code })?;

        log::debug!(
            "Swapchain created: {}x{}, {} images, {:?}",
            extent.width,
            extent.height,
            images.len(),
            present_mode
        );

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format,
            extent,
        })
    }

    /// Acquire the next presentable image.
    ///
    /// Returns the image index paired with the surface status; on
    /// [`SurfaceStatus::Stale`] no image was acquired and the index is
    /// `None`.
    pub fn acquire_next_image(
        &self,
        signal: vk::Semaphore,
    ) -> VulkanResult<(Option<u32>, SurfaceStatus)> {
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                signal,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Present the given image on the present queue once `wait` signals
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait: vk::Semaphore,
    ) -> VulkanResult<SurfaceStatus> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { self.swapchain_loader.queue_present(queue, &present_info) };
        classify_present(result)
    }

    /// Get swapchain extent
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Get surface format
    pub fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Get image views, one per swapchain image
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    /// Number of images the swapchain actually delivered
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Get swapchain handle
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min_count: u32, max_count: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min_count,
            max_image_count: max_count,
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn acquire_suboptimal_still_returns_image() {
        let (index, status) = classify_acquire(Ok((2, true))).unwrap();
        assert_eq!(index, Some(2));
        assert_eq!(status, SurfaceStatus::Suboptimal);
        assert!(status.needs_rebuild());
    }

    #[test]
    fn acquire_out_of_date_is_stale_not_error() {
        let (index, status) =
            classify_acquire(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap();
        assert_eq!(index, None);
        assert_eq!(status, SurfaceStatus::Stale);
    }

    #[test]
    fn acquire_device_lost_is_an_error() {
        assert!(classify_acquire(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn present_statuses_map_like_acquire() {
        assert_eq!(classify_present(Ok(false)).unwrap(), SurfaceStatus::Optimal);
        assert_eq!(
            classify_present(Ok(true)).unwrap(),
            SurfaceStatus::Suboptimal
        );
        assert_eq!(
            classify_present(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            SurfaceStatus::Stale
        );
        assert!(classify_present(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }

    #[test]
    fn extent_uses_surface_value_when_fixed() {
        let caps = caps(2, 8, (800, 600));
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 1920,
                height: 1080,
            },
        );
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn extent_clamps_window_size_when_flexible() {
        let caps = caps(2, 8, (u32::MAX, u32::MAX));
        let extent = choose_extent(
            &caps,
            vk::Extent2D {
                width: 10_000,
                height: 0,
            },
        );
        assert_eq!((extent.width, extent.height), (4096, 1));
    }

    #[test]
    fn image_count_respects_surface_maximum() {
        assert_eq!(choose_image_count(&caps(2, 3, (0, 0))), 3);
        assert_eq!(choose_image_count(&caps(2, 0, (0, 0))), 3);
        assert_eq!(choose_image_count(&caps(3, 8, (0, 0))), 4);
    }

    #[test]
    fn present_mode_prefers_mailbox_falls_back_to_fifo() {
        assert_eq!(
            choose_present_mode(&[
                vk::PresentModeKHR::FIFO,
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::IMMEDIATE,
            ]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE]),
            vk::PresentModeKHR::FIFO
        );
    }
}
