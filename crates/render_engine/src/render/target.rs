//! Render targets: presentation-backed and offscreen
//!
//! A render target bundles a render pass with the attachments and
//! framebuffers it draws into. The presentation target is rebuilt on
//! every swapchain rebuild; the offscreen target only when its extent
//! changes.

use ash::{vk, Device};

use crate::render::context::{VulkanContext, VulkanError, VulkanResult};
use crate::render::render_pass::RenderPass;
use crate::render::swapchain::Swapchain;

/// Device-local image usable as a framebuffer attachment
pub struct AttachmentImage {
    device: Device,
    image: vk::Image,
    memory: vk::DeviceMemory,
    image_view: vk::ImageView,
    format: vk::Format,
}

impl AttachmentImage {
    /// Create an attachment image with the given format, usage and
    /// sample count
    pub fn new(
        context: &VulkanContext,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();

        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(samples);

        let image = unsafe {
            device
                .create_image(&image_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "attachment image", code })?
        };

        let requirements = unsafe { device.get_image_memory_requirements(image) };
        let memory_type_index = context.find_memory_type(
            requirements.memory_type_bits,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = unsafe {
            device
                .allocate_memory(&alloc_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "image memory", code })?
        };

        unsafe {
            device
                .bind_image_memory(image, memory, 0)
                .map_err(VulkanError::Api)?;
        }

        let view_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        let image_view = unsafe {
            device
                .create_image_view(&view_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "image view", code })?
        };

        Ok(Self {
            device,
            image,
            memory,
            image_view,
            format,
        })
    }

    /// Get the image view handle
    pub fn image_view(&self) -> vk::ImageView {
        self.image_view
    }

    /// Get the image handle
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// Get the image format
    pub fn format(&self) -> vk::Format {
        self.format
    }
}

impl Drop for AttachmentImage {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_image_view(self.image_view, None);
            self.device.destroy_image(self.image, None);
            self.device.free_memory(self.memory, None);
        }
    }
}

/// Framebuffer wrapper with RAII cleanup
struct Framebuffer {
    device: Device,
    framebuffer: vk::Framebuffer,
}

impl Framebuffer {
    fn new(
        device: Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> VulkanResult<Self> {
        let create_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        let framebuffer = unsafe {
            device
                .create_framebuffer(&create_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "framebuffer", code })?
        };

        Ok(Self {
            device,
            framebuffer,
        })
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_framebuffer(self.framebuffer, None);
        }
    }
}

/// Something pipelines can render into
pub trait RenderTarget {
    /// Render pass the target's framebuffers were built for
    fn render_pass(&self) -> vk::RenderPass;
    /// Framebuffer for the given image index
    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer;
    /// Target extent in pixels
    fn extent(&self) -> vk::Extent2D;
    /// Color attachment format
    fn color_format(&self) -> vk::Format;
    /// Clear values matching the target's attachment order
    fn clear_values(&self) -> Vec<vk::ClearValue>;
}

/// Swapchain-backed target with depth and optional MSAA.
///
/// Owns the forward render pass, the depth attachment, the MSAA color
/// attachment when multisampling is on, and one framebuffer per
/// swapchain image. Fields drop in declaration order, mirroring the
/// construction order in reverse: framebuffers go first, then the
/// attachments they reference, then the render pass.
pub struct PresentationTarget {
    framebuffers: Vec<Framebuffer>,
    depth: AttachmentImage,
    msaa_color: Option<AttachmentImage>,
    render_pass: RenderPass,
    extent: vk::Extent2D,
    color_format: vk::Format,
    samples: vk::SampleCountFlags,
}

impl PresentationTarget {
    /// Build the target against the current swapchain
    pub fn new(
        context: &VulkanContext,
        swapchain: &Swapchain,
        samples: vk::SampleCountFlags,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let extent = swapchain.extent();
        let color_format = swapchain.format().format;
        let depth_format = context.find_depth_format()?;

        let render_pass =
            RenderPass::new_forward_pass(device.clone(), color_format, depth_format, samples)?;

        let multisampled = samples != vk::SampleCountFlags::TYPE_1;

        let msaa_color = if multisampled {
            Some(AttachmentImage::new(
                context,
                extent,
                color_format,
                vk::ImageUsageFlags::TRANSIENT_ATTACHMENT | vk::ImageUsageFlags::COLOR_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
                samples,
            )?)
        } else {
            None
        };

        let depth = AttachmentImage::new(
            context,
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            samples,
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|&swapchain_view| {
                let attachments: Vec<vk::ImageView> = match &msaa_color {
                    Some(msaa) => vec![msaa.image_view(), depth.image_view(), swapchain_view],
                    None => vec![swapchain_view, depth.image_view()],
                };
                Framebuffer::new(device.clone(), render_pass.handle(), &attachments, extent)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        Ok(Self {
            framebuffers,
            depth,
            msaa_color,
            render_pass,
            extent,
            color_format,
            samples,
        })
    }

    /// Sample count the target was built with
    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }
}

impl RenderTarget for PresentationTarget {
    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize].framebuffer
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn color_format(&self) -> vk::Format {
        self.color_format
    }

    fn clear_values(&self) -> Vec<vk::ClearValue> {
        let color = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [0.02, 0.02, 0.04, 1.0],
            },
        };
        let depth = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        };
        if self.msaa_color.is_some() {
            // Resolve attachment is DONT_CARE loaded but still needs an entry
            vec![color, depth, color]
        } else {
            vec![color, depth]
        }
    }
}

/// Number of rotating color images an offscreen target owns.
///
/// Three lets the UI sample last frame's result while the current frame
/// renders into another image and a third sits queued.
pub const OFFSCREEN_IMAGE_COUNT: usize = 3;

/// View/sampler pair a UI layer binds like any other texture
#[derive(Clone, Copy, Debug)]
pub struct OffscreenTexture {
    pub view: vk::ImageView,
    pub sampler: vk::Sampler,
}

/// Fixed-size render-to-texture target.
///
/// Owns a small rotation of single-sampled sampleable color images
/// (one framebuffer each, sharing one depth attachment) so a completed
/// image can be displayed as a texture while the next one is drawn.
/// Picking targets use this with `R8G8B8A8_UNORM` regardless of the
/// display format.
pub struct OffscreenTarget {
    framebuffers: Vec<Framebuffer>,
    depth: AttachmentImage,
    colors: Vec<AttachmentImage>,
    render_pass: RenderPass,
    sampler: vk::Sampler,
    device: Device,
    extent: vk::Extent2D,
    color_format: vk::Format,
}

impl OffscreenTarget {
    /// Build an offscreen target of the given extent and color format
    pub fn new(
        context: &VulkanContext,
        extent: vk::Extent2D,
        color_format: vk::Format,
    ) -> VulkanResult<Self> {
        let device = context.raw_device();
        let depth_format = context.find_depth_format()?;

        let render_pass =
            RenderPass::new_offscreen_pass(device.clone(), color_format, depth_format)?;

        let colors = (0..OFFSCREEN_IMAGE_COUNT)
            .map(|_| {
                AttachmentImage::new(
                    context,
                    extent,
                    color_format,
                    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::SAMPLED,
                    vk::ImageAspectFlags::COLOR,
                    vk::SampleCountFlags::TYPE_1,
                )
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let depth = AttachmentImage::new(
            context,
            extent,
            depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            vk::ImageAspectFlags::DEPTH,
            vk::SampleCountFlags::TYPE_1,
        )?;

        let framebuffers = colors
            .iter()
            .map(|color| {
                let attachments = [color.image_view(), depth.image_view()];
                Framebuffer::new(device.clone(), render_pass.handle(), &attachments, extent)
            })
            .collect::<VulkanResult<Vec<_>>>()?;

        let sampler_info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_v(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .address_mode_w(vk::SamplerAddressMode::CLAMP_TO_EDGE)
            .min_lod(0.0)
            .max_lod(0.0);

        let sampler = unsafe {
            device
                .create_sampler(&sampler_info, None)
                .map_err(|code| VulkanError::ResourceCreation { kind: "sampler", code })?
        };

        Ok(Self {
            framebuffers,
            depth,
            colors,
            render_pass,
            sampler,
            device,
            extent,
            color_format,
        })
    }

    /// Number of rotating color images
    pub fn image_count(&self) -> usize {
        self.colors.len()
    }

    /// Texture handle for a completed image, bindable by UI or picking
    /// readback shaders once the pass writing it has finished
    pub fn texture(&self, image_index: u32) -> OffscreenTexture {
        OffscreenTexture {
            view: self.colors[image_index as usize].image_view(),
            sampler: self.sampler,
        }
    }

    /// Color image handle for the given index
    pub fn color_image(&self, image_index: u32) -> vk::Image {
        self.colors[image_index as usize].image()
    }
}

impl RenderTarget for OffscreenTarget {
    fn render_pass(&self) -> vk::RenderPass {
        self.render_pass.handle()
    }

    fn framebuffer(&self, image_index: u32) -> vk::Framebuffer {
        self.framebuffers[image_index as usize].framebuffer
    }

    fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn color_format(&self) -> vk::Format {
        self.color_format
    }

    fn clear_values(&self) -> Vec<vk::ClearValue> {
        vec![
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 0.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: 1.0,
                    stencil: 0,
                },
            },
        ]
    }
}

impl Drop for OffscreenTarget {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_sampler(self.sampler, None);
        }
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

    // Mirrors the field layout both targets use: framebuffers above the
    // attachments they reference, render pass last.
    struct Layout {
        framebuffers: Tracked,
        depth: Tracked,
        render_pass: Tracked,
    }

    #[test]
    fn framebuffers_release_before_their_attachments() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let target = Layout {
            framebuffers: Tracked {
                name: "framebuffers",
                log: log.clone(),
            },
            depth: Tracked {
                name: "depth",
                log: log.clone(),
            },
            render_pass: Tracked {
                name: "render_pass",
                log: log.clone(),
            },
        };
        let _ = (&target.framebuffers, &target.depth, &target.render_pass);

        drop(target);
        assert_eq!(*log.borrow(), ["framebuffers", "depth", "render_pass"]);
    }
}
