use crate::device::AshDevice;
use crate::image::{full_subresource_range, sharing_mode_for, ImageView};
use crate::instance::Surface;
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

pub const DEFAULT_SURFACE_FORMATS: [vk::SurfaceFormatKHR; 2] = [
    vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
    vk::SurfaceFormatKHR {
        format: vk::Format::R8G8B8A8_UNORM,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    },
];

/// First preferred format the surface offers, else the surface's first format.
/// A lone UNDEFINED entry means the surface accepts anything.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: &[vk::SurfaceFormatKHR],
) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = available {
        if only.format == vk::Format::UNDEFINED {
            return preferred.first().copied();
        }
    }

    preferred
        .iter()
        .find(|wanted| {
            available.iter().any(|surface_format| {
                surface_format.format == wanted.format
                    && surface_format.color_space == wanted.color_space
            })
        })
        .copied()
        .or_else(|| available.first().copied())
}

/// Mailbox when offered, otherwise FIFO which every surface supports.
pub fn choose_present_mode(available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    // u32::MAX means the swapchain decides the surface size.
    let target = if capabilities.current_extent.width == u32::MAX {
        desired
    } else {
        capabilities.current_extent
    };

    vk::Extent2D {
        width: target.width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: target.height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// One more than the minimum, capped by the maximum (0 means no maximum).
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

#[derive(Debug, Clone)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Debug, Clone)]
pub struct SwapchainParameters {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub sharing_mode: vk::SharingMode,
    pub queue_family_indices: Vec<u32>,
}

impl SwapchainSupport {
    pub fn query(device: &AshDevice, surface: &Surface) -> Result<Self, VulkanError> {
        let surface_ext = &device.instance.surface;
        unsafe {
            Ok(Self {
                capabilities: surface_ext
                    .get_physical_device_surface_capabilities(device.physical, surface.handle)?,
                formats: surface_ext
                    .get_physical_device_surface_formats(device.physical, surface.handle)?,
                present_modes: surface_ext
                    .get_physical_device_surface_present_modes(device.physical, surface.handle)?,
            })
        }
    }

    pub fn choose(
        &self,
        desired_extent: vk::Extent2D,
        preferred_formats: &[vk::SurfaceFormatKHR],
        graphics_family: u32,
        present_family: u32,
    ) -> Result<SwapchainParameters, VulkanError> {
        let surface_format = choose_surface_format(&self.formats, preferred_formats)
            .ok_or(VulkanError::Vk(vk::Result::ERROR_FORMAT_NOT_SUPPORTED))?;
        let (sharing_mode, queue_family_indices) =
            sharing_mode_for(&[graphics_family, present_family]);

        Ok(SwapchainParameters {
            surface_format,
            present_mode: choose_present_mode(&self.present_modes),
            extent: choose_extent(&self.capabilities, desired_extent),
            image_count: choose_image_count(&self.capabilities),
            pre_transform: self.capabilities.current_transform,
            sharing_mode,
            queue_family_indices,
        })
    }
}

pub struct Framebuffer {
    device: Arc<AshDevice>,
    pub handle: vk::Framebuffer,
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_framebuffer(self.handle, None) };
    }
}

pub struct Swapchain {
    device: Arc<AshDevice>,
    _surface: Arc<Surface>,
    pub handle: vk::SwapchainKHR,
    pub parameters: SwapchainParameters,
    pub images: Vec<vk::Image>,
    pub views: Vec<ImageView>,
    pub framebuffers: Vec<Framebuffer>,
}

impl Swapchain {
    pub fn new(
        device: Arc<AshDevice>,
        surface: Arc<Surface>,
        desired_extent: vk::Extent2D,
        preferred_formats: &[vk::SurfaceFormatKHR],
    ) -> Result<Self, VulkanError> {
        let support = SwapchainSupport::query(&device, &surface)?;
        let parameters = support.choose(
            desired_extent,
            preferred_formats,
            device.queues.graphics.family_index,
            device.queues.present.family_index,
        )?;

        let handle = unsafe {
            device.swapchain.create_swapchain(
                &vk::SwapchainCreateInfoKHR::builder()
                    .surface(surface.handle)
                    .min_image_count(parameters.image_count)
                    .image_format(parameters.surface_format.format)
                    .image_color_space(parameters.surface_format.color_space)
                    .image_extent(parameters.extent)
                    .image_array_layers(1)
                    .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
                    .image_sharing_mode(parameters.sharing_mode)
                    .queue_family_indices(&parameters.queue_family_indices)
                    .pre_transform(parameters.pre_transform)
                    .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
                    .present_mode(parameters.present_mode)
                    .clipped(true),
                None,
            )
        }?;

        let mut swapchain = Self {
            device: device.clone(),
            _surface: surface,
            handle,
            parameters,
            images: Vec::new(),
            views: Vec::new(),
            framebuffers: Vec::new(),
        };

        swapchain.images = unsafe { device.swapchain.get_swapchain_images(handle) }?;
        for &image in swapchain.images.iter() {
            swapchain.views.push(ImageView::new(
                device.clone(),
                image,
                swapchain.parameters.surface_format.format,
                full_subresource_range(vk::ImageAspectFlags::COLOR),
            )?);
        }

        info!(
            "Created swapchain: {:?} {:?} {}x{} with {} images ({:?})",
            swapchain.parameters.surface_format.format,
            swapchain.parameters.present_mode,
            swapchain.parameters.extent.width,
            swapchain.parameters.extent.height,
            swapchain.images.len(),
            swapchain.parameters.sharing_mode,
        );

        Ok(swapchain)
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.parameters.extent
    }

    pub fn format(&self) -> vk::Format {
        self.parameters.surface_format.format
    }

    /// One framebuffer per swapchain view, all sharing `depth_view`.
    pub fn create_framebuffers(
        &mut self,
        render_pass: vk::RenderPass,
        depth_view: vk::ImageView,
    ) -> Result<(), VulkanError> {
        self.framebuffers.clear();
        let extent = self.extent();

        for view in self.views.iter() {
            let attachments = [view.handle, depth_view];
            let handle = unsafe {
                self.device.core.create_framebuffer(
                    &vk::FramebufferCreateInfo::builder()
                        .render_pass(render_pass)
                        .attachments(&attachments)
                        .width(extent.width)
                        .height(extent.height)
                        .layers(1),
                    None,
                )
            }?;
            self.framebuffers.push(Framebuffer {
                device: self.device.clone(),
                handle,
            });
        }
        Ok(())
    }

    pub fn framebuffer_handles(&self) -> Vec<vk::Framebuffer> {
        self.framebuffers.iter().map(|framebuffer| framebuffer.handle).collect()
    }

    pub fn acquire_next_image(
        &self,
        image_available: vk::Semaphore,
        timeout_ns: u64,
    ) -> Result<u32, VulkanError> {
        match unsafe {
            self.device.swapchain.acquire_next_image(
                self.handle,
                timeout_ns,
                image_available,
                vk::Fence::null(),
            )
        } {
            Ok((index, suboptimal)) => {
                if suboptimal {
                    warn!("Swapchain is suboptimal for the surface");
                }
                Ok(index)
            }
            Err(vk::Result::TIMEOUT) | Err(vk::Result::NOT_READY) => Err(VulkanError::AcquireTimeout),
            Err(err) => Err(err.into()),
        }
    }

    pub fn present(
        &self,
        queue: vk::Queue,
        wait_semaphore: vk::Semaphore,
        image_index: u32,
    ) -> Result<(), VulkanError> {
        let wait_semaphores = [wait_semaphore];
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let suboptimal = unsafe {
            self.device.swapchain.queue_present(
                queue,
                &vk::PresentInfoKHR::builder()
                    .wait_semaphores(&wait_semaphores)
                    .swapchains(&swapchains)
                    .image_indices(&image_indices),
            )
        }?;
        if suboptimal {
            warn!("Presented to a suboptimal swapchain");
        }
        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.framebuffers.clear();
        self.views.clear();
        unsafe { self.device.swapchain.destroy_swapchain(self.handle, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
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
    fn end_to_end_selection() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 3, (800, 600)),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        };

        let parameters = support
            .choose(
                vk::Extent2D {
                    width: 1024,
                    height: 768,
                },
                &DEFAULT_SURFACE_FORMATS,
                0,
                0,
            )
            .unwrap();

        assert_eq!(parameters.image_count, 3);
        assert_eq!(parameters.surface_format.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(parameters.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(
            parameters.extent,
            vk::Extent2D {
                width: 800,
                height: 600
            }
        );
        assert_eq!(parameters.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn split_graphics_and_present_share_concurrently() {
        let support = SwapchainSupport {
            capabilities: capabilities(2, 0, (640, 480)),
            formats: DEFAULT_SURFACE_FORMATS.to_vec(),
            present_modes: vec![vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX],
        };
        let parameters = support
            .choose(vk::Extent2D::default(), &DEFAULT_SURFACE_FORMATS, 0, 2)
            .unwrap();

        assert_eq!(parameters.sharing_mode, vk::SharingMode::CONCURRENT);
        assert_eq!(parameters.queue_family_indices, vec![0, 2]);
        assert_eq!(parameters.present_mode, vk::PresentModeKHR::MAILBOX);
        assert_eq!(parameters.image_count, 3);
    }

    #[test]
    fn extent_is_clamped_only_when_surface_defers() {
        let mut caps = capabilities(2, 3, (u32::MAX, u32::MAX));
        caps.min_image_extent = vk::Extent2D {
            width: 100,
            height: 100,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 1920,
            height: 1080,
        };

        let inside = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(choose_extent(&caps, inside), inside);

        let outside = vk::Extent2D {
            width: 4000,
            height: 50,
        };
        assert_eq!(
            choose_extent(&caps, outside),
            vk::Extent2D {
                width: 1920,
                height: 100
            }
        );

        let fixed = capabilities(2, 3, (1280, 720));
        assert_eq!(
            choose_extent(&fixed, inside),
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
    }

    #[test]
    fn extent_always_within_bounds() {
        let mut caps = capabilities(2, 3, (u32::MAX, u32::MAX));
        caps.min_image_extent = vk::Extent2D {
            width: 64,
            height: 32,
        };
        caps.max_image_extent = vk::Extent2D {
            width: 512,
            height: 256,
        };

        for width in [0, 63, 64, 300, 512, 513, u32::MAX - 1] {
            for height in [0, 31, 32, 100, 256, 1000] {
                let extent = choose_extent(&caps, vk::Extent2D { width, height });
                assert!((64..=512).contains(&extent.width));
                assert!((32..=256).contains(&extent.height));
                if (64..=512).contains(&width) && (32..=256).contains(&height) {
                    assert_eq!(extent, vk::Extent2D { width, height });
                }
            }
        }
    }

    #[test]
    fn image_count_respects_unbounded_maximum() {
        assert_eq!(choose_image_count(&capabilities(2, 0, (1, 1))), 3);
        assert_eq!(choose_image_count(&capabilities(2, 2, (1, 1))), 2);
        assert_eq!(choose_image_count(&capabilities(1, 8, (1, 1))), 2);
    }

    #[test]
    fn format_preference_and_fallback() {
        let undefined = [vk::SurfaceFormatKHR {
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        assert_eq!(
            choose_surface_format(&undefined, &DEFAULT_SURFACE_FORMATS),
            Some(DEFAULT_SURFACE_FORMATS[0])
        );

        let offered = [
            vk::SurfaceFormatKHR {
                format: vk::Format::A2B10G10R10_UNORM_PACK32,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            DEFAULT_SURFACE_FORMATS[1],
        ];
        assert_eq!(
            choose_surface_format(&offered, &DEFAULT_SURFACE_FORMATS),
            Some(DEFAULT_SURFACE_FORMATS[1])
        );
        assert_eq!(choose_surface_format(&offered[..1], &DEFAULT_SURFACE_FORMATS), Some(offered[0]));
        assert_eq!(choose_surface_format(&[], &DEFAULT_SURFACE_FORMATS), None);
    }
}
