use crate::device::AshDevice;
use crate::memory::{allocate_memory, free_memory};
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// First candidate usable as an optimally tiled depth attachment.
pub fn find_depth_format(
    candidates: &[vk::Format],
    mut optimal_features: impl FnMut(vk::Format) -> vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        optimal_features(format).contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    })
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

pub fn aspect_flags_for(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        format if has_stencil_component(format) => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// Exclusive ownership for a single family, concurrent across several.
pub fn sharing_mode_for(queue_families: &[u32]) -> (vk::SharingMode, Vec<u32>) {
    let mut unique: Vec<u32> = Vec::with_capacity(queue_families.len());
    for &family in queue_families {
        if !unique.contains(&family) {
            unique.push(family);
        }
    }

    if unique.len() > 1 {
        (vk::SharingMode::CONCURRENT, unique)
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

#[derive(Debug, Clone)]
pub struct ImageDescription {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub image_type: vk::ImageType,
    pub format: vk::Format,
    pub tiling: vk::ImageTiling,
    pub usage: vk::ImageUsageFlags,
    pub queue_families: Vec<u32>,
}

impl ImageDescription {
    pub fn new_2d(
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Self {
        Self {
            width: extent.width,
            height: extent.height,
            depth: 1,
            image_type: vk::ImageType::TYPE_2D,
            format,
            tiling: vk::ImageTiling::OPTIMAL,
            usage,
            queue_families: Vec::new(),
        }
    }

    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }
}

/// An image object with no memory behind it yet.
pub struct UnboundImage {
    device: Arc<AshDevice>,
    name: String,
    handle: vk::Image,
    description: ImageDescription,
}

impl UnboundImage {
    pub fn new(
        device: Arc<AshDevice>,
        name: &str,
        description: &ImageDescription,
    ) -> Result<Self, VulkanError> {
        let (sharing_mode, queue_family_indices) = sharing_mode_for(&description.queue_families);

        let handle = unsafe {
            device.core.create_image(
                &vk::ImageCreateInfo::builder()
                    .image_type(description.image_type)
                    .format(description.format)
                    .extent(description.extent())
                    .mip_levels(1)
                    .array_layers(1)
                    .samples(vk::SampleCountFlags::TYPE_1)
                    .tiling(description.tiling)
                    .usage(description.usage)
                    .sharing_mode(sharing_mode)
                    .queue_family_indices(&queue_family_indices)
                    .initial_layout(vk::ImageLayout::UNDEFINED),
                None,
            )
        }?;

        device.set_object_name(handle, name);

        Ok(Self {
            device,
            name: name.to_string(),
            handle,
            description: description.clone(),
        })
    }

    pub fn memory_requirements(&self) -> vk::MemoryRequirements {
        unsafe { self.device.core.get_image_memory_requirements(self.handle) }
    }

    pub fn allocate_and_bind(mut self, desired: vk::MemoryPropertyFlags) -> Result<Image, VulkanError> {
        let requirements = self.memory_requirements();
        let linear = self.description.tiling == vk::ImageTiling::LINEAR;
        let allocation = allocate_memory(&self.device, &self.name, requirements, desired, linear)?;

        if let Err(err) = unsafe {
            self.device
                .core
                .bind_image_memory(self.handle, allocation.memory(), allocation.offset())
        } {
            free_memory(&self.device, allocation);
            return Err(err.into());
        }

        let handle = std::mem::replace(&mut self.handle, vk::Image::null());

        Ok(Image {
            device: self.device.clone(),
            handle,
            allocation,
            description: self.description.clone(),
        })
    }
}

impl Drop for UnboundImage {
    fn drop(&mut self) {
        if self.handle != vk::Image::null() {
            unsafe {
                self.device.core.destroy_image(self.handle, None);
            }
        }
    }
}

pub struct Image {
    pub device: Arc<AshDevice>,
    pub handle: vk::Image,
    pub allocation: gpu_allocator::vulkan::Allocation,
    pub description: ImageDescription,
}

impl Image {
    pub fn new(
        device: Arc<AshDevice>,
        name: &str,
        description: &ImageDescription,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self, VulkanError> {
        UnboundImage::new(device, name, description)?.allocate_and_bind(properties)
    }

    pub fn subresource_range(&self) -> vk::ImageSubresourceRange {
        full_subresource_range(aspect_flags_for(self.description.format))
    }

    pub fn create_view(&self) -> Result<ImageView, VulkanError> {
        ImageView::new(
            self.device.clone(),
            self.handle,
            self.description.format,
            self.subresource_range(),
        )
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_image(self.handle, None) };
        free_memory(&self.device, std::mem::take(&mut self.allocation));
    }
}

pub(crate) fn full_subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange::builder()
        .aspect_mask(aspect_mask)
        .base_mip_level(0)
        .level_count(1)
        .base_array_layer(0)
        .layer_count(1)
        .build()
}

pub struct ImageView {
    device: Arc<AshDevice>,
    pub handle: vk::ImageView,
}

impl ImageView {
    /// View over an image this type does not own, e.g. a swapchain image.
    pub fn new(
        device: Arc<AshDevice>,
        image: vk::Image,
        format: vk::Format,
        subresource_range: vk::ImageSubresourceRange,
    ) -> Result<Self, VulkanError> {
        let handle = unsafe {
            device.core.create_image_view(
                &vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(subresource_range),
                None,
            )
        }?;

        Ok(Self { device, handle })
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_image_view(self.handle, None) };
    }
}
