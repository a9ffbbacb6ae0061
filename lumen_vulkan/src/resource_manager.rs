use crate::buffer::Buffer;
use crate::device::AshDevice;
use crate::image::{Image, ImageDescription};
use crate::{BufferKey, ImageKey, VulkanError};
use ash::vk;
use slotmap::SlotMap;
use std::sync::Arc;

/// Owns every long-lived buffer and image. Dropping the manager releases them.
pub struct ResourceManager {
    device: Arc<AshDevice>,
    buffers: SlotMap<BufferKey, Buffer>,
    images: SlotMap<ImageKey, Image>,
}

impl ResourceManager {
    pub fn new(device: Arc<AshDevice>) -> Self {
        Self {
            device,
            buffers: SlotMap::with_key(),
            images: SlotMap::with_key(),
        }
    }

    pub fn insert_buffer(&mut self, buffer: Buffer) -> BufferKey {
        self.buffers.insert(buffer)
    }

    pub fn create_image(
        &mut self,
        name: &str,
        description: &ImageDescription,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<ImageKey, VulkanError> {
        let image = Image::new(self.device.clone(), name, description, properties)?;
        Ok(self.images.insert(image))
    }

    pub fn image(&self, key: ImageKey) -> Result<&Image, VulkanError> {
        self.images.get(key).ok_or(VulkanError::MissingResource("image"))
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        debug!(
            "Releasing {} buffers and {} images",
            self.buffers.len(),
            self.images.len()
        );
    }
}
