use crate::device::AshDevice;
use crate::image::sharing_mode_for;
use crate::memory::{allocate_memory, free_memory};
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct BufferDescription {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    /// Families that access the buffer. More than one makes it concurrent.
    pub queue_families: Vec<u32>,
}

impl BufferDescription {
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self {
            size,
            usage,
            queue_families: Vec::new(),
        }
    }

    pub fn shared_by(mut self, queue_families: &[u32]) -> Self {
        self.queue_families = queue_families.to_vec();
        self
    }

    pub fn sharing_mode(&self) -> (vk::SharingMode, Vec<u32>) {
        sharing_mode_for(&self.queue_families)
    }
}

/// A buffer object with no memory behind it yet.
pub struct UnboundBuffer {
    device: Arc<AshDevice>,
    name: String,
    handle: vk::Buffer,
    description: BufferDescription,
}

impl UnboundBuffer {
    pub fn new(
        device: Arc<AshDevice>,
        name: &str,
        description: &BufferDescription,
    ) -> Result<Self, VulkanError> {
        let (sharing_mode, queue_family_indices) = description.sharing_mode();

        let handle = unsafe {
            device.core.create_buffer(
                &vk::BufferCreateInfo::builder()
                    .size(description.size)
                    .usage(description.usage)
                    .sharing_mode(sharing_mode)
                    .queue_family_indices(&queue_family_indices),
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
        unsafe { self.device.core.get_buffer_memory_requirements(self.handle) }
    }

    pub fn allocate_and_bind(mut self, desired: vk::MemoryPropertyFlags) -> Result<Buffer, VulkanError> {
        let requirements = self.memory_requirements();
        let allocation = allocate_memory(&self.device, &self.name, requirements, desired, true)?;

        if let Err(err) = unsafe {
            self.device
                .core
                .bind_buffer_memory(self.handle, allocation.memory(), allocation.offset())
        } {
            free_memory(&self.device, allocation);
            return Err(err.into());
        }

        // Ownership of the handle moves to the bound buffer.
        let handle = std::mem::replace(&mut self.handle, vk::Buffer::null());

        Ok(Buffer {
            device: self.device.clone(),
            handle,
            allocation,
            size: self.description.size,
            usage: self.description.usage,
            properties: desired,
        })
    }
}

impl Drop for UnboundBuffer {
    fn drop(&mut self) {
        if self.handle != vk::Buffer::null() {
            unsafe {
                self.device.core.destroy_buffer(self.handle, None);
            }
        }
    }
}

pub struct Buffer {
    pub device: Arc<AshDevice>,
    pub handle: vk::Buffer,
    pub allocation: gpu_allocator::vulkan::Allocation,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub properties: vk::MemoryPropertyFlags,
}

impl Buffer {
    /// Creates the object and binds it to memory with `properties`.
    pub fn new(
        device: Arc<AshDevice>,
        name: &str,
        description: &BufferDescription,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<Self, VulkanError> {
        UnboundBuffer::new(device, name, description)?.allocate_and_bind(properties)
    }

    /// Copies `data` into the start of a host-mapped buffer.
    pub fn write(&mut self, data: &[u8]) -> Result<(), VulkanError> {
        self.write_at(0, data)
    }

    pub fn write_at(&mut self, offset: usize, data: &[u8]) -> Result<(), VulkanError> {
        let mapped = self
            .allocation
            .mapped_slice_mut()
            .ok_or(VulkanError::MemoryNotMapped)?;
        let end = offset + data.len();
        if end > mapped.len() {
            return Err(VulkanError::WriteOutOfBounds {
                offset,
                len: data.len(),
                capacity: mapped.len(),
            });
        }
        mapped[offset..end].copy_from_slice(data);
        Ok(())
    }

    pub fn read(&self) -> Result<Vec<u8>, VulkanError> {
        let mapped = self
            .allocation
            .mapped_slice()
            .ok_or(VulkanError::MemoryNotMapped)?;
        Ok(mapped[..self.size as usize].to_vec())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.core.destroy_buffer(self.handle, None);
        };
        free_memory(&self.device, std::mem::take(&mut self.allocation));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffers_are_exclusive_by_default() {
        let description = BufferDescription::new(64, vk::BufferUsageFlags::UNIFORM_BUFFER);
        assert_eq!(description.sharing_mode(), (vk::SharingMode::EXCLUSIVE, vec![]));
    }

    #[test]
    fn split_families_share_concurrently() {
        let description =
            BufferDescription::new(128, vk::BufferUsageFlags::STORAGE_BUFFER).shared_by(&[0, 2]);
        assert_eq!(description.sharing_mode(), (vk::SharingMode::CONCURRENT, vec![0, 2]));

        let same = BufferDescription::new(128, vk::BufferUsageFlags::STORAGE_BUFFER).shared_by(&[1, 1]);
        assert_eq!(same.sharing_mode(), (vk::SharingMode::EXCLUSIVE, vec![]));
    }
}
