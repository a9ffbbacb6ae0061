use crate::device::AshDevice;
use crate::VulkanError;
use ash::vk;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BindingDescription {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
}

impl BindingDescription {
    pub const fn new(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            stages,
        }
    }
}

pub struct DescriptorSetLayout {
    device: Arc<AshDevice>,
    pub handle: vk::DescriptorSetLayout,
    pub bindings: Vec<BindingDescription>,
}

impl DescriptorSetLayout {
    pub fn new(device: Arc<AshDevice>, bindings: &[BindingDescription]) -> Result<Self, VulkanError> {
        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .descriptor_count(1)
                    .stage_flags(binding.stages)
                    .build()
            })
            .collect();

        let handle = unsafe {
            device.core.create_descriptor_set_layout(
                &vk::DescriptorSetLayoutCreateInfo::builder().bindings(&layout_bindings),
                None,
            )
        }?;

        Ok(Self {
            device,
            handle,
            bindings: bindings.to_vec(),
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .core
                .destroy_descriptor_set_layout(self.handle, None)
        };
    }
}

#[derive(Debug, Default, Clone, Copy, Eq, PartialEq)]
pub struct BindingCount {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub storage_images: u32,
    pub combined_image_samplers: u32,
}

impl BindingCount {
    /// Totals per descriptor type across every layout the pool serves.
    pub fn from_layouts<'a>(layouts: impl IntoIterator<Item = &'a [BindingDescription]>) -> Self {
        let mut counts = Self::default();
        for binding in layouts.into_iter().flatten() {
            match binding.descriptor_type {
                vk::DescriptorType::UNIFORM_BUFFER => counts.uniform_buffers += 1,
                vk::DescriptorType::STORAGE_BUFFER => counts.storage_buffers += 1,
                vk::DescriptorType::STORAGE_IMAGE => counts.storage_images += 1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => counts.combined_image_samplers += 1,
                other => warn!("Descriptor type {:?} is not pooled", other),
            }
        }
        counts
    }

    pub fn pool_sizes(&self) -> Vec<vk::DescriptorPoolSize> {
        [
            (vk::DescriptorType::UNIFORM_BUFFER, self.uniform_buffers),
            (vk::DescriptorType::STORAGE_BUFFER, self.storage_buffers),
            (vk::DescriptorType::STORAGE_IMAGE, self.storage_images),
            (
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                self.combined_image_samplers,
            ),
        ]
        .into_iter()
        .filter(|(_ty, count)| *count > 0)
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        })
        .collect()
    }
}

pub struct DescriptorPool {
    device: Arc<AshDevice>,
    pub handle: vk::DescriptorPool,
}

impl DescriptorPool {
    pub fn new(device: Arc<AshDevice>, counts: BindingCount, max_sets: u32) -> Result<Self, VulkanError> {
        let pool_sizes = counts.pool_sizes();

        let handle = unsafe {
            device.core.create_descriptor_pool(
                &vk::DescriptorPoolCreateInfo::builder()
                    .pool_sizes(&pool_sizes)
                    .max_sets(max_sets),
                None,
            )
        }?;

        info!("Created descriptor pool {:?} for {} sets", counts, max_sets);
        Ok(Self { device, handle })
    }

    pub fn allocate(&self, layout: &DescriptorSetLayout) -> Result<vk::DescriptorSet, VulkanError> {
        let layouts = [layout.handle];
        let sets = unsafe {
            self.device.core.allocate_descriptor_sets(
                &vk::DescriptorSetAllocateInfo::builder()
                    .descriptor_pool(self.handle)
                    .set_layouts(&layouts),
            )
        }?;
        Ok(sets[0])
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.core.destroy_descriptor_pool(self.handle, None) };
    }
}

#[derive(Debug, Clone, Copy)]
pub enum DescriptorResource {
    Buffer(vk::DescriptorBufferInfo),
    Image(vk::DescriptorImageInfo),
}

#[derive(Debug, Clone, Copy)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    pub fn buffer(binding: u32, descriptor_type: vk::DescriptorType, buffer: vk::Buffer) -> Self {
        Self {
            binding,
            descriptor_type,
            resource: DescriptorResource::Buffer(vk::DescriptorBufferInfo {
                buffer,
                offset: 0,
                range: vk::WHOLE_SIZE,
            }),
        }
    }

    pub fn image(
        binding: u32,
        descriptor_type: vk::DescriptorType,
        sampler: vk::Sampler,
        image_view: vk::ImageView,
        image_layout: vk::ImageLayout,
    ) -> Self {
        Self {
            binding,
            descriptor_type,
            resource: DescriptorResource::Image(vk::DescriptorImageInfo {
                sampler,
                image_view,
                image_layout,
            }),
        }
    }
}

/// Points each binding of `set` at its resource. Types are not checked
/// against the layout.
pub fn write_descriptor_set(device: &AshDevice, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
    let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
        .iter()
        .map(|write| {
            let builder = vk::WriteDescriptorSet::builder()
                .dst_set(set)
                .dst_binding(write.binding)
                .dst_array_element(0)
                .descriptor_type(write.descriptor_type);
            match &write.resource {
                DescriptorResource::Buffer(info) => {
                    builder.buffer_info(std::slice::from_ref(info)).build()
                }
                DescriptorResource::Image(info) => builder.image_info(std::slice::from_ref(info)).build(),
            }
        })
        .collect();

    unsafe { device.core.update_descriptor_sets(&descriptor_writes, &[]) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_every_layout() {
        let graphics = [
            BindingDescription::new(0, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::VERTEX),
            BindingDescription::new(
                1,
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                vk::ShaderStageFlags::FRAGMENT,
            ),
        ];
        let compute = [
            BindingDescription::new(0, vk::DescriptorType::STORAGE_IMAGE, vk::ShaderStageFlags::COMPUTE),
            BindingDescription::new(1, vk::DescriptorType::UNIFORM_BUFFER, vk::ShaderStageFlags::COMPUTE),
            BindingDescription::new(2, vk::DescriptorType::STORAGE_BUFFER, vk::ShaderStageFlags::COMPUTE),
        ];

        let counts = BindingCount::from_layouts([&graphics[..], &compute[..]]);
        assert_eq!(
            counts,
            BindingCount {
                uniform_buffers: 2,
                storage_buffers: 1,
                storage_images: 1,
                combined_image_samplers: 1,
            }
        );
        assert_eq!(counts.pool_sizes().len(), 4);
    }

    #[test]
    fn empty_types_are_left_out_of_the_pool() {
        let graphics = [BindingDescription::new(
            0,
            vk::DescriptorType::UNIFORM_BUFFER,
            vk::ShaderStageFlags::VERTEX,
        )];
        let sizes = BindingCount::from_layouts([&graphics[..]]).pool_sizes();
        assert_eq!(sizes.len(), 1);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 1);
    }
}
